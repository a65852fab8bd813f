use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::aggregator::TestMetrics;
use crate::error::{AnalyzerError, Result};

/// Sub-score awarded for the first band passed; anything below the last band scores 30.
const BAND_SCORES: [u32; 5] = [100, 85, 70, 50, 30];

/// Score a metric where higher is better: first threshold strictly exceeded wins.
fn band_above(value: f64, thresholds: [f64; 4]) -> u32 {
    thresholds
        .iter()
        .position(|&t| value > t)
        .map_or(BAND_SCORES[4], |i| BAND_SCORES[i])
}

/// Score a metric where lower is better: first threshold strictly undercut wins.
fn band_below(value: f64, thresholds: [f64; 4]) -> u32 {
    thresholds
        .iter()
        .position(|&t| value < t)
        .map_or(BAND_SCORES[4], |i| BAND_SCORES[i])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rating {
    Excellent,
    Good,
    Average,
    Fair,
    Poor,
}

impl Rating {
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 90 => Rating::Excellent,
            s if s >= 75 => Rating::Good,
            s if s >= 60 => Rating::Average,
            s if s >= 40 => Rating::Fair,
            _ => Rating::Poor,
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Rating::Excellent => "Excellent",
            Rating::Good => "Good",
            Rating::Average => "Average",
            Rating::Fair => "Fair",
            Rating::Poor => "Poor",
        };
        write!(f, "{}", s)
    }
}

/// Protocol-specific score for one finalized run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestScore {
    pub overall_score: u32,
    pub acceleration_score: Option<u32>,
    pub braking_score: Option<u32>,
    pub cornering_score: Option<u32>,
    pub smoothness_score: u32,
    pub rating: Rating,
    /// Ordered (label, formatted value) pairs for display.
    pub breakdown: Vec<(String, String)>,
}

/// Standardized driving test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TestProtocol {
    StandingStartStop,
    Figure8,
}

impl TestProtocol {
    pub fn all() -> &'static [TestProtocol] {
        &[TestProtocol::StandingStartStop, TestProtocol::Figure8]
    }

    pub fn name(&self) -> &'static str {
        match self {
            TestProtocol::StandingStartStop => "Standing Start/Stop",
            TestProtocol::Figure8 => "Figure-8",
        }
    }

    /// Command-line identifier.
    pub fn slug(&self) -> &'static str {
        match self {
            TestProtocol::StandingStartStop => "standing-start-stop",
            TestProtocol::Figure8 => "figure-8",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            TestProtocol::StandingStartStop => {
                "Accelerate from stop to 40 mph, then brake back to stop"
            }
            TestProtocol::Figure8 => "Drive a figure-8 pattern at consistent speed",
        }
    }

    pub fn duration_secs(&self) -> u32 {
        match self {
            TestProtocol::StandingStartStop => 30,
            TestProtocol::Figure8 => 45,
        }
    }

    pub fn instructions(&self) -> &'static [&'static str] {
        match self {
            TestProtocol::StandingStartStop => &[
                "Start from a complete stop",
                "Accelerate smoothly to 40 mph",
                "Brake smoothly to a complete stop",
                "The run is scored on acceleration and braking G-forces",
            ],
            TestProtocol::Figure8 => &[
                "Find a safe, empty area such as a parking lot",
                "Drive a figure-8 pattern",
                "Hold a steady 20-25 mph",
                "Complete at least two full figure-8s",
                "The run is scored on cornering and body roll control",
            ],
        }
    }

    pub fn score(&self, metrics: &TestMetrics) -> TestScore {
        match self {
            TestProtocol::StandingStartStop => {
                let braking = metrics.peak_braking_g.abs();
                let accel = band_above(metrics.peak_acceleration_g, [0.8, 0.6, 0.4, 0.2]);
                let brake = band_above(braking, [0.9, 0.7, 0.5, 0.3]);
                let smooth = band_below(metrics.vertical_variation, [0.15, 0.25, 0.35, 0.50]);
                let overall = (4 * accel + 4 * brake + 2 * smooth) / 10;

                TestScore {
                    overall_score: overall,
                    acceleration_score: Some(accel),
                    braking_score: Some(brake),
                    cornering_score: None,
                    smoothness_score: smooth,
                    rating: Rating::from_score(overall),
                    breakdown: vec![
                        ("Peak Acceleration".into(), format!("{:.2} G", metrics.peak_acceleration_g)),
                        ("Peak Braking".into(), format!("{:.2} G", braking)),
                        ("Vertical Stability".into(), format!("{:.2} G variation", metrics.vertical_variation)),
                    ],
                }
            }
            TestProtocol::Figure8 => {
                let cornering = band_above(metrics.peak_lateral_g, [0.7, 0.5, 0.4, 0.3]);
                let consistency = band_below(metrics.lateral_variation, [0.15, 0.25, 0.35, 0.50]);
                let body_roll = band_below(metrics.vertical_variation, [0.20, 0.30, 0.40, 0.55]);
                let overall = (5 * cornering + 3 * consistency + 2 * body_roll) / 10;

                TestScore {
                    overall_score: overall,
                    acceleration_score: None,
                    braking_score: None,
                    cornering_score: Some(cornering),
                    smoothness_score: body_roll,
                    rating: Rating::from_score(overall),
                    breakdown: vec![
                        ("Peak Lateral G".into(), format!("{:.2} G", metrics.peak_lateral_g)),
                        ("Cornering Consistency".into(), format!("{:.2} G variation", metrics.lateral_variation)),
                        ("Body Roll Control".into(), format!("{:.2} G variation", metrics.vertical_variation)),
                        ("Turn Count".into(), format!("{} turns detected", metrics.turn_count)),
                    ],
                }
            }
        }
    }
}

impl fmt::Display for TestProtocol {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for TestProtocol {
    type Err = AnalyzerError;

    /// Accepts the display name or the slug, case-insensitively.
    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        TestProtocol::all()
            .iter()
            .copied()
            .find(|p| p.name().eq_ignore_ascii_case(wanted) || p.slug().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| AnalyzerError::UnknownProtocol(s.to_string()))
    }
}
