use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::{AnalyzerError, Result};
use crate::types::FusedReading;

/// Default lateral-G deadband for turn detection.
pub const TURN_DEADBAND_G: f64 = 0.2;

/// Aggregator state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AnalysisState {
    /// Created, no run started
    Idle,
    /// Accepting readings
    Recording,
    /// Metrics computed; readings rejected until the next start
    Finalized,
}

/// Run-level aggregate produced once per recorded run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestMetrics {
    pub peak_lateral_g: f64,
    pub peak_acceleration_g: f64,
    /// Most negative longitudinal G (zero or below).
    pub peak_braking_g: f64,
    pub peak_vertical_g: f64,
    pub lateral_variation: f64,
    pub longitudinal_variation: f64,
    pub vertical_variation: f64,
    pub turn_count: u32,
    pub duration_secs: f64,
    pub data_points: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnDirection {
    Left,
    Right,
}

/// Live, per-run accumulator over the fused reading stream.
///
/// Single-writer: callers serialize `process_reading` themselves.
pub struct StreamAggregator {
    state: AnalysisState,
    turn_deadband_g: f64,

    lateral_history: Vec<f64>,
    longitudinal_history: Vec<f64>,
    vertical_history: Vec<f64>,

    started_at: Option<Instant>,
    peak_lateral: f64,
    peak_acceleration: f64,
    peak_braking: f64,
    peak_vertical: f64,
    turn_count: u32,
    last_direction: Option<TurnDirection>,

    finalized: Option<TestMetrics>,
}

impl StreamAggregator {
    pub fn new(turn_deadband_g: f64) -> Self {
        Self {
            state: AnalysisState::Idle,
            turn_deadband_g,
            lateral_history: Vec::new(),
            longitudinal_history: Vec::new(),
            vertical_history: Vec::new(),
            started_at: None,
            peak_lateral: 0.0,
            peak_acceleration: 0.0,
            peak_braking: 0.0,
            peak_vertical: 0.0,
            turn_count: 0,
            last_direction: None,
            finalized: None,
        }
    }

    pub fn state(&self) -> AnalysisState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == AnalysisState::Recording
    }

    /// Reset all running state and enter Recording (from any state).
    pub fn start_analysis(&mut self) {
        self.lateral_history.clear();
        self.longitudinal_history.clear();
        self.vertical_history.clear();
        self.started_at = Some(Instant::now());
        self.peak_lateral = 0.0;
        self.peak_acceleration = 0.0;
        self.peak_braking = 0.0;
        self.peak_vertical = 0.0;
        self.turn_count = 0;
        self.last_direction = None;
        self.finalized = None;

        log::debug!("Aggregator {:?} -> Recording", self.state);
        self.state = AnalysisState::Recording;
    }

    pub fn process_reading(&mut self, reading: &FusedReading) -> Result<()> {
        if self.state != AnalysisState::Recording {
            return Err(AnalyzerError::InvalidState(format!(
                "process_reading requires Recording, aggregator is {:?}",
                self.state
            )));
        }

        let lateral = reading.peak_lateral_g;
        let longitudinal = reading.peak_longitudinal_g;
        let vertical = reading.peak_vertical_g;

        self.lateral_history.push(lateral);
        self.longitudinal_history.push(longitudinal);
        self.vertical_history.push(vertical);

        self.peak_lateral = self.peak_lateral.max(lateral.abs());
        self.peak_vertical = self.peak_vertical.max(vertical.abs());
        self.peak_acceleration = self.peak_acceleration.max(longitudinal);
        self.peak_braking = self.peak_braking.min(longitudinal);

        self.track_turn(lateral);
        Ok(())
    }

    /// Finalize the run. Repeated calls return the same metrics.
    pub fn compute_metrics(&mut self) -> Result<TestMetrics> {
        match self.state {
            AnalysisState::Idle => Err(AnalyzerError::InvalidState(
                "compute_metrics called before start_analysis".to_string(),
            )),
            AnalysisState::Finalized => self.finalized.clone().ok_or_else(|| {
                AnalyzerError::InvalidState("finalized without metrics".to_string())
            }),
            AnalysisState::Recording => {
                let duration_secs = self
                    .started_at
                    .map(|t| t.elapsed().as_secs_f64())
                    .unwrap_or(0.0);

                let metrics = TestMetrics {
                    peak_lateral_g: self.peak_lateral,
                    peak_acceleration_g: self.peak_acceleration,
                    peak_braking_g: self.peak_braking,
                    peak_vertical_g: self.peak_vertical,
                    lateral_variation: population_std_dev(&self.lateral_history),
                    longitudinal_variation: population_std_dev(&self.longitudinal_history),
                    vertical_variation: population_std_dev(&self.vertical_history),
                    turn_count: self.turn_count,
                    duration_secs,
                    data_points: self.lateral_history.len(),
                };

                log::info!(
                    "Run finalized: {} readings over {:.1}s, {} turns",
                    metrics.data_points,
                    metrics.duration_secs,
                    metrics.turn_count
                );
                self.finalized = Some(metrics.clone());
                self.state = AnalysisState::Finalized;
                Ok(metrics)
            }
        }
    }

    /// Deadband sign tracking. Neutral readings leave the last direction untouched.
    fn track_turn(&mut self, lateral_g: f64) {
        let direction = if lateral_g > self.turn_deadband_g {
            TurnDirection::Right
        } else if lateral_g < -self.turn_deadband_g {
            TurnDirection::Left
        } else {
            return;
        };

        if let Some(last) = self.last_direction {
            if last != direction {
                self.turn_count += 1;
            }
        }
        self.last_direction = Some(direction);
    }
}

impl Default for StreamAggregator {
    fn default() -> Self {
        Self::new(TURN_DEADBAND_G)
    }
}

/// Population standard deviation; 0 for an empty slice.
pub fn population_std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    variance.max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Axis3;
    use approx::assert_abs_diff_eq;

    fn reading(lateral: f64, longitudinal: f64, vertical: f64) -> FusedReading {
        FusedReading {
            timestamp_ms: 0,
            accel: Axis3::ZERO,
            gyro: Axis3::ZERO,
            pitch: 0.0,
            roll: 0.0,
            yaw: 0.0,
            filtered_accel_z: vertical * 9.81,
            peak_lateral_g: lateral,
            peak_longitudinal_g: longitudinal,
            peak_vertical_g: vertical,
            speed: 10.0,
        }
    }

    fn lateral_run(values: &[f64]) -> TestMetrics {
        let mut agg = StreamAggregator::default();
        agg.start_analysis();
        for &v in values {
            agg.process_reading(&reading(v, 0.0, 0.0)).unwrap();
        }
        agg.compute_metrics().unwrap()
    }

    #[test]
    fn test_std_dev() {
        assert_eq!(population_std_dev(&[]), 0.0);
        assert_eq!(population_std_dev(&[0.4; 25]), 0.0);
        assert_abs_diff_eq!(population_std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]), 2.0, epsilon = 1e-12);
    }

    #[test]
    fn test_state_transitions() {
        let mut agg = StreamAggregator::default();
        assert_eq!(agg.state(), AnalysisState::Idle);

        agg.start_analysis();
        assert!(agg.is_recording());

        agg.compute_metrics().unwrap();
        assert_eq!(agg.state(), AnalysisState::Finalized);

        // Restart from Finalized
        agg.start_analysis();
        assert_eq!(agg.state(), AnalysisState::Recording);
    }

    #[test]
    fn test_invalid_state_rejected() {
        let mut agg = StreamAggregator::default();
        assert!(matches!(
            agg.process_reading(&reading(0.1, 0.0, 0.0)),
            Err(AnalyzerError::InvalidState(_))
        ));
        assert!(matches!(agg.compute_metrics(), Err(AnalyzerError::InvalidState(_))));

        agg.start_analysis();
        agg.compute_metrics().unwrap();
        assert!(matches!(
            agg.process_reading(&reading(0.1, 0.0, 0.0)),
            Err(AnalyzerError::InvalidState(_))
        ));
    }

    #[test]
    fn test_empty_run_metrics() {
        let mut agg = StreamAggregator::default();
        agg.start_analysis();
        let metrics = agg.compute_metrics().unwrap();

        assert_eq!(metrics.data_points, 0);
        assert_eq!(metrics.turn_count, 0);
        assert_eq!(metrics.peak_lateral_g, 0.0);
        assert_eq!(metrics.peak_acceleration_g, 0.0);
        assert_eq!(metrics.peak_braking_g, 0.0);
        assert_eq!(metrics.peak_vertical_g, 0.0);
        assert_eq!(metrics.lateral_variation, 0.0);
        assert_eq!(metrics.longitudinal_variation, 0.0);
        assert_eq!(metrics.vertical_variation, 0.0);
        assert!(metrics.duration_secs >= 0.0);
    }

    #[test]
    fn test_peaks_tracked() {
        let mut agg = StreamAggregator::default();
        agg.start_analysis();
        for r in [
            reading(0.3, 0.5, -0.2),
            reading(-0.6, -0.9, 0.1),
            reading(0.1, 0.7, 0.4),
            reading(0.0, -0.3, -0.5),
        ] {
            agg.process_reading(&r).unwrap();
        }
        let metrics = agg.compute_metrics().unwrap();

        assert_eq!(metrics.peak_lateral_g, 0.6);
        assert_eq!(metrics.peak_acceleration_g, 0.7);
        assert_eq!(metrics.peak_braking_g, -0.9);
        assert_eq!(metrics.peak_vertical_g, 0.5);
        assert_eq!(metrics.data_points, 4);
        assert!(metrics.vertical_variation > 0.0);
    }

    #[test]
    fn test_turn_count_on_sign_reversal() {
        let metrics = lateral_run(&[0.3, 0.4, -0.3, -0.5, 0.25, -0.25]);
        assert_eq!(metrics.turn_count, 3);
    }

    #[test]
    fn test_neutral_readings_keep_last_direction() {
        // right, neutral, right again: no turn
        assert_eq!(lateral_run(&[0.3, 0.0, 0.1, -0.1, 0.3]).turn_count, 0);
        // right, neutral, left: one turn across the neutral gap
        assert_eq!(lateral_run(&[0.3, 0.0, 0.0, -0.3]).turn_count, 1);
    }

    #[test]
    fn test_deadband_only_readings_never_turn() {
        let values: Vec<f64> = (0..200).map(|i| if i % 2 == 0 { 0.19 } else { -0.2 }).collect();
        assert_eq!(lateral_run(&values).turn_count, 0);
    }

    #[test]
    fn test_finalized_metrics_are_stable() {
        let mut agg = StreamAggregator::default();
        agg.start_analysis();
        agg.process_reading(&reading(0.5, 0.2, 0.1)).unwrap();
        let first = agg.compute_metrics().unwrap();
        let second = agg.compute_metrics().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_start_resets_previous_run() {
        let mut agg = StreamAggregator::default();
        agg.start_analysis();
        agg.process_reading(&reading(0.9, 0.9, 0.9)).unwrap();
        agg.compute_metrics().unwrap();

        agg.start_analysis();
        agg.process_reading(&reading(0.1, 0.0, 0.0)).unwrap();
        let metrics = agg.compute_metrics().unwrap();
        assert_eq!(metrics.peak_lateral_g, 0.1);
        assert_eq!(metrics.data_points, 1);
    }
}
