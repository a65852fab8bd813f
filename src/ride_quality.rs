//! Offline ride-quality breakdown of a completed run.
//!
//! The reading log is split into three fixed speed buckets and each bucket is
//! scored on its vertical acceleration: RMS, peak, oscillation frequency and a
//! log-decrement damping estimate, normalized by the square of the mean
//! bucket speed.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::types::FusedReading;

/// Floor applied to the mean bucket speed (m/s) before normalization.
const MIN_MEAN_SPEED: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpeedBucket {
    /// [0, 30) km/h
    Low,
    /// [30, 60] km/h
    Mid,
    /// (60, ∞) km/h
    High,
}

impl SpeedBucket {
    pub const ALL: [SpeedBucket; 3] = [SpeedBucket::Low, SpeedBucket::Mid, SpeedBucket::High];

    /// Bucket for a speed in km/h. Non-finite and negative speeds fall in `Low`.
    pub fn for_kmh(kmh: f64) -> Self {
        if !kmh.is_finite() || kmh < 30.0 {
            SpeedBucket::Low
        } else if kmh <= 60.0 {
            SpeedBucket::Mid
        } else {
            SpeedBucket::High
        }
    }

    pub fn index(self) -> usize {
        match self {
            SpeedBucket::Low => 0,
            SpeedBucket::Mid => 1,
            SpeedBucket::High => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            SpeedBucket::Low => "0-30 km/h",
            SpeedBucket::Mid => "30-60 km/h",
            SpeedBucket::High => "60+ km/h",
        }
    }
}

/// Ride-quality metrics for one speed bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetrics {
    pub bucket: SpeedBucket,
    pub sample_count: usize,
    pub rms_vertical: f64,
    pub peak_vertical: f64,
    /// Local extrema per second (Hz).
    pub vibration_frequency: f64,
    pub damping_ratio: f64,
    pub normalized_rms: f64,
    pub normalized_peak: f64,
    /// 0-100, higher is smoother.
    pub composite_score: f64,
}

impl RunMetrics {
    /// Sentinel for a bucket with no readings.
    pub fn empty(bucket: SpeedBucket) -> Self {
        Self {
            bucket,
            sample_count: 0,
            rms_vertical: 0.0,
            peak_vertical: 0.0,
            vibration_frequency: 0.0,
            damping_ratio: 0.0,
            normalized_rms: 0.0,
            normalized_peak: 0.0,
            composite_score: 100.0,
        }
    }
}

/// Score a run log. Always returns three entries, ordered Low, Mid, High.
pub fn analyze(readings: &[FusedReading]) -> Vec<RunMetrics> {
    let mut buckets: [Vec<&FusedReading>; 3] = [Vec::new(), Vec::new(), Vec::new()];
    for reading in readings {
        buckets[SpeedBucket::for_kmh(reading.speed_kmh()).index()].push(reading);
    }

    let metrics: Vec<RunMetrics> = SpeedBucket::ALL
        .iter()
        .zip(buckets.iter())
        .map(|(&bucket, members)| bucket_metrics(bucket, members))
        .collect();

    log::debug!(
        "Ride quality: {} readings -> bucket sizes [{}, {}, {}]",
        readings.len(),
        metrics[0].sample_count,
        metrics[1].sample_count,
        metrics[2].sample_count
    );
    metrics
}

/// (seconds since the first reading, filtered vertical accel) pairs for charting.
pub fn vertical_trace(readings: &[FusedReading]) -> Vec<(f64, f64)> {
    let Some(first) = readings.first() else {
        return Vec::new();
    };
    readings
        .iter()
        .map(|r| {
            let secs = r.timestamp_ms.saturating_sub(first.timestamp_ms) as f64 / 1000.0;
            (secs, r.filtered_accel_z)
        })
        .collect()
}

fn bucket_metrics(bucket: SpeedBucket, members: &[&FusedReading]) -> RunMetrics {
    let (Some(first), Some(last)) = (members.first(), members.last()) else {
        return RunMetrics::empty(bucket);
    };

    let z: Vec<f64> = members.iter().map(|r| r.filtered_accel_z).collect();
    let n = z.len() as f64;

    let peak = z.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    let rms = root_mean_square(&z, peak);

    let span_secs = last.timestamp_ms.saturating_sub(first.timestamp_ms) as f64 / 1000.0;
    let frequency = vibration_frequency(&z, span_secs);
    let damping = damping_ratio(&z);

    let mean_speed = (members
        .iter()
        .map(|r| if r.speed.is_finite() { r.speed } else { 0.0 })
        .sum::<f64>()
        / n)
        .max(MIN_MEAN_SPEED);
    let scale = mean_speed * mean_speed / 1000.0;
    let normalized_rms = (rms / scale).min(f64::MAX);
    let normalized_peak = (peak / scale).min(f64::MAX);

    let penalty = 0.5 * normalized_rms + 0.3 * normalized_peak + 0.2 * frequency;
    let composite_score = if penalty.is_finite() {
        (100.0 - penalty).clamp(0.0, 100.0)
    } else {
        0.0
    };

    RunMetrics {
        bucket,
        sample_count: members.len(),
        rms_vertical: rms,
        peak_vertical: peak,
        vibration_frequency: frequency,
        damping_ratio: damping,
        normalized_rms,
        normalized_peak,
        composite_score,
    }
}

/// RMS accumulated relative to `peak` (max |z|) so squares never overflow.
fn root_mean_square(z: &[f64], peak: f64) -> f64 {
    if z.is_empty() || peak == 0.0 {
        return 0.0;
    }
    let mean_sq = z.iter().map(|v| (v / peak) * (v / peak)).sum::<f64>() / z.len() as f64;
    peak * mean_sq.sqrt()
}

/// Local extrema per second over `span_secs`.
///
/// Interior samples strictly above or below both neighbours count as one
/// extremum. End samples strictly above or below their only neighbour count
/// as half, but only once the interior oscillates, so a window cut mid-swing
/// is not under-counted while a monotonic window still reads 0 Hz.
fn vibration_frequency(z: &[f64], span_secs: f64) -> f64 {
    if z.len() < 3 || span_secs <= 0.0 {
        return 0.0;
    }

    let interior = z
        .windows(3)
        .filter(|w| (w[0] < w[1] && w[1] > w[2]) || (w[0] > w[1] && w[1] < w[2]))
        .count() as f64;
    if interior == 0.0 {
        return 0.0;
    }

    let n = z.len();
    let mut edges = 0.0;
    if z[0] != z[1] {
        edges += 0.5;
    }
    if z[n - 1] != z[n - 2] {
        edges += 0.5;
    }

    (interior + edges) / span_secs
}

/// Mean log-decrement over consecutive local maxima, divided by 2π.
/// Pairs that do not decay (or touch zero) contribute 0 to the mean.
fn damping_ratio(z: &[f64]) -> f64 {
    let peaks: Vec<f64> = z
        .windows(3)
        .filter(|w| w[1] > w[0] && w[1] > w[2])
        .map(|w| w[1])
        .collect();
    if peaks.len() < 2 {
        return 0.0;
    }

    let decrements: Vec<f64> = peaks
        .windows(2)
        .map(|p| {
            if p[0] > p[1] && p[1] > 0.0 {
                (p[0] / p[1]).ln()
            } else {
                0.0
            }
        })
        .collect();

    let mean = decrements.iter().sum::<f64>() / decrements.len() as f64;
    mean / (2.0 * PI)
}
