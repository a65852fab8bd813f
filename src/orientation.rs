//! Orientation estimation and gravity compensation.
//!
//! A complementary filter blends integrated gyroscope rates (fast, drifts)
//! with the tilt implied by the accelerometer (slow, drift-free). Roll and
//! pitch are used to rotate each calibrated accel vector into the
//! gravity-aligned frame, gravity is removed from the vertical axis and the
//! result is expressed in G.
//!
//! Accelerometer tilt is only trusted while the measured magnitude stays
//! within `accel_trust_band_g` of 1 g; during hard manoeuvres the estimate
//! runs on the gyro alone so sustained cornering or braking is not absorbed
//! into the attitude.

use nalgebra::{Rotation3, Vector3};
use std::f64::consts::PI;

use crate::config::AnalyzerConfig;
use crate::types::{Axis3, FusedReading, RawSample};

// ─── Signal processing ───────────────────────────────────────────────────────

struct LowPassFilter {
    alpha: f64,
    last_output: Vector3<f64>,
    initialized: bool,
}

impl LowPassFilter {
    fn new(cutoff_hz: f64, sample_rate_hz: f64) -> Self {
        let dt = 1.0 / sample_rate_hz;
        let rc = 1.0 / (2.0 * PI * cutoff_hz);
        let alpha = dt / (rc + dt);
        Self { alpha, last_output: Vector3::zeros(), initialized: false }
    }

    fn update(&mut self, input: Vector3<f64>) -> Vector3<f64> {
        if !self.initialized {
            self.last_output = input;
            self.initialized = true;
            return input;
        }
        self.last_output = self.last_output * (1.0 - self.alpha) + input * self.alpha;
        self.last_output
    }

    fn reset(&mut self) {
        self.last_output = Vector3::zeros();
        self.initialized = false;
    }
}

// ─── Orientation filter ──────────────────────────────────────────────────────

pub struct OrientationFilter {
    alpha: f64,
    gravity: f64,
    max_dt_ms: u64,
    accel_trust_band_g: f64,

    roll: f64,
    pitch: f64,
    yaw: f64,
    last_timestamp_ms: Option<u64>,

    accel_lpf: LowPassFilter,
}

impl OrientationFilter {
    pub fn new(config: &AnalyzerConfig) -> Self {
        Self {
            alpha: config.filter_alpha,
            gravity: config.gravity,
            max_dt_ms: config.max_dt_ms,
            accel_trust_band_g: config.accel_trust_band_g,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            last_timestamp_ms: None,
            accel_lpf: LowPassFilter::new(config.accel_lpf_cutoff_hz, config.accel_lpf_sample_hz),
        }
    }

    /// Forget the orientation estimate. Called after recalibration.
    pub fn reset(&mut self) {
        self.roll = 0.0;
        self.pitch = 0.0;
        self.yaw = 0.0;
        self.last_timestamp_ms = None;
        self.accel_lpf.reset();
    }

    /// (pitch, roll, yaw) in radians.
    pub fn orientation(&self) -> (f64, f64, f64) {
        (self.pitch, self.roll, self.yaw)
    }

    /// Fuse one calibrated sample. `speed` is passed through to the reading.
    pub fn process(&mut self, sample: &RawSample, speed: f64) -> FusedReading {
        let accel = finite_or_zero(sample.accel.to_vector());
        let gyro = finite_or_zero(sample.gyro.to_vector());
        let (roll_acc, pitch_acc) = tilt_from_accel(&accel);

        match self.last_timestamp_ms {
            None => {
                self.roll = roll_acc;
                self.pitch = pitch_acc;
            }
            Some(prev_ts) => {
                let dt = self.step_secs(prev_ts, sample.timestamp_ms);
                let roll_gyro = self.roll + gyro.x * dt;
                let pitch_gyro = self.pitch + gyro.y * dt;

                if self.accel_trusted(&accel) {
                    self.roll = blend(roll_gyro, roll_acc, self.alpha);
                    self.pitch = blend(pitch_gyro, pitch_acc, self.alpha);
                } else {
                    self.roll = wrap_angle(roll_gyro);
                    self.pitch = wrap_angle(pitch_gyro);
                }
                self.yaw = wrap_angle(self.yaw + gyro.z * dt);
            }
        }
        self.last_timestamp_ms = Some(sample.timestamp_ms);

        // Level the accel vector, then remove 1 g from the vertical axis
        let level = Rotation3::from_euler_angles(self.roll, self.pitch, 0.0) * accel;
        let linear = level - Vector3::new(0.0, 0.0, self.gravity);
        let filtered = self.accel_lpf.update(linear);

        FusedReading {
            timestamp_ms: sample.timestamp_ms,
            accel: Axis3::from(accel),
            gyro: Axis3::from(gyro),
            pitch: self.pitch,
            roll: self.roll,
            yaw: self.yaw,
            filtered_accel_z: filtered.z,
            peak_lateral_g: filtered.x / self.gravity,
            peak_longitudinal_g: filtered.y / self.gravity,
            peak_vertical_g: filtered.z / self.gravity,
            speed: if speed.is_finite() { speed } else { 0.0 },
        }
    }

    fn step_secs(&self, prev_ts: u64, ts: u64) -> f64 {
        // Non-increasing timestamps contribute no rotation
        let dt_ms = ts.saturating_sub(prev_ts).min(self.max_dt_ms);
        dt_ms as f64 / 1000.0
    }

    fn accel_trusted(&self, accel: &Vector3<f64>) -> bool {
        let deviation_g = (accel.norm() - self.gravity).abs() / self.gravity;
        deviation_g <= self.accel_trust_band_g
    }
}

/// Roll and pitch implied by a gravity-dominated accel vector.
fn tilt_from_accel(accel: &Vector3<f64>) -> (f64, f64) {
    let roll = accel.y.atan2(accel.z);
    let pitch = (-accel.x).atan2((accel.y * accel.y + accel.z * accel.z).sqrt());
    (roll, pitch)
}

/// Complementary blend on the shortest angular path.
fn blend(gyro_estimate: f64, accel_estimate: f64, alpha: f64) -> f64 {
    let correction = wrap_angle(accel_estimate - gyro_estimate);
    wrap_angle(gyro_estimate + (1.0 - alpha) * correction)
}

/// Wrap to (-π, π].
fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI { wrapped + 2.0 * PI } else { wrapped }
}

fn finite_or_zero(v: Vector3<f64>) -> Vector3<f64> {
    if v.iter().all(|c| c.is_finite()) {
        v
    } else {
        log::debug!("Dropping non-finite sensor vector {:?}", v);
        Vector3::zeros()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GRAVITY;
    use approx::assert_abs_diff_eq;

    fn sample(ts: u64, accel: (f64, f64, f64), gyro: (f64, f64, f64)) -> RawSample {
        RawSample::new(
            ts,
            Axis3::new(accel.0, accel.1, accel.2),
            Axis3::new(gyro.0, gyro.1, gyro.2),
        )
    }

    #[test]
    fn test_level_stationary_reads_zero_g() {
        let mut filter = OrientationFilter::new(&AnalyzerConfig::default());
        let mut last = None;
        for i in 0..50 {
            last = Some(filter.process(&RawSample::stationary(i * 20), 5.0));
        }
        let reading = last.unwrap();

        assert_abs_diff_eq!(reading.pitch, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(reading.roll, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(reading.filtered_accel_z, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(reading.peak_lateral_g, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(reading.peak_longitudinal_g, 0.0, epsilon = 1e-9);
        assert_eq!(reading.speed, 5.0);
    }

    #[test]
    fn test_static_tilt_is_compensated() {
        let roll: f64 = 0.2;
        let accel = (0.0, GRAVITY * roll.sin(), GRAVITY * roll.cos());
        let mut filter = OrientationFilter::new(&AnalyzerConfig::default());

        let reading = filter.process(&sample(0, accel, (0.0, 0.0, 0.0)), 0.0);
        assert_abs_diff_eq!(reading.roll, roll, epsilon = 1e-9);
        assert_abs_diff_eq!(reading.peak_vertical_g, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(reading.peak_longitudinal_g, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sustained_lateral_load_not_absorbed_into_tilt() {
        let mut filter = OrientationFilter::new(&AnalyzerConfig::default());
        for i in 0..30 {
            filter.process(&RawSample::stationary(i * 20), 10.0);
        }
        let mut reading = None;
        for i in 30..60 {
            reading = Some(filter.process(
                &sample(i * 20, (0.5 * GRAVITY, 0.0, GRAVITY), (0.0, 0.0, 0.0)),
                10.0,
            ));
        }
        let reading = reading.unwrap();

        assert_abs_diff_eq!(reading.pitch, 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(reading.peak_lateral_g, 0.5, epsilon = 1e-3);
        assert_abs_diff_eq!(reading.peak_vertical_g, 0.0, epsilon = 1e-3);
    }

    #[test]
    fn test_braking_reads_negative_longitudinal() {
        let mut filter = OrientationFilter::new(&AnalyzerConfig::default());
        for i in 0..10 {
            filter.process(&RawSample::stationary(i * 20), 15.0);
        }
        let mut reading = None;
        for i in 10..50 {
            reading = Some(filter.process(
                &sample(i * 20, (0.0, -0.8 * GRAVITY, GRAVITY), (0.0, 0.0, 0.0)),
                15.0,
            ));
        }
        assert_abs_diff_eq!(reading.unwrap().peak_longitudinal_g, -0.8, epsilon = 1e-3);
    }

    #[test]
    fn test_long_session_stays_bounded() {
        let mut filter = OrientationFilter::new(&AnalyzerConfig::default());
        // Uncorrected gyro bias on every axis for ~33 minutes at 50 Hz
        for i in 0..100_000u64 {
            let reading = filter.process(
                &sample(i * 20, (0.0, 0.0, GRAVITY), (0.05, -0.05, 0.3)),
                20.0,
            );
            assert!(reading.yaw > -PI && reading.yaw <= PI);
            assert!(reading.peak_vertical_g.is_finite());
        }
        let (pitch, roll, _) = filter.orientation();
        assert!(roll.abs() < 0.1, "roll drifted to {}", roll);
        assert!(pitch.abs() < 0.1, "pitch drifted to {}", pitch);
    }

    #[test]
    fn test_identical_input_is_deterministic() {
        let input: Vec<RawSample> = (0..500u64)
            .map(|i| {
                let t = i as f64 * 0.02;
                sample(
                    i * 20,
                    ((t * 3.0).sin(), (t * 1.7).cos(), GRAVITY + (t * 9.0).sin()),
                    ((t * 0.5).sin() * 0.1, 0.02, (t * 0.2).cos() * 0.1),
                )
            })
            .collect();

        let mut a = OrientationFilter::new(&AnalyzerConfig::default());
        let mut b = OrientationFilter::new(&AnalyzerConfig::default());
        let ra: Vec<FusedReading> = input.iter().map(|s| a.process(s, 12.0)).collect();
        let rb: Vec<FusedReading> = input.iter().map(|s| b.process(s, 12.0)).collect();
        assert_eq!(ra, rb);
    }

    #[test]
    fn test_sensor_gap_is_clamped() {
        let config = AnalyzerConfig::default();
        let mut filter = OrientationFilter::new(&config);
        filter.process(&RawSample::stationary(0), 0.0);
        // 10 s gap while spinning at 1 rad/s on z
        let reading = filter.process(&sample(10_000, (0.0, 0.0, GRAVITY), (0.0, 0.0, 1.0)), 0.0);
        assert_abs_diff_eq!(reading.yaw, config.max_dt_ms as f64 / 1000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_non_finite_input_does_not_poison_state() {
        let mut filter = OrientationFilter::new(&AnalyzerConfig::default());
        filter.process(&RawSample::stationary(0), 0.0);
        filter.process(&sample(20, (f64::NAN, 0.0, GRAVITY), (0.0, f64::INFINITY, 0.0)), f64::NAN);
        let reading = filter.process(&RawSample::stationary(40), 0.0);
        assert!(reading.pitch.is_finite() && reading.roll.is_finite());
        assert!(reading.peak_vertical_g.is_finite());
    }

    #[test]
    fn test_reset_reseeds_from_accel() {
        let mut filter = OrientationFilter::new(&AnalyzerConfig::default());
        for i in 0..10 {
            filter.process(&sample(i * 20, (0.0, 0.0, GRAVITY), (0.0, 0.0, 0.5)), 0.0);
        }
        assert!(filter.orientation().2 > 0.0);

        filter.reset();
        let reading = filter.process(&RawSample::stationary(1_000), 0.0);
        assert_eq!(reading.yaw, 0.0);
    }

    #[test]
    fn test_wrap_angle() {
        assert_abs_diff_eq!(wrap_angle(2.5 * PI), 0.5 * PI, epsilon = 1e-9);
        assert_abs_diff_eq!(wrap_angle(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(wrap_angle(0.5), 0.5, epsilon = 1e-12);
        // Blending across the ±π seam stays on the seam instead of swinging through 0
        assert_abs_diff_eq!(blend(PI - 0.01, -PI + 0.01, 0.5).abs(), PI, epsilon = 1e-9);
    }
}
