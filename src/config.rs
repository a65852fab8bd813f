use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{AnalyzerError, Result};
use crate::types::GRAVITY;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    // ── Physics ──
    pub gravity: f64,

    // ── Orientation filter ──
    /// Gyro weight of the complementary blend (accel weight is 1 - alpha).
    pub filter_alpha: f64,
    /// Largest integration step; longer sensor gaps are clamped to this.
    pub max_dt_ms: u64,
    /// Accel tilt is ignored while |a| deviates from 1 g by more than this.
    pub accel_trust_band_g: f64,

    // ── Low-pass filter on gravity-aligned accel ──
    pub accel_lpf_cutoff_hz: f64,
    pub accel_lpf_sample_hz: f64,

    // ── Turn detection ──
    pub turn_deadband_g: f64,

    // ── Calibration ──
    pub calibration_samples: usize,
    pub calibration_timeout_ms: u64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            gravity: GRAVITY,
            filter_alpha: 0.98,
            max_dt_ms: 200,
            accel_trust_band_g: 0.1,
            accel_lpf_cutoff_hz: 5.0,
            accel_lpf_sample_hz: 50.0,
            turn_deadband_g: 0.2,
            calibration_samples: 50,
            calibration_timeout_ms: 5_000,
        }
    }
}

impl AnalyzerConfig {
    /// Load a JSON config file. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let config: AnalyzerConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        log::info!(
            "Loaded analyzer config from {} (alpha={}, calibration_samples={})",
            path.as_ref().display(),
            config.filter_alpha,
            config.calibration_samples
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.gravity.is_finite() && self.gravity > 0.0) {
            return Err(AnalyzerError::InvalidConfig(format!(
                "gravity must be positive, got {}",
                self.gravity
            )));
        }
        if !(0.0..=1.0).contains(&self.filter_alpha) {
            return Err(AnalyzerError::InvalidConfig(format!(
                "filter_alpha must be within [0, 1], got {}",
                self.filter_alpha
            )));
        }
        if !(self.accel_trust_band_g >= 0.0) {
            return Err(AnalyzerError::InvalidConfig(format!(
                "accel_trust_band_g must be non-negative, got {}",
                self.accel_trust_band_g
            )));
        }
        if self.accel_lpf_cutoff_hz <= 0.0 || self.accel_lpf_sample_hz <= 0.0 {
            return Err(AnalyzerError::InvalidConfig(
                "low-pass cutoff and sample rate must be positive".to_string(),
            ));
        }
        if self.turn_deadband_g < 0.0 {
            return Err(AnalyzerError::InvalidConfig(format!(
                "turn_deadband_g must be non-negative, got {}",
                self.turn_deadband_g
            )));
        }
        if self.calibration_samples == 0 {
            return Err(AnalyzerError::InvalidConfig(
                "calibration_samples must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn calibration_timeout(&self) -> Duration {
        Duration::from_millis(self.calibration_timeout_ms)
    }
}
