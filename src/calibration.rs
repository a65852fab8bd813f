//! Zero-offset calibration from stationary samples.
//!
//! The device is assumed to be motionless and level while calibrating; no
//! stillness detection is performed. The accelerometer bias is the stationary
//! mean minus the reference gravity vector `(0, 0, g)`, so a calibrated
//! stationary sample reads exactly `(0, 0, g)`. The gyroscope bias is the
//! plain stationary mean.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc::Receiver;

use crate::error::{AnalyzerError, Result};
use crate::types::{Axis3, RawSample};

/// Per-axis bias subtracted from every sample after calibration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationOffset {
    pub accel: Axis3,
    pub gyro: Axis3,
}

impl CalibrationOffset {
    /// Mean accel/gyro over `samples`, with gravity removed from the accel mean.
    /// An empty window yields the zero offset.
    pub fn from_samples(samples: &[RawSample], gravity: f64) -> Self {
        let count = samples.len();
        if count == 0 {
            return Self::default();
        }

        let mut asum = (0.0, 0.0, 0.0);
        let mut gsum = (0.0, 0.0, 0.0);
        for s in samples {
            asum.0 += s.accel.x; asum.1 += s.accel.y; asum.2 += s.accel.z;
            gsum.0 += s.gyro.x; gsum.1 += s.gyro.y; gsum.2 += s.gyro.z;
        }
        let n = count as f64;

        Self {
            accel: Axis3::new(asum.0 / n, asum.1 / n, asum.2 / n - gravity),
            gyro: Axis3::new(gsum.0 / n, gsum.1 / n, gsum.2 / n),
        }
    }

    pub fn apply(&self, sample: &RawSample) -> RawSample {
        RawSample {
            timestamp_ms: sample.timestamp_ms,
            accel: sample.accel - self.accel,
            gyro: sample.gyro - self.gyro,
        }
    }
}

/// Holds the offset currently in force. Starts at zero.
#[derive(Clone, Debug)]
pub struct Calibrator {
    offset: CalibrationOffset,
    gravity: f64,
    calibrated: bool,
}

impl Calibrator {
    pub fn new(gravity: f64) -> Self {
        Self {
            offset: CalibrationOffset::default(),
            gravity,
            calibrated: false,
        }
    }

    pub fn offset(&self) -> CalibrationOffset {
        self.offset
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrated
    }

    pub fn apply(&self, sample: &RawSample) -> RawSample {
        self.offset.apply(sample)
    }

    /// Calibrate from an already-collected window, using its first `sample_count` samples.
    pub fn calibrate_from(
        &mut self,
        samples: &[RawSample],
        sample_count: usize,
    ) -> Result<CalibrationOffset> {
        check_sample_count(sample_count)?;
        if samples.len() < sample_count {
            log::warn!(
                "Calibration aborted: {} of {} samples available, keeping previous offset",
                samples.len(),
                sample_count
            );
            return Err(AnalyzerError::InsufficientSamples {
                collected: samples.len(),
                required: sample_count,
            });
        }
        Ok(self.commit(&samples[..sample_count]))
    }

    /// Collect `sample_count` consecutive samples from `rx` within `timeout`.
    ///
    /// On timeout or a closed channel the partial window is discarded and the
    /// previous offset stays in force. Dropping the returned future has the
    /// same effect.
    pub async fn calibrate(
        &mut self,
        rx: &mut Receiver<RawSample>,
        sample_count: usize,
        timeout: Duration,
    ) -> Result<CalibrationOffset> {
        check_sample_count(sample_count)?;
        log::info!("Calibrating (collecting {} stationary samples)...", sample_count);

        let mut window = Vec::with_capacity(sample_count);
        let collect = async {
            while window.len() < sample_count {
                match rx.recv().await {
                    Some(sample) => window.push(sample),
                    None => break,
                }
            }
        };
        if tokio::time::timeout(timeout, collect).await.is_err() {
            log::debug!("Calibration window timed out after {:?}", timeout);
        }

        if window.len() < sample_count {
            log::warn!(
                "Calibration failed: collected {} of {} samples, keeping previous offset",
                window.len(),
                sample_count
            );
            return Err(AnalyzerError::InsufficientSamples {
                collected: window.len(),
                required: sample_count,
            });
        }
        Ok(self.commit(&window))
    }

    fn commit(&mut self, window: &[RawSample]) -> CalibrationOffset {
        self.offset = CalibrationOffset::from_samples(window, self.gravity);
        self.calibrated = true;
        log::info!(
            "Calibration complete: accel bias ({:.3}, {:.3}, {:.3}) m/s², gyro bias ({:.4}, {:.4}, {:.4}) rad/s ({} samples)",
            self.offset.accel.x, self.offset.accel.y, self.offset.accel.z,
            self.offset.gyro.x, self.offset.gyro.y, self.offset.gyro.z,
            window.len()
        );
        self.offset
    }
}

fn check_sample_count(sample_count: usize) -> Result<()> {
    if sample_count == 0 {
        return Err(AnalyzerError::InvalidConfig(
            "calibration sample count must be at least 1".to_string(),
        ));
    }
    Ok(())
}
