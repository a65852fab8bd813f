//! One recorded test run: calibration, live fusion, aggregation and the final report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc::Receiver;

use crate::aggregator::{AnalysisState, StreamAggregator, TestMetrics};
use crate::calibration::{CalibrationOffset, Calibrator};
use crate::config::AnalyzerConfig;
use crate::error::Result;
use crate::orientation::OrientationFilter;
use crate::protocol::{TestProtocol, TestScore};
use crate::ride_quality::{self, RunMetrics};
use crate::types::{FusedReading, RawSample};

/// Everything produced for a finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub protocol: String,
    pub created_at: DateTime<Utc>,
    pub metrics: TestMetrics,
    pub score: TestScore,
    /// Ordered Low, Mid, High speed bucket.
    pub ride_quality: Vec<RunMetrics>,
}

impl RunReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub struct RunSession {
    config: AnalyzerConfig,
    calibrator: Calibrator,
    filter: OrientationFilter,
    aggregator: StreamAggregator,
    log: Vec<FusedReading>,
}

impl RunSession {
    pub fn new(config: AnalyzerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            calibrator: Calibrator::new(config.gravity),
            filter: OrientationFilter::new(&config),
            aggregator: StreamAggregator::new(config.turn_deadband_g),
            log: Vec::new(),
            config,
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn calibration(&self) -> CalibrationOffset {
        self.calibrator.offset()
    }

    pub fn is_calibrated(&self) -> bool {
        self.calibrator.is_calibrated()
    }

    pub fn state(&self) -> AnalysisState {
        self.aggregator.state()
    }

    /// Readings logged since the last `start`.
    pub fn readings(&self) -> &[FusedReading] {
        &self.log
    }

    pub fn calibrate_from(&mut self, samples: &[RawSample]) -> Result<CalibrationOffset> {
        let offset = self
            .calibrator
            .calibrate_from(samples, self.config.calibration_samples)?;
        self.filter.reset();
        Ok(offset)
    }

    pub async fn calibrate(
        &mut self,
        rx: &mut Receiver<RawSample>,
        timeout: Duration,
    ) -> Result<CalibrationOffset> {
        let offset = self
            .calibrator
            .calibrate(rx, self.config.calibration_samples, timeout)
            .await?;
        self.filter.reset();
        Ok(offset)
    }

    /// Begin a new run, discarding the previous log.
    pub fn start(&mut self) {
        if !self.calibrator.is_calibrated() {
            log::warn!("Starting run without calibration; raw sensor bias will be included");
        }
        self.log.clear();
        self.aggregator.start_analysis();
        log::info!("Run started");
    }

    /// Fuse one sample. While recording the reading is also aggregated and logged.
    pub fn ingest(&mut self, raw: &RawSample, speed: f64) -> FusedReading {
        let calibrated = self.calibrator.apply(raw);
        let reading = self.filter.process(&calibrated, speed);
        if self.aggregator.is_recording() {
            match self.aggregator.process_reading(&reading) {
                Ok(()) => self.log.push(reading),
                Err(e) => log::warn!("Reading at {} ms not aggregated: {}", reading.timestamp_ms, e),
            }
        }
        reading
    }

    /// Finalize the run and score it under `protocol`.
    pub fn finish(&mut self, protocol: TestProtocol) -> Result<RunReport> {
        let metrics = self.aggregator.compute_metrics()?;
        let score = protocol.score(&metrics);
        let ride_quality = ride_quality::analyze(&self.log);

        log::info!(
            "{} scored {} ({}) over {} readings",
            protocol,
            score.overall_score,
            score.rating,
            metrics.data_points
        );

        Ok(RunReport {
            protocol: protocol.name().to_string(),
            created_at: Utc::now(),
            metrics,
            score,
            ride_quality,
        })
    }
}
