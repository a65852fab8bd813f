//! Motion-sensor fusion and suspension test scoring.
//!
//! Raw accelerometer/gyroscope samples are calibrated, fused into orientation
//! and gravity-compensated G-forces, aggregated over a test run and scored
//! against a driving protocol. A per-speed ride-quality breakdown is computed
//! from the logged readings once the run ends.

pub mod aggregator;
pub mod calibration;
pub mod comparison;
pub mod config;
pub mod error;
pub mod orientation;
pub mod protocol;
pub mod ride_quality;
pub mod run_session;
pub mod sensors;
pub mod types;

pub use aggregator::{AnalysisState, StreamAggregator, TestMetrics};
pub use calibration::{CalibrationOffset, Calibrator};
pub use comparison::{RunComparison, ScoredRun};
pub use config::AnalyzerConfig;
pub use error::{AnalyzerError, Result};
pub use orientation::OrientationFilter;
pub use protocol::{Rating, TestProtocol, TestScore};
pub use ride_quality::{analyze, vertical_trace, RunMetrics, SpeedBucket};
pub use run_session::{RunReport, RunSession};
pub use types::{Axis3, FusedReading, RawSample, GRAVITY};
