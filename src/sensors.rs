use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tokio::sync::mpsc::Sender;
use tokio::time::{interval, Duration};

use crate::error::Result;
use crate::protocol::TestProtocol;
use crate::types::{Axis3, RawSample, GRAVITY};

/// Simulated sensor period (50 Hz).
pub const SAMPLE_PERIOD_MS: u64 = 20;

/// One timestamped sensor sample with the externally supplied vehicle speed.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorFrame {
    pub sample: RawSample,
    /// m/s
    pub speed: f64,
}

/// Recorded sensor stream, stored as JSON (gzip-compressed when the path ends in `.gz`).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    pub samples: Vec<SensorFrame>,
}

fn is_gzip(path: &Path) -> bool {
    path.extension().map(|e| e == "gz").unwrap_or(false)
}

impl RunLog {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let log: RunLog = if is_gzip(path) {
            serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?
        } else {
            serde_json::from_reader(BufReader::new(file))?
        };
        log::info!("Loaded {} samples from {}", log.samples.len(), path.display());
        Ok(log)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)?;
        if is_gzip(path) {
            let mut gz = GzEncoder::new(BufWriter::new(file), Compression::default());
            serde_json::to_writer(&mut gz, self)?;
            gz.finish()?.flush()?;
        } else {
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            writer.flush()?;
        }
        Ok(())
    }
}

/// Deterministic synthetic drive shaped after a test protocol.
///
/// The first `lead_in_secs` are motionless (for calibration); afterwards the
/// vehicle follows the protocol's manoeuvre. A fixed sensor bias is added to
/// every sample.
pub struct SimulatedDrive {
    protocol: TestProtocol,
    index: u64,
    total: u64,
    lead_in: u64,
    speed: f64,
    accel_bias: Axis3,
    gyro_bias: Axis3,
}

impl SimulatedDrive {
    pub fn new(protocol: TestProtocol, lead_in_secs: u64, drive_secs: u64) -> Self {
        let per_sec = 1000 / SAMPLE_PERIOD_MS;
        Self {
            protocol,
            index: 0,
            total: (lead_in_secs + drive_secs) * per_sec,
            lead_in: lead_in_secs * per_sec,
            speed: 0.0,
            accel_bias: Axis3::new(0.05, -0.08, 0.12),
            gyro_bias: Axis3::new(0.002, -0.001, 0.003),
        }
    }

    pub fn accel_bias(&self) -> Axis3 {
        self.accel_bias
    }

    pub fn gyro_bias(&self) -> Axis3 {
        self.gyro_bias
    }

    /// (lateral G, longitudinal G) demanded at `t` seconds into the manoeuvre.
    fn demand(&self, t: f64, drive_secs: f64) -> (f64, f64) {
        match self.protocol {
            TestProtocol::StandingStartStop => {
                let progress = t / drive_secs;
                let longitudinal = if progress < 0.4 && self.speed < 18.0 {
                    0.55
                } else if progress >= 0.55 && self.speed > 0.0 {
                    -0.75
                } else {
                    0.0
                };
                (0.0, longitudinal)
            }
            TestProtocol::Figure8 => {
                let longitudinal = if self.speed < 10.0 { 0.3 } else { 0.0 };
                let lateral = if self.speed > 5.0 {
                    0.55 * (2.0 * PI * t / 8.0).sin()
                } else {
                    0.0
                };
                (lateral, longitudinal)
            }
        }
    }
}

impl Iterator for SimulatedDrive {
    type Item = SensorFrame;

    fn next(&mut self) -> Option<SensorFrame> {
        if self.index >= self.total {
            return None;
        }
        let timestamp_ms = self.index * SAMPLE_PERIOD_MS;
        let moving = self.index >= self.lead_in;
        self.index += 1;

        let (lateral_g, longitudinal_g, vertical) = if moving {
            let dt = SAMPLE_PERIOD_MS as f64 / 1000.0;
            let t = (self.index - self.lead_in) as f64 * dt;
            let drive_secs = (self.total - self.lead_in) as f64 * dt;
            let (lat, long) = self.demand(t, drive_secs);
            self.speed = (self.speed + long * GRAVITY * dt).max(0.0);

            // Road input grows with speed
            let road = self.speed / 20.0;
            let vertical = road * 0.6 * (2.0 * PI * 2.5 * t).sin() + 0.1 * (2.0 * PI * 11.0 * t).sin();
            (lat, long, vertical)
        } else {
            (0.0, 0.0, 0.0)
        };

        let yaw_rate = if self.speed > 1.0 {
            lateral_g * GRAVITY / self.speed
        } else {
            0.0
        };

        let accel = Axis3::new(
            lateral_g * GRAVITY + self.accel_bias.x,
            longitudinal_g * GRAVITY + self.accel_bias.y,
            GRAVITY + vertical + self.accel_bias.z,
        );
        let gyro = Axis3::new(self.gyro_bias.x, self.gyro_bias.y, yaw_rate + self.gyro_bias.z);

        Some(SensorFrame {
            sample: RawSample::new(timestamp_ms, accel, gyro),
            speed: self.speed,
        })
    }
}

/// Push `items` into `tx` in order, one per tick when `period` is given.
/// Stops early if the receiver is dropped.
pub async fn feed<T>(items: impl IntoIterator<Item = T>, tx: Sender<T>, period: Option<Duration>) {
    let mut ticker = period.filter(|p| !p.is_zero()).map(interval);
    let mut sent = 0u64;

    for item in items {
        if let Some(ticker) = ticker.as_mut() {
            ticker.tick().await;
        }
        if tx.send(item).await.is_err() {
            log::warn!("Sensor feed closed by receiver after {} samples", sent);
            return;
        }
        sent += 1;
        if sent % 500 == 0 {
            log::debug!("[feed] {} samples", sent);
        }
    }
    log::debug!("Sensor feed finished ({} samples)", sent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_frame_count_and_timestamps() {
        let frames: Vec<SensorFrame> = SimulatedDrive::new(TestProtocol::Figure8, 1, 2).collect();
        assert_eq!(frames.len(), 150);
        assert!(frames
            .windows(2)
            .all(|w| w[1].sample.timestamp_ms == w[0].sample.timestamp_ms + SAMPLE_PERIOD_MS));
    }

    #[test]
    fn test_lead_in_is_stationary_with_bias() {
        let drive = SimulatedDrive::new(TestProtocol::StandingStartStop, 1, 5);
        let bias = drive.accel_bias();
        for frame in drive.take(50) {
            assert_eq!(frame.speed, 0.0);
            assert_eq!(frame.sample.accel, Axis3::new(bias.x, bias.y, GRAVITY + bias.z));
        }
    }

    #[test]
    fn test_standing_start_stop_profile() {
        let frames: Vec<SensorFrame> = SimulatedDrive::new(TestProtocol::StandingStartStop, 1, 30).collect();
        let top_speed = frames.iter().map(|f| f.speed).fold(0.0, f64::max);
        assert!(top_speed > 15.0);
        assert!(frames.iter().all(|f| f.speed >= 0.0));
        let last = frames.last().unwrap();
        assert_eq!(last.speed, 0.0);
    }

    #[test]
    fn test_figure8_alternates_direction() {
        let drive = SimulatedDrive::new(TestProtocol::Figure8, 0, 30);
        let bias = drive.accel_bias();
        let lateral: Vec<f64> = drive.map(|f| f.sample.accel.x - bias.x).collect();
        assert!(lateral.iter().any(|&x| x > 0.4 * GRAVITY));
        assert!(lateral.iter().any(|&x| x < -0.4 * GRAVITY));
    }

    #[test]
    fn test_deterministic() {
        let a: Vec<SensorFrame> = SimulatedDrive::new(TestProtocol::Figure8, 1, 3).collect();
        let b: Vec<SensorFrame> = SimulatedDrive::new(TestProtocol::Figure8, 1, 3).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn test_run_log_gzip() {
        let log = RunLog {
            samples: SimulatedDrive::new(TestProtocol::Figure8, 1, 1).collect(),
        };
        let path = std::env::temp_dir().join(format!("suspension_run_{}.json.gz", std::process::id()));
        log.save(&path).unwrap();

        let loaded = RunLog::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.samples.len(), 100);
        assert_eq!(loaded.samples[0].sample.timestamp_ms, 0);
    }

    #[test]
    fn test_run_log_plain_json() {
        let path = std::env::temp_dir().join(format!("suspension_run_{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{ "samples": [ { "sample": { "timestamp_ms": 20, "accel": { "x": 0.0, "y": 0.0, "z": 9.81 }, "gyro": { "x": 0.0, "y": 0.0, "z": 0.0 } }, "speed": 4.5 } ] }"#,
        )
        .unwrap();

        let loaded = RunLog::load(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(loaded.samples.len(), 1);
        assert_eq!(loaded.samples[0].speed, 4.5);
        assert_eq!(loaded.samples[0].sample, RawSample::stationary(20));
    }

    #[tokio::test]
    async fn test_feed_delivers_in_order() {
        let (tx, mut rx) = mpsc::channel(8);
        let handle = tokio::spawn(feed(0..20u32, tx, None));

        let mut received = Vec::new();
        while let Some(v) = rx.recv().await {
            received.push(v);
        }
        handle.await.unwrap();
        assert_eq!(received, (0..20).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_feed_stops_when_receiver_dropped() {
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        // Returns instead of blocking forever
        feed(0..1_000u32, tx, Some(Duration::from_millis(1))).await;
    }
}
