use anyhow::{bail, Context, Result};
use clap::Parser;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::time::Duration;

use suspension_analyzer_rs::sensors::{self, RunLog, SensorFrame, SimulatedDrive, SAMPLE_PERIOD_MS};
use suspension_analyzer_rs::{
    AnalyzerConfig, RawSample, RunComparison, RunReport, RunSession, ScoredRun, TestProtocol,
};

#[derive(Parser, Debug)]
#[command(name = "suspension_analyzer")]
#[command(about = "Score suspension test runs from accelerometer/gyroscope data", long_about = None)]
struct Args {
    /// Recorded run log (.json or .json.gz)
    #[arg(long, conflicts_with = "simulate")]
    log: Option<PathBuf>,

    /// Simulate a drive of this many seconds instead of reading a log
    #[arg(long, value_name = "SECONDS")]
    simulate: Option<u64>,

    /// Test protocol, by name or slug
    #[arg(long, default_value = "standing-start-stop")]
    protocol: String,

    /// Analyzer config JSON (missing fields use defaults)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the run report JSON here
    #[arg(long)]
    out: Option<PathBuf>,

    /// Save the simulated sensor log (.json or .json.gz)
    #[arg(long, requires = "simulate")]
    save_log: Option<PathBuf>,

    /// Pace the simulated sensor feed in real time
    #[arg(long)]
    realtime: bool,

    /// Compare previously written reports
    #[arg(long, num_args = 2.., value_name = "REPORT")]
    compare: Vec<PathBuf>,

    /// List available test protocols and exit
    #[arg(long)]
    list_protocols: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.list_protocols {
        list_protocols();
        return Ok(());
    }
    if !args.compare.is_empty() {
        return compare_reports(&args.compare);
    }

    let protocol: TestProtocol = args.protocol.parse()?;
    let config = match args.config.as_ref() {
        Some(path) => AnalyzerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => AnalyzerConfig::default(),
    };
    let mut session = RunSession::new(config)?;

    let report = if let Some(path) = args.log.as_ref() {
        replay_log(&mut session, path, protocol)?
    } else if let Some(secs) = args.simulate {
        simulate(&mut session, protocol, secs, &args).await?
    } else {
        bail!("Provide --log, --simulate or --compare");
    };

    print_report(&report);

    if let Some(out) = args.out.as_ref() {
        std::fs::write(out, report.to_json()?)
            .with_context(|| format!("writing report {}", out.display()))?;
        println!("Report written to {}", out.display());
    }
    Ok(())
}

fn list_protocols() {
    for protocol in TestProtocol::all() {
        println!("{} ({}, {}s)", protocol.name(), protocol.slug(), protocol.duration_secs());
        println!("  {}", protocol.description());
        for (i, step) in protocol.instructions().iter().enumerate() {
            println!("  {}. {}", i + 1, step);
        }
    }
}

/// Calibrate on the head of a recorded log, then score the remainder.
fn replay_log(session: &mut RunSession, path: &Path, protocol: TestProtocol) -> Result<RunReport> {
    let log = RunLog::load(path).with_context(|| format!("loading log {}", path.display()))?;
    let window = session.config().calibration_samples;

    let head: Vec<RawSample> = log.samples.iter().take(window).map(|f| f.sample).collect();
    session
        .calibrate_from(&head)
        .with_context(|| format!("calibrating from {}", path.display()))?;

    session.start();
    for frame in log.samples.iter().skip(window) {
        session.ingest(&frame.sample, frame.speed);
    }
    Ok(session.finish(protocol)?)
}

async fn simulate(
    session: &mut RunSession,
    protocol: TestProtocol,
    secs: u64,
    args: &Args,
) -> Result<RunReport> {
    let window = session.config().calibration_samples;
    let lead_in_secs = (window as u64 * SAMPLE_PERIOD_MS).div_ceil(1000) + 1;
    let frames: Vec<SensorFrame> = SimulatedDrive::new(protocol, lead_in_secs, secs).collect();

    if let Some(path) = args.save_log.as_ref() {
        RunLog { samples: frames.clone() }
            .save(path)
            .with_context(|| format!("saving log {}", path.display()))?;
        println!("Sensor log written to {}", path.display());
    }

    let pace = args.realtime.then(|| Duration::from_millis(SAMPLE_PERIOD_MS));

    let (cal_tx, mut cal_rx) = mpsc::channel::<RawSample>(256);
    let head: Vec<RawSample> = frames.iter().take(window).map(|f| f.sample).collect();
    let _cal_handle = tokio::spawn(sensors::feed(head, cal_tx, pace));
    let timeout = session.config().calibration_timeout();
    session.calibrate(&mut cal_rx, timeout).await?;

    let (tx, mut rx) = mpsc::channel::<SensorFrame>(256);
    let drive: Vec<SensorFrame> = frames.into_iter().skip(window).collect();
    let _drive_handle = tokio::spawn(sensors::feed(drive, tx, pace));

    session.start();
    let mut count = 0u64;
    while let Some(frame) = rx.recv().await {
        let reading = session.ingest(&frame.sample, frame.speed);
        count += 1;
        if args.realtime && count % 50 == 0 {
            println!(
                "  t={:>5.1}s  speed={:>5.1} km/h  lat={:>5.2} G  long={:>5.2} G  vert={:>5.2} G",
                count as f64 * SAMPLE_PERIOD_MS as f64 / 1000.0,
                reading.speed_kmh(),
                reading.peak_lateral_g,
                reading.peak_longitudinal_g,
                reading.peak_vertical_g
            );
        }
    }
    Ok(session.finish(protocol)?)
}

fn print_report(report: &RunReport) {
    let score = &report.score;
    println!("{} @ {}", report.protocol, report.created_at.to_rfc3339());
    println!("  Score: {} ({})", score.overall_score, score.rating);
    for (label, value) in &score.breakdown {
        println!("    {:<24} {}", label, value);
    }
    println!(
        "  {} readings over {:.1}s",
        report.metrics.data_points, report.metrics.duration_secs
    );
    println!("  Ride quality:");
    for m in &report.ride_quality {
        println!(
            "    {:<11} n={:<6} rms={:.3} peak={:.3} freq={:.2}Hz damping={:.3} score={:.1}",
            m.bucket.label(),
            m.sample_count,
            m.rms_vertical,
            m.peak_vertical,
            m.vibration_frequency,
            m.damping_ratio,
            m.composite_score
        );
    }
}

fn compare_reports(paths: &[PathBuf]) -> Result<()> {
    let mut runs = Vec::with_capacity(paths.len());
    for path in paths {
        let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let report: RunReport = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing report {}", path.display()))?;
        let label = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&report.protocol)
            .to_string();
        println!("{:<24} {:<20} {:>3}", label, report.protocol, report.score.overall_score);
        runs.push(ScoredRun::new(label, report.score.overall_score));
    }

    match RunComparison::compare(&runs) {
        Some(cmp) => println!("{}", cmp),
        None => println!("Need at least two reports to compare"),
    }
    Ok(())
}
