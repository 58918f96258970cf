//! Replays recorded detector output through the engagement pipeline.
//!
//! Reads one JSON `FaceObservation` per line from the file given as the
//! first argument (or stdin) and prints every produced report as a JSON line.
//!
//! Environment:
//! - `ATTENTION_CONFIG`: path to a JSON engine configuration
//! - `ATTENTION_STORE`: path of the JSON calibration store (in-memory if unset)
//! - `ATTENTION_CALIBRATE`: `1`/`true` to calibrate on the first qualifying frames
//! - `ATTENTION_LOG`: tracing filter, default `info`

use std::io::{self, BufRead, BufReader, Write};
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use attention_engine::logging::init_tracing;
use attention_engine::{
    CalibrationStore, EngagementPipeline, EngineConfig, FaceObservation, JsonFileStore, MemoryStore,
    Result,
};

fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

fn load_config() -> Result<EngineConfig> {
    match std::env::var("ATTENTION_CONFIG") {
        Ok(path) => EngineConfig::from_file(path),
        Err(_) => EngineConfig::from_env(),
    }
}

fn open_store() -> Result<Arc<dyn CalibrationStore>> {
    match std::env::var("ATTENTION_STORE") {
        Ok(path) => Ok(Arc::new(JsonFileStore::open(path)?)),
        Err(_) => Ok(Arc::new(MemoryStore::new())),
    }
}

fn run() -> Result<()> {
    let config = load_config()?;
    let store = open_store()?;
    let mut pipeline = EngagementPipeline::new(config, store);

    let calibrating = env_flag("ATTENTION_CALIBRATE");
    if calibrating {
        pipeline.start_calibration();
    }

    let input: Box<dyn BufRead> = match std::env::args().nth(1) {
        Some(path) => Box::new(BufReader::new(std::fs::File::open(path)?)),
        None => Box::new(BufReader::new(io::stdin())),
    };
    let stdout = io::stdout();
    let mut out = stdout.lock();

    let mut emitted = 0u64;
    for (line_no, line) in input.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let observation: FaceObservation = match serde_json::from_str(&line) {
            Ok(obs) => obs,
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "Skipping malformed observation");
                continue;
            }
        };

        if let Some(report) = pipeline.on_observation(&observation, observation.timestamp_ms) {
            serde_json::to_writer(&mut out, &report)?;
            out.write_all(b"\n")?;
            emitted += 1;
        }

        if calibrating && !pipeline.is_calibrated() && pipeline.calibration_progress() >= 1.0 {
            pipeline.finish_calibration();
        }
    }
    out.flush()?;

    let stats = pipeline.performance_stats();
    info!(
        emitted,
        total = stats.total_frames,
        skipped = stats.skipped_frames,
        avg_ms = stats.average_processing_ms,
        calibrated = pipeline.is_calibrated(),
        "Replay finished"
    );
    Ok(())
}

fn main() -> ExitCode {
    init_tracing("info");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Replay failed");
            ExitCode::FAILURE
        }
    }
}
