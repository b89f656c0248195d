use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use rsterix::cot::{self, Affiliation, CotEvent};
use rsterix::klv::{self, KlvStandard};
use rsterix::prelude::*;
use tracing::{info, warn};

use crate::AppError;

/// Load the TOML configuration (or the defaults) and validate it.
pub fn load_config(path: Option<&Path>) -> Result<Config, AppError> {
    let config: Config = match path {
        Some(path) => {
            let text = fs::read_to_string(path)
                .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
            toml::from_str(&text)
                .map_err(|e| AppError::Config(format!("cannot parse {}: {e}", path.display())))?
        }
        None => Config::default(),
    };
    config
        .validate()
        .map_err(|e| AppError::Config(e.to_string()))?;
    Ok(config)
}

fn parse_affiliation(value: &str) -> Result<Affiliation, AppError> {
    value.parse().map_err(AppError::Config)
}

fn parse_standard(value: &str) -> Result<KlvStandard, AppError> {
    value.parse().map_err(AppError::Config)
}

fn load_summaries(path: &Path) -> Result<Vec<TrackSummary>, AppError> {
    let text = fs::read_to_string(path)
        .map_err(|e| AppError::Runtime(format!("cannot read {}: {e}", path.display())))?;
    serde_json::from_str(&text)
        .map_err(|e| AppError::Runtime(format!("cannot parse {}: {e}", path.display())))
}

/// A capture file is either raw binary or hex text (whitespace ignored).
fn load_capture(path: &Path) -> Result<Vec<u8>, AppError> {
    let raw = fs::read(path)
        .map_err(|e| AppError::Runtime(format!("cannot read {}: {e}", path.display())))?;
    let looks_hex = !raw.is_empty()
        && raw
            .iter()
            .all(|b| b.is_ascii_hexdigit() || b.is_ascii_whitespace());
    if looks_hex {
        let text: String = raw
            .iter()
            .filter(|b| b.is_ascii_hexdigit())
            .map(|&b| b as char)
            .collect();
        hex::decode(&text).map_err(|e| AppError::Runtime(format!("invalid hex capture: {e}")))
    } else {
        Ok(raw)
    }
}

/// `decode FILE`: one JSON plot per line on stdout.
pub fn decode(config: &Config, file: &Path) -> Result<(), AppError> {
    let payload = load_capture(file)?;
    let blocks = decode_blocks(&payload).map_err(|e| AppError::Runtime(e.to_string()))?;
    let station = config.station();
    let received = Utc::now();

    for block in &blocks {
        for plot in Plot::from_records(&block.records, &station, received) {
            let json =
                serde_json::to_string(&plot).map_err(|e| AppError::Runtime(e.to_string()))?;
            println!("{json}");
        }
    }
    Ok(())
}

/// `encode-cot FILE`: a CoT `<events>` batch on stdout.
pub fn encode_cot(file: &Path, affiliation: &str) -> Result<(), AppError> {
    let affiliation = parse_affiliation(affiliation)?;
    let summaries = load_summaries(file)?;
    let now = Utc::now();
    let events: Vec<CotEvent> = summaries
        .iter()
        .map(|summary| CotEvent::from_track(summary, affiliation, now))
        .collect();
    let xml = cot::encode_batch(&events).map_err(|e| AppError::Runtime(e.to_string()))?;
    println!("{xml}");
    Ok(())
}

/// `encode-klv FILE`: concatenated packets, hex on stdout.
pub fn encode_klv(file: &Path, standard: &str) -> Result<(), AppError> {
    let standard = parse_standard(standard)?;
    let summaries = load_summaries(file)?;
    let stream = klv::encode_stream(&summaries, standard, Utc::now());
    println!("{}", hex::encode(stream));
    Ok(())
}

/// `ingest`: run the pipeline until Ctrl-C, emitting a CoT batch for the
/// active set every `cot_interval` seconds.
pub async fn ingest(config: Config, cot_interval: u64, affiliation: &str) -> Result<(), AppError> {
    let affiliation = parse_affiliation(affiliation)?;
    let pipeline = match Pipeline::start(config).await {
        Ok(pipeline) => pipeline,
        Err(rsterix::error::PipelineError::Config(e)) => {
            return Err(AppError::Config(e.to_string()))
        }
        Err(e) => return Err(AppError::Runtime(e.to_string())),
    };

    let mut snapshots = pipeline.snapshots();
    let mut ticker = tokio::time::interval(Duration::from_secs(cot_interval.max(1)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    warn!("cannot listen for Ctrl-C: {e}");
                }
                pipeline.shutdown();
                break;
            }
            _ = ticker.tick() => {
                let tracks = snapshots.borrow_and_update().clone();
                if tracks.is_empty() {
                    continue;
                }
                let now = Utc::now();
                let events: Vec<CotEvent> = tracks
                    .iter()
                    .map(|summary| CotEvent::from_track(summary, affiliation, now))
                    .collect();
                match cot::encode_batch(&events) {
                    Ok(xml) => println!("{xml}"),
                    Err(e) => warn!("CoT encoding failed: {e}"),
                }
            }
        }
    }

    info!(
        "ingest stopped after {} datagrams",
        pipeline
            .ingest_stats()
            .datagrams
            .load(std::sync::atomic::Ordering::Relaxed)
    );
    pipeline
        .join()
        .await
        .map_err(|e| AppError::Runtime(e.to_string()))
}
