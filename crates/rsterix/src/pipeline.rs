/**
 * Pipeline assembly: ingest task → bounded plot queue → update task.
 *
 * The ingest task owns the UDP socket; the update task owns the track
 * estimator and therefore every track invariant. Readers receive
 * copy-on-read [`TrackSummary`] snapshots through a watch channel, so
 * the snapshot path never takes a lock the update task contends on.
 *
 * Lifecycle: [`Pipeline::start`] binds and spawns, [`Pipeline::shutdown`]
 * flips the shutdown flag (honoured within one socket timeout), and
 * [`Pipeline::join`] waits for both tasks to drain and exit.
 */
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::decode;
use crate::error::PipelineError;
use crate::plot::Plot;
use crate::source::udp::{self, Datagram, IngestStats};
use crate::track::{TrackEstimator, TrackSummary};

pub struct Pipeline {
    shutdown_tx: watch::Sender<bool>,
    snapshot_rx: watch::Receiver<Vec<TrackSummary>>,
    ingest_stats: Arc<IngestStats>,
    ingest_task: JoinHandle<std::io::Result<()>>,
    update_task: JoinHandle<()>,
}

impl Pipeline {
    /// Validate the configuration, bind the socket, spawn both tasks.
    pub async fn start(cfg: Config) -> Result<Pipeline, PipelineError> {
        cfg.validate()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (snapshot_tx, snapshot_rx) = watch::channel(Vec::new());
        let (plot_tx, plot_rx) = mpsc::channel::<Datagram>(cfg.queue_depth);
        let ingest_stats = Arc::new(IngestStats::default());

        let address = format!("{}:{}", cfg.host, cfg.port);
        let timeout = Duration::from_millis(cfg.socket_timeout_ms);
        let stats = ingest_stats.clone();
        let ingest_task = tokio::spawn(async move {
            udp::receiver(&address, plot_tx, shutdown_rx, timeout, stats).await
        });

        let update_task = tokio::spawn(update_loop(cfg, plot_rx, snapshot_tx));

        Ok(Pipeline {
            shutdown_tx,
            snapshot_rx,
            ingest_stats,
            ingest_task,
            update_task,
        })
    }

    /// Subscribe to track snapshots. Each value is a full copy of the
    /// active set; reading never blocks the update task.
    pub fn snapshots(&self) -> watch::Receiver<Vec<TrackSummary>> {
        self.snapshot_rx.clone()
    }

    pub fn ingest_stats(&self) -> &IngestStats {
        &self.ingest_stats
    }

    /// Signal shutdown. The ingest task exits within one socket timeout;
    /// the update task drains the queue and exits.
    pub fn shutdown(&self) {
        info!("pipeline shutdown requested");
        let _ = self.shutdown_tx.send(true);
    }

    /// Wait for both tasks to finish.
    pub async fn join(self) -> Result<(), PipelineError> {
        self.ingest_task
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))??;
        self.update_task
            .await
            .map_err(|e| PipelineError::Task(e.to_string()))?;
        Ok(())
    }
}

/// Single consumer of the plot queue; exclusive owner of the estimator.
async fn update_loop(
    cfg: Config,
    mut rx: mpsc::Receiver<Datagram>,
    snapshot_tx: watch::Sender<Vec<TrackSummary>>,
) {
    let station = cfg.station();
    let mut estimator = TrackEstimator::new(cfg);

    while let Some(datagram) = rx.recv().await {
        let blocks = match decode::decode_blocks(&datagram.data) {
            Ok(blocks) => blocks,
            Err(e) => {
                warn!("dropping datagram from {}: {e}", datagram.peer);
                continue;
            }
        };

        // plots of one datagram are applied in file order, as one batch
        let records = blocks.iter().flat_map(|block| block.records.iter());
        let plots: Vec<Plot> = Plot::from_records(records, &station, datagram.received);
        if plots.is_empty() {
            continue;
        }
        debug!("applying {} plots from {}", plots.len(), datagram.peer);
        estimator.process_batch(&plots);

        if snapshot_tx.send(estimator.summaries()).is_err() {
            // nobody watches anymore; keep tracking anyway
            debug!("no snapshot subscribers");
        }
    }
    info!(
        "update task drained: {} tracks active, {} plots processed",
        estimator.active_tracks().len(),
        estimator.stats.plots_processed
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::items::{DataSourceIdentifier, Mode3ACode, PolarPosition, TimeOfDay};
    use crate::decode::{cat048::Cat048Record, encode_block, Record};
    use tokio::net::UdpSocket;

    fn test_config(port: u16) -> Config {
        Config {
            host: "127.0.0.1".to_string(),
            port,
            socket_timeout_ms: 50,
            ..Config::default()
        }
    }

    fn polar_block(range_nm: f64, azimuth_deg: f64, seconds: f64) -> Vec<u8> {
        let record = Cat048Record {
            data_source: Some(DataSourceIdentifier { sac: 0, sic: 1 }),
            time_of_day: Some(TimeOfDay::from_seconds(seconds)),
            polar_position: Some(PolarPosition::from_measurement(range_nm, azimuth_deg)),
            mode_3a: Mode3ACode::from_octal("1234"),
            ..Cat048Record::default()
        };
        encode_block(48, &[Record::Cat048(record)]).unwrap()
    }

    #[tokio::test]
    async fn datagrams_become_tracks() {
        let probe = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let pipeline = Pipeline::start(test_config(port)).await.unwrap();
        let mut snapshots = pipeline.snapshots();
        let target = format!("127.0.0.1:{port}");
        let sender = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        let seconds = chrono::Utc::now().timestamp() % 86_400;
        for i in 0..4 {
            let block = polar_block(10.0 + 0.02 * i as f64, 90.0, (seconds + i) as f64);
            sender.send_to(&block, &target).await.unwrap();
            tokio::time::sleep(Duration::from_millis(30)).await;
        }

        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            tokio::time::timeout_at(deadline, snapshots.changed())
                .await
                .expect("no snapshot before the deadline")
                .unwrap();
            if !snapshots.borrow().is_empty() {
                break;
            }
        }
        let summary = snapshots.borrow().first().cloned().unwrap();
        assert!(summary.mode_3a.as_deref() == Some("1234"));

        pipeline.shutdown();
        tokio::time::timeout(Duration::from_secs(2), pipeline.join())
            .await
            .expect("shutdown within the timeout")
            .unwrap();
    }

    #[tokio::test]
    async fn invalid_config_fails_fast() {
        let cfg = Config {
            station_lat: 120.0,
            ..Config::default()
        };
        assert!(matches!(
            Pipeline::start(cfg).await,
            Err(PipelineError::Config(_))
        ));
    }
}
