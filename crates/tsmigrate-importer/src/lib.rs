//! The importer: a bounded-channel, worker-pool HTTP writer that batches
//! `TimeSeries` by sample count and flushes them into VictoriaMetrics with
//! retry/backoff, gzip-optional streaming bodies, and thread-safe stats.

mod config;
mod error;
mod worker;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio::task::JoinHandle;

use tsmigrate_model::TimeSeries;
use tsmigrate_stats::Stats;

pub use config::{ImporterConfig, DEFAULT_BATCH_SIZE};
pub use error::ImporterError;

/// A batch that failed to flush, together with the cause. Ownership of the
/// batch passes to whoever drains the error channel.
#[derive(Debug)]
pub struct ImportError {
    pub batch: Vec<TimeSeries>,
    pub cause: ImporterError,
}

/// Capacity multiplier applied to the importer's input channel, in units of
/// writer concurrency. Producers block once `4 * concurrency` series are
/// in flight -- this is how reader parallelism is throttled to writer
/// throughput.
const INPUT_CHANNEL_FACTOR: usize = 4;

pub struct Importer {
    input_tx: std::sync::Mutex<Option<mpsc::Sender<TimeSeries>>>,
    error_rx: std::sync::Mutex<Option<mpsc::Receiver<ImportError>>>,
    stats: Arc<Stats>,
    workers: std::sync::Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Importer {
    /// Validates `cfg`, pings the destination's health endpoint, then spawns
    /// `cfg.concurrency` writer workers.
    pub async fn new(cfg: ImporterConfig) -> Result<Self, ImporterError> {
        cfg.validate()?;

        let client = reqwest::Client::new();
        ping(&client, &cfg).await?;

        let capacity = INPUT_CHANNEL_FACTOR * cfg.concurrency as usize;
        let (input_tx, input_rx) = mpsc::channel::<TimeSeries>(capacity);
        let (error_tx, error_rx) = mpsc::channel::<ImportError>(capacity);

        let input_rx = Arc::new(AsyncMutex::new(input_rx));
        let stats = Arc::new(Stats::new());
        let cfg = Arc::new(cfg);

        let mut workers = Vec::with_capacity(cfg.concurrency as usize);
        for id in 0..cfg.concurrency {
            let input_rx = input_rx.clone();
            let client = client.clone();
            let cfg = cfg.clone();
            let stats = stats.clone();
            let error_tx = error_tx.clone();
            workers.push(tokio::spawn(async move {
                writer_loop(id, input_rx, client, cfg, stats, error_tx).await;
            }));
        }

        Ok(Self {
            input_tx: std::sync::Mutex::new(Some(input_tx)),
            error_rx: std::sync::Mutex::new(Some(error_rx)),
            stats,
            workers: std::sync::Mutex::new(workers),
            closed: AtomicBool::new(false),
        })
    }

    /// A clone of the bounded input sender. Producers block when the
    /// channel is full.
    pub fn input(&self) -> mpsc::Sender<TimeSeries> {
        self.input_tx
            .lock()
            .unwrap()
            .as_ref()
            .expect("input() called after close()")
            .clone()
    }

    /// Takes ownership of the error receiver. May only be called once;
    /// subsequent calls return `None`.
    pub fn take_errors(&self) -> Option<mpsc::Receiver<ImportError>> {
        self.error_rx.lock().unwrap().take()
    }

    pub fn stats(&self) -> Arc<Stats> {
        self.stats.clone()
    }

    /// Re-initializes accumulated counters and the start time.
    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Idempotent: signals writers to drain by dropping the importer's own
    /// sender handle, then joins them. A second call is a no-op.
    pub async fn close(&self) -> Result<(), ImporterError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.input_tx.lock().unwrap().take();
        let handles: Vec<_> = std::mem::take(&mut *self.workers.lock().unwrap());
        for handle in handles {
            handle.await?;
        }
        Ok(())
    }
}

async fn ping(client: &reqwest::Client, cfg: &ImporterConfig) -> Result<(), ImporterError> {
    let mut req = client.get(cfg.health_url());
    if let Some(user) = &cfg.user {
        req = req.basic_auth(user, cfg.password.clone());
    }
    let resp = req.send().await.map_err(ImporterError::Ping)?;
    if resp.status().as_u16() != 200 {
        return Err(ImporterError::PingStatus(resp.status()));
    }
    Ok(())
}

async fn writer_loop(
    id: u8,
    input_rx: Arc<AsyncMutex<mpsc::Receiver<TimeSeries>>>,
    client: reqwest::Client,
    cfg: Arc<ImporterConfig>,
    stats: Arc<Stats>,
    error_tx: mpsc::Sender<ImportError>,
) {
    let mut batch: Vec<TimeSeries> = Vec::new();
    let mut sample_count: usize = 0;
    let mut idle_since = Instant::now();
    let batch_size = cfg.effective_batch_size();

    loop {
        let next = {
            let mut rx = input_rx.lock().await;
            rx.recv().await
        };

        match next {
            Some(mut series) => {
                if cfg.decimal_places > 0 {
                    series.round_values(cfg.decimal_places);
                }
                if batch.is_empty() {
                    idle_since = Instant::now();
                }
                sample_count += series.sample_count();
                batch.push(series);

                if sample_count >= batch_size {
                    stats.record_idle(idle_since.elapsed());
                    match worker::flush_with_retry(&client, &cfg, &batch, || stats.record_retry())
                        .await
                    {
                        Ok((bytes, samples, duration)) => {
                            stats.record_success(bytes, samples, duration);
                            batch.clear();
                        }
                        Err(cause) => {
                            let failed =
                                std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                            tracing::error!(writer = id, error = %cause, "flush failed terminally");
                            let _ = error_tx.send(ImportError { batch: failed, cause }).await;
                        }
                    }
                    sample_count = 0;
                    idle_since = Instant::now();
                }
            }
            None => {
                if !batch.is_empty() {
                    let attempt_start = Instant::now();
                    match worker::import_once(&client, &cfg, &batch).await {
                        Ok((bytes, samples)) => {
                            stats.record_success(bytes, samples, attempt_start.elapsed());
                        }
                        Err(cause) => {
                            tracing::error!(writer = id, error = %cause, "close-time flush failed");
                            let _ = error_tx.send(ImportError { batch, cause }).await;
                        }
                    }
                }
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_channel_capacity_scales_with_concurrency() {
        assert_eq!(INPUT_CHANNEL_FACTOR * 2, 8);
    }
}
