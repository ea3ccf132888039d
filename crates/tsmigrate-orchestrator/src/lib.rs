//! Drives reader workers across a [`Source`], feeding the importer, and
//! aborts the whole run at the first error from either side.

mod error;

use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{mpsc, Mutex as AsyncMutex};

pub use error::OrchestratorError;
use tsmigrate_importer::Importer;
use tsmigrate_model::{SeriesDescriptor, TimeSeries};
use tsmigrate_source::Source;

pub struct ProcessorConfig {
    pub concurrency: usize,
    pub silent: bool,
    pub measurement_field_separator: String,
}

pub struct Processor {
    source: Arc<dyn Source>,
    importer: Arc<Importer>,
    cfg: ProcessorConfig,
}

impl Processor {
    pub fn new(source: Arc<dyn Source>, importer: Arc<Importer>, cfg: ProcessorConfig) -> Self {
        Self {
            source,
            importer,
            cfg,
        }
    }

    /// Explores the source, optionally confirms with the operator, fans
    /// descriptors out to reader workers, and closes the importer once
    /// every descriptor has been dispatched. The first error from either a
    /// reader worker or the importer aborts dispatch.
    pub async fn run(&self) -> Result<(), OrchestratorError> {
        let descriptors = self.source.explore().await?;
        if descriptors.is_empty() {
            return Err(OrchestratorError::NothingToImport);
        }
        tracing::info!(series = descriptors.len(), "explored series");

        if !self.cfg.silent && !confirm(descriptors.len())? {
            tracing::info!("run cancelled by operator");
            return Ok(());
        }

        let progress = ProgressBar::new(descriptors.len() as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner} {pos}/{len} series [{elapsed_precise}] {msg}",
        ) {
            progress.set_style(style);
        }

        // Unbuffered: tokio::mpsc has no true rendezvous mode, so capacity 1 is the
        // closest equivalent to the reference's unbuffered descriptor channel -- a
        // send cannot complete until a worker is ready to receive it.
        let (descriptor_tx, descriptor_rx) = mpsc::channel::<SeriesDescriptor>(1);
        let descriptor_rx = Arc::new(AsyncMutex::new(descriptor_rx));
        let (worker_error_tx, mut worker_error_rx) = mpsc::channel::<OrchestratorError>(1);

        let mut worker_handles = Vec::with_capacity(self.cfg.concurrency);
        for _ in 0..self.cfg.concurrency {
            let source = self.source.clone();
            let importer_input = self.importer.input();
            let descriptor_rx = descriptor_rx.clone();
            let error_tx = worker_error_tx.clone();
            let progress = progress.clone();
            let separator = self.cfg.measurement_field_separator.clone();
            worker_handles.push(tokio::spawn(async move {
                reader_worker(source, descriptor_rx, importer_input, error_tx, progress, separator)
                    .await;
            }));
        }
        drop(worker_error_tx);

        let mut importer_errors = self.importer.take_errors();
        let mut result = Ok(());

        'dispatch: for descriptor in descriptors {
            tokio::select! {
                biased;
                Some(err) = worker_error_rx.recv() => {
                    result = Err(err);
                    break 'dispatch;
                }
                Some(import_err) = recv_importer_error(&mut importer_errors) => {
                    result = Err(OrchestratorError::BatchFailed {
                        batch_len: import_err.batch.len(),
                        sample: sample_series_names(&import_err.batch),
                        cause: import_err.cause,
                    });
                    break 'dispatch;
                }
                send_result = descriptor_tx.send(descriptor) => {
                    if send_result.is_err() {
                        break 'dispatch;
                    }
                }
            }
        }

        drop(descriptor_tx);
        for handle in worker_handles {
            let _ = handle.await;
        }
        self.importer.close().await?;
        progress.finish();

        result
    }
}

const BATCH_FAILURE_SAMPLE_SIZE: usize = 3;

/// A short, human-readable sample of a failed batch's series names, for
/// error reporting -- e.g. `"cpu_value, mem_used, and 12 more"`.
fn sample_series_names(batch: &[TimeSeries]) -> String {
    let names: Vec<&str> = batch
        .iter()
        .take(BATCH_FAILURE_SAMPLE_SIZE)
        .map(|series| series.name.as_str())
        .collect();
    let remaining = batch.len().saturating_sub(names.len());
    if remaining == 0 {
        names.join(", ")
    } else {
        format!("{}, and {remaining} more", names.join(", "))
    }
}

async fn recv_importer_error(
    rx: &mut Option<mpsc::Receiver<tsmigrate_importer::ImportError>>,
) -> Option<tsmigrate_importer::ImportError> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn reader_worker(
    source: Arc<dyn Source>,
    descriptor_rx: Arc<AsyncMutex<mpsc::Receiver<SeriesDescriptor>>>,
    importer_input: mpsc::Sender<TimeSeries>,
    error_tx: mpsc::Sender<OrchestratorError>,
    progress: ProgressBar,
    separator: String,
) {
    loop {
        let next = {
            let mut rx = descriptor_rx.lock().await;
            rx.recv().await
        };
        let Some(descriptor) = next else {
            return;
        };

        let mut iter = match source.fetch_chunks(&descriptor).await {
            Ok(iter) => iter,
            Err(e) => {
                let _ = error_tx.send(e.into()).await;
                return;
            }
        };

        loop {
            match iter.next().await {
                Ok(Some(chunk)) => {
                    if chunk.is_empty() {
                        continue;
                    }
                    let mut series =
                        TimeSeries::new(descriptor.metric_name(&separator), descriptor.labels.clone());
                    series.extend(chunk.timestamps, chunk.values);
                    if importer_input.send(series).await.is_err() {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    let _ = error_tx.send(e.into()).await;
                    return;
                }
            }
        }
        progress.inc(1);
    }
}

fn confirm(series_count: usize) -> Result<bool, OrchestratorError> {
    use std::io::Write;
    print!("About to import {series_count} series. Continue? [Y/n] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim().to_ascii_lowercase();
    Ok(answer.is_empty() || answer == "y" || answer == "yes")
}
