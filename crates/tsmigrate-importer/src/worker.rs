use std::pin::Pin;
use std::time::{Duration, Instant};

use async_compression::tokio::write::GzipEncoder;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tokio_util::io::ReaderStream;

use tsmigrate_model::{encode_line, TimeSeries};

use crate::config::ImporterConfig;
use crate::error::ImporterError;

/// One round-trip: streams `batch` into the destination without buffering
/// the whole (possibly multi-megabyte) body in memory.
pub async fn import_once(
    client: &reqwest::Client,
    cfg: &ImporterConfig,
    batch: &[TimeSeries],
) -> Result<(u64, u64), ImporterError> {
    let (pipe_writer, pipe_reader) = tokio::io::duplex(64 * 1024);

    let body = reqwest::Body::wrap_stream(ReaderStream::new(pipe_reader));
    let mut request = client.post(cfg.import_url()).body(body);
    if cfg.compress {
        request = request.header(reqwest::header::CONTENT_ENCODING, "gzip");
    }
    if let Some(user) = &cfg.user {
        request = request.basic_auth(user, cfg.password.clone());
    }

    let compress = cfg.compress;
    let samples: u64 = batch.iter().map(|s| s.sample_count() as u64).sum();
    let lines: Vec<Vec<u8>> = batch
        .iter()
        .map(|series| {
            let mut buf = Vec::new();
            encode_line(series, &mut buf)?;
            Ok::<_, ImporterError>(buf)
        })
        .collect::<Result<_, _>>()?;

    let produce = async move {
        let mut sink: Pin<Box<dyn AsyncWrite + Send>> = if compress {
            Box::pin(BufWriter::with_capacity(16 * 1024, GzipEncoder::new(pipe_writer)))
        } else {
            Box::pin(BufWriter::with_capacity(16 * 1024, pipe_writer))
        };
        let mut bytes_written: u64 = 0;
        for line in &lines {
            sink.write_all(line).await?;
            bytes_written += line.len() as u64;
        }
        sink.flush().await?;
        sink.shutdown().await?;
        Ok::<u64, ImporterError>(bytes_written)
    };

    let send = async { request.send().await.map_err(ImporterError::Transport) };

    let (bytes_written, response) = tokio::try_join!(produce, send)?;

    let status = response.status();
    if status.as_u16() == 204 {
        return Ok((bytes_written, samples));
    }
    let body_text = response.text().await.unwrap_or_default();
    if status.as_u16() == 400 {
        return Err(ImporterError::BadRequest(body_text));
    }
    Err(ImporterError::BadStatus {
        status,
        body: body_text,
    })
}

/// Calls [`import_once`] up to `cfg.backoff_max_attempts()` times, sleeping
/// between attempts with exponential backoff. A `BadRequest` response short
/// circuits immediately: it is never retried.
pub async fn flush_with_retry(
    client: &reqwest::Client,
    cfg: &ImporterConfig,
    batch: &[TimeSeries],
    on_retry: impl Fn(),
) -> Result<(u64, u64, Duration), ImporterError> {
    let started = Instant::now();
    let max_attempts = cfg.backoff_max_attempts();
    for attempt in 0..max_attempts {
        match import_once(client, cfg, batch).await {
            Ok((bytes, samples)) => return Ok((bytes, samples, started.elapsed())),
            Err(err) if err.is_bad_request() => return Err(err),
            Err(err) => {
                if attempt + 1 == max_attempts {
                    return Err(ImporterError::RetriesExhausted {
                        attempts: max_attempts,
                        source: Box::new(err),
                    });
                }
                tracing::warn!(attempt, error = %err, "import attempt failed, retrying");
                on_retry();
                tokio::time::sleep(cfg.backoff_delay(attempt)).await;
            }
        }
    }
    unreachable!("loop always returns or sleeps before looping again")
}
