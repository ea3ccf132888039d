//! A hand-rolled, minimal HTTP/1.1 responder used only to exercise the
//! importer's retry/batching/gzip behavior without a real VictoriaMetrics
//! instance.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;

pub struct FakeServer {
    pub addr: String,
    statuses: Arc<Mutex<VecDeque<u16>>>,
}

impl FakeServer {
    /// Spawns a server that answers `GET /health` with 200, and each
    /// `POST .../import` with the next status from `statuses` (repeating
    /// the last one once exhausted).
    pub async fn spawn(statuses: Vec<u16>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let statuses = Arc::new(Mutex::new(VecDeque::from(statuses)));
        let shared = statuses.clone();

        tokio::spawn(async move {
            loop {
                let (socket, _) = match listener.accept().await {
                    Ok(x) => x,
                    Err(_) => break,
                };
                let statuses = shared.clone();
                tokio::spawn(async move {
                    let _ = handle_conn(socket, statuses).await;
                });
            }
        });

        Self {
            addr: format!("http://{addr}"),
            statuses,
        }
    }

    pub fn remaining(&self) -> usize {
        self.statuses.lock().unwrap().len()
    }
}

async fn handle_conn(
    socket: tokio::net::TcpStream,
    statuses: Arc<Mutex<VecDeque<u16>>>,
) -> std::io::Result<()> {
    let mut reader = BufReader::new(socket);
    let request_line = read_line(&mut reader).await?;
    let is_health = request_line.contains("GET") && request_line.contains("/health");

    let mut content_length: usize = 0;
    let mut chunked = false;
    loop {
        let line = read_line(&mut reader).await?;
        if line.is_empty() {
            break;
        }
        let lower = line.to_ascii_lowercase();
        if let Some(value) = lower.strip_prefix("content-length:") {
            content_length = value.trim().parse().unwrap_or(0);
        }
        if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
            chunked = true;
        }
    }

    if chunked {
        drain_chunked(&mut reader).await?;
    } else if content_length > 0 {
        let mut buf = vec![0u8; content_length];
        reader.read_exact(&mut buf).await?;
    }

    let (status, reason) = if is_health {
        (200u16, "OK")
    } else {
        let next = statuses.lock().unwrap().pop_front().unwrap_or(204);
        (next, reason_phrase(next))
    };
    let body = if status == 400 { "bad request" } else { "" };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let mut socket = reader.into_inner();
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        204 => "No Content",
        400 => "Bad Request",
        503 => "Service Unavailable",
        _ => "Status",
    }
}

async fn read_line<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<String> {
    use tokio::io::AsyncBufReadExt;
    let mut line = String::new();
    reader.read_line(&mut line).await?;
    Ok(line.trim_end().to_string())
}

async fn drain_chunked<R: tokio::io::AsyncBufRead + Unpin>(reader: &mut R) -> std::io::Result<()> {
    loop {
        let size_line = read_line(reader).await?;
        let size = usize::from_str_radix(size_line.trim(), 16).unwrap_or(0);
        if size == 0 {
            let _ = read_line(reader).await?;
            break;
        }
        let mut buf = vec![0u8; size];
        reader.read_exact(&mut buf).await?;
        let mut crlf = [0u8; 2];
        reader.read_exact(&mut crlf).await?;
    }
    Ok(())
}
