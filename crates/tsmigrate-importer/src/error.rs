#[derive(Debug, thiserror::Error)]
pub enum ImporterError {
    #[error("invalid importer configuration: {0}")]
    Config(String),

    #[error("failed to reach destination health endpoint: {0}")]
    Ping(#[source] reqwest::Error),

    #[error("destination health endpoint returned unexpected status {0}")]
    PingStatus(reqwest::StatusCode),

    #[error("failed to encode batch: {0}")]
    Wire(#[from] tsmigrate_model::WireError),

    #[error("failed to write import body: {0}")]
    Io(#[from] std::io::Error),

    #[error("import request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// HTTP 400: non-retryable.
    #[error("destination rejected batch (bad request): {0}")]
    BadRequest(String),

    /// Any other non-204 status: retryable.
    #[error("destination returned non-success status {status}: {body}")]
    BadStatus {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("import failed after {attempts} attempts: {source}")]
    RetriesExhausted {
        attempts: usize,
        #[source]
        source: Box<ImporterError>,
    },

    #[error("writer task panicked: {0}")]
    WorkerJoin(#[from] tokio::task::JoinError),
}

impl ImporterError {
    pub fn is_bad_request(&self) -> bool {
        matches!(self, ImporterError::BadRequest(_))
    }
}
