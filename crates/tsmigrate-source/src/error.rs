#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("http request to source failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse source response: {0}")]
    Json(#[from] serde_json::Error),

    #[error("i/o error reading source: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed response while reading {context}: {detail}")]
    Malformed { context: String, detail: String },

    #[error("query {query:?} failed: {detail}")]
    Query { query: String, detail: String },

    #[error("value of field {field:?} in measurement {measurement:?} is not numeric")]
    NonNumericField { measurement: String, field: String },

    #[error("block {0:?} has no __name__ label")]
    MissingName(String),
}
