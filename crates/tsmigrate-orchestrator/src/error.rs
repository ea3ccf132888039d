#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("nothing to import: source returned no series")]
    NothingToImport,

    #[error("source error: {0}")]
    Source(#[from] tsmigrate_source::SourceError),

    #[error("importer error: {0}")]
    Importer(#[from] tsmigrate_importer::ImporterError),

    #[error("import failed for a batch of {batch_len} series ({sample}): {cause}")]
    BatchFailed {
        batch_len: usize,
        /// A short, comma-joined sample of the failed batch's series names.
        sample: String,
        cause: tsmigrate_importer::ImporterError,
    },

    #[error("failed to read confirmation prompt: {0}")]
    Prompt(#[from] std::io::Error),
}
