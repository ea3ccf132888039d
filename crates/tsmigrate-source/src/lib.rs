//! Source-side contract: enumerate series, then lazily stream datapoint
//! chunks for each one. Implemented by the `influx` and `prometheus`
//! submodules.

mod error;
pub mod influx;
pub mod prometheus;

use async_trait::async_trait;

pub use error::SourceError;
use tsmigrate_model::SeriesDescriptor;

/// One lazily-produced slice of a series' datapoints, in source order.
#[derive(Debug, Clone, Default)]
pub struct Chunk {
    pub timestamps: Vec<i64>,
    pub values: Vec<f64>,
}

impl Chunk {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Enumerates series and opens per-series datapoint streams. Object-safe
/// so a caller can hold one behind `Box<dyn Source>` regardless of which
/// backend produced it.
#[async_trait]
pub trait Source: Send + Sync {
    async fn explore(&self) -> Result<Vec<SeriesDescriptor>, SourceError>;

    async fn fetch_chunks(
        &self,
        descriptor: &SeriesDescriptor,
    ) -> Result<Box<dyn ChunkIterator>, SourceError>;
}

/// A finite, non-restartable sequence of chunks for one series. Resources
/// are released on drop rather than through an explicit close call.
#[async_trait]
pub trait ChunkIterator: Send {
    async fn next(&mut self) -> Result<Option<Chunk>, SourceError>;
}
