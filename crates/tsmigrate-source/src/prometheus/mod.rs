mod bitio;
mod chunks;
mod config;
mod meta;
mod series;
mod symbols;
mod toc;
mod varint;

pub use config::PrometheusConfig;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use tsmigrate_model::SeriesDescriptor;

use crate::error::SourceError;
use crate::{Chunk, ChunkIterator, Source};
use series::ChunkMeta;

const NAME_LABEL: &str = "__name__";

struct CachedSeries {
    block_dir: PathBuf,
    chunks: Vec<ChunkMeta>,
}

pub struct PrometheusSource {
    cfg: PrometheusConfig,
    cache: Mutex<HashMap<String, CachedSeries>>,
}

impl PrometheusSource {
    pub fn new(cfg: PrometheusConfig) -> Self {
        Self {
            cfg,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

fn canonical_key(name: &str, labels: &[(String, String)]) -> String {
    let mut sorted = labels.to_vec();
    sorted.sort();
    let mut key = name.to_string();
    for (k, v) in sorted {
        key.push('\u{1}');
        key.push_str(&k);
        key.push('=');
        key.push_str(&v);
    }
    key
}

#[async_trait]
impl Source for PrometheusSource {
    async fn explore(&self) -> Result<Vec<SeriesDescriptor>, SourceError> {
        let mut descriptors = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&self.cfg.snapshot_dir).await?;

        while let Some(entry) = read_dir.next_entry().await? {
            let block_dir = entry.path();
            if !block_dir.is_dir() {
                continue;
            }
            let meta_path = block_dir.join("meta.json");
            if !meta_path.exists() {
                continue;
            }
            let meta_bytes = tokio::fs::read(&meta_path).await?;
            let block_meta: meta::BlockMeta = serde_json::from_slice(&meta_bytes)?;
            if block_meta.max_time < self.cfg.filter_time_min.unwrap_or(i64::MIN)
                || block_meta.min_time > self.cfg.filter_time_max.unwrap_or(i64::MAX)
            {
                continue;
            }

            let index_path = block_dir.join("index");
            let data = tokio::fs::read(&index_path).await?;
            let block_toc = toc::parse_toc(&data)?;
            let symbol_table = symbols::parse_symbol_table(&data, block_toc.symbol_table as usize)?;
            let entries = series::parse_series_section(
                &data,
                block_toc.series as usize,
                block_toc.label_indices as usize,
                &symbol_table,
            )?;

            let mut cache = self.cache.lock().unwrap();
            for entry in entries {
                let mut labels = entry.labels;
                let Some(pos) = labels.iter().position(|(k, _)| k == NAME_LABEL) else {
                    return Err(SourceError::MissingName(format!("{:?}", labels)));
                };
                let (_, name) = labels.remove(pos);

                if !self.cfg.matches_labels(&labels) {
                    continue;
                }

                let key = canonical_key(&name, &labels);
                cache.insert(
                    key,
                    CachedSeries {
                        block_dir: block_dir.clone(),
                        chunks: entry.chunks,
                    },
                );
                descriptors.push(SeriesDescriptor {
                    measurement: String::new(),
                    field: name,
                    labels,
                });
            }
        }

        Ok(descriptors)
    }

    async fn fetch_chunks(
        &self,
        descriptor: &SeriesDescriptor,
    ) -> Result<Box<dyn ChunkIterator>, SourceError> {
        let key = canonical_key(&descriptor.field, &descriptor.labels);
        let cached = {
            let cache = self.cache.lock().unwrap();
            cache.get(&key).map(|c| (c.block_dir.clone(), c.chunks.clone()))
        };
        let Some((block_dir, chunk_metas)) = cached else {
            return Err(SourceError::Malformed {
                context: "prometheus fetch_chunks".to_string(),
                detail: format!("series {key:?} was not produced by explore()"),
            });
        };

        let chunk_metas = chunk_metas
            .into_iter()
            .filter(|c| {
                c.max_time >= self.cfg.filter_time_min.unwrap_or(i64::MIN)
                    && c.min_time <= self.cfg.filter_time_max.unwrap_or(i64::MAX)
            })
            .collect();

        Ok(Box::new(PrometheusChunkIterator {
            block_dir,
            chunk_metas,
            done: false,
        }))
    }
}

/// Reshapes every on-disk chunk of one series into a single combined
/// `Chunk`, matching one `TimeSeries` per series on the importer side.
/// Yields its one combined chunk on the first call, then `None`.
struct PrometheusChunkIterator {
    block_dir: PathBuf,
    chunk_metas: Vec<ChunkMeta>,
    done: bool,
}

#[async_trait]
impl ChunkIterator for PrometheusChunkIterator {
    async fn next(&mut self) -> Result<Option<Chunk>, SourceError> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let mut timestamps = Vec::new();
        let mut values = Vec::new();
        for meta in &self.chunk_metas {
            let chunk = chunks::read_chunk(&self.block_dir, meta).await?;
            timestamps.extend(chunk.timestamps);
            values.extend(chunk.values);
        }
        Ok(Some(Chunk { timestamps, values }))
    }
}
