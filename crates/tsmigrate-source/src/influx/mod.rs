mod config;
mod query;
mod stream;

pub use config::{InfluxConfig, DEFAULT_CHUNK_SIZE, DEFAULT_RETENTION};
pub use query::{build_select_query, parse_series_key};

use async_trait::async_trait;
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tokio_util::io::StreamReader;

use tsmigrate_model::SeriesDescriptor;

use crate::error::SourceError;
use crate::{Chunk, ChunkIterator, Source};
use stream::JsonObjectStream;

const DB_LABEL: &str = "db";

pub struct InfluxSource {
    client: reqwest::Client,
    cfg: InfluxConfig,
}

impl InfluxSource {
    pub fn new(cfg: InfluxConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            cfg,
        }
    }

    fn request(&self, query: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(format!("{}/query", self.cfg.base_addr()))
            .query(&[("db", self.cfg.database.as_str()), ("q", query)]);
        if let Some(user) = &self.cfg.user {
            req = req.basic_auth(user, self.cfg.password.clone());
        }
        req
    }

    async fn run_query(&self, query: &str) -> Result<Value, SourceError> {
        let resp = self.request(query).send().await?;
        let body: Value = resp.json().await?;
        Ok(body)
    }
}

#[async_trait]
impl Source for InfluxSource {
    async fn explore(&self) -> Result<Vec<SeriesDescriptor>, SourceError> {
        let fields = self.run_query("SHOW FIELD KEYS").await?;
        let fields_by_measurement = parse_field_keys(&fields)?;

        let series_query = if self.cfg.filter_series.is_empty() {
            "SHOW SERIES".to_string()
        } else {
            format!("SHOW SERIES WHERE {}", self.cfg.filter_series)
        };
        let series = self.run_query(&series_query).await?;
        let series_keys = parse_series_keys(&series)?;

        let mut descriptors = Vec::new();
        for (measurement, mut labels) in series_keys {
            if !labels.iter().any(|(k, _)| k == DB_LABEL) {
                labels.push((DB_LABEL.to_string(), self.cfg.database.clone()));
            }
            let Some(fields) = fields_by_measurement.get(&measurement) else {
                continue;
            };
            for field in fields {
                descriptors.push(SeriesDescriptor {
                    measurement: measurement.clone(),
                    field: field.clone(),
                    labels: labels.clone(),
                });
            }
        }
        Ok(descriptors)
    }

    async fn fetch_chunks(
        &self,
        descriptor: &SeriesDescriptor,
    ) -> Result<Box<dyn ChunkIterator>, SourceError> {
        // labels used in the WHERE clause exclude the synthetic `db` label,
        // which was appended for the destination, not the source.
        let where_labels: Vec<(String, String)> = descriptor
            .labels
            .iter()
            .filter(|(k, _)| k != DB_LABEL)
            .cloned()
            .collect();

        let query = build_select_query(
            &descriptor.measurement,
            &descriptor.field,
            &where_labels,
            &self.cfg.filter_series,
            self.cfg.filter_time_start,
            self.cfg.filter_time_end,
        );

        let resp = self
            .request(&query)
            .query(&[
                ("chunked", "true"),
                ("chunk_size", &self.cfg.chunk_size.to_string()),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SourceError::Query {
                query,
                detail: format!("status {}", resp.status()),
            });
        }

        let byte_stream: ByteStream = Box::pin(
            resp.bytes_stream()
                .map(|r| r.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))),
        );
        let reader = StreamReader::new(byte_stream);

        Ok(Box::new(InfluxChunkIterator {
            stream: JsonObjectStream::new(reader),
            measurement: descriptor.measurement.clone(),
            field: descriptor.field.clone(),
        }))
    }
}

use futures::StreamExt;
use std::pin::Pin;

type ByteStream = Pin<Box<dyn futures::Stream<Item = std::io::Result<bytes::Bytes>> + Send>>;

struct InfluxChunkIterator {
    stream: JsonObjectStream<StreamReader<ByteStream, bytes::Bytes>>,
    measurement: String,
    field: String,
}

#[async_trait]
impl ChunkIterator for InfluxChunkIterator {
    async fn next(&mut self) -> Result<Option<Chunk>, SourceError> {
        loop {
            let Some(object) = self.stream.next_object().await? else {
                return Ok(None);
            };
            let value: Value = serde_json::from_slice(&object)?;
            let Some(chunk) = extract_chunk(&value, &self.measurement, &self.field)? else {
                continue;
            };
            return Ok(Some(chunk));
        }
    }
}

fn extract_chunk(value: &Value, measurement: &str, field: &str) -> Result<Option<Chunk>, SourceError> {
    let series = value
        .pointer("/results/0/series/0")
        .and_then(Value::as_object);
    let Some(series) = series else {
        return Ok(None);
    };
    let columns = series
        .get("columns")
        .and_then(Value::as_array)
        .ok_or_else(|| SourceError::Malformed {
            context: "influx chunk".to_string(),
            detail: "missing columns".to_string(),
        })?;
    let field_idx = columns
        .iter()
        .position(|c| c.as_str() == Some(field))
        .ok_or_else(|| SourceError::Malformed {
            context: "influx chunk".to_string(),
            detail: format!("column {field:?} not present"),
        })?;

    let rows = series
        .get("values")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut timestamps = Vec::with_capacity(rows.len());
    let mut values = Vec::with_capacity(rows.len());
    for row in &rows {
        let row = row.as_array().ok_or_else(|| SourceError::Malformed {
            context: "influx chunk".to_string(),
            detail: "row is not an array".to_string(),
        })?;
        let ts_str = row[0].as_str().ok_or_else(|| SourceError::Malformed {
            context: "influx chunk".to_string(),
            detail: "time column is not a string".to_string(),
        })?;
        let ts = OffsetDateTime::parse(ts_str, &Rfc3339).map_err(|e| SourceError::Malformed {
            context: "influx chunk".to_string(),
            detail: e.to_string(),
        })?;
        let value = row
            .get(field_idx)
            .and_then(Value::as_f64)
            .ok_or_else(|| SourceError::NonNumericField {
                measurement: measurement.to_string(),
                field: field.to_string(),
            })?;
        timestamps.push(ts.unix_timestamp_nanos() as i64 / 1_000_000);
        values.push(value);
    }

    Ok(Some(Chunk { timestamps, values }))
}

fn parse_field_keys(value: &Value) -> Result<std::collections::HashMap<String, Vec<String>>, SourceError> {
    let mut out: std::collections::HashMap<String, Vec<String>> = std::collections::HashMap::new();
    let Some(series) = value.pointer("/results/0/series").and_then(Value::as_array) else {
        return Ok(out);
    };
    for s in series {
        let Some(measurement) = s.get("name").and_then(Value::as_str) else {
            continue;
        };
        let rows = s.get("values").and_then(Value::as_array).cloned().unwrap_or_default();
        let mut keys = Vec::new();
        for row in rows {
            if let Some(field) = row.get(0).and_then(Value::as_str) {
                keys.push(field.to_string());
            }
        }
        out.insert(measurement.to_string(), keys);
    }
    Ok(out)
}

fn parse_series_keys(value: &Value) -> Result<Vec<(String, Vec<(String, String)>)>, SourceError> {
    let mut out = Vec::new();
    let Some(series) = value.pointer("/results/0/series").and_then(Value::as_array) else {
        return Ok(out);
    };
    for s in series {
        let rows = s.get("values").and_then(Value::as_array).cloned().unwrap_or_default();
        for row in rows {
            if let Some(key) = row.get(0).and_then(Value::as_str) {
                out.push(parse_series_key(key));
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_field_keys_response() {
        let body = serde_json::json!({
            "results": [{
                "series": [{
                    "name": "cpu",
                    "columns": ["fieldKey", "fieldType"],
                    "values": [["value", "float"]]
                }]
            }]
        });
        let parsed = parse_field_keys(&body).unwrap();
        assert_eq!(parsed.get("cpu").unwrap(), &vec!["value".to_string()]);
    }

    #[test]
    fn parses_series_keys_response() {
        let body = serde_json::json!({
            "results": [{
                "series": [{
                    "values": [["cpu,host=a"], ["cpu,host=b"]]
                }]
            }]
        });
        let parsed = parse_series_keys(&body).unwrap();
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].0, "cpu");
    }

    #[test]
    fn extract_chunk_reads_rows() {
        let body = serde_json::json!({
            "results": [{
                "series": [{
                    "columns": ["time", "value"],
                    "values": [["2020-01-01T00:00:00Z", 1.5]]
                }]
            }]
        });
        let chunk = extract_chunk(&body, "cpu", "value").unwrap().unwrap();
        assert_eq!(chunk.values, vec![1.5]);
        assert_eq!(chunk.timestamps.len(), 1);
    }

    #[test]
    fn extract_chunk_rejects_non_numeric() {
        let body = serde_json::json!({
            "results": [{
                "series": [{
                    "columns": ["time", "value"],
                    "values": [["2020-01-01T00:00:00Z", "oops"]]
                }]
            }]
        });
        assert!(extract_chunk(&body, "cpu", "value").is_err());
    }
}
