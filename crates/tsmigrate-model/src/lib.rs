//! Core data types that flow through the migration pipeline, plus the
//! newline-delimited JSON codec used to write them into VictoriaMetrics.

use std::io::Write;

use serde::Serialize;

/// A label name/value pair. Order within a series is preserved but carries
/// no semantic meaning to the destination.
pub type Label = (String, String);

/// One metric's worth of samples, ready to be handed to the importer.
///
/// Invariant: `timestamps.len() == values.len()`. A series violating this
/// must be rejected by its producer before it reaches the importer.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    pub name: String,
    pub labels: Vec<Label>,
    pub timestamps: Vec<i64>,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn new(name: impl Into<String>, labels: Vec<Label>) -> Self {
        Self {
            name: name.into(),
            labels,
            timestamps: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Appends a full chunk, preserving order.
    pub fn extend(&mut self, timestamps: Vec<i64>, values: Vec<f64>) {
        debug_assert_eq!(timestamps.len(), values.len());
        self.timestamps.extend(timestamps);
        self.values.extend(values);
    }

    pub fn sample_count(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Rounds every value to `decimal_places` digits. A no-op when
    /// `decimal_places == 0`.
    pub fn round_values(&mut self, decimal_places: u32) {
        if decimal_places == 0 {
            return;
        }
        let factor = 10f64.powi(decimal_places as i32);
        for v in &mut self.values {
            *v = (*v * factor).round() / factor;
        }
    }

    /// Does this series already carry a label with the given name?
    pub fn has_label(&self, name: &str) -> bool {
        self.labels.iter().any(|(k, _)| k == name)
    }
}

/// Identifies a series before its datapoints have been fetched.
#[derive(Debug, Clone)]
pub struct SeriesDescriptor {
    pub measurement: String,
    pub field: String,
    pub labels: Vec<Label>,
}

impl SeriesDescriptor {
    /// Assembles the destination metric name: `measurement ⊕ separator ⊕
    /// field` when `measurement` is non-empty, else just `field`.
    pub fn metric_name(&self, separator: &str) -> String {
        if self.measurement.is_empty() {
            self.field.clone()
        } else {
            format!("{}{}{}", self.measurement, separator, self.field)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("failed to encode series as json: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to write encoded line: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Serialize)]
struct Line<'a> {
    metric: serde_json::Map<String, serde_json::Value>,
    values: &'a [f64],
    timestamps: &'a [i64],
}

/// Writes one newline-delimited-JSON import line for `series` into `out`,
/// returning the number of bytes written (pre-compression, as reported to
/// stats).
///
/// Samples whose value is not finite (NaN or +/-Inf) are dropped from the
/// emitted `values`/`timestamps` arrays rather than producing invalid JSON
/// or being silently coerced. A series whose every sample is non-finite is
/// still written, with empty arrays: this codec never decides to drop a
/// whole series, only individual samples.
pub fn encode_line<W: Write>(series: &TimeSeries, out: &mut W) -> Result<usize, WireError> {
    let mut metric = serde_json::Map::with_capacity(series.labels.len() + 1);
    metric.insert(
        "__name__".to_string(),
        serde_json::Value::String(series.name.clone()),
    );
    for (k, v) in &series.labels {
        metric.insert(k.clone(), serde_json::Value::String(v.clone()));
    }

    let mut timestamps = Vec::with_capacity(series.timestamps.len());
    let mut values = Vec::with_capacity(series.values.len());
    for (&ts, &v) in series.timestamps.iter().zip(series.values.iter()) {
        if v.is_finite() {
            timestamps.push(ts);
            values.push(v);
        }
    }

    let line = Line {
        metric,
        values: &values,
        timestamps: &timestamps,
    };

    let bytes = serde_json::to_vec(&line)?;
    let len = bytes.len() + 1;
    out.write_all(&bytes)?;
    out.write_all(b"\n")?;
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_name_with_measurement() {
        let d = SeriesDescriptor {
            measurement: "cpu".into(),
            field: "value".into(),
            labels: vec![],
        };
        assert_eq!(d.metric_name("_"), "cpu_value");
    }

    #[test]
    fn metric_name_without_measurement() {
        let d = SeriesDescriptor {
            measurement: String::new(),
            field: "value".into(),
            labels: vec![],
        };
        assert_eq!(d.metric_name("_"), "value");
    }

    #[test]
    fn round_values_respects_decimal_places() {
        let mut ts = TimeSeries::new("m", vec![]);
        ts.extend(vec![1], vec![1.23456]);
        ts.round_values(2);
        assert_eq!(ts.values[0], 1.23);
    }

    #[test]
    fn round_values_noop_when_zero() {
        let mut ts = TimeSeries::new("m", vec![]);
        ts.extend(vec![1], vec![1.23456]);
        ts.round_values(0);
        assert_eq!(ts.values[0], 1.23456);
    }

    #[test]
    fn encode_line_drops_non_finite_samples() {
        let mut ts = TimeSeries::new("cpu_value", vec![("host".into(), "a".into())]);
        ts.extend(
            vec![1, 2, 3],
            vec![1.0, f64::NAN, f64::INFINITY],
        );
        let mut buf = Vec::new();
        encode_line(&ts, &mut buf).unwrap();
        let line = String::from_utf8(buf).unwrap();
        let value: serde_json::Value = serde_json::from_str(line.trim_end()).unwrap();
        assert_eq!(value["values"].as_array().unwrap().len(), 1);
        assert_eq!(value["timestamps"].as_array().unwrap().len(), 1);
        assert_eq!(value["metric"]["__name__"], "cpu_value");
        assert_eq!(value["metric"]["host"], "a");
    }

    #[test]
    fn encode_line_all_non_finite_yields_empty_arrays() {
        let mut ts = TimeSeries::new("m", vec![]);
        ts.extend(vec![1], vec![f64::NAN]);
        let mut buf = Vec::new();
        encode_line(&ts, &mut buf).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(String::from_utf8(buf).unwrap().trim_end()).unwrap();
        assert!(value["values"].as_array().unwrap().is_empty());
        assert!(value["timestamps"].as_array().unwrap().is_empty());
    }
}
