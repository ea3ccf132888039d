use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct PrometheusConfig {
    pub snapshot_dir: PathBuf,
    pub filter_time_min: Option<i64>,
    pub filter_time_max: Option<i64>,
    pub filter_label: Option<String>,
    pub filter_label_value: Option<String>,
}

impl PrometheusConfig {
    pub fn matches_time(&self, timestamp_ms: i64) -> bool {
        if let Some(min) = self.filter_time_min {
            if timestamp_ms < min {
                return false;
            }
        }
        if let Some(max) = self.filter_time_max {
            if timestamp_ms > max {
                return false;
            }
        }
        true
    }

    pub fn matches_labels(&self, labels: &[(String, String)]) -> bool {
        match (&self.filter_label, &self.filter_label_value) {
            (Some(name), Some(value)) => {
                labels.iter().any(|(k, v)| k == name && v == value)
            }
            _ => true,
        }
    }
}
