use std::time::Duration;

use crate::error::ImporterError;

/// Default batch size when the caller leaves it unset (`<= 0` in the
/// reference's flag parsing maps to this).
pub const DEFAULT_BATCH_SIZE: usize = 100_000;

const BACKOFF_MAX_ATTEMPTS: usize = 5;
const BACKOFF_MIN_DURATION: Duration = Duration::from_secs(1);
const BACKOFF_FACTOR: f64 = 1.7;

#[derive(Debug, Clone)]
pub struct ImporterConfig {
    pub addr: String,
    pub concurrency: u8,
    pub compress: bool,
    /// Negative selects the single-node import path.
    pub account_id: i64,
    pub batch_size: usize,
    pub user: Option<String>,
    pub password: Option<String>,
    pub decimal_places: u32,
}

impl ImporterConfig {
    pub fn validate(&self) -> Result<(), ImporterError> {
        if self.concurrency == 0 {
            return Err(ImporterError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn effective_batch_size(&self) -> usize {
        if self.batch_size == 0 {
            DEFAULT_BATCH_SIZE
        } else {
            self.batch_size
        }
    }

    fn base_addr(&self) -> &str {
        self.addr.trim_end_matches('/')
    }

    pub fn import_url(&self) -> String {
        let base = self.base_addr();
        if self.account_id < 0 {
            format!("{base}/api/v1/import")
        } else {
            format!(
                "{base}/insert/{}/prometheus/api/v1/import",
                self.account_id as u64
            )
        }
    }

    pub fn health_url(&self) -> String {
        format!("{}/health", self.base_addr())
    }

    pub fn backoff_max_attempts(&self) -> usize {
        BACKOFF_MAX_ATTEMPTS
    }

    pub fn backoff_delay(&self, attempt: usize) -> Duration {
        BACKOFF_MIN_DURATION.mul_f64(BACKOFF_FACTOR.powi(attempt as i32))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(account_id: i64) -> ImporterConfig {
        ImporterConfig {
            addr: "http://localhost:8428/".to_string(),
            concurrency: 2,
            compress: true,
            account_id,
            batch_size: 0,
            user: None,
            password: None,
            decimal_places: 0,
        }
    }

    #[test]
    fn single_node_import_path() {
        assert_eq!(cfg(-1).import_url(), "http://localhost:8428/api/v1/import");
    }

    #[test]
    fn cluster_import_path() {
        assert_eq!(
            cfg(7).import_url(),
            "http://localhost:8428/insert/7/prometheus/api/v1/import"
        );
    }

    #[test]
    fn zero_batch_size_defaults() {
        assert_eq!(cfg(-1).effective_batch_size(), DEFAULT_BATCH_SIZE);
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut c = cfg(-1);
        c.concurrency = 0;
        assert!(c.validate().is_err());
    }
}
