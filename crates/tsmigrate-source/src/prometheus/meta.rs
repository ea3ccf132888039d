use serde::Deserialize;

/// The subset of a TSDB block's `meta.json` this reader needs.
#[derive(Debug, Clone, Deserialize)]
pub struct BlockMeta {
    #[serde(rename = "minTime")]
    pub min_time: i64,
    #[serde(rename = "maxTime")]
    pub max_time: i64,
}
