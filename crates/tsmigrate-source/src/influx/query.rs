use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Builds the `SELECT ... FROM ... [WHERE ...]` query for one series.
///
/// Clauses, in order: one equality predicate per label, then the raw user
/// filter (if any) appended verbatim, then `time >=`/`time <=` bounds. Each
/// clause is present only when its input is non-empty; the whole `where`
/// clause is omitted when nothing applies.
pub fn build_select_query(
    measurement: &str,
    field: &str,
    labels: &[(String, String)],
    user_filter: &str,
    time_start: Option<OffsetDateTime>,
    time_end: Option<OffsetDateTime>,
) -> String {
    let mut clauses = Vec::new();
    for (k, v) in labels {
        clauses.push(format!("\"{k}\"='{v}'"));
    }
    if !user_filter.is_empty() {
        clauses.push(user_filter.to_string());
    }
    if let Some(start) = time_start {
        clauses.push(format!("time >= '{}'", start.format(&Rfc3339).unwrap()));
    }
    if let Some(end) = time_end {
        clauses.push(format!("time <= '{}'", end.format(&Rfc3339).unwrap()));
    }

    let mut query = format!("select \"{field}\" from \"{measurement}\"");
    if !clauses.is_empty() {
        query.push_str(" where ");
        query.push_str(&clauses.join(" and "));
    }
    query
}

/// Parses an Influx series key of the form `measurement[,k=v]*` as emitted
/// by `SHOW SERIES`.
pub fn parse_series_key(key: &str) -> (String, Vec<(String, String)>) {
    let mut parts = key.split(',');
    let measurement = parts.next().unwrap_or_default().to_string();
    let labels = parts
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    (measurement, labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_and_filter_clause() {
        let q = build_select_query(
            "cpu",
            "value",
            &[("foo".into(), "bar".into())],
            "time >= now()",
            None,
            None,
        );
        assert_eq!(q, "select \"value\" from \"cpu\" where \"foo\"='bar' and time >= now()");
    }

    #[test]
    fn no_clauses() {
        let q = build_select_query("cpu", "value", &[], "", None, None);
        assert_eq!(q, "select \"value\" from \"cpu\"");
    }

    #[test]
    fn bounds_only() {
        let start = OffsetDateTime::parse("2020-01-01T20:07:00Z", &Rfc3339).unwrap();
        let end = OffsetDateTime::parse("2020-01-01T21:07:00Z", &Rfc3339).unwrap();
        let q = build_select_query("cpu", "value", &[], "", Some(start), Some(end));
        assert_eq!(
            q,
            "select \"value\" from \"cpu\" where time >= '2020-01-01T20:07:00Z' and time <= '2020-01-01T21:07:00Z'"
        );
    }

    #[test]
    fn parses_series_key_with_tags() {
        let (measurement, labels) = parse_series_key("cpu,host=a,region=us");
        assert_eq!(measurement, "cpu");
        assert_eq!(
            labels,
            vec![("host".to_string(), "a".to_string()), ("region".to_string(), "us".to_string())]
        );
    }

    #[test]
    fn parses_series_key_without_tags() {
        let (measurement, labels) = parse_series_key("cpu");
        assert_eq!(measurement, "cpu");
        assert!(labels.is_empty());
    }
}
