use serde_json::Value;
use url::Url;

use crate::archive::{Archive, parse_endpoint};
use crate::constants::archive::{DEFAULT_ROWS_ENDPOINT, ROWS_INDEX_FIELD, ROWS_MAX_PAGE_WIDTH};
use crate::data::{RecordId, Split};
use crate::errors::SamplerError;

const ROWS_ARCHIVE_ID: &str = "rows";

/// Target dataset of a [`RowsArchive`].
#[derive(Clone, Debug)]
pub struct RowsArchiveConfig {
    /// Base URL of the datasets-server deployment.
    pub endpoint: String,
    /// Dataset repository id (`owner/name`).
    pub dataset: String,
    /// Dataset config name.
    pub config: String,
    /// Dataset split name.
    pub split: String,
    /// Row column used as the record identifier. `None` uses the row index.
    pub id_column: Option<String>,
}

impl RowsArchiveConfig {
    /// Config for `dataset` on the default endpoint with `default`/`train`.
    pub fn new(dataset: impl Into<String>) -> Self {
        Self {
            endpoint: DEFAULT_ROWS_ENDPOINT.to_string(),
            dataset: dataset.into(),
            config: "default".to_string(),
            split: "train".to_string(),
            id_column: None,
        }
    }
}

/// JSON rows API adapter (datasets-server `/rows` and `/filter`).
///
/// An empty query pages the whole split through `/rows`; any other query is
/// passed as the `where` clause of `/filter`. Splits carry 1-based starts and
/// the API takes 0-based offsets, so `offset = start - 1`. Both endpoints
/// report the match count as `num_rows_total`, which makes a one-row page the
/// count request. Pages are capped at 100 rows, so wider windows are refused.
#[derive(Clone, Debug)]
pub struct RowsArchive {
    base: Url,
    config: RowsArchiveConfig,
}

impl RowsArchive {
    /// Validate the endpoint and build the adapter.
    pub fn new(config: RowsArchiveConfig) -> Result<Self, SamplerError> {
        if config.dataset.trim().is_empty() {
            return Err(SamplerError::Configuration(
                "rows archive requires a dataset name".into(),
            ));
        }
        let base = parse_endpoint(ROWS_ARCHIVE_ID, &config.endpoint)?;
        Ok(Self { base, config })
    }

    /// Dataset this adapter reads.
    pub fn config(&self) -> &RowsArchiveConfig {
        &self.config
    }

    fn rows_url(&self, query: &str, offset: usize, length: usize) -> String {
        let mut url = self.base.clone();
        let route = if query.trim().is_empty() {
            "rows"
        } else {
            "filter"
        };
        url.set_path(&format!("{}/{route}", self.base.path().trim_end_matches('/')));
        {
            let mut pairs = url.query_pairs_mut();
            pairs
                .append_pair("dataset", &self.config.dataset)
                .append_pair("config", &self.config.config)
                .append_pair("split", &self.config.split);
            if !query.trim().is_empty() {
                pairs.append_pair("where", query);
            }
            pairs
                .append_pair("offset", &offset.to_string())
                .append_pair("length", &length.to_string());
        }
        url.into()
    }

    fn parse_json(&self, body: &[u8]) -> Result<Value, SamplerError> {
        serde_json::from_slice(body).map_err(|err| Self::malformed(format!("invalid JSON: {err}")))
    }

    fn malformed(details: impl Into<String>) -> SamplerError {
        SamplerError::MalformedResponse {
            archive: ROWS_ARCHIVE_ID.into(),
            details: details.into(),
        }
    }

    fn identifier(&self, entry: &Value) -> Option<RecordId> {
        match &self.config.id_column {
            Some(column) => entry
                .get("row")
                .and_then(|row| row.get(column))
                .and_then(value_to_id),
            None => entry.get(ROWS_INDEX_FIELD).and_then(value_to_id),
        }
    }
}

/// Render a scalar JSON value as an identifier; nulls and blanks are skipped.
fn value_to_id(value: &Value) -> Option<RecordId> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl Archive for RowsArchive {
    fn id(&self) -> &str {
        ROWS_ARCHIVE_ID
    }

    fn count_url(&self, query: &str) -> String {
        self.rows_url(query, 0, 1)
    }

    fn page_url(&self, split: &Split) -> String {
        self.rows_url(&split.query, split.start.saturating_sub(1), split.width)
    }

    fn parse_count(&self, body: &[u8]) -> Result<usize, SamplerError> {
        let json = self.parse_json(body)?;
        json.get("num_rows_total")
            .and_then(Value::as_u64)
            .and_then(|raw| usize::try_from(raw).ok())
            .ok_or_else(|| Self::malformed("response has no num_rows_total"))
    }

    fn parse_page(&self, body: &[u8]) -> Result<Vec<RecordId>, SamplerError> {
        let json = self.parse_json(body)?;
        let rows = json
            .get("rows")
            .and_then(Value::as_array)
            .ok_or_else(|| Self::malformed("response has no rows array"))?;
        Ok(rows.iter().filter_map(|entry| self.identifier(entry)).collect())
    }

    fn max_page_width(&self) -> Option<usize> {
        Some(ROWS_MAX_PAGE_WIDTH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive(id_column: Option<&str>) -> RowsArchive {
        let mut config = RowsArchiveConfig::new("org/news");
        config.endpoint = "https://rows.example".into();
        config.id_column = id_column.map(str::to_string);
        RowsArchive::new(config).unwrap()
    }

    fn pairs(url: &str) -> Vec<(String, String)> {
        Url::parse(url).unwrap().query_pairs().into_owned().collect()
    }

    #[test]
    fn page_url_converts_to_zero_based_offset() {
        let split = Split {
            query: String::new(),
            start: 1001,
            width: 100,
            seed: 7,
        };
        let url = archive(None).page_url(&split);

        assert!(url.starts_with("https://rows.example/rows?"));
        let pairs = pairs(&url);
        assert!(pairs.contains(&("offset".into(), "1000".into())));
        assert!(pairs.contains(&("length".into(), "100".into())));
        assert!(pairs.contains(&("dataset".into(), "org/news".into())));
    }

    #[test]
    fn non_empty_query_uses_filter_route() {
        let url = archive(None).count_url("\"year\" >= 1890");

        assert!(url.starts_with("https://rows.example/filter?"));
        let pairs = pairs(&url);
        assert!(pairs.contains(&("where".into(), "\"year\" >= 1890".into())));
        assert!(pairs.contains(&("length".into(), "1".into())));
    }

    #[test]
    fn parse_count_reads_num_rows_total() {
        let body = br#"{"rows": [], "num_rows_total": 48213, "num_rows_per_page": 100}"#;
        assert_eq!(archive(None).parse_count(body).unwrap(), 48213);
        assert!(archive(None).parse_count(br#"{"error": "busy"}"#).is_err());
    }

    #[test]
    fn parse_page_defaults_to_row_index() {
        let body = br#"{"rows": [
            {"row_idx": 10, "row": {"url": "a"}},
            {"row_idx": 11, "row": {"url": "b"}}
        ]}"#;

        assert_eq!(
            archive(None).parse_page(body).unwrap(),
            vec!["10".to_string(), "11".to_string()]
        );
    }

    #[test]
    fn parse_page_reads_configured_column_and_skips_blanks() {
        let body = br#"{"rows": [
            {"row_idx": 0, "row": {"url": "http://a"}},
            {"row_idx": 1, "row": {"url": null}},
            {"row_idx": 2, "row": {"url": "  "}},
            {"row_idx": 3, "row": {"url": "http://d"}}
        ]}"#;

        assert_eq!(
            archive(Some("url")).parse_page(body).unwrap(),
            vec!["http://a".to_string(), "http://d".to_string()]
        );
    }

    #[test]
    fn pages_are_capped_at_the_route_limit() {
        assert_eq!(archive(None).max_page_width(), Some(100));
    }

    #[test]
    fn parse_page_rejects_payload_without_rows() {
        assert!(archive(None).parse_page(b"<html>").is_err());
        assert!(archive(None).parse_page(br#"{"num_rows_total": 3}"#).is_err());
    }

    #[test]
    fn blank_dataset_is_rejected() {
        let config = RowsArchiveConfig::new(" ");
        assert!(matches!(
            RowsArchive::new(config),
            Err(SamplerError::Configuration(_))
        ));
    }
}
