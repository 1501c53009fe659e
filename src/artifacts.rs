//! Files exchanged with upstream and downstream pipeline stages.
//!
//! Stages are resumable: a runner skips a step whose output already exists
//! unless asked to overwrite it.

use std::fs;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use crate::criteria::target_term;
use crate::data::{CriterionKey, Record, RecordId, SampleSet};
use crate::errors::SamplerError;
use crate::extracts::ScoredArticle;
use crate::panning::PanningReport;
use crate::transport::fs::{ensure_parent, file_mtime, read_lines, write_lines};

/// One row of the stratified sample table.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    /// Source document identifier.
    pub url: RecordId,
    /// Search term of the criterion query.
    pub query: String,
    /// Criterion the row was drawn for.
    pub criterion: CriterionKey,
    /// Selected extract.
    pub extract: String,
    /// Extract score (summed negative log-likelihood).
    pub score: f64,
    /// Document metadata; `matching_queries` is narrowed to the criterion query.
    pub metadata: Value,
}

/// True when `path` exists and `overwrite` is off.
pub fn should_skip(path: &Path, overwrite: bool) -> bool {
    if overwrite || !path.exists() {
        return false;
    }
    info!(
        path = %path.display(),
        modified = ?file_mtime(path),
        "[panning:artifacts] output exists; step skipped"
    );
    true
}

/// Write one record identifier per line.
pub fn write_record_ids(path: &Path, records: &[Record]) -> Result<usize, SamplerError> {
    write_lines(path, records.iter().map(|record| record.id.as_str()))
}

/// Read identifiers written by [`write_record_ids`].
pub fn read_record_ids(path: &Path) -> Result<Vec<RecordId>, SamplerError> {
    read_lines(path)
}

/// Write a panning report as pretty JSON.
pub fn write_report(path: &Path, report: &PanningReport) -> Result<(), SamplerError> {
    write_json(path, report)
}

/// Flatten a sample set into table rows, in fill order.
pub fn sample_rows(set: &SampleSet) -> Vec<SampleRow> {
    set.entries
        .iter()
        .map(|entry| {
            let mut metadata = entry.candidate.metadata.clone();
            if let Some(fields) = metadata.as_object_mut() {
                fields.insert(
                    "matching_queries".to_string(),
                    Value::from(vec![entry.criterion.content.clone()]),
                );
            }
            SampleRow {
                url: entry.candidate.source.clone(),
                query: target_term(&entry.criterion.content).to_string(),
                criterion: entry.criterion.clone(),
                extract: entry.candidate.text.clone(),
                score: entry.candidate.score,
                metadata,
            }
        })
        .collect()
}

/// Write the ordered sample table as a JSON array of rows.
pub fn write_sample_set(path: &Path, set: &SampleSet) -> Result<usize, SamplerError> {
    let rows = sample_rows(set);
    write_json(path, &rows)?;
    Ok(rows.len())
}

/// Read a sample table written by [`write_sample_set`].
pub fn read_sample_rows(path: &Path) -> Result<Vec<SampleRow>, SamplerError> {
    read_json(path)
}

/// Read scored articles (`[[url, metadata, text], ...]`).
pub fn read_scored_articles(path: &Path) -> Result<Vec<ScoredArticle>, SamplerError> {
    read_json(path)
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SamplerError> {
    ensure_parent(path)?;
    let raw = serde_json::to_string_pretty(value)?;
    fs::write(path, raw)?;
    Ok(())
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, SamplerError> {
    let reader = BufReader::new(fs::File::open(path)?);
    Ok(serde_json::from_reader(reader)?)
}
