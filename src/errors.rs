use std::io;

use thiserror::Error;

use crate::types::ArchiveId;

/// Error type for sampling configuration, archive access, and artifact IO failures.
///
/// Fetch-level failures never surface here during a sampling run: the
/// retrying fetcher turns them into `FetchResult::Failed` values. Only
/// precondition violations abort a run.
#[derive(Debug, Error)]
pub enum SamplerError {
    #[error(
        "split plan exceeds population: split_width {split_width} x n_splits {n_splits} > population {population}"
    )]
    PopulationTooSmall {
        split_width: usize,
        n_splits: usize,
        population: usize,
    },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("archive '{archive}' is unavailable: {reason}")]
    ArchiveUnavailable { archive: ArchiveId, reason: String },
    #[error("malformed response from archive '{archive}': {details}")]
    MalformedResponse { archive: ArchiveId, details: String },
    #[error("request to {url} failed: {reason}")]
    Transport { url: String, reason: String },
    #[error("worker panicked: {0}")]
    WorkerPanicked(String),
    #[error("invalid sampling weights for criterion '{criterion}': {details}")]
    InvalidWeights { criterion: String, details: String },
    #[error("sample shortfall: achieved {achieved} of {requested} requested")]
    Shortfall { achieved: usize, requested: usize },
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
