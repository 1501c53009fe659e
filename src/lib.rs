#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

/// Reusable command-line runners shared by the demo binaries.
pub mod apps;
/// Archive adapters: URL schemes and payload parsers.
pub mod archive;
/// Pipeline artifact files.
pub mod artifacts;
/// Sampling configuration types.
pub mod config;
/// Centralized defaults and labels.
pub mod constants;
/// Query and criteria construction.
pub mod criteria;
/// Shared sampling data types.
pub mod data;
/// Chunked, bounded-concurrency dispatch.
pub mod dispatch;
/// Candidate extraction from scored articles.
pub mod extracts;
/// Retrying fetch primitive and transport trait.
pub mod fetch;
/// Yield and coverage estimates plus report formatting.
pub mod heuristics;
/// Balance metrics for stratified samples.
pub mod metrics;
/// Two-stage population sampling.
pub mod panning;
/// Weighted, quota-balanced stratified sampling.
pub mod quota;
/// Request transports (HTTP) and local line files.
pub mod transport;
/// Shared type aliases.
pub mod types;

mod errors;

pub use archive::{Archive, RowsArchive, RowsArchiveConfig, SruArchive};
pub use config::{PanningConfig, QuotaConfig, RetryPolicy};
pub use data::{Candidate, Criterion, CriterionKey, Record, SampleEntry, SampleSet, Split};
pub use dispatch::{Dispatch, DispatchCounters, DispatchState, dispatch};
pub use errors::SamplerError;
pub use fetch::{FetchFailure, FetchResult, RetryingFetcher, Transport};
pub use panning::{PanningReport, PanningRun, PopulationSampler};
pub use quota::StratifiedQuotaSampler;
pub use types::{ArchiveId, ContentTag, ExtractText, Query, RecordId, SpatialTag};
