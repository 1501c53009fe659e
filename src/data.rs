use serde::{Deserialize, Serialize};
use std::fmt;

pub use crate::types::{ContentTag, ExtractText, Query, RecordId, SpatialTag};

/// A page-aligned window over a remote population for one query.
///
/// Splits are planned before dispatch and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Split {
    /// Query whose result set is being paged.
    pub query: Query,
    /// 1-based offset of the first record in the window.
    pub start: usize,
    /// Records requested from `start`.
    pub width: usize,
    /// Seed for the within-split draw, fixed when the split is planned.
    pub seed: u64,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}..+{}]", self.query, self.start, self.width)
    }
}

/// One identifier sampled from a fetched split.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    /// Identifier harvested from the archive page.
    pub id: RecordId,
    /// Start offset of the split the identifier was drawn from.
    pub split_start: usize,
}

/// Grouping key of a sampling criterion: content term x spatial category.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CriterionKey {
    /// Full content query the candidate matched.
    pub content: ContentTag,
    /// Spatial distribution of the candidate's source.
    pub spatial: SpatialTag,
}

impl CriterionKey {
    /// Build a key from its two components.
    pub fn new(content: impl Into<ContentTag>, spatial: impl Into<SpatialTag>) -> Self {
        Self {
            content: content.into(),
            spatial: spatial.into(),
        }
    }
}

impl fmt::Display for CriterionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} | {}", self.content, self.spatial)
    }
}

/// A stratum with its own quota and length constraint.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Criterion {
    /// Key candidates must match to join this stratum's pool.
    pub key: CriterionKey,
    /// Candidates drawn for this stratum before the global fill.
    pub quota: usize,
    /// Longest admissible extract, in characters.
    pub max_chars: usize,
}

/// A scored item eligible for stratified selection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Identifier of the document the extract was cut from.
    pub source: RecordId,
    /// Criterion key the candidate belongs to.
    pub key: CriterionKey,
    /// Extract text.
    pub text: ExtractText,
    /// Negative log-probability of the extract; lower is more probable.
    pub score: f64,
    /// Opaque document metadata carried through to the output table.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One selected candidate with the criterion it was drawn for.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleEntry {
    /// Criterion whose bucket produced this entry.
    pub criterion: CriterionKey,
    /// Selected candidate.
    pub candidate: Candidate,
}

/// Size-capped output of the stratified sampler.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    /// Selected entries in fill order.
    pub entries: Vec<SampleEntry>,
    /// Requested global size (N).
    pub requested: usize,
}

impl SampleSet {
    /// Number of entries actually selected.
    pub fn achieved(&self) -> usize {
        self.entries.len()
    }

    /// Entries missing relative to the requested size.
    pub fn shortfall(&self) -> usize {
        self.requested.saturating_sub(self.entries.len())
    }

    /// True when the requested size was reached.
    pub fn is_complete(&self) -> bool {
        self.shortfall() == 0
    }

    /// True when nothing was selected.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of selected entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
