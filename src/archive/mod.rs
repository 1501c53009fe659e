//! Archive adapters: how to address and parse a paginated remote population.
//!
//! An `Archive` knows its endpoint's URL scheme and payload format. It does
//! no IO itself; requests go through `RetryingFetcher`, so a parse failure is
//! retried exactly like a transport failure.

use crate::data::{RecordId, Split};
use crate::errors::SamplerError;

/// Datasets-server style JSON rows adapter.
pub mod rows;
/// SRU `searchRetrieve` XML adapter.
pub mod sru;

pub use rows::{RowsArchive, RowsArchiveConfig};
pub use sru::SruArchive;

/// Addressing and payload contract of a paginated archive.
///
/// Offsets in `Split` are 1-based. How many identifiers a page actually holds
/// is the archive's business: the final window of a population, or an
/// endpoint with a hard page cap, may return fewer than `split.width`.
pub trait Archive: Send + Sync {
    /// Stable adapter identifier used in logs and errors.
    fn id(&self) -> &str;
    /// URL of the cheap match-count request for `query`.
    fn count_url(&self, query: &str) -> String;
    /// URL of the page request covering `split`.
    fn page_url(&self, split: &Split) -> String;
    /// Extract the total match count from a count response.
    fn parse_count(&self, body: &[u8]) -> Result<usize, SamplerError>;
    /// Extract record identifiers, in page order, from a page response.
    fn parse_page(&self, body: &[u8]) -> Result<Vec<RecordId>, SamplerError>;
    /// Largest page the endpoint serves in one request; `None` when uncapped.
    fn max_page_width(&self) -> Option<usize> {
        None
    }
}

impl<A: Archive + ?Sized> Archive for std::sync::Arc<A> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn count_url(&self, query: &str) -> String {
        (**self).count_url(query)
    }

    fn page_url(&self, split: &Split) -> String {
        (**self).page_url(split)
    }

    fn parse_count(&self, body: &[u8]) -> Result<usize, SamplerError> {
        (**self).parse_count(body)
    }

    fn parse_page(&self, body: &[u8]) -> Result<Vec<RecordId>, SamplerError> {
        (**self).parse_page(body)
    }

    fn max_page_width(&self) -> Option<usize> {
        (**self).max_page_width()
    }
}

/// Parse and validate an endpoint URL for an adapter.
pub(crate) fn parse_endpoint(archive: &str, endpoint: &str) -> Result<url::Url, SamplerError> {
    url::Url::parse(endpoint).map_err(|err| {
        SamplerError::Configuration(format!(
            "archive '{archive}' endpoint '{endpoint}' is not a valid URL: {err}"
        ))
    })
}
