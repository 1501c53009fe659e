//! Query composition and sampling-criteria construction.
//!
//! Queries are built as the cartesian product of line-separated term lists,
//! joined with `" AND "`. Criteria pair every content query with every
//! spatial category.

use std::path::Path;

use crate::config::QuotaConfig;
use crate::constants::criteria::QUERY_JOINER;
use crate::data::{Criterion, CriterionKey, Query};
use crate::errors::SamplerError;
use crate::transport::fs::read_lines;

/// Cartesian product of `lists`, first list varying slowest.
///
/// Any empty list empties the product. No lists yields a single empty row.
pub fn line_combinations<S: AsRef<str>>(lists: &[Vec<S>]) -> Vec<Vec<String>> {
    let mut rows: Vec<Vec<String>> = vec![Vec::new()];
    for list in lists {
        rows = rows
            .iter()
            .flat_map(|prefix| {
                list.iter().map(move |item| {
                    let mut row = prefix.clone();
                    row.push(item.as_ref().to_string());
                    row
                })
            })
            .collect();
    }
    rows
}

/// Join query components with `" AND "`.
pub fn compose_query<S: AsRef<str>>(parts: &[S]) -> Query {
    parts
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join(QUERY_JOINER)
}

/// All queries from the product of `lists`.
pub fn compose_queries<S: AsRef<str>>(lists: &[Vec<S>]) -> Vec<Query> {
    line_combinations(lists)
        .iter()
        .map(|parts| compose_query(parts.as_slice()))
        .collect()
}

/// Read each file's non-blank lines and compose the product into queries.
pub fn queries_from_files<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Query>, SamplerError> {
    let lists = paths
        .iter()
        .map(|path| read_lines(path.as_ref()))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(compose_queries(&lists))
}

/// Search term of a composed query: its first `" AND "` component.
pub fn target_term(query: &str) -> &str {
    query
        .split(QUERY_JOINER)
        .next()
        .unwrap_or(query)
        .trim()
}

/// One criterion per (content, spatial) pair, in product order.
///
/// Every criterion shares the configured quota and adjacency-derived
/// `max_chars`.
pub fn build_criteria<S: AsRef<str>>(
    contents: &[S],
    spatials: &[S],
    config: &QuotaConfig,
) -> Vec<Criterion> {
    let max_chars = config.max_chars();
    contents
        .iter()
        .flat_map(|content| {
            spatials.iter().map(move |spatial| Criterion {
                key: CriterionKey::new(content.as_ref(), spatial.as_ref()),
                quota: config.quota,
                max_chars,
            })
        })
        .collect()
}
