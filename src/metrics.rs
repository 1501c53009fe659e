use std::collections::HashMap;

use indexmap::IndexSet;

use crate::data::{Criterion, CriterionKey, SampleSet};

/// Aggregate skew metrics for per-criterion sample counts.
#[derive(Clone, Debug, PartialEq)]
pub struct CriterionSkew {
    pub total: usize,
    pub criteria: usize,
    pub empty: usize,
    pub min: usize,
    pub max: usize,
    pub mean: f64,
    pub max_share: f64,
    pub min_share: f64,
    pub ratio: f64,
    pub per_criterion: Vec<CriterionShare>,
}

/// Per-criterion share of a sample for balance inspection.
#[derive(Clone, Debug, PartialEq)]
pub struct CriterionShare {
    pub criterion: CriterionKey,
    pub count: usize,
    pub share: f64,
}

/// Count entries per criterion.
pub fn criterion_counts(set: &SampleSet) -> HashMap<CriterionKey, usize> {
    let mut counts = HashMap::new();
    for entry in &set.entries {
        *counts.entry(entry.criterion.clone()).or_insert(0) += 1;
    }
    counts
}

/// Compute skew metrics over every criterion of a run.
///
/// Criteria that received nothing count as zero, so a starved stratum pulls
/// `min` to 0 and `ratio` to infinity. Keys present in `counts` but not in
/// `criteria` are included as well. `None` when there is nothing to measure.
pub fn criterion_skew(
    criteria: &[Criterion],
    counts: &HashMap<CriterionKey, usize>,
) -> Option<CriterionSkew> {
    let mut keys: IndexSet<&CriterionKey> =
        criteria.iter().map(|criterion| &criterion.key).collect();
    keys.extend(counts.keys());
    let count_of = |key: &CriterionKey| counts.get(key).copied().unwrap_or(0);
    let min = keys.iter().map(|&key| count_of(key)).min()?;
    let max = keys.iter().map(|&key| count_of(key)).max()?;
    let empty = keys.iter().filter(|&&key| count_of(key) == 0).count();
    let total: usize = counts.values().sum();
    let criteria = keys.len();
    let share_of = |count: usize| {
        if total == 0 {
            0.0
        } else {
            count as f64 / total as f64
        }
    };
    let ratio = if min == 0 {
        f64::INFINITY
    } else {
        max as f64 / min as f64
    };
    let mut per_criterion: Vec<CriterionShare> = keys
        .iter()
        .map(|&key| CriterionShare {
            criterion: key.clone(),
            count: count_of(key),
            share: share_of(count_of(key)),
        })
        .collect();
    per_criterion.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.criterion.cmp(&b.criterion))
    });
    Some(CriterionSkew {
        total,
        criteria,
        empty,
        min,
        max,
        mean: total as f64 / criteria as f64,
        max_share: share_of(max),
        min_share: share_of(min),
        ratio,
        per_criterion,
    })
}
