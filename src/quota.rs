//! Weighted, quota-balanced selection over a pre-scored candidate pool.
//!
//! Each criterion first draws up to `quota` candidates from its own pool,
//! weighted towards low scores. The per-criterion draws are then interleaved
//! round-robin over one random permutation of criteria until the global
//! target is reached or every bucket is empty.

use std::collections::{HashSet, VecDeque};

use indexmap::IndexMap;
use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crate::config::QuotaConfig;
use crate::data::{Candidate, Criterion, CriterionKey, SampleEntry, SampleSet};
use crate::errors::SamplerError;

/// Per-criterion draws, keyed in criterion order. Each bucket is in draw order.
pub type CriterionBuckets = IndexMap<CriterionKey, VecDeque<Candidate>>;

/// Normalized draw weights `exp(-score) + epsilon`.
///
/// Fails when any weight is not finite (for example a NaN score, or a score
/// so negative that `exp(-score)` overflows).
pub fn softmax_weights(
    criterion: &CriterionKey,
    scores: &[f64],
    epsilon: f64,
) -> Result<Vec<f64>, SamplerError> {
    let raw: Vec<f64> = scores.iter().map(|score| (-score).exp() + epsilon).collect();
    let total: f64 = raw.iter().sum();
    if raw.iter().any(|weight| !weight.is_finite()) || !total.is_finite() || total <= 0.0 {
        return Err(SamplerError::InvalidWeights {
            criterion: criterion.to_string(),
            details: format!("scores {scores:?} produce no valid distribution"),
        });
    }
    Ok(raw.into_iter().map(|weight| weight / total).collect())
}

/// Interleave buckets one candidate at a time, walking `order` cyclically.
///
/// Exhausted buckets are skipped. Stops at `target` entries or when every
/// bucket named in `order` is empty.
pub fn fill_round_robin(
    buckets: &mut CriterionBuckets,
    order: &[CriterionKey],
    target: usize,
) -> Vec<SampleEntry> {
    let mut entries = Vec::with_capacity(target.min(buckets.values().map(VecDeque::len).sum()));
    while entries.len() < target {
        let mut progressed = false;
        for key in order {
            if entries.len() == target {
                break;
            }
            if let Some(bucket) = buckets.get_mut(key)
                && let Some(candidate) = bucket.pop_front()
            {
                entries.push(SampleEntry {
                    criterion: key.clone(),
                    candidate,
                });
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }
    entries
}

/// Stratified sampler over scored candidates.
#[derive(Clone, Debug)]
pub struct StratifiedQuotaSampler {
    config: QuotaConfig,
}

impl StratifiedQuotaSampler {
    /// Create a sampler, rejecting unusable weight settings.
    pub fn new(config: QuotaConfig) -> Result<Self, SamplerError> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Active parameters.
    pub fn config(&self) -> &QuotaConfig {
        &self.config
    }

    /// Indices of candidates eligible for `criterion` and not yet consumed.
    pub fn eligible(
        criterion: &Criterion,
        candidates: &[Candidate],
        consumed: &HashSet<usize>,
    ) -> Vec<usize> {
        candidates
            .iter()
            .enumerate()
            .filter(|(idx, candidate)| {
                !consumed.contains(idx)
                    && candidate.key == criterion.key
                    && candidate.text.chars().count() <= criterion.max_chars
            })
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Weighted draw of `min(criterion.quota, pool.len())` distinct pool entries.
    ///
    /// Returns indices into `candidates`, in draw order.
    pub fn draw_for_criterion<R: Rng>(
        &self,
        criterion: &Criterion,
        candidates: &[Candidate],
        pool: &[usize],
        rng: &mut R,
    ) -> Result<Vec<usize>, SamplerError> {
        let amount = criterion.quota.min(pool.len());
        if amount == 0 {
            return Ok(Vec::new());
        }
        let scores: Vec<f64> = pool.iter().map(|&idx| candidates[idx].score).collect();
        let weights = softmax_weights(&criterion.key, &scores, self.config.epsilon)?;
        let invalid = |err: rand::distr::weighted::Error| SamplerError::InvalidWeights {
            criterion: criterion.key.to_string(),
            details: err.to_string(),
        };
        let mut dist = WeightedIndex::new(&weights).map_err(invalid)?;
        let mut drawn = Vec::with_capacity(amount);
        for draw in 0..amount {
            let slot = dist.sample(rng);
            drawn.push(pool[slot]);
            if draw + 1 < amount {
                dist.update_weights(&[(slot, &0.0)]).map_err(invalid)?;
            }
        }
        Ok(drawn)
    }

    /// Step 1: draw every criterion's bucket, never reusing a candidate.
    ///
    /// Criteria sharing a key share one bucket.
    pub fn draw_buckets<R: Rng>(
        &self,
        criteria: &[Criterion],
        candidates: &[Candidate],
        rng: &mut R,
    ) -> Result<CriterionBuckets, SamplerError> {
        let mut consumed = HashSet::new();
        let mut buckets = CriterionBuckets::new();
        for criterion in criteria {
            let pool = Self::eligible(criterion, candidates, &consumed);
            let drawn = self.draw_for_criterion(criterion, candidates, &pool, rng)?;
            debug!(
                criterion = %criterion.key,
                pool = pool.len(),
                drawn = drawn.len(),
                "[panning:quota] criterion drawn"
            );
            let bucket = buckets.entry(criterion.key.clone()).or_default();
            for idx in drawn {
                consumed.insert(idx);
                bucket.push_back(candidates[idx].clone());
            }
        }
        Ok(buckets)
    }

    /// Select up to `config.target` candidates balanced across `criteria`.
    ///
    /// A result smaller than the target is returned as-is; check
    /// [`SampleSet::shortfall`].
    pub fn sample<R: Rng>(
        &self,
        criteria: &[Criterion],
        candidates: &[Candidate],
        rng: &mut R,
    ) -> Result<SampleSet, SamplerError> {
        let mut buckets = self.draw_buckets(criteria, candidates, rng)?;
        let mut order: Vec<CriterionKey> = buckets.keys().cloned().collect();
        order.shuffle(rng);
        let entries = fill_round_robin(&mut buckets, &order, self.config.target);
        let set = SampleSet {
            entries,
            requested: self.config.target,
        };
        if set.is_complete() {
            info!(
                achieved = set.achieved(),
                criteria = order.len(),
                "[panning:quota] sample assembled"
            );
        } else {
            warn!(
                achieved = set.achieved(),
                requested = set.requested,
                candidates = candidates.len(),
                "[panning:quota] sample is short of target"
            );
        }
        Ok(set)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn key(content: &str) -> CriterionKey {
        CriterionKey::new(content, "netherlands")
    }

    fn criterion(content: &str, quota: usize) -> Criterion {
        Criterion {
            key: key(content),
            quota,
            max_chars: 1000,
        }
    }

    fn candidate(content: &str, text: &str, score: f64) -> Candidate {
        Candidate {
            source: format!("urn:{text}"),
            key: key(content),
            text: text.to_string(),
            score,
            metadata: serde_json::Value::Null,
        }
    }

    fn sampler(quota: usize, target: usize) -> StratifiedQuotaSampler {
        StratifiedQuotaSampler::new(QuotaConfig {
            quota,
            target,
            ..QuotaConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn weights_are_normalized_softmax() {
        let weights = softmax_weights(&key("a"), &[0.0, 5.0], 1e-6).unwrap();
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!((weights[0] / weights[1] - (1.0 + 1e-6) / ((-5.0f64).exp() + 1e-6)).abs() < 1e-6);
    }

    #[test]
    fn huge_scores_fall_back_to_epsilon() {
        let weights = softmax_weights(&key("a"), &[5000.0, 5000.0], 1e-6).unwrap();
        assert_eq!(weights, vec![0.5, 0.5]);
    }

    #[test]
    fn non_finite_scores_are_rejected() {
        assert!(softmax_weights(&key("a"), &[f64::NAN], 1e-6).is_err());
        assert!(softmax_weights(&key("a"), &[-1e6], 1e-6).is_err());
    }

    #[test]
    fn low_score_is_drawn_at_softmax_frequency() {
        let sampler = sampler(1, 1);
        let crit = criterion("a", 1);
        let candidates = vec![candidate("a", "likely", 0.0), candidate("a", "unlikely", 5.0)];
        let pool = vec![0, 1];
        let mut rng = StdRng::seed_from_u64(7);
        let trials = 20_000;

        let hits = (0..trials)
            .filter(|_| sampler.draw_for_criterion(&crit, &candidates, &pool, &mut rng).unwrap() == vec![0])
            .count();

        let expected = (1.0 + 1e-6) / (1.0 + (-5.0f64).exp() + 2e-6);
        let observed = hits as f64 / trials as f64;
        assert!((observed - expected).abs() < 0.005, "observed {observed}, expected {expected}");
    }

    #[test]
    fn draws_are_capped_by_pool_and_distinct() {
        let sampler = sampler(10, 100);
        let crit = criterion("a", 10);
        let candidates = vec![
            candidate("a", "one", 1.0),
            candidate("a", "two", 2.0),
            candidate("a", "three", 3.0),
        ];

        let drawn = sampler
            .draw_for_criterion(&crit, &candidates, &[0, 1, 2], &mut StdRng::seed_from_u64(1))
            .unwrap();

        let distinct: HashSet<usize> = drawn.iter().copied().collect();
        assert_eq!(drawn.len(), 3);
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn empty_pool_draws_nothing() {
        let sampler = sampler(5, 10);
        let drawn = sampler
            .draw_for_criterion(&criterion("a", 5), &[], &[], &mut StdRng::seed_from_u64(1))
            .unwrap();
        assert!(drawn.is_empty());
    }

    #[test]
    fn eligibility_filters_key_length_and_consumption() {
        let crit = Criterion {
            max_chars: 5,
            ..criterion("a", 3)
        };
        let candidates = vec![
            candidate("a", "short", 0.0),
            candidate("a", "too long", 0.0),
            candidate("b", "short", 0.0),
            candidate("a", "tiny", 0.0),
            candidate("a", "émigré", 0.0),
        ];
        let consumed = HashSet::from([3]);

        assert_eq!(StratifiedQuotaSampler::eligible(&crit, &candidates, &consumed), vec![0]);
    }

    #[test]
    fn round_robin_interleaves_in_permutation_order() {
        let mut buckets = CriterionBuckets::new();
        buckets.insert(key("A"), VecDeque::from([candidate("A", "a1", 0.0)]));
        buckets.insert(
            key("B"),
            VecDeque::from([candidate("B", "b1", 0.0), candidate("B", "b2", 0.0)]),
        );

        let entries = fill_round_robin(&mut buckets, &[key("A"), key("B")], 2);

        let texts: Vec<&str> = entries.iter().map(|entry| entry.candidate.text.as_str()).collect();
        assert_eq!(texts, vec!["a1", "b1"]);
    }

    #[test]
    fn round_robin_skips_exhausted_buckets() {
        let mut buckets = CriterionBuckets::new();
        buckets.insert(key("A"), VecDeque::from([candidate("A", "a1", 0.0)]));
        buckets.insert(
            key("B"),
            VecDeque::from([
                candidate("B", "b1", 0.0),
                candidate("B", "b2", 0.0),
                candidate("B", "b3", 0.0),
            ]),
        );

        let entries = fill_round_robin(&mut buckets, &[key("B"), key("A")], 10);

        let texts: Vec<&str> = entries.iter().map(|entry| entry.candidate.text.as_str()).collect();
        assert_eq!(texts, vec!["b1", "a1", "b2", "b3"]);
    }

    #[test]
    fn candidate_is_never_consumed_twice() {
        let sampler = sampler(2, 100);
        let criteria = vec![criterion("a", 2), criterion("a", 2)];
        let candidates = vec![
            candidate("a", "one", 0.0),
            candidate("a", "two", 0.0),
            candidate("a", "three", 0.0),
        ];

        let set = sampler
            .sample(&criteria, &candidates, &mut StdRng::seed_from_u64(4))
            .unwrap();

        let texts: HashSet<&str> = set
            .entries
            .iter()
            .map(|entry| entry.candidate.text.as_str())
            .collect();
        assert_eq!(set.len(), 3);
        assert_eq!(texts.len(), 3);
    }

    #[test]
    fn output_is_min_of_target_and_available() {
        let criteria = vec![criterion("a", 3), criterion("b", 3), criterion("c", 3)];
        let candidates = vec![
            candidate("a", "a1", 0.0),
            candidate("a", "a2", 1.0),
            candidate("b", "b1", 2.0),
            candidate("c", "c1", 0.5),
            candidate("c", "c2", 0.5),
        ];

        let short = sampler(3, 10)
            .sample(&criteria, &candidates, &mut StdRng::seed_from_u64(2))
            .unwrap();
        assert_eq!(short.achieved(), 5);
        assert_eq!(short.shortfall(), 5);
        assert!(!short.is_complete());

        let capped = sampler(3, 4)
            .sample(&criteria, &candidates, &mut StdRng::seed_from_u64(2))
            .unwrap();
        assert_eq!(capped.achieved(), 4);
        assert!(capped.is_complete());
    }

    #[test]
    fn balanced_output_draws_one_per_criterion_per_round() {
        let criteria = vec![criterion("a", 2), criterion("b", 2), criterion("c", 2)];
        let candidates: Vec<Candidate> = ["a", "b", "c"]
            .iter()
            .flat_map(|content| (0..4).map(move |n| candidate(content, &format!("{content}{n}"), 0.0)))
            .collect();

        let set = sampler(2, 3)
            .sample(&criteria, &candidates, &mut StdRng::seed_from_u64(12))
            .unwrap();

        let contents: HashSet<&str> = set
            .entries
            .iter()
            .map(|entry| entry.criterion.content.as_str())
            .collect();
        assert_eq!(contents, HashSet::from(["a", "b", "c"]));
    }
}
