use std::time::Duration;

use crate::constants::{fetch, panning, quota};
use crate::errors::SamplerError;

/// Retry behavior for a single fetch.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Attempts made before the failure sentinel is returned (at least 1).
    pub max_attempts: usize,
    /// Fixed pause between attempts.
    pub retry_delay: Duration,
    /// Per-request timeout handed to the transport.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: fetch::DEFAULT_MAX_ATTEMPTS,
            retry_delay: fetch::DEFAULT_RETRY_DELAY,
            timeout: fetch::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Reject policies that would never attempt a request.
    pub fn validate(&self) -> Result<(), SamplerError> {
        if self.max_attempts == 0 {
            return Err(SamplerError::Configuration(
                "max_attempts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Two-stage population sampling parameters.
#[derive(Clone, Debug)]
pub struct PanningConfig {
    /// Width (W) of each page window requested from the archive.
    pub split_width: usize,
    /// Number of windows (S) drawn per query.
    pub n_splits: usize,
    /// Records (K) drawn without replacement from each fetched window.
    pub per_split: usize,
    /// Upper bound on concurrently executing fetches.
    pub max_workers: usize,
    /// Upper bound on submitted-but-unresolved fetches. `None` submits all splits at once.
    pub chunk_size: Option<usize>,
}

impl Default for PanningConfig {
    fn default() -> Self {
        Self {
            split_width: panning::DEFAULT_SPLIT_WIDTH,
            n_splits: panning::DEFAULT_N_SPLITS,
            per_split: panning::DEFAULT_PER_SPLIT,
            max_workers: panning::DEFAULT_MAX_WORKERS,
            chunk_size: Some(panning::DEFAULT_CHUNK_SIZE),
        }
    }
}

impl PanningConfig {
    /// Upper bound on records a run can yield (`n_splits * per_split`).
    pub fn requested_records(&self) -> usize {
        self.n_splits.saturating_mul(self.per_split)
    }

    /// Check the configuration against a known population size.
    ///
    /// Called before any split fetch is issued.
    pub fn validate_for(&self, population: usize) -> Result<(), SamplerError> {
        if self.split_width == 0 || self.n_splits == 0 || self.per_split == 0 {
            return Err(SamplerError::Configuration(format!(
                "split_width ({}), n_splits ({}), and per_split ({}) must all be positive",
                self.split_width, self.n_splits, self.per_split
            )));
        }
        if self.max_workers == 0 {
            return Err(SamplerError::Configuration(
                "max_workers must be at least 1".into(),
            ));
        }
        if self.chunk_size == Some(0) {
            return Err(SamplerError::Configuration(
                "chunk_size must be at least 1 when set".into(),
            ));
        }
        let planned = self.split_width.checked_mul(self.n_splits);
        if planned.is_none_or(|planned| planned > population) {
            return Err(SamplerError::PopulationTooSmall {
                split_width: self.split_width,
                n_splits: self.n_splits,
                population,
            });
        }
        Ok(())
    }
}

/// Stratified quota sampling parameters.
#[derive(Clone, Debug)]
pub struct QuotaConfig {
    /// Candidates (n) drawn per criterion.
    pub quota: usize,
    /// Global sample size (N).
    pub target: usize,
    /// Sentences required on each side of a target sentence.
    pub adjacent: usize,
    /// Average character budget per sentence.
    pub chars_per_unit: usize,
    /// Added to each `exp(-score)` weight before normalization.
    pub epsilon: f64,
    /// Seed for the random context used to draw and interleave candidates.
    pub seed: u64,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            quota: quota::DEFAULT_QUOTA,
            target: quota::DEFAULT_TARGET,
            adjacent: quota::DEFAULT_ADJACENT,
            chars_per_unit: quota::DEFAULT_CHARS_PER_UNIT,
            epsilon: quota::WEIGHT_EPSILON,
            seed: quota::DEFAULT_SEED,
        }
    }
}

impl QuotaConfig {
    /// Maximum extract length: `(2 * adjacent + 1) * chars_per_unit`.
    pub fn max_chars(&self) -> usize {
        (2 * self.adjacent + 1).saturating_mul(self.chars_per_unit)
    }

    /// Reject weight settings that cannot produce a valid distribution.
    pub fn validate(&self) -> Result<(), SamplerError> {
        if !self.epsilon.is_finite() || self.epsilon <= 0.0 {
            return Err(SamplerError::Configuration(format!(
                "epsilon must be a positive finite number, got {}",
                self.epsilon
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panning_config_rejects_plan_wider_than_population() {
        let config = PanningConfig {
            split_width: 1000,
            n_splits: 6,
            per_split: 10,
            ..PanningConfig::default()
        };
        let err = config.validate_for(5000).unwrap_err();
        assert!(matches!(
            err,
            SamplerError::PopulationTooSmall {
                split_width: 1000,
                n_splits: 6,
                population: 5000
            }
        ));
        assert!(config.validate_for(6000).is_ok());
    }

    #[test]
    fn panning_config_rejects_zero_parameters() {
        let config = PanningConfig {
            per_split: 0,
            ..PanningConfig::default()
        };
        assert!(matches!(
            config.validate_for(usize::MAX),
            Err(SamplerError::Configuration(_))
        ));
        let config = PanningConfig {
            chunk_size: Some(0),
            ..PanningConfig::default()
        };
        assert!(matches!(
            config.validate_for(usize::MAX),
            Err(SamplerError::Configuration(_))
        ));
    }

    #[test]
    fn panning_config_overflowing_plan_is_too_small() {
        let config = PanningConfig {
            split_width: usize::MAX,
            n_splits: 2,
            ..PanningConfig::default()
        };
        assert!(matches!(
            config.validate_for(usize::MAX),
            Err(SamplerError::PopulationTooSmall { .. })
        ));
    }

    #[test]
    fn quota_config_derives_max_chars_from_adjacency() {
        let config = QuotaConfig {
            adjacent: 2,
            chars_per_unit: 200,
            ..QuotaConfig::default()
        };
        assert_eq!(config.max_chars(), 1000);
        let config = QuotaConfig {
            adjacent: 0,
            ..config
        };
        assert_eq!(config.max_chars(), 200);
    }

    #[test]
    fn retry_policy_requires_an_attempt() {
        let policy = RetryPolicy {
            max_attempts: 0,
            ..RetryPolicy::default()
        };
        assert!(policy.validate().is_err());
        assert!(RetryPolicy::default().validate().is_ok());
    }
}
