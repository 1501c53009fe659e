//! Two-stage random sampling over a population reachable only by paging.
//!
//! Stage 1 draws `n_splits` page-aligned windows without replacement from the
//! offsets `1, 1 + W, 1 + 2W, ...` below the population size. Stage 2 fetches
//! those windows through the chunked dispatcher and draws up to `per_split`
//! distinct identifiers from each fetched page. Windows whose fetch fails are
//! counted and dropped; nothing is retried or replaced at this layer.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::archive::Archive;
use crate::config::PanningConfig;
use crate::constants::panning::FIRST_OFFSET;
use crate::data::{Query, Record, RecordId, Split};
use crate::dispatch::{Dispatch, DispatchCounters, dispatch};
use crate::errors::SamplerError;
use crate::fetch::{FetchResult, RetryingFetcher, Transport};

type PageDispatch = Dispatch<std::vec::IntoIter<Split>, FetchResult<Vec<RecordId>>>;

/// Number of candidate window offsets `{1, 1 + W, ...} ∩ [1, population)`.
pub fn candidate_offsets(population: usize, split_width: usize) -> usize {
    if split_width == 0 || population <= FIRST_OFFSET {
        return 0;
    }
    (population - FIRST_OFFSET - 1) / split_width + 1
}

/// Stage 1: choose `n_splits` distinct windows and fix a seed for each.
///
/// Seeds are drawn here, in plan order, so the records later drawn from a
/// window do not depend on the order in which fetches complete.
pub fn plan_splits<R: Rng>(
    query: &str,
    population: usize,
    config: &PanningConfig,
    rng: &mut R,
) -> Result<Vec<Split>, SamplerError> {
    config.validate_for(population)?;
    let offsets = candidate_offsets(population, config.split_width);
    if offsets < config.n_splits {
        return Err(SamplerError::PopulationTooSmall {
            split_width: config.split_width,
            n_splits: config.n_splits,
            population,
        });
    }
    let chosen = index::sample(rng, offsets, config.n_splits);
    Ok(chosen
        .into_iter()
        .map(|slot| Split {
            query: query.to_string(),
            start: FIRST_OFFSET + slot * config.split_width,
            width: config.split_width,
            seed: rng.random(),
        })
        .collect())
}

/// Draw `min(per_split, distinct ids)` identifiers from one fetched page.
///
/// Duplicate identifiers on a page are collapsed first, so the draw never
/// yields the same record twice.
pub fn draw_from_page(split: &Split, page: Vec<RecordId>, per_split: usize) -> Vec<Record> {
    let distinct: IndexSet<RecordId> = page.into_iter().collect();
    let amount = per_split.min(distinct.len());
    let mut rng = StdRng::seed_from_u64(split.seed);
    let mut picked = index::sample(&mut rng, distinct.len(), amount).into_vec();
    picked.sort_unstable();
    picked
        .into_iter()
        .filter_map(|idx| distinct.get_index(idx).cloned())
        .map(|id| Record {
            id,
            split_start: split.start,
        })
        .collect()
}

/// Outcome counts of one panning run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PanningReport {
    /// Query whose population was sampled.
    pub query: Query,
    /// Population size reported by the count query.
    pub population: usize,
    /// Windows planned in stage 1.
    pub requested_splits: usize,
    /// Windows whose page was fetched and parsed.
    pub fetched_splits: usize,
    /// Windows dropped after exhausting retries.
    pub failed_splits: usize,
    /// Upper bound on yielded records (`n_splits * per_split`).
    pub requested_records: usize,
    /// Records yielded so far.
    pub yielded_records: usize,
    /// When dispatch started.
    pub started_at: DateTime<Utc>,
    /// When the last window resolved; `None` while the run is in progress.
    pub finished_at: Option<DateTime<Utc>>,
}

impl PanningReport {
    /// Records missing relative to the requested count.
    pub fn shortfall(&self) -> usize {
        self.requested_records.saturating_sub(self.yielded_records)
    }

    /// Windows whose outcome has been observed.
    pub fn resolved_splits(&self) -> usize {
        self.fetched_splits + self.failed_splits
    }
}

/// Lazy, unordered stream of records produced by fetching planned windows.
///
/// Records become available as their window's fetch completes. The report
/// is updated as windows resolve and is final once the iterator is exhausted.
pub struct PanningRun {
    pages: PageDispatch,
    per_split: usize,
    buffered: VecDeque<Record>,
    report: PanningReport,
}

impl PanningRun {
    /// Counts observed so far.
    pub fn report(&self) -> &PanningReport {
        &self.report
    }

    /// Dispatcher counters for the underlying page fetches.
    pub fn dispatch_counters(&self) -> DispatchCounters {
        self.pages.counters()
    }

    /// Drain the run, returning every record and the final report.
    pub fn collect_with_report(mut self) -> (Vec<Record>, PanningReport) {
        let records = self.by_ref().collect();
        (records, self.report)
    }

    fn absorb(&mut self, split: Split, outcome: Result<FetchResult<Vec<RecordId>>, SamplerError>) {
        match outcome {
            Ok(FetchResult::Fetched(page)) => {
                let page_len = page.len();
                let records = draw_from_page(&split, page, self.per_split);
                debug!(
                    split = %split,
                    page_len,
                    drawn = records.len(),
                    "[panning:pan] split fetched"
                );
                self.report.fetched_splits += 1;
                self.buffered.extend(records);
            }
            Ok(FetchResult::Failed(failure)) => {
                warn!(
                    split = %split,
                    attempts = failure.attempts,
                    error = %failure.last_error,
                    "[panning:pan] split dropped"
                );
                self.report.failed_splits += 1;
            }
            Err(err) => {
                warn!(split = %split, error = %err, "[panning:pan] split worker failed");
                self.report.failed_splits += 1;
            }
        }
    }

    fn finish(&mut self) {
        if self.report.finished_at.is_some() {
            return;
        }
        self.report.finished_at = Some(Utc::now());
        info!(
            query = %self.report.query,
            fetched = self.report.fetched_splits,
            failed = self.report.failed_splits,
            yielded = self.report.yielded_records,
            requested = self.report.requested_records,
            "[panning:pan] run finished"
        );
    }
}

impl Iterator for PanningRun {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            if let Some(record) = self.buffered.pop_front() {
                self.report.yielded_records += 1;
                return Some(record);
            }
            match self.pages.next() {
                Some((split, outcome)) => self.absorb(split, outcome),
                None => {
                    self.finish();
                    return None;
                }
            }
        }
    }
}

/// Samples records from an archive query using two-stage panning.
pub struct PopulationSampler<A, T>
where
    A: Archive + 'static,
    T: Transport + 'static,
{
    archive: Arc<A>,
    fetcher: Arc<RetryingFetcher<T>>,
    config: PanningConfig,
}

impl<A, T> PopulationSampler<A, T>
where
    A: Archive + 'static,
    T: Transport + 'static,
{
    /// Create a sampler over `archive`, fetching through `fetcher`.
    pub fn new(archive: A, fetcher: RetryingFetcher<T>, config: PanningConfig) -> Self {
        Self {
            archive: Arc::new(archive),
            fetcher: Arc::new(fetcher),
            config,
        }
    }

    /// Active sampling parameters.
    pub fn config(&self) -> &PanningConfig {
        &self.config
    }

    /// Archive this sampler reads from.
    pub fn archive(&self) -> &A {
        &self.archive
    }

    /// Ask the archive how many records match `query`.
    ///
    /// Unlike page fetches this is fatal on failure: without a population
    /// size the window plan cannot be checked.
    pub fn population(&self, query: &str) -> Result<usize, SamplerError> {
        let url = self.archive.count_url(query);
        match self
            .fetcher
            .fetch_parsed(&url, |body| self.archive.parse_count(body))
        {
            FetchResult::Fetched(count) => {
                info!(query, population = count, "[panning:pan] population counted");
                Ok(count)
            }
            FetchResult::Failed(failure) => Err(SamplerError::ArchiveUnavailable {
                archive: self.archive.id().to_string(),
                reason: format!(
                    "count query failed after {} attempts: {}",
                    failure.attempts, failure.last_error
                ),
            }),
        }
    }

    /// Refuse windows wider than the archive serves in one page.
    ///
    /// A wider window would be truncated or rejected by the endpoint, so the
    /// tail of every window could never be sampled.
    pub fn check_page_width(&self) -> Result<(), SamplerError> {
        match self.archive.max_page_width() {
            Some(max) if self.config.split_width > max => {
                Err(SamplerError::Configuration(format!(
                    "split_width {} exceeds the {max}-record page limit of archive '{}'",
                    self.config.split_width,
                    self.archive.id()
                )))
            }
            _ => Ok(()),
        }
    }

    /// Stage 1 for this sampler's configuration.
    pub fn plan_splits<R: Rng>(
        &self,
        query: &str,
        population: usize,
        rng: &mut R,
    ) -> Result<Vec<Split>, SamplerError> {
        plan_splits(query, population, &self.config, rng)
    }

    /// Plan windows over a known population and start fetching them.
    pub fn sample<R: Rng>(
        &self,
        query: &str,
        population: usize,
        rng: &mut R,
    ) -> Result<PanningRun, SamplerError> {
        self.check_page_width()?;
        let splits = self.plan_splits(query, population, rng)?;
        info!(
            query,
            population,
            splits = splits.len(),
            split_width = self.config.split_width,
            per_split = self.config.per_split,
            "[panning:pan] windows planned"
        );
        self.run_splits(query, population, splits)
    }

    /// Count the population of `query`, then [`sample`](Self::sample) it.
    pub fn sample_query<R: Rng>(
        &self,
        query: &str,
        rng: &mut R,
    ) -> Result<PanningRun, SamplerError> {
        self.check_page_width()?;
        let population = self.population(query)?;
        self.sample(query, population, rng)
    }

    /// Stage 2 over an already planned set of windows.
    pub fn run_splits(
        &self,
        query: &str,
        population: usize,
        splits: Vec<Split>,
    ) -> Result<PanningRun, SamplerError> {
        let requested_splits = splits.len();
        let archive = Arc::clone(&self.archive);
        let fetcher = Arc::clone(&self.fetcher);
        let worker = move |split: &Split| {
            let url = archive.page_url(split);
            fetcher.fetch_parsed(&url, |body| archive.parse_page(body))
        };
        let pages = dispatch(
            splits,
            worker,
            self.config.max_workers,
            self.config.chunk_size,
        )?;
        Ok(PanningRun {
            pages,
            per_split: self.config.per_split,
            buffered: VecDeque::new(),
            report: PanningReport {
                query: query.to_string(),
                population,
                requested_splits,
                fetched_splits: 0,
                failed_splits: 0,
                requested_records: requested_splits.saturating_mul(self.config.per_split),
                yielded_records: 0,
                started_at: Utc::now(),
                finished_at: None,
            },
        })
    }
}
