use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, ValueEnum, error::ErrorKind};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::warn;

use crate::archive::{Archive, RowsArchive, RowsArchiveConfig, SruArchive};
use crate::artifacts::{
    read_scored_articles, should_skip, write_record_ids, write_report, write_sample_set,
};
use crate::config::{PanningConfig, QuotaConfig, RetryPolicy};
use crate::constants::archive::DEFAULT_ROWS_ENDPOINT;
use crate::constants::{artifacts, fetch, panning, quota};
use crate::criteria::{build_criteria, compose_queries, queries_from_files};
use crate::data::{Criterion, Query, SampleSet};
use crate::errors::SamplerError;
use crate::extracts::candidates_from_articles;
use crate::fetch::RetryingFetcher;
use crate::heuristics::{
    expected_yield, format_achieved, format_count_with_commas, max_splits, sampling_fraction,
    window_coverage,
};
use crate::metrics::{criterion_counts, criterion_skew};
use crate::panning::{PanningReport, PopulationSampler};
use crate::quota::StratifiedQuotaSampler;
use crate::transport::UreqTransport;
use crate::transport::fs::read_lines;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ArchiveArg {
    Sru,
    Rows,
}

#[derive(Debug, Parser)]
#[command(
    name = "pan_archive",
    disable_help_subcommand = true,
    about = "Two-stage random sampling of record identifiers from a paginated archive",
    long_about = "Count each query's population, draw random page windows, fetch them concurrently with retry, and sample identifiers from every fetched window.",
    after_help = "Queries come from repeated --query values, or from the cartesian product of the lines of each --query-file joined with ' AND '."
)]
struct PanArchiveCli {
    #[arg(long, value_enum, default_value = "sru", help = "Archive adapter")]
    archive: ArchiveArg,
    #[arg(long, value_name = "URL", help = "Archive endpoint override")]
    endpoint: Option<String>,
    #[arg(long, help = "Dataset id for the rows adapter")]
    dataset: Option<String>,
    #[arg(long = "dataset-config", default_value = "default", help = "Dataset config for the rows adapter")]
    dataset_config: String,
    #[arg(long = "dataset-split", default_value = "train", help = "Dataset split for the rows adapter")]
    dataset_split: String,
    #[arg(long = "id-column", help = "Row column used as identifier by the rows adapter")]
    id_column: Option<String>,
    #[arg(long = "query", help = "Query to sample, repeat as needed")]
    queries: Vec<String>,
    #[arg(
        long = "query-file",
        value_name = "PATH",
        help = "Line-separated query components; repeated files are combined"
    )]
    query_files: Vec<PathBuf>,
    #[arg(
        long = "split-width",
        default_value_t = panning::DEFAULT_SPLIT_WIDTH,
        value_parser = parse_positive_usize,
        help = "Records per window; the rows archive serves at most 100"
    )]
    split_width: usize,
    #[arg(long = "n-splits", default_value_t = panning::DEFAULT_N_SPLITS, value_parser = parse_positive_usize)]
    n_splits: usize,
    #[arg(long = "per-split", default_value_t = panning::DEFAULT_PER_SPLIT, value_parser = parse_positive_usize)]
    per_split: usize,
    #[arg(long = "max-workers", default_value_t = panning::DEFAULT_MAX_WORKERS, value_parser = parse_positive_usize)]
    max_workers: usize,
    #[arg(
        long = "chunk-size",
        default_value_t = panning::DEFAULT_CHUNK_SIZE,
        help = "In-flight window fetches per chunk; 0 submits every window at once"
    )]
    chunk_size: usize,
    #[arg(long = "max-attempts", default_value_t = fetch::DEFAULT_MAX_ATTEMPTS, value_parser = parse_positive_usize)]
    max_attempts: usize,
    #[arg(long = "retry-delay-ms", default_value_t = fetch::DEFAULT_RETRY_DELAY.as_millis() as u64)]
    retry_delay_ms: u64,
    #[arg(long = "timeout-secs", default_value_t = fetch::DEFAULT_REQUEST_TIMEOUT.as_secs())]
    timeout_secs: u64,
    #[arg(long, help = "Optional deterministic seed")]
    seed: Option<u64>,
    #[arg(long = "out-dir", default_value = "panning_out")]
    out_dir: PathBuf,
    #[arg(long, help = "Rerun even when the output already exists")]
    overwrite: bool,
    #[arg(long = "require-full", help = "Fail when fewer records than requested were sampled")]
    require_full: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "stratify_extracts",
    disable_help_subcommand = true,
    about = "Quota-stratified, probability-weighted sampling of article extracts",
    long_about = "Cut extracts around query terms in scored articles, draw per-criterion quotas weighted by exp(-score), and interleave criteria round-robin up to the target size.",
    after_help = "Extracts are limited to an average of chars-per-unit characters per sentence."
)]
struct StratifyExtractsCli {
    #[arg(long, value_name = "PATH", help = "Scored articles JSON")]
    data: PathBuf,
    #[arg(long = "queries", value_name = "PATH", help = "Line-separated criterion queries")]
    queries: PathBuf,
    #[arg(long = "spatial", value_name = "PATH", help = "Line-separated spatial distributions")]
    spatial: PathBuf,
    #[arg(long, default_value_t = quota::DEFAULT_ADJACENT, help = "Sentences required on each side of the match")]
    adjacent: usize,
    #[arg(long, default_value_t = quota::DEFAULT_QUOTA, help = "Extracts drawn per criterion")]
    quota: usize,
    #[arg(long, default_value_t = quota::DEFAULT_TARGET, help = "Total extracts to sample")]
    target: usize,
    #[arg(long = "chars-per-unit", default_value_t = quota::DEFAULT_CHARS_PER_UNIT, value_parser = parse_positive_usize)]
    chars_per_unit: usize,
    #[arg(long, default_value_t = quota::DEFAULT_SEED)]
    seed: u64,
    #[arg(long = "out-dir", default_value = "panning_out")]
    out_dir: PathBuf,
    #[arg(long, help = "Rerun even when the output already exists")]
    overwrite: bool,
    #[arg(long = "require-full", help = "Fail when fewer extracts than requested were sampled")]
    require_full: bool,
}

/// Count, plan, fetch, and persist sampled identifiers for every query.
pub fn run_pan<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) =
        parse_cli::<PanArchiveCli, _>(std::iter::once("pan_archive".to_string()).chain(args_iter))?
    else {
        return Ok(());
    };

    let mut queries = cli.queries.clone();
    if !cli.query_files.is_empty() {
        queries.extend(queries_from_files(&cli.query_files)?);
    }
    if queries.is_empty() {
        return Err("no queries given; pass --query or --query-file".into());
    }

    let policy = RetryPolicy {
        max_attempts: cli.max_attempts,
        retry_delay: Duration::from_millis(cli.retry_delay_ms),
        timeout: Duration::from_secs(cli.timeout_secs),
    };
    let config = PanningConfig {
        split_width: cli.split_width,
        n_splits: cli.n_splits,
        per_split: cli.per_split,
        max_workers: cli.max_workers,
        chunk_size: (cli.chunk_size > 0).then_some(cli.chunk_size),
    };
    let fetcher = RetryingFetcher::new(UreqTransport::new(policy.timeout), policy)?;
    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let outcome = match cli.archive {
        ArchiveArg::Sru => {
            let adapter = match &cli.endpoint {
                Some(endpoint) => SruArchive::new(endpoint)?,
                None => SruArchive::default(),
            };
            let sampler = PopulationSampler::new(adapter, fetcher, config.clone());
            pan_queries(&sampler, &queries, &cli.out_dir, cli.overwrite, &mut rng)?
        }
        ArchiveArg::Rows => {
            let dataset = cli
                .dataset
                .clone()
                .ok_or("--dataset is required for the rows archive")?;
            let adapter = RowsArchive::new(RowsArchiveConfig {
                endpoint: cli
                    .endpoint
                    .clone()
                    .unwrap_or_else(|| DEFAULT_ROWS_ENDPOINT.to_string()),
                dataset,
                config: cli.dataset_config.clone(),
                split: cli.dataset_split.clone(),
                id_column: cli.id_column.clone(),
            })?;
            let sampler = PopulationSampler::new(adapter, fetcher, config.clone());
            pan_queries(&sampler, &queries, &cli.out_dir, cli.overwrite, &mut rng)?
        }
    };

    let requested: usize = outcome
        .reports
        .iter()
        .map(|report| report.requested_records)
        .sum();
    let failed_windows: usize = outcome
        .reports
        .iter()
        .map(|report| report.failed_splits)
        .sum();
    println!();
    println!("=== panning summary ===");
    for report in &outcome.reports {
        print_panning_report(report, &config);
    }
    println!(
        "total: {} records written to {} (failed windows: {}, queries skipped: {}, queries failed: {})",
        format_achieved(outcome.written, requested),
        cli.out_dir.display(),
        format_count_with_commas(failed_windows),
        outcome.skipped,
        outcome.failed.len()
    );

    if !outcome.failed.is_empty() {
        for (query, err) in &outcome.failed {
            eprintln!("failed: {query}: {err}");
        }
        return Err(format!(
            "{} of {} queries failed; rerun to retry them, completed queries are skipped",
            outcome.failed.len(),
            queries.len()
        )
        .into());
    }
    if cli.require_full && outcome.written < requested {
        return Err(SamplerError::Shortfall {
            achieved: outcome.written,
            requested,
        }
        .into());
    }
    Ok(())
}

/// Build extracts, draw the stratified sample, and persist the table.
pub fn run_stratify<I>(args_iter: I) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();

    let Some(cli) = parse_cli::<StratifyExtractsCli, _>(
        std::iter::once("stratify_extracts".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let table_path = cli.out_dir.join(artifacts::SAMPLE_TABLE_FILE);
    if should_skip(&table_path, cli.overwrite) {
        println!(
            "{} exists; pass --overwrite to sample again.",
            table_path.display()
        );
        return Ok(());
    }

    let config = QuotaConfig {
        quota: cli.quota,
        target: cli.target,
        adjacent: cli.adjacent,
        chars_per_unit: cli.chars_per_unit,
        seed: cli.seed,
        ..QuotaConfig::default()
    };
    let sampler = StratifiedQuotaSampler::new(config.clone())?;

    println!("loading {}", cli.data.display());
    let articles = read_scored_articles(&cli.data)?;
    let candidates = candidates_from_articles(&articles, config.adjacent);
    let contents = compose_queries(&[read_lines(&cli.queries)?]);
    let spatials = read_lines(&cli.spatial)?;
    let criteria = build_criteria(&contents, &spatials, &config);
    println!(
        "articles: {}  extracts: {}  criteria: {}  max extract chars: {}",
        format_count_with_commas(articles.len()),
        format_count_with_commas(candidates.len()),
        format_count_with_commas(criteria.len()),
        format_count_with_commas(config.max_chars())
    );

    let mut rng = StdRng::seed_from_u64(config.seed);
    let set = sampler.sample(&criteria, &candidates, &mut rng)?;
    let written = write_sample_set(&table_path, &set)?;
    print_sample_summary(&set, &criteria);
    println!("{written} rows written to {}", table_path.display());

    if cli.require_full && !set.is_complete() {
        return Err(SamplerError::Shortfall {
            achieved: set.achieved(),
            requested: set.requested,
        }
        .into());
    }
    Ok(())
}

/// Per-query results of a multi-query panning run.
#[derive(Default)]
struct PanOutcome {
    reports: Vec<PanningReport>,
    written: usize,
    skipped: usize,
    failed: Vec<(Query, SamplerError)>,
}

/// Sample each query and persist its records and report as soon as it ends.
///
/// A query whose id file already exists is skipped unless `overwrite` is
/// set. A query that cannot be sampled is recorded and the run moves on;
/// only a write failure or an unusable window width stops it.
fn pan_queries<A>(
    sampler: &PopulationSampler<A, UreqTransport>,
    queries: &[Query],
    out_dir: &Path,
    overwrite: bool,
    rng: &mut StdRng,
) -> Result<PanOutcome, SamplerError>
where
    A: Archive + 'static,
{
    sampler.check_page_width()?;
    let mut outcome = PanOutcome::default();
    for query in queries {
        let ids_path = query_artifact(out_dir, query, artifacts::RECORD_IDS_FILE);
        if should_skip(&ids_path, overwrite) {
            println!(
                "{} exists; skipping '{query}' (pass --overwrite to sample again).",
                ids_path.display()
            );
            outcome.skipped += 1;
            continue;
        }
        let run = match sampler.sample_query(query, rng) {
            Ok(run) => run,
            Err(err) => {
                warn!(query = %query, error = %err, "[panning:pan] query failed; continuing");
                outcome.failed.push((query.clone(), err));
                continue;
            }
        };
        let (records, report) = run.collect_with_report();
        outcome.written += write_record_ids(&ids_path, &records)?;
        write_report(
            &query_artifact(out_dir, query, artifacts::PANNING_REPORT_FILE),
            &report,
        )?;
        outcome.reports.push(report);
    }
    Ok(outcome)
}

fn query_artifact(out_dir: &Path, query: &str, suffix: &str) -> PathBuf {
    out_dir.join(format!("{}_{suffix}", slug(query)))
}

fn print_panning_report(report: &PanningReport, config: &PanningConfig) {
    println!("query: {}", report.query);
    println!(
        "  population: {}  windows: {} fetched / {} failed / {} planned",
        format_count_with_commas(report.population),
        report.fetched_splits,
        report.failed_splits,
        report.requested_splits
    );
    println!(
        "  records: {}  (expected from fetched windows: {})",
        format_achieved(report.yielded_records, report.requested_records),
        format_count_with_commas(expected_yield(config, report.failed_splits))
    );
    println!(
        "  window coverage: {:.2}%  sampling fraction: {:.4}%  max windows at width {}: {}",
        window_coverage(config, report.population) * 100.0,
        sampling_fraction(config, report.population) * 100.0,
        config.split_width,
        format_count_with_commas(max_splits(report.population, config.split_width))
    );
}

fn print_sample_summary(set: &SampleSet, criteria: &[Criterion]) {
    println!();
    println!("=== sample summary ===");
    println!("sampled: {}", format_achieved(set.achieved(), set.requested));
    if !set.is_complete() {
        eprintln!(
            "warning: only {} of {} requested extracts were available",
            set.achieved(),
            set.requested
        );
    }
    if let Some(skew) = criterion_skew(criteria, &criterion_counts(set)) {
        println!(
            "criteria: {}  empty: {}  min/max per criterion: {}/{}  max share: {:.2}%  ratio: {:.2}",
            skew.criteria,
            skew.empty,
            skew.min,
            skew.max,
            skew.max_share * 100.0,
            skew.ratio
        );
    }
}

/// File-name-safe rendering of a query.
fn slug(query: &str) -> String {
    let mut out = String::with_capacity(query.len());
    for ch in query.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
        } else if !out.ends_with('_') {
            out.push('_');
        }
    }
    out.trim_matches('_').to_string()
}

fn parse_positive_usize(raw: &str) -> Result<usize, String> {
    let parsed = raw
        .parse::<usize>()
        .map_err(|_| format!("Could not parse '{raw}' as a positive integer"))?;
    if parsed == 0 {
        return Err("value must be greater than zero".to_string());
    }
    Ok(parsed)
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::fs;
    use std::io::{BufRead, BufReader, Write};
    use std::net::TcpListener;
    use std::thread;
    use tempfile::tempdir;

    /// Local SRU endpoint over records `urn:1..=population`; queries
    /// containing `broken` answer 500.
    fn spawn_sru_server(population: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { continue };
                let mut reader = BufReader::new(stream.try_clone().unwrap());
                let mut request_line = String::new();
                reader.read_line(&mut request_line).unwrap();
                let mut header = String::new();
                while reader.read_line(&mut header).unwrap_or(0) > 2 {
                    header.clear();
                }
                let path = request_line.split_whitespace().nth(1).unwrap_or("/");
                let url = url::Url::parse(&format!("http://local{path}")).unwrap();
                let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
                let (status, body) = if params["query"].contains("broken") {
                    ("500 Internal Server Error", "down".to_string())
                } else {
                    let start: usize = params["startRecord"].parse().unwrap();
                    let maximum: usize = params["maximumRecords"].parse().unwrap();
                    let records: String = (start..(start + maximum).min(population + 1))
                        .map(|n| {
                            format!(
                                "<srw:record><srw:recordData><dc:identifier>urn:{n}</dc:identifier></srw:recordData></srw:record>"
                            )
                        })
                        .collect();
                    (
                        "200 OK",
                        format!(
                            "<srw:searchRetrieveResponse><srw:numberOfRecords>{population}</srw:numberOfRecords><srw:records>{records}</srw:records></srw:searchRetrieveResponse>"
                        ),
                    )
                };
                let _ = write!(
                    stream,
                    "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.flush();
            }
        });
        format!("http://{addr}/sru")
    }

    fn args(raw: &[&str]) -> impl Iterator<Item = String> {
        raw.iter()
            .map(|arg| arg.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn slug_is_file_name_safe() {
        assert_eq!(
            slug("Berber AND date within \"1890-01-01 1899-12-31\""),
            "berber_and_date_within_1890_01_01_1899_12_31"
        );
    }

    #[test]
    fn help_is_not_an_error() {
        assert!(run_pan(args(&["--help"])).is_ok());
        assert!(run_stratify(args(&["--help"])).is_ok());
    }

    #[test]
    fn zero_split_width_is_rejected_by_the_parser() {
        let parsed = parse_cli::<PanArchiveCli, _>(["pan_archive", "--split-width", "0"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn pan_without_queries_is_an_error() {
        let temp = tempdir().unwrap();
        let out = temp.path().to_string_lossy().to_string();
        assert!(run_pan(args(&["--out-dir", &out])).is_err());
    }

    #[test]
    fn pan_skips_existing_output() {
        let temp = tempdir().unwrap();
        let existing = temp.path().join(format!("x_{}", artifacts::RECORD_IDS_FILE));
        fs::write(&existing, "urn:1\n").unwrap();
        let out = temp.path().to_string_lossy().to_string();

        assert!(run_pan(args(&["--out-dir", &out, "--query", "x"])).is_ok());
        assert_eq!(fs::read_to_string(&existing).unwrap(), "urn:1\n");
    }

    #[test]
    fn failed_query_keeps_completed_queries_on_disk() {
        let endpoint = spawn_sru_server(50);
        let temp = tempdir().unwrap();
        let out = temp.path().join("out");
        let run = |queries: &[&str]| {
            let mut raw = vec![
                "--endpoint".to_string(),
                endpoint.clone(),
                "--out-dir".to_string(),
                out.to_string_lossy().to_string(),
                "--split-width".to_string(),
                "10".to_string(),
                "--n-splits".to_string(),
                "2".to_string(),
                "--per-split".to_string(),
                "3".to_string(),
                "--max-workers".to_string(),
                "2".to_string(),
                "--max-attempts".to_string(),
                "1".to_string(),
                "--retry-delay-ms".to_string(),
                "0".to_string(),
                "--seed".to_string(),
                "5".to_string(),
            ];
            for query in queries {
                raw.push("--query".to_string());
                raw.push(query.to_string());
            }
            run_pan(raw.into_iter())
        };

        assert!(run(&["good", "broken"]).is_err());

        let good_ids = out.join(format!("good_{}", artifacts::RECORD_IDS_FILE));
        let ids = fs::read_to_string(&good_ids).unwrap();
        assert_eq!(ids.lines().count(), 6);
        assert!(ids.lines().all(|id| id.starts_with("urn:")));
        assert!(out.join(format!("good_{}", artifacts::PANNING_REPORT_FILE)).exists());
        assert!(!out.join(format!("broken_{}", artifacts::RECORD_IDS_FILE)).exists());

        // Completed queries are skipped on rerun and keep their ids.
        assert!(run(&["good"]).is_ok());
        assert_eq!(fs::read_to_string(&good_ids).unwrap(), ids);
    }

    #[test]
    fn rows_window_wider_than_page_limit_is_rejected() {
        let temp = tempdir().unwrap();
        let out = temp.path().to_string_lossy().to_string();

        let result = run_pan(args(&[
            "--archive",
            "rows",
            "--dataset",
            "org/news",
            "--endpoint",
            "http://127.0.0.1:9",
            "--split-width",
            "1000",
            "--query",
            "x",
            "--out-dir",
            &out,
        ]));

        let err = result.unwrap_err();
        assert!(err.to_string().contains("page limit"), "{err}");
    }

    #[test]
    fn stratify_writes_table_and_enforces_require_full() {
        let temp = tempdir().unwrap();
        let data = temp.path().join("scored.json");
        let queries = temp.path().join("queries.txt");
        let spatial = temp.path().join("spatial.txt");
        fs::write(
            &data,
            r#"[
                ["u1", {"matching_queries": ["turk AND type=artikel"], "kb_oai_metadata": {"spatial_distribution": "Landelijk"}},
                 {"text": {"s": ["een", "de turk", "drie"], "neg_log_probability": [1.0, 2.0, 3.0]}}],
                ["u2", {"matching_queries": ["moor AND type=artikel"], "kb_oai_metadata": {"spatial_distribution": "Landelijk"}},
                 {"text": {"s": ["een", "de moor", "drie"], "neg_log_probability": [1.0, 2.0, 3.0]}}]
            ]"#,
        )
        .unwrap();
        fs::write(&queries, "turk AND type=artikel\nmoor AND type=artikel\n").unwrap();
        fs::write(&spatial, "Landelijk\n").unwrap();
        let out = temp.path().join("out");
        let base = [
            "--data".to_string(),
            data.to_string_lossy().to_string(),
            "--queries".to_string(),
            queries.to_string_lossy().to_string(),
            "--spatial".to_string(),
            spatial.to_string_lossy().to_string(),
            "--adjacent".to_string(),
            "1".to_string(),
            "--out-dir".to_string(),
            out.to_string_lossy().to_string(),
        ];

        let full = base
            .iter()
            .cloned()
            .chain(["--target".to_string(), "2".to_string()]);
        run_stratify(full).unwrap();
        let table = fs::read_to_string(out.join(artifacts::SAMPLE_TABLE_FILE)).unwrap();
        let rows: Vec<serde_json::Value> = serde_json::from_str(&table).unwrap();
        assert_eq!(rows.len(), 2);

        let short = base.iter().cloned().chain(
            ["--target", "5", "--overwrite", "--require-full"]
                .iter()
                .map(|arg| arg.to_string()),
        );
        assert!(run_stratify(short).is_err());
    }
}
