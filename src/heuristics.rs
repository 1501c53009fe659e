use crate::config::PanningConfig;
use crate::panning::candidate_offsets;

/// Records a panning run yields if `failed_splits` windows are dropped and
/// every other window holds at least `per_split` distinct identifiers.
pub fn expected_yield(config: &PanningConfig, failed_splits: usize) -> usize {
    config
        .n_splits
        .saturating_sub(failed_splits)
        .saturating_mul(config.per_split)
}

/// Share of the population covered by the planned windows.
pub fn window_coverage(config: &PanningConfig, population: usize) -> f64 {
    if population == 0 {
        return 0.0;
    }
    let covered = config.split_width.saturating_mul(config.n_splits).min(population);
    covered as f64 / population as f64
}

/// Share of the population the requested records represent.
pub fn sampling_fraction(config: &PanningConfig, population: usize) -> f64 {
    if population == 0 {
        return 0.0;
    }
    config.requested_records().min(population) as f64 / population as f64
}

/// Largest `n_splits` the population admits for `split_width`.
pub fn max_splits(population: usize, split_width: usize) -> usize {
    if split_width == 0 {
        return 0;
    }
    candidate_offsets(population, split_width).min(population / split_width)
}

/// Render `value` with thousands separators, e.g. `1,234,567`.
pub fn format_count_with_commas(value: usize) -> String {
    let raw = value.to_string();
    let mut grouped_reversed = String::with_capacity(raw.len() + (raw.len() / 3));
    for (idx, ch) in raw.chars().rev().enumerate() {
        if idx > 0 && idx % 3 == 0 {
            grouped_reversed.push(',');
        }
        grouped_reversed.push(ch);
    }
    grouped_reversed.chars().rev().collect()
}

/// Render an achieved count against the requested one, with a percentage
/// when anything was requested.
pub fn format_achieved(achieved: usize, requested: usize) -> String {
    if requested == 0 {
        return format_count_with_commas(achieved);
    }
    let percent = achieved as f64 / requested as f64 * 100.0;
    format!(
        "{} / {} ({percent:.1}%)",
        format_count_with_commas(achieved),
        format_count_with_commas(requested)
    )
}
