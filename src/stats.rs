//! Descriptive statistics over measurement samples
//!
//! Samples are per-iteration wall times in microseconds. Percentiles use
//! linear interpolation between the closest ranks.

use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Summary of one measurement run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleStats {
    pub count: usize,
    pub total_us: u64,
    pub mean: f64,
    pub stddev: f64,
    pub min: f64,
    pub max: f64,
    pub median: f64, // P50
    pub p90: f64,
    pub p95: f64,
    pub p99: f64,
}

impl SampleStats {
    /// Summarize `samples_us`; `None` when there are no samples
    pub fn from_samples(samples_us: &[u64]) -> Option<SampleStats> {
        if samples_us.is_empty() {
            return None;
        }

        let count = samples_us.len();
        let total_us: u64 = samples_us.iter().sum();
        let values: Vec<f64> = samples_us.iter().map(|&s| s as f64).collect();
        let mean = values.iter().sum::<f64>() / count as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;

        let mut sorted = values;
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

        Some(SampleStats {
            count,
            total_us,
            mean,
            stddev: variance.sqrt(),
            min: sorted[0],
            max: sorted[count - 1],
            median: calculate_percentile(&sorted, 50.0),
            p90: calculate_percentile(&sorted, 90.0),
            p95: calculate_percentile(&sorted, 95.0),
            p99: calculate_percentile(&sorted, 99.0),
        })
    }

    /// Operations per second implied by the mean sample
    pub fn throughput(&self) -> f64 {
        if self.mean > 0.0 {
            1_000_000.0 / self.mean
        } else {
            0.0
        }
    }
}

/// Calculate percentile from sorted data
fn calculate_percentile(sorted_data: &[f64], percentile: f64) -> f64 {
    if sorted_data.is_empty() {
        return 0.0;
    }
    if sorted_data.len() == 1 {
        return sorted_data[0];
    }

    let index = (percentile / 100.0) * (sorted_data.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;

    if lower == upper {
        sorted_data[lower]
    } else {
        let weight = index - lower as f64;
        sorted_data[lower] * (1.0 - weight) + sorted_data[upper] * weight
    }
}

/// Render the console summary for one run
pub fn format_summary(operation: &str, stats: Option<&SampleStats>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "operation        iters     mean(us)   stddev(us)      p50(us)      p99(us)     ops/s");
    let _ = writeln!(out, "---------------- ----- ------------ ------------ ------------ ------------ ---------");
    match stats {
        Some(s) => {
            let _ = writeln!(
                out,
                "{:<16} {:>5} {:>12.2} {:>12.2} {:>12.2} {:>12.2} {:>9.1}",
                operation,
                s.count,
                s.mean,
                s.stddev,
                s.median,
                s.p99,
                s.throughput()
            );
        }
        None => {
            let _ = writeln!(out, "{:<16} {:>5} (no samples)", operation, 0);
        }
    }
    out
}

/// Print the console summary to stderr
pub fn print_summary(operation: &str, stats: Option<&SampleStats>) {
    eprint!("{}", format_summary(operation, stats));
}
