//! End-of-run summary rendering

use crate::crawler::RunSummary;
use std::fmt::Write;

/// Failures listed individually before the rest are elided
const MAX_LISTED_FAILURES: usize = 20;

/// Renders a human-readable summary of a finished run
pub fn format_run_summary(summary: &RunSummary) -> String {
    let mut out = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(out, "=== Scrape Run {} ===\n", summary.run_id);
    let _ = writeln!(
        out,
        "Discovery: {} URLs in {} rounds ({})",
        summary.discovered, summary.rounds, summary.termination
    );
    let _ = writeln!(out, "Ingested:  {}", summary.ingested.len());
    let _ = writeln!(out, "Failed:    {}", summary.failures.len());
    let _ = writeln!(out, "Elapsed:   {:.1}s", summary.elapsed.as_secs_f64());

    if !summary.failures.is_empty() {
        let _ = writeln!(out, "\nFailures:");
        for failure in summary.failures.iter().take(MAX_LISTED_FAILURES) {
            let _ = writeln!(
                out,
                "  [{}] {}: {}",
                failure.stage, failure.url, failure.error
            );
        }
        if summary.failures.len() > MAX_LISTED_FAILURES {
            let _ = writeln!(
                out,
                "  ... and {} more",
                summary.failures.len() - MAX_LISTED_FAILURES
            );
        }
    }

    out
}

pub fn print_run_summary(summary: &RunSummary) {
    print!("{}", format_run_summary(summary));
}
