//! Console statistics for a finished mirror run

use crate::output::MirrorSummary;

/// Number of failures listed individually before the rest are elided
const MAX_LISTED_FAILURES: usize = 20;

/// Prints the run summary to stdout
pub fn print_summary(summary: &MirrorSummary) {
    println!("=== Mirror Summary ===\n");

    println!("Site: {}", summary.seed_url);
    println!("Output: {}", summary.output_dir.display());
    println!("Max depth: {}", summary.max_depth);
    if let Some(duration) = summary.duration_seconds() {
        println!("Elapsed: {:.1}s", duration);
    }
    if summary.cancelled {
        println!("Status: cancelled (partial mirror)");
    }
    println!();

    println!("Resources:");
    println!("  Fetched: {} ({})", summary.fetched, format_bytes(summary.bytes_downloaded));
    println!("  Skipped (already mirrored): {}", summary.skipped);
    println!("  Failed: {}", summary.failed);
    println!("  Pages mirrored: {}", summary.pages.len());
    println!("  Documents rewritten: {}", summary.documents_rewritten);
    println!();

    if !summary.failures.is_empty() {
        println!("Failures by kind:");
        for (kind, count) in summary.failures_by_kind() {
            println!("  {}: {}", kind, count);
        }
        println!();

        println!("Failed resources:");
        for failure in summary.failures.iter().take(MAX_LISTED_FAILURES) {
            println!("  - {} ({})", failure.url, failure.reason);
        }
        if summary.failures.len() > MAX_LISTED_FAILURES {
            println!("  ... and {} more", summary.failures.len() - MAX_LISTED_FAILURES);
        }
        println!();
    }

    if !summary.degraded_pages.is_empty() {
        println!("Partially parsed pages:");
        for url in &summary.degraded_pages {
            println!("  - {}", url);
        }
        println!();
    }

    println!(
        "Success Rate: {:.1}% ({} / {} resources mirrored)",
        summary.success_rate(),
        summary.fetched + summary.skipped,
        summary.total()
    );
}

/// Formats a byte count for humans
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
