//! Console reports for import results and catalog state

pub mod stats;

pub use stats::{load_statistics, print_statistics, CatalogStatistics};

use crate::import::{BatchSummary, ImportReport};

/// One-line summary of a catalog import
pub fn format_report(report: &ImportReport) -> String {
    let stats = &report.stats;
    format!(
        "{} [{}] run #{}: {} processed, {} new, {} updated, {} skipped, {} errored ({} pages, {} failed)",
        report.catalog,
        report.phase,
        report.run_id,
        stats.cards_processed,
        stats.inserted,
        stats.refreshed,
        stats.skipped,
        stats.card_errors,
        stats.pages_fetched,
        stats.pages_failed
    )
}

/// Prints a catalog import report to stdout
pub fn print_report(report: &ImportReport) {
    println!("{}", format_report(report));
    let sets = &report.sets;
    if sets.new + sets.empty + sets.has_delta + sets.current > 0 {
        println!(
            "  Sets: {} new, {} empty, {} with delta, {} current ({} failed)",
            sets.new, sets.empty, sets.has_delta, sets.current, report.stats.sets_failed
        );
    }
}

/// Prints every catalog of a batch followed by the overall status
pub fn print_batch_summary(summary: &BatchSummary) {
    println!("=== Import Summary ===\n");

    for report in &summary.reports {
        print_report(report);
    }
    for (catalog, error) in &summary.failures {
        println!("{} [failed]: {}", catalog, error);
    }

    let totals = summary.totals();
    println!();
    println!(
        "Total: {} processed, {} new, {} updated, {} errored",
        totals.cards_processed,
        totals.inserted,
        totals.refreshed,
        totals.card_errors
    );
    println!("Status: {}", summary.overall_status());
}
