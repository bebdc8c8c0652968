//! Run counters and batch summaries

use std::fmt;

use crate::catalog::{Classification, SkipReason, UpsertOutcome};
use crate::state::ImportPhase;

/// Counters of one catalog run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunStats {
    /// Pages fetched and parsed successfully (set and card listings)
    pub pages_fetched: u64,
    /// Pages abandoned after retries
    pub pages_failed: u64,
    /// Sets that could not be resolved or lost at least one page
    pub sets_failed: u64,
    /// Cards seen on successful pages
    pub cards_processed: u64,
    pub inserted: u64,
    pub refreshed: u64,
    pub skipped: u64,
    /// Cards whose write failed
    pub card_errors: u64,
}

impl RunStats {
    /// Counts one upsert outcome
    pub fn record(&mut self, outcome: UpsertOutcome) {
        self.cards_processed += 1;
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::PriceRefreshed => self.refreshed += 1,
            UpsertOutcome::Skipped(SkipReason::MissingName | SkipReason::AlreadyStored) => {
                self.skipped += 1
            }
        }
    }

    /// Counts a card whose write failed
    pub fn record_card_error(&mut self) {
        self.cards_processed += 1;
        self.card_errors += 1;
    }

    /// True when any page, set or card failed
    pub fn has_failures(&self) -> bool {
        self.pages_failed > 0 || self.sets_failed > 0 || self.card_errors > 0
    }
}

/// How many upstream sets fell into each class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetCounts {
    pub new: usize,
    pub empty: usize,
    pub has_delta: usize,
    pub current: usize,
}

impl From<&Classification> for SetCounts {
    fn from(c: &Classification) -> Self {
        Self {
            new: c.new.len(),
            empty: c.empty.len(),
            has_delta: c.has_delta.len(),
            current: c.current.len(),
        }
    }
}

/// Outcome of one catalog import
#[derive(Debug, Clone)]
pub struct ImportReport {
    pub catalog: String,
    pub run_id: i64,
    /// `Completed` or `PartiallyFailed`
    pub phase: ImportPhase,
    pub stats: RunStats,
    pub sets: SetCounts,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.phase == ImportPhase::Completed
    }
}

/// Overall status of a multi-catalog batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    NoImports,
    Success,
    PartialSuccess,
    Failed,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NoImports => "NO_IMPORTS",
            Self::Success => "SUCCESS",
            Self::PartialSuccess => "PARTIAL_SUCCESS",
            Self::Failed => "FAILED",
        };
        write!(f, "{}", s)
    }
}

/// Per-catalog results of `import_catalogs`
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<ImportReport>,
    /// Catalogs whose import returned an error: (catalog, message)
    pub failures: Vec<(String, String)>,
}

impl BatchSummary {
    /// SUCCESS when every catalog completed, FAILED when none finished, else PARTIAL_SUCCESS
    pub fn overall_status(&self) -> BatchStatus {
        let finished = self.reports.len();
        if finished == 0 && self.failures.is_empty() {
            return BatchStatus::NoImports;
        }

        let completed = self.reports.iter().filter(|r| r.is_complete()).count();
        if self.failures.is_empty() && completed == finished {
            BatchStatus::Success
        } else if finished > 0 {
            BatchStatus::PartialSuccess
        } else {
            BatchStatus::Failed
        }
    }

    /// Sum of every catalog's counters
    pub fn totals(&self) -> RunStats {
        self.reports.iter().fold(RunStats::default(), |mut acc, r| {
            acc.pages_fetched += r.stats.pages_fetched;
            acc.pages_failed += r.stats.pages_failed;
            acc.sets_failed += r.stats.sets_failed;
            acc.cards_processed += r.stats.cards_processed;
            acc.inserted += r.stats.inserted;
            acc.refreshed += r.stats.refreshed;
            acc.skipped += r.stats.skipped;
            acc.card_errors += r.stats.card_errors;
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(catalog: &str, phase: ImportPhase, inserted: u64) -> ImportReport {
        ImportReport {
            catalog: catalog.to_string(),
            run_id: 1,
            phase,
            stats: RunStats {
                inserted,
                ..RunStats::default()
            },
            sets: SetCounts::default(),
        }
    }

    #[test]
    fn test_record_outcomes() {
        let mut stats = RunStats::default();
        stats.record(UpsertOutcome::Inserted);
        stats.record(UpsertOutcome::PriceRefreshed);
        stats.record(UpsertOutcome::Skipped(SkipReason::AlreadyStored));
        stats.record_card_error();

        assert_eq!(stats.cards_processed, 4);
        assert_eq!(stats.inserted, 1);
        assert_eq!(stats.refreshed, 1);
        assert_eq!(stats.skipped, 1);
        assert!(stats.has_failures());
    }

    #[test]
    fn test_batch_status() {
        assert_eq!(BatchSummary::default().overall_status(), BatchStatus::NoImports);

        let all_good = BatchSummary {
            reports: vec![report("pokemon", ImportPhase::Completed, 3)],
            failures: vec![],
        };
        assert_eq!(all_good.overall_status(), BatchStatus::Success);

        let mixed = BatchSummary {
            reports: vec![report("pokemon", ImportPhase::Completed, 3)],
            failures: vec![("yugioh".into(), "locked".into())],
        };
        assert_eq!(mixed.overall_status(), BatchStatus::PartialSuccess);

        let partial = BatchSummary {
            reports: vec![report("pokemon", ImportPhase::PartiallyFailed, 1)],
            failures: vec![],
        };
        assert_eq!(partial.overall_status(), BatchStatus::PartialSuccess);

        let failed = BatchSummary {
            reports: vec![],
            failures: vec![("pokemon".into(), "boom".into())],
        };
        assert_eq!(failed.overall_status(), BatchStatus::Failed);
        assert_eq!(failed.overall_status().to_string(), "FAILED");
    }

    #[test]
    fn test_totals() {
        let batch = BatchSummary {
            reports: vec![
                report("pokemon", ImportPhase::Completed, 3),
                report("yugioh", ImportPhase::Completed, 2),
            ],
            failures: vec![],
        };
        assert_eq!(batch.totals().inserted, 5);
    }
}
