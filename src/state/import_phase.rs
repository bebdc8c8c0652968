/// Phase definitions for a single catalog import run
///
/// A run moves `Idle → Classifying → FullImporting → DeltaImporting` and ends in
/// `Completed` or `PartiallyFailed`. Catalog-wide runs have no delta phase. `Aborted` is
/// reserved for runs that could not classify at all.
use std::fmt;

/// Represents where a catalog run is in its pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImportPhase {
    // ===== Active States =====
    /// Run created but no work started
    Idle,

    /// Loading upstream sets and local inventory, deciding what to fetch
    Classifying,

    /// Draining NEW and EMPTY sets with full pagination
    FullImporting,

    /// Draining HAS_DELTA sets, skipping cards already stored
    DeltaImporting,

    // ===== Terminal States =====
    /// Every queued set and page was processed without error
    Completed,

    /// Run finished but at least one page or set failed
    PartiallyFailed,

    /// Run stopped before importing (local inventory unreadable)
    Aborted,
}

impl ImportPhase {
    /// Returns true if the run has finished
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::PartiallyFailed | Self::Aborted)
    }

    /// Returns true if the run is still in progress
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    /// Checks whether moving from `self` to `next` follows the pipeline
    pub fn can_transition_to(&self, next: ImportPhase) -> bool {
        use ImportPhase::*;
        match (self, next) {
            (Idle, Classifying) => true,
            (Classifying, FullImporting) | (Classifying, Aborted) => true,
            (FullImporting, DeltaImporting) => true,
            (FullImporting, Completed) | (FullImporting, PartiallyFailed) => true,
            (DeltaImporting, Completed) | (DeltaImporting, PartiallyFailed) => true,
            (Classifying, Completed) | (Classifying, PartiallyFailed) => true,
            _ => false,
        }
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Classifying => "classifying",
            Self::FullImporting => "full_importing",
            Self::DeltaImporting => "delta_importing",
            Self::Completed => "completed",
            Self::PartiallyFailed => "partially_failed",
            Self::Aborted => "aborted",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "classifying" => Some(Self::Classifying),
            "full_importing" => Some(Self::FullImporting),
            "delta_importing" => Some(Self::DeltaImporting),
            "completed" => Some(Self::Completed),
            "partially_failed" => Some(Self::PartiallyFailed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
