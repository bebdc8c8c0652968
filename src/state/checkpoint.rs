//! Resumable import position of a catalog

use chrono::{DateTime, Utc};

/// One checkpoint per catalog
///
/// The position is "the next offset to request" inside `set_code`. In catalog-wide mode
/// `set_code` stays `None` and the offset walks the whole game listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportCheckpoint {
    pub catalog: String,
    pub set_code: Option<String>,
    pub last_offset: u32,
    pub pages_processed: u64,
    pub is_complete: bool,
    pub last_updated: Option<DateTime<Utc>>,
    pub last_check_date: Option<DateTime<Utc>>,
}

impl ImportCheckpoint {
    pub fn new(catalog: &str) -> Self {
        Self {
            catalog: catalog.to_string(),
            set_code: None,
            last_offset: 0,
            pages_processed: 0,
            is_complete: false,
            last_updated: None,
            last_check_date: None,
        }
    }

    /// Marks a run as started; the position is kept so it can be resumed
    pub fn begin(&mut self, now: DateTime<Utc>) {
        self.is_complete = false;
        self.last_check_date = Some(now);
    }

    /// True when the stored position is inside `set_code`
    pub fn points_at(&self, set_code: &str) -> bool {
        self.set_code.as_deref() == Some(set_code)
    }

    /// Offset a walk over `set_code` should start from
    pub fn resume_offset(&self, set_code: &str) -> u32 {
        if self.points_at(set_code) {
            self.last_offset
        } else {
            0
        }
    }

    /// Records a fully upserted page; `next_offset` is where the walk continues
    pub fn record_page(&mut self, set_code: Option<&str>, next_offset: u32, now: DateTime<Utc>) {
        self.set_code = set_code.map(str::to_string);
        self.last_offset = next_offset;
        self.pages_processed += 1;
        self.last_updated = Some(now);
    }

    /// Marks the catalog complete
    ///
    /// `keep_position` leaves the offset in place for catalog-wide probing of new data.
    pub fn mark_complete(&mut self, keep_position: bool, now: DateTime<Utc>) {
        self.is_complete = true;
        if !keep_position {
            self.clear_position();
        }
        self.last_updated = Some(now);
    }

    /// Forgets the set and offset
    pub fn clear_position(&mut self) {
        self.set_code = None;
        self.last_offset = 0;
    }
}
