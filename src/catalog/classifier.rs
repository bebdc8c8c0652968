//! Decides which upstream sets need work
//!
//! | Class | Condition | Work |
//! |-------|-----------|------|
//! | New | set code not stored locally | full fetch |
//! | Empty | stored, no cards | full fetch |
//! | HasDelta | declared count differs from stored keys | delta fetch |
//! | Current | everything else | none |
//!
//! A declared count of zero (or none at all) with cards already stored is treated as
//! current: upstream simply does not report counts for that set.

use std::collections::HashMap;

use super::model::{SetInventory, SetMetadata};

/// Classification of one upstream set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetClass {
    New,
    Empty,
    HasDelta,
    Current,
}

/// Upstream sets partitioned by class, in upstream order
#[derive(Debug, Clone, Default)]
pub struct Classification {
    pub new: Vec<SetMetadata>,
    pub empty: Vec<SetMetadata>,
    pub has_delta: Vec<SetMetadata>,
    pub current: Vec<SetMetadata>,
}

impl Classification {
    /// Sets that get a full fetch: NEW first, then EMPTY
    pub fn full_queue(&self) -> impl Iterator<Item = &SetMetadata> {
        self.new.iter().chain(self.empty.iter())
    }

    pub fn total(&self) -> usize {
        self.new.len() + self.empty.len() + self.has_delta.len() + self.current.len()
    }

    /// True when nothing needs fetching
    pub fn is_idle(&self) -> bool {
        self.new.is_empty() && self.empty.is_empty() && self.has_delta.is_empty()
    }

    /// Makes sure an interrupted set is walked again
    ///
    /// A CURRENT set moves to the delta queue; sets already queued stay where they are.
    /// Returns the class the set is queued under, or `None` when upstream no longer lists it.
    pub fn requeue(&mut self, set_code: &str) -> Option<SetClass> {
        let queued = [
            (&self.new, SetClass::New),
            (&self.empty, SetClass::Empty),
            (&self.has_delta, SetClass::HasDelta),
        ];
        for (queue, class) in queued {
            if queue.iter().any(|s| s.set_code == set_code) {
                return Some(class);
            }
        }

        let index = self.current.iter().position(|s| s.set_code == set_code)?;
        let set = self.current.remove(index);
        self.has_delta.push(set);
        Some(SetClass::HasDelta)
    }
}

/// Classifies one upstream set against its local inventory row
///
/// The upstream declared count wins over the stored one so that growth is seen even for
/// sets whose metadata is frozen.
pub fn classify_set(upstream: &SetMetadata, local: Option<&SetInventory>) -> SetClass {
    let Some(local) = local else {
        return SetClass::New;
    };

    if local.stored_cards == 0 {
        return SetClass::Empty;
    }

    match upstream.declared_count.or(local.declared_card_count) {
        None | Some(0) => SetClass::Current,
        Some(declared) if declared != local.stored_cards => SetClass::HasDelta,
        Some(_) => SetClass::Current,
    }
}

/// Partitions `upstream` sets against the local inventory
pub fn classify(upstream: &[SetMetadata], inventory: &HashMap<String, SetInventory>) -> Classification {
    let mut result = Classification::default();

    for set in upstream {
        let bucket = match classify_set(set, inventory.get(&set.set_code)) {
            SetClass::New => &mut result.new,
            SetClass::Empty => &mut result.empty,
            SetClass::HasDelta => &mut result.has_delta,
            SetClass::Current => &mut result.current,
        };
        bucket.push(set.clone());
    }

    tracing::debug!(
        "Classified {} sets: {} new, {} empty, {} with delta, {} current",
        result.total(),
        result.new.len(),
        result.empty.len(),
        result.has_delta.len(),
        result.current.len()
    );

    result
}
