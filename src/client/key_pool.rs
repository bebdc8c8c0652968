//! Rotating pool of upstream API keys
//!
//! The pool is shared by every catalog import in the process. When a key is rate limited the
//! fetcher rotates to the next one; after a quiet cooldown the pool drifts back to the primary
//! key so that backup keys are only spent while the primary is throttled.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Default time after the last rotation before the pool returns to the primary key
pub const DEFAULT_KEY_COOLDOWN: Duration = Duration::from_secs(3600);

#[derive(Debug)]
struct PoolState {
    index: usize,
    last_rotation: Option<Instant>,
}

/// Ordered ring of API keys with a current index
#[derive(Debug)]
pub struct ApiKeyPool {
    keys: Vec<String>,
    cooldown: Duration,
    state: Mutex<PoolState>,
}

impl ApiKeyPool {
    /// Creates a pool over `keys` (order is priority; index 0 is the primary)
    ///
    /// Returns `None` for an empty key list.
    pub fn new(keys: Vec<String>, cooldown: Duration) -> Option<Self> {
        if keys.is_empty() {
            return None;
        }

        Some(Self {
            keys,
            cooldown,
            state: Mutex::new(PoolState {
                index: 0,
                last_rotation: None,
            }),
        })
    }

    /// Number of keys in the pool
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Returns the key at the current index
    pub fn current_key(&self) -> String {
        let state = self.lock();
        self.keys[state.index].clone()
    }

    /// Returns the current index (0 is the primary key)
    pub fn current_index(&self) -> usize {
        self.lock().index
    }

    /// Advances to the next key, wrapping around
    ///
    /// Always returns true: rotation itself never fails. Callers bound how many times they
    /// rotate for a single request.
    pub fn rotate(&self) -> bool {
        self.rotate_at(Instant::now())
    }

    pub fn rotate_at(&self, now: Instant) -> bool {
        let mut state = self.lock();
        state.index = (state.index + 1) % self.keys.len();
        state.last_rotation = Some(now);
        tracing::warn!(
            "Rotated API key to index {} of {}",
            state.index,
            self.keys.len()
        );
        true
    }

    /// Returns to the primary key if the cooldown has elapsed since the last rotation
    ///
    /// Returns true when the pool was reset.
    pub fn maybe_revert_to_primary(&self) -> bool {
        self.maybe_revert_to_primary_at(Instant::now())
    }

    pub fn maybe_revert_to_primary_at(&self, now: Instant) -> bool {
        let mut state = self.lock();
        if state.index == 0 {
            return false;
        }

        let elapsed = match state.last_rotation {
            Some(at) => now.saturating_duration_since(at),
            None => return false,
        };

        if elapsed >= self.cooldown {
            tracing::info!("Key cooldown elapsed, reverting to primary API key");
            state.index = 0;
            true
        } else {
            false
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolState> {
        // The state is two plain fields; a panic elsewhere cannot leave it inconsistent.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
