//! Key Lock Module
//!
//! Striped mutexes serializing writers of the same key.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Number of stripes; distinct keys collide with probability 1/64.
const STRIPES: usize = 64;

// == Key Locks ==
/// A fixed set of mutexes indexed by key hash.
///
/// Two writers of the same key always contend on the same stripe, while
/// writers of different keys usually proceed independently.
#[derive(Debug)]
pub(crate) struct KeyLocks {
    stripes: Vec<Mutex<()>>,
}

impl KeyLocks {
    pub fn new() -> Self {
        Self {
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    // == Lock ==
    /// Blocks until the stripe owning `key` is held.
    pub fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(key)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn stripe_of(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() as usize) % self.stripes.len()
    }
}

impl Default for KeyLocks {
    fn default() -> Self {
        Self::new()
    }
}
