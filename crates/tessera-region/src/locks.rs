//! A fixed array of coarse locks that serializes store I/O per bucket.
//!
//! The lock count stays constant no matter how large the world grows. Two
//! coordinates that hash to the same bucket simply contend.

use std::hash::{Hash, Hasher};
use std::sync::{Mutex, MutexGuard, PoisonError};

use rustc_hash::FxHasher;

pub struct BucketLocks {
    buckets: Box<[Mutex<()>]>,
}

impl BucketLocks {
    /// Creates `count` buckets (at least one).
    pub fn new(count: usize) -> Self {
        let buckets = (0..count.max(1)).map(|_| Mutex::new(())).collect();
        Self { buckets }
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Bucket index for `key`.
    pub fn bucket_of<K: Hash + ?Sized>(&self, key: &K) -> usize {
        let mut hasher = FxHasher::default();
        key.hash(&mut hasher);
        (hasher.finish() % self.buckets.len() as u64) as usize
    }

    /// Locks the bucket owning `key`.
    ///
    /// A worker that panicked while holding a bucket leaves no state behind
    /// the lock, so poisoning is ignored.
    pub fn lock<K: Hash + ?Sized>(&self, key: &K) -> MutexGuard<'_, ()> {
        self.buckets[self.bucket_of(key)]
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
