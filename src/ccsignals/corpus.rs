use moka::sync::Cache;
use std::sync::Arc;
use tracing::debug;

use super::levenshtein::normalized_edit_distance_capped;
use super::simhash::{Fingerprint, SimHasher};
use super::types::{CcSignal, ContentMatch};

pub const DEFAULT_MAX_HAMMING: u32 = 5;
pub const DEFAULT_MAX_EDIT_DISTANCE: f64 = 0.30;
/// Entries kept before the least recently used are evicted
pub const DEFAULT_CORPUS_CAPACITY: u64 = 10_000;

struct CorpusEntry {
    owner_id: String,
    signal: CcSignal,
    is_public: bool,
    fingerprint: Fingerprint,
    content: String,
}

/// Known content with its owner and CC signal.
///
/// Lookups screen every entry by fingerprint Hamming distance first and only
/// run the edit distance on the few candidates that pass. An owner's
/// content is stored once per fingerprint, and the corpus is bounded.
pub struct FingerprintCorpus {
    hasher: SimHasher,
    max_hamming: u32,
    max_edit_distance: f64,
    entries: Cache<String, Arc<CorpusEntry>>,
}

impl FingerprintCorpus {
    pub fn new(hasher: SimHasher) -> Self {
        Self::with_thresholds(hasher, DEFAULT_MAX_HAMMING, DEFAULT_MAX_EDIT_DISTANCE)
    }

    pub fn with_thresholds(hasher: SimHasher, max_hamming: u32, max_edit_distance: f64) -> Self {
        Self {
            hasher,
            max_hamming,
            max_edit_distance,
            entries: Cache::new(DEFAULT_CORPUS_CAPACITY),
        }
    }

    pub fn with_capacity(mut self, capacity: u64) -> Self {
        self.entries = Cache::new(capacity);
        self
    }

    /// Register content. Returns false for empty (zero-fingerprint) content
    /// and for content this owner already registered.
    pub fn insert(&self, owner_id: &str, signal: CcSignal, is_public: bool, content: &str) -> bool {
        let fingerprint = self.hasher.hash(content);
        if fingerprint.is_zero() {
            return false;
        }
        let key = format!("{}:{:016x}", owner_id, fingerprint.0);
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(
            key,
            Arc::new(CorpusEntry {
                owner_id: owner_id.to_string(),
                signal,
                is_public,
                fingerprint,
                content: content.to_string(),
            }),
        );
        debug!(owner = %owner_id, "Content registered in corpus");
        true
    }

    pub fn len(&self) -> usize {
        self.entries.run_pending_tasks();
        self.entries.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Closest entry by edit distance among those passing both thresholds.
    pub fn find_match(&self, content: &str) -> Option<ContentMatch> {
        self.best_match(content, |_| true)
    }

    /// Like [`find_match`](Self::find_match) but restricted to one owner's content.
    pub fn find_owned_match(&self, owner_id: &str, content: &str) -> Option<ContentMatch> {
        self.best_match(content, |entry| entry.owner_id == owner_id)
    }

    fn best_match(&self, content: &str, filter: impl Fn(&CorpusEntry) -> bool) -> Option<ContentMatch> {
        let fingerprint = self.hasher.hash(content);
        if fingerprint.is_zero() {
            return None;
        }
        // Distances past the threshold only need to be known as "too far".
        let cap = self.max_edit_distance + 1e-9;

        let mut best: Option<ContentMatch> = None;
        let mut candidates = 0usize;
        for (_, entry) in self.entries.iter() {
            if !filter(&entry) {
                continue;
            }
            let hamming = entry.fingerprint.hamming_distance(&fingerprint);
            if hamming > self.max_hamming {
                continue;
            }
            candidates += 1;
            let edit_distance = normalized_edit_distance_capped(&entry.content, content, cap);
            if edit_distance > self.max_edit_distance {
                continue;
            }
            if best.as_ref().map_or(true, |b| edit_distance < b.edit_distance) {
                best = Some(ContentMatch {
                    owner_id: entry.owner_id.clone(),
                    is_public: entry.is_public,
                    signal: entry.signal,
                    hamming,
                    edit_distance,
                });
            }
        }
        debug!(candidates, matched = best.is_some(), "Corpus lookup");
        best
    }
}
