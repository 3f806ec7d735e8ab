//! CC-Signal enforcement: detects pasted content in a session and blocks
//! AI-assisted generation on it until enough original editing has been
//! layered on top.
//!
//! The pieces, leaves first:
//! - [`simhash`]: 64-bit approximate fingerprints for cheap similarity screening
//! - [`levenshtein`]: exact and length-normalized edit distance
//! - [`lockstore`]: per-session lock state behind [`LockStore`], in memory or in Redis
//! - [`detector`]: the paste/unlock decision run on every code update
//! - [`corpus`]: fingerprint pre-filter for attributing pasted content to an owner

pub mod corpus;
pub mod detector;
pub mod levenshtein;
pub mod lockstore;
pub mod simhash;
pub mod types;

pub use corpus::FingerprintCorpus;
pub use detector::{ContentDelta, DetectionOutcome, DetectorError, PasteLockDetector};
pub use levenshtein::{
    levenshtein_distance, levenshtein_distance_bounded, normalized_edit_distance, normalized_edit_distance_capped,
};
pub use lockstore::{LockStore, LockStoreError, MemoryLockStore, RedisLockStore};
pub use simhash::{Fingerprint, SimHasher, DEFAULT_SHINGLE_SIZE};
pub use types::{CcSignal, ContentMatch, DetectorConfig, LockState};
