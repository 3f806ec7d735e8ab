use std::sync::Arc;
use tracing::{debug, info};

use super::corpus::FingerprintCorpus;
use super::levenshtein::normalized_edit_distance_capped;
use super::lockstore::{LockStore, LockStoreError};
use super::types::{ContentMatch, DetectorConfig, LockState, DEFAULT_LOCK_REASON};

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error(transparent)]
    Store(#[from] LockStoreError),
    #[error("content comparison failed: {0}")]
    Comparison(#[from] tokio::task::JoinError),
}

/// Size change between two consecutive snapshots of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentDelta {
    pub chars_added: usize,
    pub lines_added: usize,
}

impl ContentDelta {
    /// Only growth counts; deletions yield zero.
    pub fn between(previous: &str, current: &str) -> Self {
        Self {
            chars_added: current.chars().count().saturating_sub(previous.chars().count()),
            lines_added: current.lines().count().saturating_sub(previous.lines().count()),
        }
    }

    pub fn is_paste(&self, config: &DetectorConfig) -> bool {
        self.chars_added > config.paste_delta_threshold || self.lines_added > config.paste_line_threshold
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome {
    /// No lock before, no paste now
    Unchanged,
    /// A new lock was created with the current content as baseline
    PasteDetected { reason: String },
    /// A paste of content the author already owns; nothing is locked
    OwnContent,
    /// The lock holds; its TTL was refreshed
    StillLocked { edit_distance: f64 },
    /// Enough original work was done on top of the baseline; the lock is
    /// gone. The distance is a lower bound, at least the unlock threshold.
    Released { edit_distance: f64 },
}

enum Attribution {
    Own,
    Other(ContentMatch),
    Unknown,
}

/// Decides, per code update, whether a paste happened and whether an
/// existing lock should be released. Refusing generation while locked is
/// left to the caller.
pub struct PasteLockDetector {
    store: Arc<dyn LockStore>,
    config: DetectorConfig,
    corpus: Option<Arc<FingerprintCorpus>>,
}

impl PasteLockDetector {
    pub fn new(store: Arc<dyn LockStore>, config: DetectorConfig) -> Self {
        Self { store, config, corpus: None }
    }

    /// Attribute detected pastes to known content in the lock reason, and
    /// let authors paste content the corpus records as their own.
    pub fn with_corpus(mut self, corpus: Arc<FingerprintCorpus>) -> Self {
        self.corpus = Some(corpus);
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Edit distance and corpus lookups run on the blocking pool; their
    /// cost grows with document size.
    pub async fn on_code_update(
        &self,
        session_id: &str,
        author: Option<&str>,
        previous: &str,
        current: &str,
    ) -> Result<DetectionOutcome, DetectorError> {
        let state = self.store.get_lock(session_id).await?;

        if state.locked {
            let baseline = state.baseline_code;
            let edited = current.to_string();
            let threshold = self.config.unlock_threshold;
            let edit_distance =
                tokio::task::spawn_blocking(move || normalized_edit_distance_capped(&baseline, &edited, threshold))
                    .await?;
            if edit_distance >= threshold {
                self.store.remove_lock(session_id).await?;
                info!(session = %session_id, edit_distance, "Paste lock released");
                return Ok(DetectionOutcome::Released { edit_distance });
            }
            self.store.refresh_ttl(session_id, self.config.lock_ttl).await?;
            debug!(session = %session_id, edit_distance, "Paste lock still held");
            return Ok(DetectionOutcome::StillLocked { edit_distance });
        }

        let delta = ContentDelta::between(previous, current);
        if !delta.is_paste(&self.config) {
            return Ok(DetectionOutcome::Unchanged);
        }

        let reason = match self.attribute(author, current).await? {
            Attribution::Own => {
                info!(session = %session_id, author = ?author, "Paste of the author's own content, not locking");
                return Ok(DetectionOutcome::OwnContent);
            }
            Attribution::Other(m) => format!("paste matches content by {} ({})", m.owner_id, m.signal),
            Attribution::Unknown => DEFAULT_LOCK_REASON.to_string(),
        };
        self.store
            .set_lock_with_reason(session_id, current, &reason, self.config.lock_ttl)
            .await?;
        info!(
            session = %session_id,
            chars_added = delta.chars_added,
            lines_added = delta.lines_added,
            reason = %reason,
            "Paste detected, AI generation locked"
        );
        Ok(DetectionOutcome::PasteDetected { reason })
    }

    pub async fn is_locked(&self, session_id: &str) -> Result<bool, LockStoreError> {
        Ok(self.store.get_lock(session_id).await?.locked)
    }

    pub async fn lock_state(&self, session_id: &str) -> Result<LockState, LockStoreError> {
        self.store.get_lock(session_id).await
    }

    async fn attribute(&self, author: Option<&str>, content: &str) -> Result<Attribution, DetectorError> {
        let Some(corpus) = self.corpus.clone() else {
            return Ok(Attribution::Unknown);
        };
        let author = author.map(str::to_string);
        let content = content.to_string();
        let attribution = tokio::task::spawn_blocking(move || {
            if let Some(author) = author.as_deref() {
                if corpus.find_owned_match(author, &content).is_some() {
                    return Attribution::Own;
                }
            }
            match corpus.find_match(&content) {
                Some(m) => Attribution::Other(m),
                None => Attribution::Unknown,
            }
        })
        .await?;
        Ok(attribution)
    }
}
