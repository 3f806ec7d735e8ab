use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Reason recorded when a lock is created without a more specific explanation.
pub const DEFAULT_LOCK_REASON: &str = "paste detected";

/// Creative Commons signal attached to a piece of content, describing the
/// owner's consent to AI use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CcSignal {
    /// Allow AI use with attribution
    #[serde(rename = "cc-cr")]
    Credit,
    /// Attribution + financial support
    #[serde(rename = "cc-dc")]
    Direct,
    /// Attribution + contribution to the commons
    #[serde(rename = "cc-ec")]
    Ecosystem,
    /// Attribution + keep derivatives open
    #[serde(rename = "cc-op")]
    Open,
    /// Explicit opt-out of AI use
    #[serde(rename = "no-ai")]
    NoAi,
}

impl CcSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            CcSignal::Credit => "cc-cr",
            CcSignal::Direct => "cc-dc",
            CcSignal::Ecosystem => "cc-ec",
            CcSignal::Open => "cc-op",
            CcSignal::NoAi => "no-ai",
        }
    }

    pub fn allows_ai(&self) -> bool {
        !matches!(self, CcSignal::NoAi)
    }
}

impl fmt::Display for CcSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CcSignal {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cc-cr" => Ok(CcSignal::Credit),
            "cc-dc" => Ok(CcSignal::Direct),
            "cc-ec" => Ok(CcSignal::Ecosystem),
            "cc-op" => Ok(CcSignal::Open),
            "no-ai" => Ok(CcSignal::NoAi),
            other => Err(format!("unknown CC signal '{}'", other)),
        }
    }
}

/// Paste-lock policy. These are product decisions, so every value is
/// configurable rather than baked in.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    /// Characters added in one update above which the update counts as a paste
    pub paste_delta_threshold: usize,
    /// Lines added in one update above which the update counts as a paste
    pub paste_line_threshold: usize,
    /// Normalized edit distance from the baseline that releases a lock
    pub unlock_threshold: f64,
    pub lock_ttl: Duration,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            paste_delta_threshold: 200,
            paste_line_threshold: 50,
            unlock_threshold: 0.30,
            lock_ttl: Duration::from_secs(60 * 60),
        }
    }
}

/// Lock state of one session. An absent or expired entry reads as
/// [`LockState::unlocked`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockState {
    pub locked: bool,
    pub baseline_code: String,
    pub locked_at: Option<DateTime<Utc>>,
    pub reason: String,
}

impl LockState {
    pub fn unlocked() -> Self {
        Self {
            locked: false,
            baseline_code: String::new(),
            locked_at: None,
            reason: String::new(),
        }
    }

    pub fn locked(baseline_code: &str, reason: &str, locked_at: DateTime<Utc>) -> Self {
        Self {
            locked: true,
            baseline_code: baseline_code.to_string(),
            locked_at: Some(locked_at),
            reason: reason.to_string(),
        }
    }
}

/// A corpus entry that a piece of content was attributed to.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentMatch {
    pub owner_id: String,
    pub is_public: bool,
    pub signal: CcSignal,
    /// Bits differing between the two fingerprints
    pub hamming: u32,
    /// Normalized edit distance confirming the match
    pub edit_distance: f64,
}
