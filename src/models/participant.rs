use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

/// Participant role within a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum Role {
    #[serde(rename = "host")]
    Host,
    #[serde(rename = "co-author")]
    CoAuthor,
    #[serde(rename = "viewer")]
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Host => "host",
            Role::CoAuthor => "co-author",
            Role::Viewer => "viewer",
        }
    }

    pub fn parse(value: &str) -> Option<Role> {
        match value {
            "host" => Some(Role::Host),
            "co-author" => Some(Role::CoAuthor),
            "viewer" => Some(Role::Viewer),
            _ => None,
        }
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Role::Host | Role::CoAuthor)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service class of a participant; sets the agent request ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Byok,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "free",
            Tier::Pro => "pro",
            Tier::Byok => "byok",
        }
    }

    /// Empty or unknown tiers are treated as free.
    pub fn from_str_lossy(value: &str) -> Tier {
        match value.trim().to_lowercase().as_str() {
            "pro" => Tier::Pro,
            "byok" => Tier::Byok,
            _ => Tier::Free,
        }
    }

    /// Agent generation requests allowed per minute.
    pub fn agent_request_limit(&self) -> usize {
        match self {
            Tier::Free => 10,
            Tier::Pro => 20,
            Tier::Byok => 30,
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity a connection acts under, resolved at connect time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    /// Authenticated user id; `None` for anonymous participants
    pub user_id: Option<String>,
    pub display_name: String,
    pub role: Role,
    pub tier: Tier,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_host_and_co_author_can_write() {
        assert!(Role::Host.can_write());
        assert!(Role::CoAuthor.can_write());
        assert!(!Role::Viewer.can_write());
    }

    #[test]
    fn role_parses_wire_names() {
        assert_eq!(Role::parse("co-author"), Some(Role::CoAuthor));
        assert_eq!(Role::parse(""), None);
        assert_eq!(serde_json::to_string(&Role::CoAuthor).unwrap(), "\"co-author\"");
    }

    #[test]
    fn tier_limits_with_free_fallback() {
        let cases = [("free", 10), ("pro", 20), ("byok", 30), ("", 10), ("unknown", 10), ("PRO", 20)];
        for (raw, limit) in cases {
            assert_eq!(Tier::from_str_lossy(raw).agent_request_limit(), limit, "tier {:?}", raw);
        }
    }
}
