use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::{Participant, Role, Tier};

#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    #[error("session not found")]
    NotFound,
    #[error("not allowed to join this session")]
    Forbidden,
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Author role of a stored session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session membership and persistence backing the websocket layer.
#[async_trait]
pub trait Repository: Send + Sync {
    /// Resolve the role of an authenticated user: host, then an existing
    /// membership, then `invite` (which creates the membership).
    async fn get_authenticated_participant(
        &self,
        session_id: &str,
        user_id: &str,
        invite: Option<&str>,
    ) -> Result<Participant, RepoError>;

    /// Admit an anonymous participant through `invite`.
    async fn add_anonymous_participant(
        &self,
        session_id: &str,
        display_name: &str,
        invite: Option<&str>,
    ) -> Result<Participant, RepoError>;

    async fn get_session_code(&self, session_id: &str) -> Result<String, RepoError>;

    async fn update_session_code(&self, session_id: &str, code: &str) -> Result<(), RepoError>;

    async fn add_message(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        role: MessageRole,
        content: &str,
    ) -> Result<(), RepoError>;

    async fn update_last_activity(&self, session_id: &str) -> Result<(), RepoError>;
}

/// Display name used when an anonymous participant gives none.
pub fn anonymous_display_name(requested: Option<&str>) -> String {
    match requested.map(str::trim) {
        Some(name) if !name.is_empty() => name.chars().take(64).collect(),
        _ => "Anonymous".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub user_id: Option<String>,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
struct SessionRecord {
    host_user_id: String,
    code: String,
    is_active: bool,
    last_activity: DateTime<Utc>,
    members: HashMap<String, Role>,
    messages: Vec<StoredMessage>,
}

#[derive(Debug)]
struct InviteRecord {
    session_id: String,
    role: Role,
    max_uses: Option<u32>,
    uses: u32,
    expires_at: Option<DateTime<Utc>>,
}

impl InviteRecord {
    fn is_usable(&self, session_id: &str, now: DateTime<Utc>) -> bool {
        self.session_id == session_id
            && self.expires_at.map_or(true, |at| at > now)
            && self.max_uses.map_or(true, |max| self.uses < max)
    }
}

#[derive(Debug, Clone)]
struct UserRecord {
    display_name: String,
    tier: Tier,
}

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<String, SessionRecord>,
    invites: HashMap<String, InviteRecord>,
    users: HashMap<String, UserRecord>,
}

impl MemoryState {
    fn open_session(&mut self, session_id: &str, host_user_id: &str, code: &str) {
        self.sessions.insert(
            session_id.to_string(),
            SessionRecord {
                host_user_id: host_user_id.to_string(),
                code: code.to_string(),
                is_active: true,
                last_activity: Utc::now(),
                members: HashMap::new(),
                messages: Vec::new(),
            },
        );
        info!(session = %session_id, host = %host_user_id, "Session created");
    }

    fn active_session(&mut self, session_id: &str) -> Result<&mut SessionRecord, RepoError> {
        match self.sessions.get_mut(session_id) {
            Some(session) if session.is_active => Ok(session),
            _ => Err(RepoError::NotFound),
        }
    }

    /// Consume one use of `token` for `session_id` and return the role it grants.
    fn redeem_invite(&mut self, session_id: &str, token: Option<&str>) -> Result<Role, RepoError> {
        let token = token.filter(|t| !t.is_empty()).ok_or(RepoError::Forbidden)?;
        let invite = self.invites.get_mut(token).ok_or(RepoError::Forbidden)?;
        if !invite.is_usable(session_id, Utc::now()) {
            return Err(RepoError::Forbidden);
        }
        invite.uses += 1;
        Ok(invite.role)
    }
}

/// In-process repository for tests and single-instance development.
pub struct MemoryRepository {
    state: Mutex<MemoryState>,
    /// Open unknown sessions on the first authenticated join, hosted by that user
    open_on_join: bool,
}

impl Default for MemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryRepository {
    /// Only sessions created through [`create_session`](Self::create_session) exist.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            open_on_join: false,
        }
    }

    /// Repository for a server running without a database: an authenticated
    /// user joining an unknown session id opens it and becomes its host.
    /// Ended sessions stay closed.
    pub fn ephemeral() -> Self {
        Self {
            state: Mutex::new(MemoryState::default()),
            open_on_join: true,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create an active session hosted by `host_user_id` and return its id.
    pub fn create_session(&self, host_user_id: &str, code: &str) -> String {
        let id = Uuid::new_v4().to_string();
        self.create_session_with_id(&id, host_user_id, code);
        id
    }

    pub fn create_session_with_id(&self, session_id: &str, host_user_id: &str, code: &str) {
        self.lock().open_session(session_id, host_user_id, code);
    }

    pub fn end_session(&self, session_id: &str) {
        if let Some(session) = self.lock().sessions.get_mut(session_id) {
            session.is_active = false;
        }
    }

    pub fn add_user(&self, user_id: &str, display_name: &str, tier: Tier) {
        self.lock().users.insert(
            user_id.to_string(),
            UserRecord { display_name: display_name.to_string(), tier },
        );
    }

    pub fn add_member(&self, session_id: &str, user_id: &str, role: Role) {
        if let Some(session) = self.lock().sessions.get_mut(session_id) {
            session.members.insert(user_id.to_string(), role);
        }
    }

    /// Create an invite token for `session_id` and return it.
    pub fn add_invite(
        &self,
        session_id: &str,
        role: Role,
        max_uses: Option<u32>,
        expires_at: Option<DateTime<Utc>>,
    ) -> String {
        let token = Uuid::new_v4().simple().to_string();
        self.lock().invites.insert(
            token.clone(),
            InviteRecord {
                session_id: session_id.to_string(),
                role,
                max_uses,
                uses: 0,
                expires_at,
            },
        );
        token
    }

    pub fn messages(&self, session_id: &str) -> Vec<StoredMessage> {
        self.lock()
            .sessions
            .get(session_id)
            .map(|s| s.messages.clone())
            .unwrap_or_default()
    }

    pub fn last_activity(&self, session_id: &str) -> Option<DateTime<Utc>> {
        self.lock().sessions.get(session_id).map(|s| s.last_activity)
    }

    pub fn session_host(&self, session_id: &str) -> Option<String> {
        self.lock().sessions.get(session_id).map(|s| s.host_user_id.clone())
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn get_authenticated_participant(
        &self,
        session_id: &str,
        user_id: &str,
        invite: Option<&str>,
    ) -> Result<Participant, RepoError> {
        let mut state = self.lock();
        let user = state.users.get(user_id).cloned().unwrap_or_else(|| UserRecord {
            display_name: user_id.to_string(),
            tier: Tier::Free,
        });

        if self.open_on_join && !state.sessions.contains_key(session_id) {
            state.open_session(session_id, user_id, "");
        }

        let existing = {
            let session = state.active_session(session_id)?;
            if session.host_user_id == user_id {
                Some(Role::Host)
            } else {
                session.members.get(user_id).copied()
            }
        };
        let role = match existing {
            Some(role) => role,
            None => {
                let role = state.redeem_invite(session_id, invite)?;
                state.active_session(session_id)?.members.insert(user_id.to_string(), role);
                debug!(session = %session_id, user = %user_id, role = %role, "Invite redeemed");
                role
            }
        };

        Ok(Participant {
            user_id: Some(user_id.to_string()),
            display_name: user.display_name,
            role,
            tier: user.tier,
        })
    }

    async fn add_anonymous_participant(
        &self,
        session_id: &str,
        display_name: &str,
        invite: Option<&str>,
    ) -> Result<Participant, RepoError> {
        let mut state = self.lock();
        state.active_session(session_id)?;
        let role = state.redeem_invite(session_id, invite)?;
        debug!(session = %session_id, role = %role, "Anonymous participant admitted");
        Ok(Participant {
            user_id: None,
            display_name: anonymous_display_name(Some(display_name)),
            role,
            tier: Tier::Free,
        })
    }

    async fn get_session_code(&self, session_id: &str) -> Result<String, RepoError> {
        Ok(self.lock().active_session(session_id)?.code.clone())
    }

    async fn update_session_code(&self, session_id: &str, code: &str) -> Result<(), RepoError> {
        let mut state = self.lock();
        let session = state.active_session(session_id)?;
        session.code = code.to_string();
        session.last_activity = Utc::now();
        Ok(())
    }

    async fn add_message(
        &self,
        session_id: &str,
        user_id: Option<&str>,
        role: MessageRole,
        content: &str,
    ) -> Result<(), RepoError> {
        let mut state = self.lock();
        let session = state.active_session(session_id)?;
        session.messages.push(StoredMessage {
            user_id: user_id.map(str::to_string),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn update_last_activity(&self, session_id: &str) -> Result<(), RepoError> {
        let mut state = self.lock();
        state.active_session(session_id)?.last_activity = Utc::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn host_resolves_without_invite() {
        let repo = MemoryRepository::new();
        repo.add_user("u-host", "Hostess", Tier::Pro);
        let session = repo.create_session("u-host", "s(\"bd\")");

        let p = repo.get_authenticated_participant(&session, "u-host", None).await.unwrap();
        assert_eq!(p.role, Role::Host);
        assert_eq!(p.display_name, "Hostess");
        assert_eq!(p.tier, Tier::Pro);
    }

    #[tokio::test]
    async fn invite_creates_membership_once() {
        let repo = MemoryRepository::new();
        let session = repo.create_session("u-host", "");
        let invite = repo.add_invite(&session, Role::CoAuthor, Some(1), None);

        let p = repo.get_authenticated_participant(&session, "u-2", Some(&invite)).await.unwrap();
        assert_eq!(p.role, Role::CoAuthor);

        // Membership persists without the (now used up) invite
        let again = repo.get_authenticated_participant(&session, "u-2", None).await.unwrap();
        assert_eq!(again.role, Role::CoAuthor);

        let other = repo.get_authenticated_participant(&session, "u-3", Some(&invite)).await;
        assert!(matches!(other, Err(RepoError::Forbidden)));
    }

    #[tokio::test]
    async fn outsiders_and_unknown_sessions_are_refused() {
        let repo = MemoryRepository::new();
        let session = repo.create_session("u-host", "");
        assert!(matches!(
            repo.get_authenticated_participant(&session, "stranger", None).await,
            Err(RepoError::Forbidden)
        ));
        assert!(matches!(
            repo.get_authenticated_participant("missing", "u-host", None).await,
            Err(RepoError::NotFound)
        ));

        repo.end_session(&session);
        assert!(matches!(repo.get_session_code(&session).await, Err(RepoError::NotFound)));
    }

    #[tokio::test]
    async fn expired_or_foreign_invites_are_refused() {
        let repo = MemoryRepository::new();
        let s1 = repo.create_session("h", "");
        let s2 = repo.create_session("h", "");
        let expired = repo.add_invite(&s1, Role::Viewer, None, Some(Utc::now() - chrono::Duration::minutes(1)));
        let for_s2 = repo.add_invite(&s2, Role::Viewer, None, None);

        assert!(matches!(
            repo.add_anonymous_participant(&s1, "guest", Some(&expired)).await,
            Err(RepoError::Forbidden)
        ));
        assert!(matches!(
            repo.add_anonymous_participant(&s1, "guest", Some(&for_s2)).await,
            Err(RepoError::Forbidden)
        ));
        assert!(matches!(repo.add_anonymous_participant(&s1, "guest", None).await, Err(RepoError::Forbidden)));
    }

    #[tokio::test]
    async fn anonymous_participant_gets_invite_role() {
        let repo = MemoryRepository::new();
        let session = repo.create_session("h", "");
        let invite = repo.add_invite(&session, Role::Viewer, None, None);

        let p = repo.add_anonymous_participant(&session, "  ", Some(&invite)).await.unwrap();
        assert_eq!(p.user_id, None);
        assert_eq!(p.display_name, "Anonymous");
        assert_eq!(p.role, Role::Viewer);
    }

    #[tokio::test]
    async fn ephemeral_repository_opens_unknown_sessions() {
        let repo = MemoryRepository::ephemeral();

        let host = repo.get_authenticated_participant("jam", "u1", None).await.unwrap();
        assert_eq!(host.role, Role::Host);
        assert_eq!(repo.session_host("jam").as_deref(), Some("u1"));
        assert_eq!(repo.get_session_code("jam").await.unwrap(), "");

        // Later arrivals still need an invite
        assert!(matches!(
            repo.get_authenticated_participant("jam", "u2", None).await,
            Err(RepoError::Forbidden)
        ));
        // Anonymous users never open a session
        let invite = repo.add_invite("jam", Role::Viewer, None, None);
        assert!(matches!(
            repo.add_anonymous_participant("other", "guest", Some(&invite)).await,
            Err(RepoError::NotFound)
        ));

        repo.end_session("jam");
        assert!(matches!(
            repo.get_authenticated_participant("jam", "u1", None).await,
            Err(RepoError::NotFound)
        ));
    }

    #[tokio::test]
    async fn plain_repository_does_not_open_sessions() {
        let repo = MemoryRepository::new();
        assert!(matches!(
            repo.get_authenticated_participant("jam", "u1", None).await,
            Err(RepoError::NotFound)
        ));
        assert!(repo.session_host("jam").is_none());
    }

    #[tokio::test]
    async fn code_and_messages_persist() {
        let repo = MemoryRepository::new();
        let session = repo.create_session("h", "old");
        let before = repo.last_activity(&session).unwrap();

        repo.update_session_code(&session, "new").await.unwrap();
        repo.add_message(&session, Some("h"), MessageRole::User, "make it faster").await.unwrap();
        repo.add_message(&session, None, MessageRole::Assistant, "s(\"hh*8\")").await.unwrap();
        repo.update_last_activity(&session).await.unwrap();

        assert_eq!(repo.get_session_code(&session).await.unwrap(), "new");
        let messages = repo.messages(&session);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].role, MessageRole::Assistant);
        assert!(messages[1].user_id.is_none());
        assert!(repo.last_activity(&session).unwrap() >= before);
    }
}
