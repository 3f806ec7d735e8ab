use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use super::connection::Tier;

pub const AGENT_REQUEST_WINDOW: Duration = Duration::from_secs(60);
pub const CODE_UPDATE_WINDOW: Duration = Duration::from_secs(1);
pub const CHAT_WINDOW: Duration = Duration::from_secs(60);

pub const MAX_CODE_UPDATES_PER_SECOND: usize = 10;
pub const MAX_CHAT_MESSAGES_PER_MINUTE: usize = 20;

/// The action a rate-limit window guards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitedAction {
    AgentRequest,
    CodeUpdate,
    ChatMessage,
}

impl fmt::Display for RateLimitedAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RateLimitedAction::AgentRequest => "agent requests",
            RateLimitedAction::CodeUpdate => "code updates",
            RateLimitedAction::ChatMessage => "chat messages",
        })
    }
}

/// Sliding log of admitted actions within a trailing window.
#[derive(Debug)]
pub struct SlidingWindow {
    window: Duration,
    timestamps: VecDeque<Instant>,
}

impl SlidingWindow {
    pub fn new(window: Duration) -> Self {
        Self { window, timestamps: VecDeque::new() }
    }

    /// Prune entries older than the window, then admit and record `now` if
    /// fewer than `limit` remain.
    pub fn check_at(&mut self, limit: usize, now: Instant) -> bool {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
        if self.timestamps.len() >= limit {
            return false;
        }
        self.timestamps.push_back(now);
        true
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Connection-scoped admission control: three independent windows.
#[derive(Debug)]
pub struct RateLimiter {
    tier: Tier,
    agent_requests: SlidingWindow,
    code_updates: SlidingWindow,
    chat_messages: SlidingWindow,
}

impl RateLimiter {
    pub fn new(tier: Tier) -> Self {
        Self {
            tier,
            agent_requests: SlidingWindow::new(AGENT_REQUEST_WINDOW),
            code_updates: SlidingWindow::new(CODE_UPDATE_WINDOW),
            chat_messages: SlidingWindow::new(CHAT_WINDOW),
        }
    }

    pub fn check(&mut self, action: RateLimitedAction) -> bool {
        self.check_at(action, Instant::now())
    }

    pub fn check_at(&mut self, action: RateLimitedAction, now: Instant) -> bool {
        match action {
            RateLimitedAction::AgentRequest => {
                let limit = self.tier.agent_request_limit();
                self.agent_requests.check_at(limit, now)
            }
            RateLimitedAction::CodeUpdate => self.code_updates.check_at(MAX_CODE_UPDATES_PER_SECOND, now),
            RateLimitedAction::ChatMessage => self.chat_messages.check_at(MAX_CHAT_MESSAGES_PER_MINUTE, now),
        }
    }

    /// Entries currently held for `action`.
    pub fn recorded(&self, action: RateLimitedAction) -> usize {
        match action {
            RateLimitedAction::AgentRequest => self.agent_requests.len(),
            RateLimitedAction::CodeUpdate => self.code_updates.len(),
            RateLimitedAction::ChatMessage => self.chat_messages.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn exhaust(limiter: &mut RateLimiter, action: RateLimitedAction, n: usize, now: Instant) {
        for i in 0..n {
            assert!(limiter.check_at(action, now), "call {} should be allowed", i + 1);
        }
    }

    #[test]
    fn agent_limits_follow_tier() {
        for (tier, limit) in [(Tier::Free, 10), (Tier::Pro, 20), (Tier::Byok, 30)] {
            let mut limiter = RateLimiter::new(tier);
            let now = Instant::now();
            exhaust(&mut limiter, RateLimitedAction::AgentRequest, limit, now);
            assert!(!limiter.check_at(RateLimitedAction::AgentRequest, now));
            assert_eq!(limiter.recorded(RateLimitedAction::AgentRequest), limit);
        }
    }

    #[test]
    fn agent_window_expires_and_prunes() {
        let mut limiter = RateLimiter::new(Tier::Free);
        let start = Instant::now();
        exhaust(&mut limiter, RateLimitedAction::AgentRequest, 10, start);

        let later = start + Duration::from_secs(120);
        assert!(limiter.check_at(RateLimitedAction::AgentRequest, later));
        assert_eq!(limiter.recorded(RateLimitedAction::AgentRequest), 1);
    }

    #[test]
    fn code_updates_limited_per_second() {
        let mut limiter = RateLimiter::new(Tier::Byok);
        let start = Instant::now();
        exhaust(&mut limiter, RateLimitedAction::CodeUpdate, MAX_CODE_UPDATES_PER_SECOND, start);
        assert!(!limiter.check_at(RateLimitedAction::CodeUpdate, start + Duration::from_millis(500)));

        assert!(limiter.check_at(RateLimitedAction::CodeUpdate, start + Duration::from_secs(2)));
        assert_eq!(limiter.recorded(RateLimitedAction::CodeUpdate), 1);
    }

    #[test]
    fn chat_limited_per_minute() {
        let mut limiter = RateLimiter::new(Tier::Pro);
        let start = Instant::now();
        exhaust(&mut limiter, RateLimitedAction::ChatMessage, MAX_CHAT_MESSAGES_PER_MINUTE, start);
        assert!(!limiter.check_at(RateLimitedAction::ChatMessage, start));

        assert!(limiter.check_at(RateLimitedAction::ChatMessage, start + Duration::from_secs(120)));
        assert_eq!(limiter.recorded(RateLimitedAction::ChatMessage), 1);
    }

    #[test]
    fn windows_are_independent() {
        let mut limiter = RateLimiter::new(Tier::Free);
        let now = Instant::now();
        exhaust(&mut limiter, RateLimitedAction::CodeUpdate, MAX_CODE_UPDATES_PER_SECOND, now);
        assert!(!limiter.check_at(RateLimitedAction::CodeUpdate, now));
        assert!(limiter.check_at(RateLimitedAction::ChatMessage, now));
        assert!(limiter.check_at(RateLimitedAction::AgentRequest, now));
    }

    #[test]
    fn denied_calls_are_not_recorded() {
        let mut window = SlidingWindow::new(Duration::from_secs(1));
        let now = Instant::now();
        assert!(window.check_at(1, now));
        assert!(!window.check_at(1, now));
        assert!(!window.check_at(1, now));
        assert_eq!(window.len(), 1);
    }
}
