//! Throttling for the unauthenticated endpoints.
//!
//! Handlers consult a [`RateLimiter`] before doing any password or storage
//! work. [`WindowRateLimiter`] keeps fixed one-minute windows in process
//! memory, keyed by action and by caller address or email.

use std::{
    collections::HashMap,
    sync::{Mutex, PoisonError},
    time::{Duration, Instant},
};

const WINDOW: Duration = Duration::from_secs(60);
const PRUNE_THRESHOLD: usize = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RateLimitAction {
    Login,
    PasswordReset,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed,
    Limited,
}

pub trait RateLimiter: Send + Sync {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision;
    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision;
}

#[derive(Clone, Debug)]
pub struct NoopRateLimiter;

impl RateLimiter for NoopRateLimiter {
    fn check_ip(&self, _ip: Option<&str>, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }

    fn check_email(&self, _email: &str, _action: RateLimitAction) -> RateLimitDecision {
        RateLimitDecision::Allowed
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
enum Subject {
    Address,
    Email,
}

#[derive(Debug)]
struct Window {
    started: Instant,
    hits: u32,
}

/// Per-minute budgets; `0` turns an action's limit off.
#[derive(Debug)]
pub struct WindowRateLimiter {
    login_per_minute: u32,
    reset_per_minute: u32,
    windows: Mutex<HashMap<(RateLimitAction, Subject, String), Window>>,
}

impl WindowRateLimiter {
    #[must_use]
    pub fn new(login_per_minute: u32, reset_per_minute: u32) -> Self {
        Self {
            login_per_minute,
            reset_per_minute,
            windows: Mutex::new(HashMap::new()),
        }
    }

    const fn budget(&self, action: RateLimitAction) -> u32 {
        match action {
            RateLimitAction::Login => self.login_per_minute,
            RateLimitAction::PasswordReset => self.reset_per_minute,
        }
    }

    fn hit(&self, action: RateLimitAction, subject: Subject, key: &str) -> RateLimitDecision {
        self.hit_at(action, subject, key, Instant::now())
    }

    fn hit_at(
        &self,
        action: RateLimitAction,
        subject: Subject,
        key: &str,
        now: Instant,
    ) -> RateLimitDecision {
        let budget = self.budget(action);
        if budget == 0 {
            return RateLimitDecision::Allowed;
        }

        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        if windows.len() >= PRUNE_THRESHOLD {
            windows.retain(|_, window| now.duration_since(window.started) < WINDOW);
        }

        let window = windows
            .entry((action, subject, key.to_ascii_lowercase()))
            .or_insert(Window {
                started: now,
                hits: 0,
            });
        if now.duration_since(window.started) >= WINDOW {
            window.started = now;
            window.hits = 0;
        }
        window.hits = window.hits.saturating_add(1);

        if window.hits > budget {
            RateLimitDecision::Limited
        } else {
            RateLimitDecision::Allowed
        }
    }
}

impl RateLimiter for WindowRateLimiter {
    fn check_ip(&self, ip: Option<&str>, action: RateLimitAction) -> RateLimitDecision {
        // Without an address there is nothing stable to key on.
        ip.map_or(RateLimitDecision::Allowed, |ip| {
            self.hit(action, Subject::Address, ip)
        })
    }

    fn check_email(&self, email: &str, action: RateLimitAction) -> RateLimitDecision {
        self.hit(action, Subject::Email, email.trim())
    }
}
