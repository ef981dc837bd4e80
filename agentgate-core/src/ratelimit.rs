//! Per-client rate limiting
//!
//! Two independent tiers per client key: a global tier covering every
//! operation and a sensitive tier for send/reply-class operations. Windows
//! are simple rolling counters: reset when the window has elapsed, else
//! increment and compare to the budget.
//!
//! State is in-memory only and resets on restart by design; durability
//! across restarts is a deployment concern, not an engine one.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Which budget an operation draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpClass {
    /// Global tier only
    Standard,
    /// Global tier plus the sensitive (send/reply) tier
    Sensitive,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

impl Window {
    fn new(now: Instant) -> Self {
        Self { count: 0, started: now }
    }

    /// Roll the window if elapsed, then consume one slot. Returns whether
    /// the budget still covers the consumption.
    fn consume(&mut self, now: Instant, window_len: Duration, budget: u32) -> bool {
        if now.duration_since(self.started) >= window_len {
            self.count = 0;
            self.started = now;
        }
        self.count += 1;
        self.count <= budget
    }
}

#[derive(Debug, Clone, Copy)]
struct ClientWindows {
    global: Window,
    sensitive: Window,
}

/// Two-tier rolling-window rate limiter keyed by client address.
///
/// The map lock is held only for the counter update; nothing slow runs
/// under it.
pub struct RateLimiter {
    global_budget: u32,
    sensitive_budget: u32,
    window_len: Duration,
    clients: Mutex<HashMap<String, ClientWindows>>,
}

impl RateLimiter {
    pub fn new(global_budget: u32, sensitive_budget: u32, window_len: Duration) -> Self {
        Self {
            global_budget,
            sensitive_budget,
            window_len,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Consume budget for one operation from `client`.
    ///
    /// Sensitive operations draw from both tiers; the global slot is
    /// consumed even when the sensitive tier then rejects, so blocked
    /// attempts still cost the caller budget.
    pub fn check(&self, client: &str, class: OpClass) -> Result<()> {
        self.check_at(client, class, Instant::now())
    }

    fn check_at(&self, client: &str, class: OpClass, now: Instant) -> Result<()> {
        let mut clients = self
            .clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        // Evict clients whose windows expired more than a full window ago,
        // so the map tracks active callers only
        let stale = self.window_len * 2;
        clients.retain(|_, w| {
            now.duration_since(w.global.started) < stale
                || now.duration_since(w.sensitive.started) < stale
        });

        let windows = clients.entry(client.to_string()).or_insert(ClientWindows {
            global: Window::new(now),
            sensitive: Window::new(now),
        });

        if !windows
            .global
            .consume(now, self.window_len, self.global_budget)
        {
            tracing::warn!(client, "global rate budget exhausted");
            return Err(Error::RateLimited("global"));
        }
        if class == OpClass::Sensitive
            && !windows
                .sensitive
                .consume(now, self.window_len, self.sensitive_budget)
        {
            tracing::warn!(client, "send rate budget exhausted");
            return Err(Error::RateLimited("send"));
        }
        Ok(())
    }

    /// Number of clients currently tracked (for diagnostics).
    pub fn tracked_clients(&self) -> usize {
        self.clients
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(global: u32, sensitive: u32) -> RateLimiter {
        RateLimiter::new(global, sensitive, Duration::from_secs(60))
    }

    #[test]
    fn test_global_budget_enforced() {
        let rl = limiter(3, 10);
        for _ in 0..3 {
            rl.check("10.0.0.1", OpClass::Standard).unwrap();
        }
        let err = rl.check("10.0.0.1", OpClass::Standard).unwrap_err();
        assert!(matches!(err, Error::RateLimited("global")));
    }

    #[test]
    fn test_sensitive_tier_trips_before_global() {
        // 11th send fails on the sensitive tier while global still has room
        let rl = limiter(100, 10);
        for _ in 0..10 {
            rl.check("10.0.0.1", OpClass::Sensitive).unwrap();
        }
        let err = rl.check("10.0.0.1", OpClass::Sensitive).unwrap_err();
        assert!(matches!(err, Error::RateLimited("send")));
    }

    #[test]
    fn test_clients_are_independent() {
        let rl = limiter(1, 1);
        rl.check("10.0.0.1", OpClass::Standard).unwrap();
        rl.check("10.0.0.2", OpClass::Standard).unwrap();
        assert!(rl.check("10.0.0.1", OpClass::Standard).is_err());
        assert_eq!(rl.tracked_clients(), 2);
    }

    #[test]
    fn test_stale_clients_evicted() {
        let rl = RateLimiter::new(5, 5, Duration::from_millis(5));
        rl.check("idle", OpClass::Standard).unwrap();
        assert_eq!(rl.tracked_clients(), 1);

        // After two full windows of silence the idle client is swept on
        // the next check from anyone
        std::thread::sleep(Duration::from_millis(15));
        rl.check("active", OpClass::Standard).unwrap();
        assert_eq!(rl.tracked_clients(), 1);
    }

    #[test]
    fn test_window_rolls_over() {
        let rl = RateLimiter::new(1, 1, Duration::from_millis(5));
        rl.check("c", OpClass::Standard).unwrap();
        assert!(rl.check("c", OpClass::Standard).is_err());
        std::thread::sleep(Duration::from_millis(10));
        rl.check("c", OpClass::Standard).unwrap();
    }

    #[test]
    fn test_sensitive_rejection_still_consumes_global() {
        let rl = limiter(5, 1);
        rl.check("c", OpClass::Sensitive).unwrap();
        // Second sensitive op: rejected by the send tier, global slot spent
        assert!(rl.check("c", OpClass::Sensitive).is_err());
        // Three more standard ops exhaust the remaining global budget
        for _ in 0..3 {
            rl.check("c", OpClass::Standard).unwrap();
        }
        let err = rl.check("c", OpClass::Standard).unwrap_err();
        assert!(matches!(err, Error::RateLimited("global")));
    }
}
