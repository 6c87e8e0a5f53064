//! Per-client cooldown gate.
//!
//! Each client may start one chat request per cooldown window. The window is
//! a keyed GCRA limiter with a burst of one, so the admit decision and the
//! state update are a single atomic step per client.

use std::time::Duration;

use colloquy_types::config::RateLimitConfig;
use governor::clock::{Clock, DefaultClock};
use governor::middleware::NoOpMiddleware;
use governor::state::keyed::DashMapStateStore;
use governor::Quota;

/// A request rejected because the client is still cooling down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("too many requests, retry in {wait_ms} ms")]
pub struct CooldownRejection {
    pub wait_ms: u64,
}

impl CooldownRejection {
    /// Remaining wait rounded up to whole seconds.
    pub fn wait_secs(&self) -> u64 {
        self.wait_ms.div_ceil(1000)
    }
}

type KeyedLimiter<C> = governor::RateLimiter<
    String,
    DashMapStateStore<String>,
    C,
    NoOpMiddleware<<C as Clock>::Instant>,
>;

pub struct RateLimiter<C: Clock = DefaultClock> {
    /// `None` when the cooldown is zero and every request is admitted.
    limiter: Option<KeyedLimiter<C>>,
    clock: C,
    cooldown: Duration,
}

impl RateLimiter {
    pub fn new(config: &RateLimitConfig) -> Self {
        Self::with_cooldown(Duration::from_millis(config.cooldown_ms))
    }

    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self::with_clock(cooldown, DefaultClock::default())
    }
}

impl<C: Clock + Clone> RateLimiter<C> {
    pub fn with_clock(cooldown: Duration, clock: C) -> Self {
        let limiter = Quota::with_period(cooldown)
            .map(|quota| governor::RateLimiter::dashmap_with_clock(quota, clock.clone()));
        if limiter.is_none() {
            tracing::warn!("Cooldown is zero, per-client rate limiting disabled");
        }
        Self {
            limiter,
            clock,
            cooldown,
        }
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Admit the client or reject with the remaining wait.
    ///
    /// An admitted request starts a new cooldown window. A rejection leaves
    /// the window unchanged.
    pub fn check(&self, client_id: &str) -> Result<(), CooldownRejection> {
        let Some(limiter) = &self.limiter else {
            return Ok(());
        };
        limiter.check_key(&client_id.to_string()).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            let wait_ms = (wait.as_millis() as u64).max(1);
            tracing::debug!(client = %client_id, wait_ms, "Request rejected by cooldown");
            CooldownRejection { wait_ms }
        })
    }

    /// Forget clients whose cooldown has lapsed. Returns the number removed.
    pub fn prune(&self) -> usize {
        let Some(limiter) = &self.limiter else {
            return 0;
        };
        let before = limiter.len();
        limiter.retain_recent();
        limiter.shrink_to_fit();
        before.saturating_sub(limiter.len())
    }

    pub fn tracked_clients(&self) -> usize {
        self.limiter.as_ref().map_or(0, |limiter| limiter.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use governor::clock::FakeRelativeClock;

    fn limiter(cooldown_ms: u64) -> (FakeRelativeClock, RateLimiter<FakeRelativeClock>) {
        let clock = FakeRelativeClock::default();
        let limiter = RateLimiter::with_clock(Duration::from_millis(cooldown_ms), clock.clone());
        (clock, limiter)
    }

    #[test]
    fn test_second_request_within_cooldown_rejected() {
        let (clock, limiter) = limiter(3000);
        assert!(limiter.check("client").is_ok());

        clock.advance(Duration::from_millis(500));
        let rejection = limiter.check("client").unwrap_err();
        assert_eq!(rejection.wait_ms, 2500);
        assert_eq!(rejection.wait_secs(), 3);
    }

    #[test]
    fn test_wait_secs_rounds_up() {
        assert_eq!(CooldownRejection { wait_ms: 1 }.wait_secs(), 1);
        assert_eq!(CooldownRejection { wait_ms: 1000 }.wait_secs(), 1);
        assert_eq!(CooldownRejection { wait_ms: 1001 }.wait_secs(), 2);
    }

    #[test]
    fn test_request_after_cooldown_admitted() {
        let (clock, limiter) = limiter(3000);
        limiter.check("client").unwrap();
        clock.advance(Duration::from_millis(3000));
        assert!(limiter.check("client").is_ok());
    }

    #[test]
    fn test_rejection_does_not_extend_cooldown() {
        let (clock, limiter) = limiter(3000);
        limiter.check("client").unwrap();
        clock.advance(Duration::from_millis(2000));
        assert!(limiter.check("client").is_err());
        clock.advance(Duration::from_millis(1001));
        assert!(limiter.check("client").is_ok());
    }

    #[test]
    fn test_clients_are_independent() {
        let (_clock, limiter) = limiter(3000);
        limiter.check("a").unwrap();
        assert!(limiter.check("b").is_ok());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_prune_removes_lapsed_clients() {
        let (clock, limiter) = limiter(10);
        limiter.check("a").unwrap();
        clock.advance(Duration::from_millis(30));
        limiter.check("b").unwrap();
        assert_eq!(limiter.prune(), 1);
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_zero_cooldown_admits_everything() {
        let limiter = RateLimiter::with_cooldown(Duration::ZERO);
        assert!(limiter.check("client").is_ok());
        assert!(limiter.check("client").is_ok());
        assert_eq!(limiter.prune(), 0);
    }
}
