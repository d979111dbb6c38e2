// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Failed-attempt throttler backed by `DashMap`.
//!
//! Attempts are stored per client address and claimed app id, and counted
//! per address over a sliding window. The imposed delay doubles with every
//! attempt from `base_delay` up to `max_delay`; at `max_attempts` the client
//! is rejected outright until old attempts age out.

use dashmap::DashMap;
use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::domain::gateway_config::ThrottleConfig;
use crate::domain::throttle::{Throttled, Throttler};

pub struct AttemptThrottler {
    attempts: DashMap<IpAddr, HashMap<String, Vec<Instant>>>,
    config: ThrottleConfig,
}

impl AttemptThrottler {
    pub fn new(config: ThrottleConfig) -> Self {
        Self { attempts: DashMap::new(), config }
    }

    fn recent_attempts(&self, addr: IpAddr, now: Instant) -> u32 {
        let Some(mut per_app) = self.attempts.get_mut(&addr) else {
            return 0;
        };
        let window = self.config.window;
        per_app.retain(|_, times| {
            times.retain(|t| now.duration_since(*t) < window);
            !times.is_empty()
        });
        per_app.values().map(|t| t.len() as u32).sum()
    }

    fn delay_for_count(&self, count: u32) -> Duration {
        if count == 0 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(count.saturating_sub(1).min(31));
        self.config.base_delay.saturating_mul(factor).min(self.config.max_delay)
    }

    /// Drop addresses with no attempts left inside the window.
    pub fn purge_expired(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.attempts.retain(|_, per_app| {
            per_app.retain(|_, times| {
                times.retain(|t| now.duration_since(*t) < window);
                !times.is_empty()
            });
            !per_app.is_empty()
        });
    }

    pub fn tracked_clients(&self) -> usize {
        self.attempts.len()
    }
}

impl Throttler for AttemptThrottler {
    fn delay_for(&self, addr: IpAddr) -> Result<Duration, Throttled> {
        let count = self.recent_attempts(addr, Instant::now());
        if count >= self.config.max_attempts {
            warn!(client = %addr, attempts = count, "Client exceeded failed attempt ceiling");
            return Err(Throttled { addr, attempts: count });
        }
        Ok(self.delay_for_count(count))
    }

    fn register_attempt(&self, addr: IpAddr, app_id: &str) {
        debug!(client = %addr, app_id, "Registering failed attempt");
        self.attempts
            .entry(addr)
            .or_default()
            .entry(app_id.to_string())
            .or_default()
            .push(Instant::now());
    }

    fn reset(&self, addr: IpAddr, app_id: &str) {
        let now_empty = match self.attempts.get_mut(&addr) {
            Some(mut per_app) => {
                per_app.remove(app_id);
                per_app.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.attempts.remove_if(&addr, |_, per_app| per_app.is_empty());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn config() -> ThrottleConfig {
        ThrottleConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            max_attempts: 4,
            window: Duration::from_secs(60),
        }
    }

    const CLIENT: IpAddr = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9));

    #[test]
    fn test_delay_grows_and_caps() {
        let t = AttemptThrottler::new(config());
        assert_eq!(t.delay_for(CLIENT), Ok(Duration::ZERO));
        t.register_attempt(CLIENT, "a");
        assert_eq!(t.delay_for(CLIENT), Ok(Duration::from_millis(100)));
        t.register_attempt(CLIENT, "b");
        assert_eq!(t.delay_for(CLIENT), Ok(Duration::from_millis(200)));
        t.register_attempt(CLIENT, "a");
        assert_eq!(t.delay_for(CLIENT), Ok(Duration::from_millis(350)));
    }

    #[test]
    fn test_rejects_at_ceiling() {
        let t = AttemptThrottler::new(config());
        for _ in 0..4 {
            t.register_attempt(CLIENT, "ghost");
        }
        assert_eq!(t.delay_for(CLIENT), Err(Throttled { addr: CLIENT, attempts: 4 }));
        let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 10));
        assert_eq!(t.delay_for(other), Ok(Duration::ZERO));
    }

    #[test]
    fn test_reset_clears_only_that_app() {
        let t = AttemptThrottler::new(config());
        t.register_attempt(CLIENT, "a");
        t.register_attempt(CLIENT, "b");
        t.reset(CLIENT, "a");
        assert_eq!(t.delay_for(CLIENT), Ok(Duration::from_millis(100)));
        t.reset(CLIENT, "b");
        assert_eq!(t.delay_for(CLIENT), Ok(Duration::ZERO));
        assert_eq!(t.tracked_clients(), 0);
    }

    #[test]
    fn test_attempts_age_out() {
        let mut cfg = config();
        cfg.window = Duration::ZERO;
        let t = AttemptThrottler::new(cfg);
        t.register_attempt(CLIENT, "a");
        assert_eq!(t.delay_for(CLIENT), Ok(Duration::ZERO));
        t.purge_expired();
        assert_eq!(t.tracked_clients(), 0);
    }

    #[test]
    fn test_concurrent_registration() {
        let t = std::sync::Arc::new(AttemptThrottler::new(ThrottleConfig {
            max_attempts: 1000,
            ..config()
        }));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let t = t.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        t.register_attempt(CLIENT, &format!("app-{}", i % 2));
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(t.recent_attempts(CLIENT, Instant::now()), 400);
    }
}
