//! # Rate Limiter
//!
//! Fixed window counter keyed by client identity (network address).
//!
//! ## Implementation
//!
//! - One `ClientWindow` per identity: window start + admitted count
//! - A window older than the configured length is replaced by a fresh one on the next request
//! - Every check first sweeps stale windows, keeping memory bounded by the active identities
//! - O(1) state per identity, O(n) sweep over the map
//!
//! ## Known Imprecision
//!
//! A fixed window is not a sliding log. A client can spend its whole cap at the end of one
//! window and again at the start of the next, so up to 2x the cap can be admitted within a
//! span shorter than one window.
//!
//! State lives in this process only. Multiple instances each keep their own counters, so the
//! limit is per instance, not global.
use std::{
    collections::HashMap,
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::debug;

use crate::config::RateLimitConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted { remaining: u32 },
    Denied { retry_after: Duration },
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted { .. })
    }
}

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    count: u32,
    window_start: Instant,
}

pub struct RateLimiter {
    windows: Mutex<HashMap<String, ClientWindow>>,
    window: Duration,
    max_submissions: u32,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            window: config.window,
            max_submissions: config.max_submissions,
        }
    }

    pub fn check(&self, identity: &str) -> Admission {
        self.check_at(identity, Instant::now())
    }

    pub fn check_at(&self, identity: &str, now: Instant) -> Admission {
        let mut windows = self.windows.lock();

        let before = windows.len();
        windows.retain(|_, client| now.duration_since(client.window_start) <= self.window);
        if windows.len() != before {
            debug!("Swept {} stale rate limit windows", before - windows.len());
        }

        // swept above, so any entry still here is inside its window
        let Some(client) = windows.get_mut(identity) else {
            windows.insert(
                identity.to_string(),
                ClientWindow {
                    count: 1,
                    window_start: now,
                },
            );

            return Admission::Admitted {
                remaining: self.max_submissions.saturating_sub(1),
            };
        };

        if client.count >= self.max_submissions {
            let elapsed = now.duration_since(client.window_start);

            return Admission::Denied {
                retry_after: self.window.saturating_sub(elapsed),
            };
        }

        client.count += 1;

        Admission::Admitted {
            remaining: self.max_submissions.saturating_sub(client.count),
        }
    }

    pub fn tracked_identities(&self) -> usize {
        self.windows.lock().len()
    }
}

/// Whole seconds, rounded up so a client never retries early.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR: Duration = Duration::from_secs(3600);

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::default())
    }

    fn admitted_between(
        limiter: &RateLimiter,
        identity: &str,
        times: impl IntoIterator<Item = Instant>,
    ) -> usize {
        times
            .into_iter()
            .filter(|&t| limiter.check_at(identity, t).is_admitted())
            .count()
    }

    #[test]
    fn first_request_opens_window() {
        let limiter = limiter();

        assert_eq!(
            limiter.check("10.0.0.1"),
            Admission::Admitted { remaining: 4 }
        );
        assert_eq!(limiter.tracked_identities(), 1);
    }

    #[test]
    fn cap_reached_within_window() {
        let limiter = limiter();
        let start = Instant::now();

        for expected in (0..5).rev() {
            assert_eq!(
                limiter.check_at("10.0.0.1", start),
                Admission::Admitted {
                    remaining: expected
                }
            );
        }

        let later = start + Duration::from_secs(600);
        assert_eq!(
            limiter.check_at("10.0.0.1", later),
            Admission::Denied {
                retry_after: Duration::from_secs(3000)
            }
        );
    }

    #[test]
    fn identities_are_independent() {
        let limiter = limiter();
        let start = Instant::now();

        for _ in 0..5 {
            limiter.check_at("10.0.0.1", start);
        }

        assert!(!limiter.check_at("10.0.0.1", start).is_admitted());
        assert!(limiter.check_at("10.0.0.2", start).is_admitted());
    }

    #[test]
    fn window_resets_after_expiry() {
        let limiter = limiter();
        let start = Instant::now();

        for _ in 0..6 {
            limiter.check_at("10.0.0.1", start);
        }

        // exactly one window old is still the same window
        assert!(!limiter.check_at("10.0.0.1", start + HOUR).is_admitted());

        let next = start + HOUR + Duration::from_secs(1);
        assert_eq!(
            limiter.check_at("10.0.0.1", next),
            Admission::Admitted { remaining: 4 }
        );
    }

    #[test]
    fn stale_windows_swept_on_check() {
        let limiter = limiter();
        let start = Instant::now();

        limiter.check_at("10.0.0.1", start);
        limiter.check_at("10.0.0.2", start);
        limiter.check_at("10.0.0.3", start + Duration::from_secs(1800));
        assert_eq!(limiter.tracked_identities(), 3);

        limiter.check_at("10.0.0.4", start + HOUR + Duration::from_secs(1));
        assert_eq!(limiter.tracked_identities(), 2);
    }

    #[test]
    fn at_least_cap_inside_one_window() {
        let limiter = limiter();
        let start = Instant::now();
        let times = (0..20).map(|i| start + Duration::from_secs(i * 60));

        assert_eq!(admitted_between(&limiter, "10.0.0.1", times), 5);
    }

    #[test]
    fn at_most_twice_cap_across_boundary() {
        let limiter = limiter();
        let start = Instant::now();

        // opens the window, then bursts right before and right after its end
        let opening = std::iter::once(start);
        let before_edge = (0..10).map(|i| start + HOUR - Duration::from_secs(10 - i));
        let after_edge = (1..=10).map(|i| start + HOUR + Duration::from_secs(i));

        let admitted = admitted_between(
            &limiter,
            "10.0.0.1",
            opening.chain(before_edge).chain(after_edge),
        );

        assert_eq!(admitted, 10);
    }

    #[test]
    fn retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_secs(3600)), 3600);
        assert_eq!(retry_after_secs(Duration::from_millis(3_599_001)), 3600);
        assert_eq!(retry_after_secs(Duration::ZERO), 0);
    }
}
