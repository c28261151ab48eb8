//! Per-user request throttling.
//!
//! Each user has a history of request instants. A request is admitted when,
//! for every configured rate, fewer than `count` earlier requests fall inside
//! that rate's period. Otherwise the caller gets the time until the oldest
//! request in the window ages out.

use crate::config::Rate;
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sliding-window limiter shared by all workers.
#[derive(Clone)]
pub struct RateLimiter {
    rates: Vec<Rate>,
    history: Arc<DashMap<String, VecDeque<Instant>>>,
}

impl RateLimiter {
    pub fn new(rates: Vec<Rate>) -> Self {
        RateLimiter {
            rates,
            history: Arc::new(DashMap::new()),
        }
    }

    /// Admit a request for `user` now.
    ///
    /// # Errors
    ///
    /// Returns `Error::RateLimited` with the wait time when any rate is spent.
    pub fn check(&self, user: &str) -> Result<()> {
        self.check_at(user, Instant::now())
    }

    /// Admit a request for `user` at `now`.
    pub fn check_at(&self, user: &str, now: Instant) -> Result<()> {
        let longest = self
            .rates
            .iter()
            .map(|rate| rate.period)
            .max()
            .unwrap_or_default();

        let mut history = self.history.entry(user.to_string()).or_default();
        while history
            .front()
            .is_some_and(|first| now.saturating_duration_since(*first) >= longest)
        {
            history.pop_front();
        }

        for rate in &self.rates {
            let mut in_window = history
                .iter()
                .filter(|at| now.saturating_duration_since(**at) < rate.period);
            let oldest = in_window.next().copied();
            let count = oldest.map_or(0, |_| 1 + in_window.count());

            if count >= rate.count as usize {
                let waited = oldest.map_or(Duration::ZERO, |at| now.saturating_duration_since(at));
                let retry_after = rate.period.saturating_sub(waited);
                debug!("Throttled {} for {:?}", user, retry_after);
                return Err(Error::RateLimited { retry_after });
            }
        }

        history.push_back(now);
        Ok(())
    }
}
