// SPDX-FileCopyrightText: © 2026 Warden Contributors
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Sliding-window rate limiting for externally-originated requests.

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_per_minute: u32,
    pub max_per_hour: u32,
}

impl RateLimitConfig {
    pub fn new(per_minute: u32, per_hour: u32) -> Self {
        Self {
            max_per_minute: per_minute,
            max_per_hour: per_hour,
        }
    }

    pub fn permissive() -> Self {
        Self::new(60, 1000)
    }

    pub fn conservative() -> Self {
        Self::new(10, 100)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::conservative()
    }
}

#[derive(Debug, Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    requests: VecDeque<DateTime<Utc>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            requests: VecDeque::new(),
        }
    }

    /// Record the request if allowed; `Err(retry_after_secs)` otherwise.
    pub fn check_and_record(&mut self) -> Result<(), u32> {
        self.check_and_record_at(Utc::now())
    }

    pub fn check_and_record_at(&mut self, now: DateTime<Utc>) -> Result<(), u32> {
        self.cleanup_at(now);

        let minute_ago = now - Duration::minutes(1);
        let per_minute = self.requests.iter().filter(|t| **t > minute_ago).count() as u32;
        if per_minute >= self.config.max_per_minute {
            return Err(60);
        }
        if self.requests.len() as u32 >= self.config.max_per_hour {
            return Err(3600);
        }

        self.requests.push_back(now);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn last_used(&self) -> DateTime<Utc> {
        self.requests
            .back()
            .copied()
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    fn cleanup_at(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::hours(1);
        while let Some(front) = self.requests.front() {
            if *front < cutoff {
                self.requests.pop_front();
            } else {
                break;
            }
        }
    }
}
