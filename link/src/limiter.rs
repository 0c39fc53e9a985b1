//! Client-side sliding-window rate limiter with an optional cool-down.
//!
//! A [`RateLimiter`] answers "may this action proceed right now?" for one
//! gated action (sign-in, posting a comment, ...). Attempts are counted in a
//! trailing window ending at "now". Once the window fills up, the limiter
//! blocks for `block_duration_ms`, which may be longer than the window to
//! implement punitive lockouts.
//!
//! Rejection is not an error: [`RateLimiter::record_attempt`] simply returns
//! `false`.
//!
//! # Example
//!
//! ```rust
//! use civic_link::{ManualClock, RateLimitConfig, RateLimiter};
//!
//! let clock = ManualClock::new(0);
//! let config = RateLimitConfig::new(2, 1_000).with_block_duration_ms(5_000);
//! let mut limiter = RateLimiter::with_clock(config, clock.clone()).unwrap();
//!
//! assert!(limiter.record_attempt());
//! assert!(limiter.record_attempt());
//! assert!(!limiter.record_attempt());
//!
//! clock.advance_ms(5_000);
//! assert!(!limiter.is_rate_limited());
//! ```

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::clock::{Clock, SystemClock};
use crate::error::{LinkError, Result};

/// Limits for one [`RateLimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Attempts allowed inside one window. Must be positive.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Length of the sliding window in milliseconds. Must be positive.
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// Cool-down once the window fills up.
    /// Default: None (same as `window_ms`)
    #[serde(default)]
    pub block_duration_ms: Option<u64>,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_window_ms() -> u64 {
    60_000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            window_ms: default_window_ms(),
            block_duration_ms: None,
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_attempts: u32, window_ms: u64) -> Self {
        Self {
            max_attempts,
            window_ms,
            block_duration_ms: None,
        }
    }

    pub fn with_block_duration_ms(mut self, block_duration_ms: u64) -> Self {
        self.block_duration_ms = Some(block_duration_ms);
        self
    }

    /// Effective cool-down in milliseconds.
    pub fn block_duration(&self) -> u64 {
        self.block_duration_ms.unwrap_or(self.window_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(LinkError::ConfigurationError(
                "max_attempts must be greater than zero".to_string(),
            ));
        }
        if self.window_ms == 0 {
            return Err(LinkError::ConfigurationError(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Client actions with built-in limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GatedAction {
    /// 5 attempts per 15 minutes, 30 minute lockout.
    SignIn,
    /// 5 issues per minute.
    CreateIssue,
    /// 10 comments per minute.
    PostComment,
}

impl GatedAction {
    pub fn config(&self) -> RateLimitConfig {
        match self {
            GatedAction::SignIn => {
                RateLimitConfig::new(5, 15 * 60 * 1000).with_block_duration_ms(30 * 60 * 1000)
            },
            GatedAction::CreateIssue => RateLimitConfig::new(5, 60 * 1000),
            GatedAction::PostComment => RateLimitConfig::new(10, 60 * 1000),
        }
    }
}

/// Display snapshot returned by [`RateLimiter::status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    /// Attempts currently inside the window.
    pub attempts: u32,
    pub max_attempts: u32,
    pub window_ms: u64,
    pub is_blocked: bool,
    /// Milliseconds until a new attempt would be accepted; 0 if one would be now.
    pub time_until_reset: u64,
}

/// Sliding-window limiter for one gated action.
///
/// Not shared across actions and not synchronized: mutation takes `&mut self`.
#[derive(Debug)]
pub struct RateLimiter<C: Clock = SystemClock> {
    config: RateLimitConfig,
    clock: C,
    /// Ascending attempt timestamps.
    attempts: VecDeque<u64>,
    blocked_until: Option<u64>,
}

impl RateLimiter<SystemClock> {
    /// Limiter on wall-clock time. Fails with `ConfigurationError` for zero limits.
    pub fn new(config: RateLimitConfig) -> Result<Self> {
        Self::with_clock(config, SystemClock)
    }

    /// Limiter using the built-in limits of `action`.
    pub fn for_action(action: GatedAction) -> Self {
        Self {
            config: action.config(),
            clock: SystemClock,
            attempts: VecDeque::new(),
            blocked_until: None,
        }
    }
}

impl<C: Clock> RateLimiter<C> {
    pub fn with_clock(config: RateLimitConfig, clock: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            attempts: VecDeque::new(),
            blocked_until: None,
        })
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Oldest timestamp still inside the window ending at `now`.
    fn window_start(&self, now: u64) -> u64 {
        now.saturating_sub(self.config.window_ms)
    }

    fn occupancy(&self, now: u64) -> usize {
        let start = self.window_start(now);
        self.attempts.iter().filter(|&&t| t >= start).count()
    }

    fn prune(&mut self, now: u64) {
        let start = self.window_start(now);
        while self.attempts.front().map_or(false, |&t| t < start) {
            self.attempts.pop_front();
        }
        if self.blocked_until.map_or(false, |until| now >= until) {
            self.blocked_until = None;
        }
    }

    fn is_blocked_at(&self, now: u64) -> bool {
        self.blocked_until.map_or(false, |until| now < until)
    }

    fn is_limited_at(&self, now: u64) -> bool {
        self.is_blocked_at(now) || self.occupancy(now) >= self.config.max_attempts as usize
    }

    /// Record an attempt if allowed.
    ///
    /// Returns `false` without recording anything (and without extending an
    /// active block) while rate-limited. An accepted attempt that fills the
    /// window starts the cool-down and still returns `true`.
    pub fn record_attempt(&mut self) -> bool {
        let now = self.clock.now_ms();
        self.prune(now);
        if self.is_limited_at(now) {
            return false;
        }
        self.attempts.push_back(now);
        if self.attempts.len() >= self.config.max_attempts as usize {
            let until = now.saturating_add(self.config.block_duration());
            self.blocked_until = Some(until);
            log::debug!(
                "[civic-link] Rate limit reached ({} in {}ms); blocked for {}ms",
                self.attempts.len(),
                self.config.window_ms,
                self.config.block_duration()
            );
        }
        true
    }

    pub fn is_rate_limited(&self) -> bool {
        self.is_limited_at(self.clock.now_ms())
    }

    pub fn attempts_remaining(&self) -> u32 {
        let now = self.clock.now_ms();
        if self.is_blocked_at(now) {
            return 0;
        }
        let used = self.occupancy(now) as u32;
        self.config.max_attempts.saturating_sub(used)
    }

    /// Milliseconds until the next attempt would be accepted.
    pub fn time_until_reset(&self) -> u64 {
        let now = self.clock.now_ms();
        let blocked = self
            .blocked_until
            .map_or(0, |until| until.saturating_sub(now));

        let start = self.window_start(now);
        let in_window: Vec<u64> = self.attempts.iter().copied().filter(|&t| t >= start).collect();
        let max = self.config.max_attempts as usize;
        let window = if in_window.len() >= max {
            // The window frees a slot once this attempt falls out of it.
            let pivot = in_window[in_window.len() - max];
            pivot
                .saturating_add(self.config.window_ms)
                .saturating_add(1)
                .saturating_sub(now)
        } else {
            0
        };
        blocked.max(window)
    }

    /// Clear every recorded attempt and any active block.
    pub fn reset(&mut self) {
        self.attempts.clear();
        self.blocked_until = None;
    }

    pub fn status(&self) -> RateLimitStatus {
        let now = self.clock.now_ms();
        RateLimitStatus {
            attempts: self.occupancy(now) as u32,
            max_attempts: self.config.max_attempts,
            window_ms: self.config.window_ms,
            is_blocked: self.is_limited_at(now),
            time_until_reset: self.time_until_reset(),
        }
    }
}
