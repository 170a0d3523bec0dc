//! Reconnect backoff
//!
//! Bounded exponential backoff used by transports that reconnect on their own.

use crate::error::{BridgeError, BridgeResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Reconnect policy for a transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Delay before the first retry
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,
    /// Growth factor between attempts
    pub multiplier: f64,
    /// Attempts before giving up; 0 disables reconnect
    pub max_attempts: u32,
    /// Add random jitter to spread reconnect storms
    pub jitter: bool,
    /// Maximum jitter ratio (0.0 - 1.0)
    pub jitter_ratio: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            max_attempts: 10,
            jitter: true,
            jitter_ratio: 0.2,
        }
    }
}

impl ReconnectConfig {
    /// Policy that never reconnects
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Set the initial delay
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the attempt limit
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Enable or disable jitter
    pub fn jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Reject policies that cannot produce sensible delays
    pub fn validate(&self) -> BridgeResult<()> {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(BridgeError::config(
                "transport.reconnect.multiplier must be a finite number of at least 1.0",
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(BridgeError::config(
                "transport.reconnect.jitter_ratio must be between 0.0 and 1.0",
            ));
        }
        if self.initial_delay > self.max_delay {
            return Err(BridgeError::config(
                "transport.reconnect.initial_delay must not exceed max_delay",
            ));
        }
        Ok(())
    }
}

/// Backoff strategy trait
pub trait BackoffStrategy: Send + Sync {
    /// Get the delay for the given attempt number (0-indexed)
    fn delay_for_attempt(&self, attempt: u32) -> Duration;

    /// Reset the backoff state
    fn reset(&mut self);
}

/// Exponential backoff with an attempt budget
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    config: ReconnectConfig,
    attempt: u32,
}

impl ExponentialBackoff {
    /// Create a backoff from a reconnect policy
    pub fn new(config: ReconnectConfig) -> Self {
        Self { config, attempt: 0 }
    }

    /// Next delay, or `None` once the attempt budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.config.max_attempts {
            return None;
        }
        let delay = self.delay_for_attempt(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    /// Attempts made since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    fn add_jitter(&self, delay: Duration) -> Duration {
        if !self.config.jitter {
            return delay;
        }

        let ratio = self.config.jitter_ratio;
        let ratio = if ratio.is_finite() { ratio.clamp(0.0, 1.0) } else { 0.0 };
        let jittered = delay.as_secs_f64() + rand_jitter(delay.as_secs_f64() * ratio);

        Duration::try_from_secs_f64(jittered).unwrap_or(delay)
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let max = self.config.max_delay;
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay = self.config.initial_delay.as_secs_f64() * self.config.multiplier.powi(exponent);

        // NaN and overflow fall back to the cap
        let capped = if base_delay.is_nan() {
            max
        } else {
            Duration::try_from_secs_f64(base_delay.max(0.0)).map_or(max, |d| d.min(max))
        };

        self.add_jitter(capped)
    }

    fn reset(&mut self) {
        self.attempt = 0;
    }
}

fn rand_jitter(range: f64) -> f64 {
    let bits = (uuid::Uuid::new_v4().as_u128() & u32::MAX as u128) as u32;
    (bits as f64 / u32::MAX as f64) * range
}
