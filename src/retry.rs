// src/retry.rs
//! Error classification and exponential backoff shared by every adapter.

use std::time::Duration;

use crate::error::ScanError;

pub const DEFAULT_RETRY_BASE: Duration = Duration::from_secs(2);
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// How the pagination loop should treat a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    RateLimited,
    Blocked,
    Network,
    Fatal,
}

impl ErrorClass {
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorClass::Fatal)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorClass::RateLimited => "rate_limited",
            ErrorClass::Blocked => "blocked",
            ErrorClass::Network => "network",
            ErrorClass::Fatal => "fatal",
        }
    }
}

/// Expired sessions are not handled here: the adapter re-authenticates on
/// them. They classify as `Fatal` so a plain retry loop never spins on one.
pub fn classify(err: &ScanError) -> ErrorClass {
    match err {
        ScanError::RateLimited { .. } => ErrorClass::RateLimited,
        ScanError::Blocked(_) => ErrorClass::Blocked,
        ScanError::NetworkTransient(_) => ErrorClass::Network,
        ScanError::AuthenticationExpired
        | ScanError::AuthenticationFatal(_)
        | ScanError::MalformedUpstreamResponse(_)
        | ScanError::Fatal(_)
        | ScanError::Skipped(_)
        | ScanError::Cancelled
        | ScanError::SecondaryFilter(_)
        | ScanError::AllSourcesFailed { .. } => ErrorClass::Fatal,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    base: Duration,
    max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_BASE, DEFAULT_MAX_ATTEMPTS)
    }
}

impl RetryPolicy {
    pub fn new(base: Duration, max_attempts: u32) -> Self {
        Self {
            base: base.max(Duration::from_millis(1)),
            max_attempts,
        }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// `base * 2^attempt` while `attempt < max_attempts`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        Some(self.base.saturating_mul(factor))
    }

    /// Delay for a specific error: never shorter than a server `retry_after`.
    pub fn delay_for(&self, attempt: u32, err: &ScanError) -> Option<Duration> {
        let d = self.next_delay(attempt)?;
        match err {
            ScanError::RateLimited {
                retry_after: Some(hint),
            } => Some(d.max(*hint)),
            _ => Some(d),
        }
    }

    pub fn backoff(&self) -> BackoffState {
        BackoffState {
            policy: *self,
            attempt: 0,
            next_delay: self.next_delay(0),
        }
    }
}

/// Per-loop retry state.
#[derive(Debug, Clone)]
pub struct BackoffState {
    policy: RetryPolicy,
    attempt: u32,
    next_delay: Option<Duration>,
}

impl BackoffState {
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Consume one attempt. `None` once the cap is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        let d = self.next_delay?;
        self.attempt += 1;
        self.next_delay = self.policy.next_delay(self.attempt);
        Some(d)
    }

    /// Like [`next_delay`](Self::next_delay), honouring a `retry_after` hint.
    pub fn next_delay_for(&mut self, err: &ScanError) -> Option<Duration> {
        let d = self.policy.delay_for(self.attempt, err)?;
        self.next_delay()?;
        Some(d)
    }

    pub fn exhausted(&self) -> bool {
        self.next_delay.is_none()
    }
}
