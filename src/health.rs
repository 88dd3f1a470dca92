//! Driver health tracking
//!
//! Every *tracked* transport call funnels its outcome through
//! [`HealthMonitor::track`], the single place where failure counters and
//! the coarse [`DriverState`] change. Probe and init-time identification
//! reads bypass it. Input errors (`INVALID_CONFIG` / `INVALID_PARAM`) never
//! reach it: the transport wrappers propagate those untouched.

use crate::status::{Error, Result};

/// Coarse driver state derived from consecutive failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DriverState {
    /// `init()` has not completed or `shutdown()` was called
    Uninit,
    /// Initialized, no outstanding failures
    Ready,
    /// At least one consecutive failure, below the offline threshold
    Degraded,
    /// Consecutive failures reached the offline threshold
    Offline,
}

/// Counters and timestamps describing the driver's operational health.
///
/// Counters saturate instead of wrapping. State transitions follow the
/// offline threshold configured at init: `consecutive_failures == 0` means
/// READY, anything below the threshold DEGRADED, at or above it OFFLINE.
/// Operations keep executing in OFFLINE; the first success returns the
/// driver to READY.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HealthMonitor {
    state: DriverState,
    offline_threshold: u8,
    last_ok_ms: u32,
    last_error_ms: u32,
    last_bus_activity_ms: u32,
    last_error: Option<Error>,
    consecutive_failures: u8,
    total_failures: u32,
    total_success: u32,
}

impl HealthMonitor {
    pub(crate) const fn new() -> Self {
        Self {
            state: DriverState::Uninit,
            offline_threshold: 1,
            last_ok_ms: 0,
            last_error_ms: 0,
            last_bus_activity_ms: 0,
            last_error: None,
            consecutive_failures: 0,
            total_failures: 0,
            total_success: 0,
        }
    }

    /// Clear all counters and arm the monitor with the given threshold.
    /// The state stays `Uninit` until [`mark_ready`](Self::mark_ready).
    pub(crate) fn reset(&mut self, offline_threshold: u8) {
        *self = Self::new();
        self.offline_threshold = offline_threshold.max(1);
    }

    /// Transition out of `Uninit` once init has succeeded.
    pub(crate) fn mark_ready(&mut self) {
        self.state = DriverState::Ready;
    }

    /// Return to `Uninit` on shutdown.
    pub(crate) fn deinit(&mut self) {
        self.state = DriverState::Uninit;
    }

    /// Record the outcome of one tracked transport call and pass it through.
    ///
    /// Before init completes only the timestamps and `last_error` are
    /// updated; counters and state changes start once the driver is live.
    pub(crate) fn track(&mut self, now_ms: u32, outcome: Result<()>) -> Result<()> {
        self.last_bus_activity_ms = now_ms;

        if self.state == DriverState::Uninit {
            match outcome {
                Ok(()) => self.last_ok_ms = now_ms,
                Err(err) => {
                    self.last_error = Some(err);
                    self.last_error_ms = now_ms;
                }
            }
            return outcome;
        }

        match outcome {
            Ok(()) => {
                self.last_ok_ms = now_ms;
                self.total_success = self.total_success.saturating_add(1);
                self.consecutive_failures = 0;
                self.state = DriverState::Ready;
            }
            Err(err) => {
                self.last_error = Some(err);
                self.last_error_ms = now_ms;
                self.total_failures = self.total_failures.saturating_add(1);
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.state = if self.consecutive_failures >= self.offline_threshold {
                    DriverState::Offline
                } else {
                    DriverState::Degraded
                };
            }
        }

        outcome
    }

    /// Record bus activity that is neither success nor failure, e.g. the
    /// expected read-header NACK while a periodic sample is still cooking.
    pub(crate) fn record_bus_activity(&mut self, now_ms: u32) {
        self.last_bus_activity_ms = now_ms;
    }

    /// Current coarse state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Whether the driver accepts operations (READY or DEGRADED).
    pub fn is_online(&self) -> bool {
        matches!(self.state, DriverState::Ready | DriverState::Degraded)
    }

    /// Timestamp of the last successful tracked call.
    pub fn last_ok_ms(&self) -> u32 {
        self.last_ok_ms
    }

    /// Timestamp of the last failed tracked call.
    pub fn last_error_ms(&self) -> u32 {
        self.last_error_ms
    }

    /// Timestamp of the last bus activity (success, failure or expected NACK).
    pub fn last_bus_activity_ms(&self) -> u32 {
        self.last_bus_activity_ms
    }

    /// Most recent tracked error, if any.
    pub fn last_error(&self) -> Option<Error> {
        self.last_error
    }

    /// Failures since the last success.
    pub fn consecutive_failures(&self) -> u8 {
        self.consecutive_failures
    }

    /// Lifetime failure count (saturating).
    pub fn total_failures(&self) -> u32 {
        self.total_failures
    }

    /// Lifetime success count (saturating).
    pub fn total_success(&self) -> u32 {
        self.total_success
    }
}
