//! Adaptive upload interval.
//!
//! The upload worker sleeps for [`Delay::current`] between cycles. Handled
//! batches shrink the interval to drain backlog faster; failures, blocked
//! cycles and empty stores grow it to back off.

use crate::config::DelayConfig;
use std::time::Duration;

/// A retry interval bounded to `[min, max]`.
#[derive(Debug, Clone)]
pub struct Delay {
    current: Duration,
    min: Duration,
    max: Duration,
    change_factor: f64,
}

impl Delay {
    /// Creates a delay from configuration.
    ///
    /// The initial value is clamped into the configured bounds, and a change
    /// factor below `1.0` is raised to `1.0`.
    pub fn new(config: &DelayConfig) -> Self {
        let min = config.min.min(config.max);
        let max = config.max.max(min);
        let change_factor = if config.change_factor.is_finite() {
            config.change_factor.max(1.0)
        } else {
            1.0
        };

        Self {
            current: config.initial.clamp(min, max),
            min,
            max,
            change_factor,
        }
    }

    /// Creates a delay with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(&DelayConfig::default())
    }

    /// Returns the current interval.
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Grows the interval towards the maximum.
    pub fn increase(&mut self) {
        self.current = self
            .current
            .mul_f64(self.change_factor)
            .clamp(self.min, self.max);
    }

    /// Shrinks the interval towards the minimum.
    pub fn decrease(&mut self) {
        self.current = self
            .current
            .div_f64(self.change_factor)
            .clamp(self.min, self.max);
    }

    /// Returns the lower bound.
    pub fn min(&self) -> Duration {
        self.min
    }

    /// Returns the upper bound.
    pub fn max(&self) -> Duration {
        self.max
    }
}
