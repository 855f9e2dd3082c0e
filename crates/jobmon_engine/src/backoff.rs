use std::time::Duration;

/// Bounded exponential backoff.
///
/// Each call to [`Backoff::advance`] multiplies the interval by `factor` and
/// caps it at `max`, so the sequence is non-decreasing and never exceeds the cap.
#[derive(Debug, Clone, PartialEq)]
pub struct Backoff {
    current: Duration,
    factor: f64,
    max: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, factor: f64, max: Duration) -> Self {
        let factor = if factor.is_finite() && factor >= 1.0 {
            factor
        } else {
            1.0
        };
        Self {
            current: initial.min(max),
            factor,
            max,
        }
    }

    pub fn current(&self) -> Duration {
        self.current
    }

    pub fn max(&self) -> Duration {
        self.max
    }

    /// Grows the interval and returns the new value.
    pub fn advance(&mut self) -> Duration {
        let grown = self.current.as_secs_f64() * self.factor;
        let next = if grown >= self.max.as_secs_f64() {
            self.max
        } else {
            // Whole milliseconds keep logged intervals readable (1200, 1440, ...).
            Duration::from_millis((grown * 1000.0).round() as u64)
        };
        self.current = next.max(self.current).min(self.max);
        self.current
    }
}
