use std::time::{Duration, Instant};
use crate::drivers::GloveError;
/// Spacing between events at `rate_hz`, or `InvalidConfig` if that is not a
/// positive, representable duration.
pub fn interval_for_rate(what: &str, rate_hz: f64) -> Result<Duration, GloveError> {
    if !(rate_hz.is_finite() && rate_hz > 0.0) {
        return Err(GloveError::InvalidConfig(format!(
            "{what} must be a positive number of Hz, got {rate_hz}"
        )));
    }
    Duration::try_from_secs_f64(1.0 / rate_hz).map_err(|e| {
        GloveError::InvalidConfig(format!("{what} of {rate_hz} Hz is out of range: {e}"))
    })
}
/// Caps the accepted notification rate by spacing acceptances at least `1/rate` apart.
#[derive(Clone, Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_accepted: Option<Instant>,
}
impl RateLimiter {
    pub fn new(desired_rate_hz: f64) -> Result<Self, GloveError> {
        Ok(Self {
            min_interval: interval_for_rate("desired rate", desired_rate_hz)?,
            last_accepted: None,
        })
    }
    #[cfg(test)]
    pub fn unlimited() -> Self {
        Self {
            min_interval: Duration::ZERO,
            last_accepted: None,
        }
    }
    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }
    /// Returns true and records `now` if enough time has passed since the last acceptance.
    pub fn try_accept(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last_accepted {
            if now.saturating_duration_since(last) < self.min_interval {
                return false;
            }
        }
        self.last_accepted = Some(now);
        true
    }
}
