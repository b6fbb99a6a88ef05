use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::time::Instant;
use crate::drivers::error::GloveError;
use crate::drivers::rate::RateLimiter;
use crate::drivers::source::{Sample, Timestamp};
/// Parse a comma-delimited line of decimal readings.
pub fn decode_payload(payload: &[u8]) -> Result<Vec<f64>, GloveError> {
    let text = std::str::from_utf8(payload)
        .map_err(|e| GloveError::Decode(format!("payload is not utf-8: {e}")))?;
    let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
    text.split(',')
        .enumerate()
        .map(|(idx, field)| {
            let field = field.trim();
            match field.parse::<f64>() {
                Ok(v) if v.is_finite() => Ok(v),
                _ => Err(GloveError::Decode(format!(
                    "field {} is not a finite number: {field:?} in {text:?}",
                    idx + 1
                ))),
            }
        })
        .collect()
}
/// Producer-side counters, readable from any thread.
#[derive(Debug, Default)]
pub struct PipelineStats {
    accepted: AtomicU64,
    rate_limited: AtomicU64,
    decode_errors: AtomicU64,
    shape_errors: AtomicU64,
}
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub accepted: u64,
    pub rate_limited: u64,
    pub decode_errors: u64,
    pub shape_errors: u64,
}
impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            shape_errors: self.shape_errors.load(Ordering::Relaxed),
        }
    }
}
/// Result of feeding one payload through the producer.
#[derive(Debug)]
pub enum Outcome {
    Accepted,
    RateLimited,
    Dropped(GloveError),
    /// The consumer went away; the producer should stop.
    Hangup,
}
/// Rate gate, decoder and enqueuer running on the acquisition thread.
pub struct SampleProducer {
    limiter: RateLimiter,
    channels: Option<usize>,
    tx: Sender<Sample>,
    stats: Arc<PipelineStats>,
}
impl SampleProducer {
    pub fn new(limiter: RateLimiter, tx: Sender<Sample>) -> Self {
        Self {
            limiter,
            channels: None,
            tx,
            stats: Arc::new(PipelineStats::default()),
        }
    }
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }
    #[cfg(test)]
    pub fn channel_count(&self) -> Option<usize> {
        self.channels
    }
    pub fn handle(&mut self, payload: &[u8], now: Instant) -> Outcome {
        if !self.limiter.try_accept(now) {
            self.stats.rate_limited.fetch_add(1, Ordering::Relaxed);
            return Outcome::RateLimited;
        }
        let values = match decode_payload(payload) {
            Ok(values) => values,
            Err(err) => {
                log::warn!("Skipping invalid data: {err}");
                self.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                return Outcome::Dropped(err);
            }
        };
        match self.channels {
            None => {
                log::info!("Glove reports {} channels", values.len());
                self.channels = Some(values.len());
            }
            Some(expected) if expected != values.len() => {
                let err = GloveError::ShapeMismatch {
                    expected,
                    actual: values.len(),
                };
                log::warn!("Rejecting record: {err}");
                self.stats.shape_errors.fetch_add(1, Ordering::Relaxed);
                return Outcome::Dropped(err);
            }
            Some(_) => {}
        }
        let sample = Sample::new(Timestamp::at(now), values);
        if self.tx.send(sample).is_err() {
            return Outcome::Hangup;
        }
        self.stats.accepted.fetch_add(1, Ordering::Relaxed);
        Outcome::Accepted
    }
}
