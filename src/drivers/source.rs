#[cfg(test)]
use std::collections::VecDeque;
use std::time::{Duration, Instant};
use chrono::{DateTime, Local};
use crate::drivers::GloveError;
/// Acceptance time of a sample: monotonic for spacing and plotting, wall clock for the log.
#[derive(Clone, Copy, Debug)]
pub struct Timestamp {
    pub monotonic: Instant,
    pub wall: DateTime<Local>,
}
impl Timestamp {
    pub fn now() -> Self {
        Self::at(Instant::now())
    }
    pub fn at(monotonic: Instant) -> Self {
        Self {
            monotonic,
            wall: Local::now(),
        }
    }
    /// Seconds elapsed since `origin` on the monotonic clock.
    pub fn seconds_since(&self, origin: &Timestamp) -> f64 {
        self.monotonic
            .saturating_duration_since(origin.monotonic)
            .as_secs_f64()
    }
}
/// One timestamped vector of channel readings from the glove.
#[derive(Clone, Debug)]
pub struct Sample {
    timestamp: Timestamp,
    values: Vec<f64>,
}
impl Sample {
    pub fn new(timestamp: Timestamp, values: Vec<f64>) -> Self {
        Self { timestamp, values }
    }
    pub fn timestamp(&self) -> &Timestamp {
        &self.timestamp
    }
    pub fn values(&self) -> &[f64] {
        &self.values
    }
    pub fn num_channels(&self) -> usize {
        self.values.len()
    }
}
/// What a source produced during one poll.
#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
    Payload(Vec<u8>),
    /// Nothing arrived within the wait.
    Idle,
    /// The link is gone; no further payloads will follow.
    Closed,
}
/// Something that delivers raw glove notifications.
///
/// `poll` must return within roughly `wait` so the caller can observe a stop request.
pub trait NotificationSource: Send {
    fn describe(&self) -> String;
    fn poll(&mut self, wait: Duration) -> Result<Notification, GloveError>;
}
/// In-memory source for tests.
#[cfg(test)]
pub struct ManualSource {
    queue: VecDeque<Notification>,
}
#[cfg(test)]
impl ManualSource {
    pub fn new(notifications: impl IntoIterator<Item = Notification>) -> Self {
        Self {
            queue: notifications.into_iter().collect(),
        }
    }
    pub fn from_lines<'a>(lines: impl IntoIterator<Item = &'a str>) -> Self {
        Self::new(
            lines
                .into_iter()
                .map(|line| Notification::Payload(line.as_bytes().to_vec())),
        )
    }
}
#[cfg(test)]
impl NotificationSource for ManualSource {
    fn describe(&self) -> String {
        "manual source".to_owned()
    }
    fn poll(&mut self, _wait: Duration) -> Result<Notification, GloveError> {
        Ok(self.queue.pop_front().unwrap_or(Notification::Closed))
    }
}
