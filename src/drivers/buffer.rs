use std::collections::VecDeque;
use crate::drivers::GloveError;
use crate::drivers::{Sample, Timestamp};
/// Per-channel series extracted from the buffer, ready to plot.
#[derive(Clone, Debug, Default)]
pub struct SeriesFrame {
    /// Seconds since the first sample of the session.
    pub times: Vec<f64>,
    pub raw: Vec<Vec<f64>>,      // channels x samples
    pub filtered: Vec<Vec<f64>>, // channels x samples
}
/// Rolling buffer of raw samples with their filtered vectors kept index-aligned.
pub struct SlidingBuffer {
    raw: VecDeque<Sample>,
    filtered: VecDeque<Vec<f64>>,
    channels: usize,
    capacity: usize,
}
impl SlidingBuffer {
    pub fn new(channels: usize, capacity: usize) -> Result<Self, GloveError> {
        if capacity == 0 {
            return Err(GloveError::InvalidConfig(
                "buffer capacity must be at least one sample".into(),
            ));
        }
        Ok(Self {
            raw: VecDeque::with_capacity(capacity),
            filtered: VecDeque::with_capacity(capacity),
            channels,
            capacity,
        })
    }
    pub fn channels(&self) -> usize {
        self.channels
    }
    pub fn capacity(&self) -> usize {
        self.capacity
    }
    pub fn len(&self) -> usize {
        self.raw.len()
    }
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }
    pub fn push(&mut self, sample: Sample, filtered: Vec<f64>) -> Result<(), GloveError> {
        for actual in [sample.num_channels(), filtered.len()] {
            if actual != self.channels {
                return Err(GloveError::ShapeMismatch {
                    expected: self.channels,
                    actual,
                });
            }
        }
        if self.raw.len() == self.capacity {
            self.raw.pop_front();
            self.filtered.pop_front();
        }
        self.raw.push_back(sample);
        self.filtered.push_back(filtered);
        debug_assert_eq!(self.raw.len(), self.filtered.len());
        Ok(())
    }
    #[cfg(test)]
    pub fn raw(&self) -> impl Iterator<Item = &Sample> {
        self.raw.iter()
    }
    #[cfg(test)]
    pub fn filtered(&self) -> impl Iterator<Item = &Vec<f64>> {
        self.filtered.iter()
    }
    pub fn latest_filtered(&self) -> Option<&[f64]> {
        self.filtered.back().map(|v| v.as_slice())
    }
    /// Filtered series for one channel, oldest first.
    pub fn filtered_channel(&self, channel: usize) -> Option<Vec<f64>> {
        (channel < self.channels).then(|| self.filtered.iter().map(|row| row[channel]).collect())
    }
    pub fn frame(&self, origin: &Timestamp) -> SeriesFrame {
        let times = self
            .raw
            .iter()
            .map(|s| s.timestamp().seconds_since(origin))
            .collect();
        let raw = (0..self.channels)
            .map(|c| self.raw.iter().map(|s| s.values()[c]).collect())
            .collect();
        let filtered = (0..self.channels)
            .map(|c| self.filtered.iter().map(|row| row[c]).collect())
            .collect();
        SeriesFrame {
            times,
            raw,
            filtered,
        }
    }
}
