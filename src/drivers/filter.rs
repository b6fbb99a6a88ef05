use std::collections::VecDeque;
use crate::drivers::GloveError;
/// Trailing simple moving average over whole channel vectors.
///
/// The output for a new vector is the elementwise mean of that vector and up to
/// `window - 1` of its predecessors. History is kept here, independent of any
/// display buffer, so the averaging width never depends on eviction elsewhere.
#[derive(Clone, Debug)]
pub struct MovingAverage {
    window: usize,
    channels: usize,
    history: VecDeque<Vec<f64>>,
}
impl MovingAverage {
    pub fn new(window: usize, channels: usize) -> Result<Self, GloveError> {
        if window == 0 {
            return Err(GloveError::InvalidConfig(
                "filter window must be at least one sample".into(),
            ));
        }
        Ok(Self {
            window,
            channels,
            history: VecDeque::with_capacity(window),
        })
    }
    pub fn window(&self) -> usize {
        self.window
    }
    pub fn apply(&mut self, values: &[f64]) -> Result<Vec<f64>, GloveError> {
        if values.len() != self.channels {
            return Err(GloveError::ShapeMismatch {
                expected: self.channels,
                actual: values.len(),
            });
        }
        if self.history.len() == self.window {
            self.history.pop_front();
        }
        self.history.push_back(values.to_vec());
        let n = self.history.len() as f64;
        let mut mean = vec![0.0; self.channels];
        for row in &self.history {
            for (acc, v) in mean.iter_mut().zip(row) {
                *acc += v;
            }
        }
        for acc in &mut mean {
            *acc /= n;
        }
        Ok(mean)
    }
}
