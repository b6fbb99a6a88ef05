use std::thread;
use std::time::{Duration, Instant};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use crate::drivers::error::GloveError;
use crate::drivers::rate::interval_for_rate;
use crate::drivers::source::{Notification, NotificationSource};
/// Synthetic glove: slow finger flexion on every channel plus a little noise.
pub struct SimulatedSource {
    channels: usize,
    period: Duration,
    next_due: Instant,
    phase: f64,
    rng: StdRng,
}
impl SimulatedSource {
    pub fn new(channels: usize, rate_hz: f64) -> Result<Self, GloveError> {
        if channels == 0 {
            return Err(GloveError::InvalidConfig(
                "simulated glove needs at least one channel".into(),
            ));
        }
        Ok(Self {
            channels,
            period: interval_for_rate("simulated rate", rate_hz)?,
            next_due: Instant::now(),
            phase: 0.0,
            rng: StdRng::from_entropy(),
        })
    }
    fn next_line(&mut self) -> String {
        self.phase += self.period.as_secs_f64();
        (0..self.channels)
            .map(|c| {
                let speed = 0.5 + 0.1 * c as f64;
                let flex = 800.0 * (self.phase * speed * std::f64::consts::TAU).sin();
                let noise: f64 = self.rng.gen_range(-15.0..15.0);
                format!("{:.2}", 2048.0 + flex + noise)
            })
            .collect::<Vec<_>>()
            .join(",")
    }
}
impl NotificationSource for SimulatedSource {
    fn describe(&self) -> String {
        format!("simulated glove ({} channels)", self.channels)
    }
    fn poll(&mut self, wait: Duration) -> Result<Notification, GloveError> {
        let now = Instant::now();
        if now < self.next_due {
            thread::sleep((self.next_due - now).min(wait));
            if Instant::now() < self.next_due {
                return Ok(Notification::Idle);
            }
        }
        self.next_due += self.period;
        Ok(Notification::Payload(self.next_line().into_bytes()))
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::pipeline::decode_payload;
    #[test]
    fn emits_decodable_lines_with_fixed_width() {
        let mut source = SimulatedSource::new(4, 1000.0).unwrap();
        let mut seen = 0;
        for _ in 0..20 {
            if let Notification::Payload(bytes) = source.poll(Duration::from_millis(5)).unwrap() {
                assert_eq!(decode_payload(&bytes).unwrap().len(), 4);
                seen += 1;
            }
        }
        assert!(seen > 0);
    }
    #[test]
    fn rejects_bad_parameters() {
        assert!(SimulatedSource::new(0, 100.0).is_err());
        assert!(SimulatedSource::new(3, 0.0).is_err());
        assert!(SimulatedSource::new(3, 1e-30).is_err());
    }
}
