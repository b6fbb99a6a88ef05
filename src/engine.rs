// src/engine.rs
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::{RetryPolicy, SourceConfig};
use crate::drivers::{
    GloveError, Notification, NotificationSource, Outcome, PipelineStats, SampleProducer,
    SerialSource, SimulatedSource,
};
use crate::types::{LinkEvent, SourceMode};

// Upper bound on how long the producer goes without checking for a stop request
const POLL_WAIT: Duration = Duration::from_millis(50);

/// Build the discovery closure for the configured source.
pub fn connector(
    config: &SourceConfig,
) -> impl FnMut() -> Result<Box<dyn NotificationSource>, GloveError> + Send + 'static {
    let config = config.clone();
    move || -> Result<Box<dyn NotificationSource>, GloveError> {
        match config.mode {
            SourceMode::Simulation => Ok(Box::new(SimulatedSource::new(
                config.simulated_channels,
                config.simulated_rate_hz,
            )?)),
            SourceMode::Serial => Ok(Box::new(SerialSource::discover(
                &config.device_name,
                config.port.as_deref(),
                config.baud_rate,
            )?)),
        }
    }
}

/// Owner's side of the acquisition thread.
pub struct AcquisitionHandle {
    stop_tx: Option<Sender<()>>,
    done_rx: Receiver<()>,
    join: Option<JoinHandle<()>>,
    events: Receiver<LinkEvent>,
    stats: Arc<PipelineStats>,
    finished: bool,
}

/// Start the producer context: discover the glove, then feed every notification
/// through `producer` until stopped, the link ends, or the consumer hangs up.
pub fn spawn_acquisition<C>(
    mut connect: C,
    mut producer: SampleProducer,
    retry: RetryPolicy,
) -> AcquisitionHandle
where
    C: FnMut() -> Result<Box<dyn NotificationSource>, GloveError> + Send + 'static,
{
    let (stop_tx, stop_rx) = channel::<()>();
    let (done_tx, done_rx) = channel();
    let (event_tx, events) = channel();
    let stats = producer.stats();
    let join = thread::spawn(move || {
        run(&mut connect, &mut producer, retry, &stop_rx, &event_tx);
        log::info!("Acquisition thread exiting");
        event_tx.send(LinkEvent::Stopped).ok();
        done_tx.send(()).ok();
    });
    AcquisitionHandle {
        stop_tx: Some(stop_tx),
        done_rx,
        join: Some(join),
        events,
        stats,
        finished: false,
    }
}

impl AcquisitionHandle {
    pub fn stats(&self) -> Arc<PipelineStats> {
        Arc::clone(&self.stats)
    }

    /// Status updates published since the last call.
    pub fn events(&self) -> impl Iterator<Item = LinkEvent> + '_ {
        self.events.try_iter()
    }

    pub fn is_finished(&mut self) -> bool {
        if !self.finished {
            self.finished = !matches!(self.done_rx.try_recv(), Err(TryRecvError::Empty));
        }
        self.finished
    }

    /// Ask the producer to stop and wait up to `timeout` for it to exit.
    ///
    /// Returns false if the thread did not finish in time; it is then detached.
    pub fn shutdown(mut self, timeout: Duration) -> bool {
        let started = Instant::now();
        // closing the channel is the stop signal
        self.stop_tx.take();
        if !self.finished {
            match self.done_rx.recv_timeout(timeout) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => self.finished = true,
                Err(RecvTimeoutError::Timeout) => {
                    log::error!("Acquisition thread did not stop within {timeout:?}");
                    return false;
                }
            }
        }
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::error!("Acquisition thread panicked");
            }
        }
        log::debug!("Acquisition stopped after {:?}", started.elapsed());
        true
    }
}

fn stop_requested(stop_rx: &Receiver<()>) -> bool {
    !matches!(stop_rx.try_recv(), Err(TryRecvError::Empty))
}

fn run<C>(
    connect: &mut C,
    producer: &mut SampleProducer,
    retry: RetryPolicy,
    stop_rx: &Receiver<()>,
    events: &Sender<LinkEvent>,
) where
    C: FnMut() -> Result<Box<dyn NotificationSource>, GloveError>,
{
    let Some(mut source) = connect_with_retry(connect, retry, stop_rx, events) else {
        return;
    };
    while !stop_requested(stop_rx) {
        match source.poll(POLL_WAIT) {
            Ok(Notification::Payload(bytes)) => {
                if let Outcome::Hangup = producer.handle(&bytes, Instant::now()) {
                    log::info!("Sample consumer hung up");
                    return;
                }
            }
            Ok(Notification::Idle) => {}
            Ok(Notification::Closed) => {
                log::info!("{} finished streaming", source.describe());
                return;
            }
            Err(err) => {
                log::warn!("Lost {}: {err}", source.describe());
                events.send(LinkEvent::Lost(err.to_string())).ok();
                if !err.is_retryable() {
                    return;
                }
                match connect_with_retry(connect, retry, stop_rx, events) {
                    Some(next) => source = next,
                    None => return,
                }
            }
        }
    }
    log::info!("Stop requested; releasing {}", source.describe());
}

fn connect_with_retry<C>(
    connect: &mut C,
    retry: RetryPolicy,
    stop_rx: &Receiver<()>,
    events: &Sender<LinkEvent>,
) -> Option<Box<dyn NotificationSource>>
where
    C: FnMut() -> Result<Box<dyn NotificationSource>, GloveError>,
{
    let attempts = retry.attempts.max(1);
    for attempt in 1..=attempts {
        events
            .send(LinkEvent::Searching {
                attempt,
                of: attempts,
            })
            .ok();
        match connect() {
            Ok(source) => {
                let name = source.describe();
                log::info!("Connected to {name}");
                events.send(LinkEvent::Connected(name)).ok();
                return Some(source);
            }
            Err(err) if err.is_retryable() && attempt < attempts => {
                log::warn!("Glove discovery attempt {attempt}/{attempts} failed: {err}");
                // wakes early if the owner stops us
                if !matches!(
                    stop_rx.recv_timeout(retry.backoff()),
                    Err(RecvTimeoutError::Timeout)
                ) {
                    return None;
                }
            }
            Err(err) => {
                log::error!("Giving up on the glove: {err}");
                events.send(LinkEvent::Unavailable(err.to_string())).ok();
                return None;
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{ManualSource, RateLimiter, Sample};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn producer() -> (SampleProducer, Receiver<Sample>) {
        let (tx, rx) = channel();
        (SampleProducer::new(RateLimiter::unlimited(), tx), rx)
    }

    fn fast_retry(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff_ms: 5,
        }
    }

    /// Endless stream of identical payloads.
    struct Firehose;
    impl NotificationSource for Firehose {
        fn describe(&self) -> String {
            "firehose".into()
        }
        fn poll(&mut self, _wait: Duration) -> Result<Notification, GloveError> {
            thread::sleep(Duration::from_millis(1));
            Ok(Notification::Payload(b"1.5,2.5".to_vec()))
        }
    }

    /// Fails once mid-stream, like a dropped radio link.
    struct Flaky {
        sent: bool,
    }
    impl NotificationSource for Flaky {
        fn describe(&self) -> String {
            "flaky".into()
        }
        fn poll(&mut self, _wait: Duration) -> Result<Notification, GloveError> {
            if self.sent {
                Err(GloveError::SourceDisconnected("radio dropped".into()))
            } else {
                self.sent = true;
                Ok(Notification::Payload(b"7".to_vec()))
            }
        }
    }

    #[test]
    fn streams_every_payload_in_order() {
        let (producer, rx) = producer();
        let lines: Vec<String> = (0..50).map(|i| format!("{i},{}", i * 2)).collect();
        let source = ManualSource::from_lines(lines.iter().map(String::as_str));
        let mut slot = Some(source);
        let handle = spawn_acquisition(
            move || {
                slot.take()
                    .map(|s| Box::new(s) as Box<dyn NotificationSource>)
                    .ok_or_else(|| GloveError::SourceNotFound("manual".into()))
            },
            producer,
            fast_retry(1),
        );
        let received: Vec<Sample> = rx.iter().take(50).collect();
        for (i, sample) in received.iter().enumerate() {
            assert_eq!(sample.values(), &[i as f64, (i * 2) as f64]);
        }
        assert!(handle.shutdown(Duration::from_secs(2)));
    }

    #[test]
    fn reports_unavailable_after_bounded_retry() {
        let (producer, _rx) = producer();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let mut handle = spawn_acquisition(
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(GloveError::SourceNotFound("glove".into()))
            },
            producer,
            fast_retry(3),
        );
        let deadline = Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.is_finished());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let events: Vec<LinkEvent> = handle.events().collect();
        assert_eq!(events[0], LinkEvent::Searching { attempt: 1, of: 3 });
        assert!(events
            .iter()
            .any(|e| matches!(e, LinkEvent::Unavailable(_))));
        assert_eq!(events.last(), Some(&LinkEvent::Stopped));
        assert!(handle.shutdown(Duration::from_secs(1)));
    }

    #[test]
    fn stop_mid_stream_terminates_within_bound() {
        let (producer, rx) = producer();
        let handle = spawn_acquisition(
            || Ok(Box::new(Firehose) as Box<dyn NotificationSource>),
            producer,
            fast_retry(1),
        );
        // make sure data is flowing before stopping
        rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let started = Instant::now();
        assert!(handle.shutdown(Duration::from_secs(1)));
        assert!(started.elapsed() < Duration::from_secs(1));
        // everything queued before the stop is still intact
        for sample in rx.try_iter() {
            assert_eq!(sample.values(), &[1.5, 2.5]);
        }
    }

    #[test]
    fn reconnects_after_mid_session_loss() {
        let (producer, rx) = producer();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let handle = spawn_acquisition(
            move || {
                if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                    Ok(Box::new(Flaky { sent: false }) as Box<dyn NotificationSource>)
                } else {
                    Err(GloveError::SourceNotFound("glove".into()))
                }
            },
            producer,
            fast_retry(2),
        );
        let first = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        let second = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first.values(), &[7.0]);
        assert_eq!(second.values(), &[7.0]);
        assert!(handle.shutdown(Duration::from_secs(2)));
        assert!(calls.load(Ordering::SeqCst) >= 2);
    }

    #[test]
    fn stops_when_consumer_hangs_up() {
        let (producer, rx) = producer();
        drop(rx);
        let mut handle = spawn_acquisition(
            || Ok(Box::new(Firehose) as Box<dyn NotificationSource>),
            producer,
            fast_retry(1),
        );
        let deadline = Instant::now() + Duration::from_secs(2);
        while !handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(handle.is_finished());
        assert!(handle.shutdown(Duration::from_millis(10)));
    }
}
