// src/session.rs
use std::io::BufRead;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;

use crate::calibration::CalibrationTable;
use crate::config::{ChannelMap, GloveConfig};
use crate::drivers::plot::save_png;
use crate::drivers::{
    render_series_png, GloveError, MovingAverage, NotificationSource, PipelineStats, PlotStyle,
    RateLimiter, Sample, SampleProducer, SeriesFrame, SlidingBuffer, StatsSnapshot, Timestamp,
};
use crate::engine::{self, AcquisitionHandle};
use crate::recorder::{CsvRecorder, SampleSink};
use crate::types::LinkEvent;

/// Calibrated angle trace of one finger, aligned with `SeriesFrame::times`.
#[derive(Clone, Debug, PartialEq)]
pub struct AngleSeries {
    pub finger: usize,
    pub channel: usize,
    pub degrees: Vec<f64>,
}

/// Latest filtered reading of a finger's pressure pad.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PressureReading {
    pub finger: usize,
    pub channel: usize,
    pub value: f64,
    pub contact: bool,
}

/// Everything the display needs for one redraw.
#[derive(Clone, Debug, Default)]
pub struct SessionView {
    pub frame: SeriesFrame,
    /// `None` when no calibration is loaded.
    pub angles: Option<Vec<AngleSeries>>,
    pub pressure: Vec<PressureReading>,
}

struct ChannelState {
    buffer: SlidingBuffer,
    filter: MovingAverage,
}

/// Consumer side of the pipeline: buffering, smoothing and logging.
pub struct StreamConsumer<S = CsvRecorder> {
    sink: S,
    capacity: usize,
    filter_window: usize,
    state: Option<ChannelState>,
    first_timestamp: Option<Timestamp>,
    rejected: u64,
}

impl<S: SampleSink> StreamConsumer<S> {
    pub fn new(sink: S, capacity: usize, filter_window: usize) -> Self {
        Self {
            sink,
            capacity,
            filter_window,
            state: None,
            first_timestamp: None,
            rejected: 0,
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn buffer(&self) -> Option<&SlidingBuffer> {
        self.state.as_ref().map(|s| &s.buffer)
    }

    pub fn len(&self) -> usize {
        self.buffer().map(SlidingBuffer::len).unwrap_or(0)
    }

    /// Samples refused for having the wrong number of channels.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Move every queued sample into the buffer without blocking.
    pub fn drain(&mut self, rx: &Receiver<Sample>) -> Result<usize, GloveError> {
        let mut count = 0;
        while let Ok(sample) = rx.try_recv() {
            self.ingest(sample)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn ingest(&mut self, sample: Sample) -> Result<(), GloveError> {
        let state = match self.state.as_mut() {
            Some(state) => state,
            None => {
                let state = ChannelState {
                    buffer: SlidingBuffer::new(sample.num_channels(), self.capacity)?,
                    filter: MovingAverage::new(self.filter_window, sample.num_channels())?,
                };
                log::info!(
                    "Streaming {} channels (buffer {}, filter window {})",
                    state.buffer.channels(),
                    state.buffer.capacity(),
                    state.filter.window()
                );
                self.state.insert(state)
            }
        };
        if sample.num_channels() != state.buffer.channels() {
            log::warn!(
                "Dropping sample with {} channels (expected {})",
                sample.num_channels(),
                state.buffer.channels()
            );
            self.rejected += 1;
            return Ok(());
        }
        // a sample that never reached the log must not enter the filter history either
        self.sink.record(&sample)?;
        if state.buffer.is_empty() && self.first_timestamp.is_none() {
            self.first_timestamp = Some(*sample.timestamp());
        }
        let filtered = state.filter.apply(sample.values())?;
        state.buffer.push(sample, filtered)
    }

    /// Project the buffer for display, applying calibration at view time only.
    pub fn view(
        &self,
        calibration: Option<&CalibrationTable>,
        map: &ChannelMap,
        pressure_threshold: f64,
    ) -> SessionView {
        let (Some(state), Some(origin)) = (self.state.as_ref(), self.first_timestamp.as_ref())
        else {
            return SessionView::default();
        };
        let buffer = &state.buffer;
        let angles = calibration.map(|table| {
            map.angle_channels
                .iter()
                .enumerate()
                .take(table.finger_count())
                .filter_map(|(finger, &channel)| {
                    let filtered = buffer.filtered_channel(channel)?;
                    let degrees = filtered
                        .iter()
                        .filter_map(|v| table.angle(finger, *v))
                        .collect();
                    Some(AngleSeries {
                        finger,
                        channel,
                        degrees,
                    })
                })
                .collect()
        });
        let latest = buffer.latest_filtered().unwrap_or(&[]);
        let pressure = map
            .pressure_channels
            .iter()
            .enumerate()
            .filter_map(|(finger, &channel)| {
                latest.get(channel).map(|&value| PressureReading {
                    finger,
                    channel,
                    value,
                    contact: value >= pressure_threshold,
                })
            })
            .collect();
        SessionView {
            frame: buffer.frame(origin),
            angles,
            pressure,
        }
    }

    pub fn finish(&mut self) -> Result<(), GloveError> {
        self.sink.finish()
    }

    /// Final drain, then release the sink even if the drain failed.
    /// The first error wins.
    pub fn close(&mut self, rx: &Receiver<Sample>) -> Result<usize, GloveError> {
        let drained = self.drain(rx);
        let finished = self.finish();
        let count = drained?;
        finished?;
        Ok(count)
    }
}

/// A running acquisition wired to its consumer.
pub struct LiveSession {
    consumer: StreamConsumer<CsvRecorder>,
    samples: Receiver<Sample>,
    acquisition: AcquisitionHandle,
    stats: Arc<PipelineStats>,
}

impl LiveSession {
    /// Connect to the configured source and start streaming.
    pub fn start(config: &GloveConfig) -> Result<Self, GloveError> {
        Self::spawn(engine::connector(&config.source), config)
    }

    pub fn spawn<C>(connect: C, config: &GloveConfig) -> Result<Self, GloveError>
    where
        C: FnMut() -> Result<Box<dyn NotificationSource>, GloveError> + Send + 'static,
    {
        config.validate()?;
        let (tx, samples) = channel();
        let limiter = RateLimiter::new(config.desired_rate_hz)?;
        log::debug!("Accepting at most one sample per {:?}", limiter.min_interval());
        let producer = SampleProducer::new(limiter, tx);
        let acquisition = engine::spawn_acquisition(connect, producer, config.retry);
        let recorder = CsvRecorder::for_session(&config.log_dir, Local::now());
        Ok(Self {
            consumer: StreamConsumer::new(recorder, config.buffer_capacity, config.filter_window),
            samples,
            stats: acquisition.stats(),
            acquisition,
        })
    }

    /// Drain pending samples and collect link status. Returns new status events.
    pub fn pump(&mut self) -> Result<Vec<LinkEvent>, GloveError> {
        let drained = self.consumer.drain(&self.samples)?;
        if drained > 0 {
            log::trace!("Drained {drained} samples");
        }
        Ok(self.acquisition.events().collect())
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Samples the consumer refused for a foreign channel count.
    pub fn rejected(&self) -> u64 {
        self.consumer.rejected()
    }

    pub fn view(&self, calibration: Option<&CalibrationTable>, config: &GloveConfig) -> SessionView {
        self.consumer.view(
            calibration,
            &config.channel_map,
            config.display.pressure_threshold,
        )
    }

    /// True once the producer has exited; the queue may still hold samples.
    pub fn acquisition_finished(&mut self) -> bool {
        self.acquisition.is_finished()
    }

    /// Stop the producer (bounded wait), log whatever it queued, and close the log.
    pub fn shutdown(mut self, timeout: Duration) -> Result<StreamConsumer<CsvRecorder>, GloveError> {
        if !self.acquisition.shutdown(timeout) {
            log::warn!("Continuing shutdown without the acquisition thread");
        }
        let closed = self.consumer.close(&self.samples);
        let stats = self.stats.snapshot();
        log::info!(
            "Session closed: {} accepted, {} rate-limited, {} decode errors, {} shape errors, {} rejected",
            stats.accepted,
            stats.rate_limited,
            stats.decode_errors,
            stats.shape_errors,
            self.consumer.rejected()
        );
        closed?;
        Ok(self.consumer)
    }
}

/// Set `flag` when the operator types `q` (or `quit`) and Enter.
pub fn watch_stdin_for_quit(flag: Arc<AtomicBool>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            if matches!(line.trim().to_lowercase().as_str(), "q" | "quit") {
                flag.store(true, Ordering::SeqCst);
                break;
            }
        }
    });
}

/// Display-less render/persist loop. Runs until interrupted, timed out, or the link ends.
pub fn run_headless(
    mut session: LiveSession,
    calibration: Option<&CalibrationTable>,
    config: &GloveConfig,
    stop: &AtomicBool,
) -> Result<StreamConsumer<CsvRecorder>, GloveError> {
    let started = Instant::now();
    let run_for = match config.run_limit() {
        Ok(limit) => limit,
        Err(err) => {
            if let Err(e) = session.shutdown(config.shutdown_timeout()) {
                log::warn!("Shutdown after invalid run limit failed: {e}");
            }
            return Err(err);
        }
    };
    let mut last_report = Instant::now();
    let outcome = loop {
        let events = match session.pump() {
            Ok(events) => events,
            Err(err) => break Err(err),
        };
        for event in &events {
            log::info!("{}", event.describe());
        }
        let link_ended = events.iter().any(LinkEvent::is_terminal);
        let view = session.view(calibration, config);
        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            report(&view, session.stats(), session.rejected());
        }
        if stop.load(Ordering::SeqCst) {
            log::info!("Operator interrupt received. Exiting...");
            break Ok(());
        }
        if run_for.is_some_and(|limit| started.elapsed() >= limit) {
            break Ok(());
        }
        if link_ended || session.acquisition_finished() {
            break Ok(());
        }
        thread::sleep(config.idle_interval());
    };
    let closed = session.shutdown(config.shutdown_timeout());
    // the loop's own failure is the one worth reporting
    outcome.and(closed)
}

fn report(view: &SessionView, stats: StatsSnapshot, rejected: u64) {
    let angles = view
        .angles
        .as_ref()
        .map(|series| {
            series
                .iter()
                .filter_map(|s| s.degrees.last().map(|d| format!("F{}={d:.1}°", s.finger + 1)))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .unwrap_or_else(|| "uncalibrated".to_owned());
    log::info!(
        "{} buffered, {} accepted, {} dropped | {angles}",
        view.frame.times.len(),
        stats.accepted,
        stats.decode_errors + stats.shape_errors + rejected
    );
}

/// Write the buffer as a PNG: calibrated angles if available, else filtered channels.
pub fn save_snapshot(view: &SessionView, path: &Path) -> Result<(), GloveError> {
    let (title, y_label, series): (&str, &str, Vec<(String, Vec<f64>)>) = match &view.angles {
        Some(angles) if !angles.is_empty() => (
            "Finger angles",
            "Angle (degrees)",
            angles
                .iter()
                .map(|a| (format!("Finger {}", a.finger + 1), a.degrees.clone()))
                .collect(),
        ),
        _ => (
            "Filtered channels",
            "Reading",
            view.frame
                .filtered
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("Channel {}", i + 1), v.clone()))
                .collect(),
        ),
    };
    let png = render_series_png(title, y_label, &view.frame.times, &series, PlotStyle::default())?;
    save_png(path, &png)
}
