// src/drivers/mod.rs
pub mod buffer;
pub mod error;
pub mod filter;
pub mod pipeline;
pub mod plot;
pub mod rate;
pub mod serial;
pub mod simulated;
pub mod source;
pub use buffer::{SeriesFrame, SlidingBuffer};
pub use error::GloveError;
pub use filter::MovingAverage;
pub use pipeline::{decode_payload, Outcome, PipelineStats, SampleProducer, StatsSnapshot};
pub use plot::{render_calibration_png, render_series_png, PlotStyle};
pub use rate::{interval_for_rate, RateLimiter};
pub use serial::SerialSource;
pub use simulated::SimulatedSource;
#[cfg(test)]
pub use source::ManualSource;
pub use source::{Notification, NotificationSource, Sample, Timestamp};
