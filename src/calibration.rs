// src/calibration.rs
use std::fs;
use std::path::Path;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use crate::drivers::{GloveError, Sample};
/// Affine map from one finger's filtered reading to a joint angle in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FingerCalibration {
    pub slope: f64,
    pub intercept: f64,
}
impl FingerCalibration {
    pub fn angle(&self, filtered: f64) -> f64 {
        filtered * self.slope + self.intercept
    }
    /// Reading expected at `angle`; the inverse of [`FingerCalibration::angle`].
    pub fn reading_at(&self, angle: f64) -> Option<f64> {
        (self.slope != 0.0).then(|| (angle - self.intercept) / self.slope)
    }
}
/// Per-finger calibration loaded once at startup.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTable {
    pub fingers: Vec<FingerCalibration>,
    /// Known angles the operator held during collection.
    #[serde(default)]
    pub angles: Vec<f64>,
    /// Mean reading per finger (rows) per known angle (columns).
    #[serde(default)]
    pub observations: Vec<Vec<f64>>,
}
impl CalibrationTable {
    pub fn new(fingers: Vec<FingerCalibration>) -> Self {
        Self {
            fingers,
            ..Default::default()
        }
    }
    pub fn finger_count(&self) -> usize {
        self.fingers.len()
    }
    pub fn angle(&self, finger: usize, filtered: f64) -> Option<f64> {
        self.fingers.get(finger).map(|cal| cal.angle(filtered))
    }
    /// Load a persisted table. A missing file is not an error: it yields `None`.
    pub fn load(path: &Path) -> Result<Option<Self>, GloveError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let table: Self = serde_json::from_str(&text)?;
        log::info!(
            "Loaded calibration for {} fingers from {}",
            table.finger_count(),
            path.display()
        );
        Ok(Some(table))
    }
    pub fn save(&self, path: &Path) -> Result<(), GloveError> {
        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        log::info!("Calibration saved to {}", path.display());
        Ok(())
    }
}
/// Ordinary least-squares line mapping observed readings to known angles.
pub fn fit_least_squares(observed: &[f64], angles: &[f64]) -> Result<FingerCalibration, GloveError> {
    if observed.len() != angles.len() {
        return Err(GloveError::CalibrationFit(format!(
            "{} readings for {} angles",
            observed.len(),
            angles.len()
        )));
    }
    if observed.len() < 2 {
        return Err(GloveError::CalibrationFit(
            "need readings at two or more angles".into(),
        ));
    }
    let x = Array1::from(observed.to_vec());
    let y = Array1::from(angles.to_vec());
    let (Some(x_mean), Some(y_mean)) = (x.mean(), y.mean()) else {
        return Err(GloveError::CalibrationFit("empty input".into()));
    };
    let dx = &x - x_mean;
    let dy = &y - y_mean;
    let sxx = dx.dot(&dx);
    if !(sxx.is_finite() && sxx > f64::EPSILON) {
        return Err(GloveError::CalibrationFit(
            "readings do not change with angle; check the sensor".into(),
        ));
    }
    let slope = dx.dot(&dy) / sxx;
    Ok(FingerCalibration {
        slope,
        intercept: y_mean - slope * x_mean,
    })
}
/// Mean of `channel` over every sample that arrives within `duration`.
///
/// Samples already queued when collection starts are discarded first.
pub fn collect_channel_mean(
    rx: &Receiver<Sample>,
    channel: usize,
    duration: Duration,
) -> Result<f64, GloveError> {
    while rx.try_recv().is_ok() {}
    let deadline = Instant::now() + duration;
    let mut readings = Vec::new();
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        match rx.recv_timeout(deadline - now) {
            Ok(sample) => {
                let value = sample.values().get(channel).copied().ok_or(
                    GloveError::ShapeMismatch {
                        expected: channel + 1,
                        actual: sample.num_channels(),
                    },
                )?;
                readings.push(value);
            }
            Err(RecvTimeoutError::Timeout) => break,
            Err(RecvTimeoutError::Disconnected) => {
                return Err(GloveError::SourceDisconnected(
                    "glove stopped streaming during calibration".into(),
                ))
            }
        }
    }
    Array1::from(readings).mean().ok_or_else(|| {
        GloveError::CalibrationFit(format!("no samples arrived for channel {}", channel + 1))
    })
}
/// What to collect: the channel of each finger and the angles to hold.
#[derive(Clone, Debug)]
pub struct CalibrationPlan {
    pub finger_channels: Vec<usize>,
    pub angles: Vec<f64>,
    pub collect_for: Duration,
}
/// Walk the operator through every finger/angle pair and fit one line per finger.
///
/// `prompt` is shown before each collection window and should block until the
/// operator is ready.
pub fn run_interactive(
    plan: &CalibrationPlan,
    rx: &Receiver<Sample>,
    mut prompt: impl FnMut(&str) -> Result<(), GloveError>,
) -> Result<CalibrationTable, GloveError> {
    let mut fingers = Vec::with_capacity(plan.finger_channels.len());
    let mut observations = Vec::with_capacity(plan.finger_channels.len());
    for (finger, &channel) in plan.finger_channels.iter().enumerate() {
        let mut row = Vec::with_capacity(plan.angles.len());
        for &angle in &plan.angles {
            prompt(&format!(
                "Press Enter to collect data for finger {} at {angle} degrees...",
                finger + 1
            ))?;
            let mean = collect_channel_mean(rx, channel, plan.collect_for)?;
            log::info!(
                "Mean reading for finger {} at {angle} deg: {mean:.3}",
                finger + 1
            );
            row.push(mean);
        }
        let fit = fit_least_squares(&row, &plan.angles)?;
        log::info!(
            "Finger {}: angle = {:.4} * reading + {:.3}",
            finger + 1,
            fit.slope,
            fit.intercept
        );
        fingers.push(fit);
        observations.push(row);
    }
    Ok(CalibrationTable {
        fingers,
        angles: plan.angles.clone(),
        observations,
    })
}
