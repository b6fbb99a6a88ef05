// src/config.rs
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use serde::{Deserialize, Serialize};
use crate::drivers::{interval_for_rate, GloveError};
use crate::types::SourceMode;
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub mode: SourceMode,
    /// Substring of the advertised device/port name used during discovery.
    pub device_name: String,
    /// Explicit port, skipping discovery by name.
    pub port: Option<String>,
    pub baud_rate: u32,
    pub simulated_channels: usize,
    pub simulated_rate_hz: f64,
}
impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Simulation,
            device_name: "jeppe is 2 cool".to_owned(),
            port: None,
            baud_rate: 115_200,
            simulated_channels: 10,
            // faster than the default cap so the rate gate has work to do
            simulated_rate_hz: 100.0,
        }
    }
}
/// Which channels belong to which finger. Deployments differ, so nothing here is hardcoded.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelMap {
    /// `angle_channels[f]` is the flex channel calibrated for finger `f`.
    pub angle_channels: Vec<usize>,
    /// `pressure_channels[f]` is the pressure pad of finger `f`.
    pub pressure_channels: Vec<usize>,
}
impl Default for ChannelMap {
    fn default() -> Self {
        Self {
            angle_channels: vec![0, 1, 2],
            pressure_channels: vec![3, 4, 5],
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub path: PathBuf,
    pub angles: Vec<f64>,
    pub collect_seconds: f64,
    /// Calibration-curve PNG written after an interactive calibration.
    pub plot_path: Option<PathBuf>,
}
impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("glove_cal.json"),
            angles: vec![0.0, 110.0],
            collect_seconds: 5.0,
            plot_path: Some(PathBuf::from("glove_cal.png")),
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub headless: bool,
    pub show_raw: bool,
    pub show_pressure: bool,
    pub idle_ms: u64,
    /// Stop a headless run after this many seconds.
    pub run_seconds: Option<f64>,
    /// PNG of the final buffer written on shutdown.
    pub snapshot_path: Option<PathBuf>,
    pub pressure_threshold: f64,
}
impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            headless: false,
            show_raw: false,
            show_pressure: true,
            idle_ms: 10,
            run_seconds: None,
            snapshot_path: None,
            pressure_threshold: 0.0,
        }
    }
}
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff_ms: u64,
}
impl RetryPolicy {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}
impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff_ms: 1000,
        }
    }
}
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GloveConfig {
    pub source: SourceConfig,
    pub desired_rate_hz: f64,
    pub buffer_capacity: usize,
    pub filter_window: usize,
    pub channel_map: ChannelMap,
    pub calibration: CalibrationConfig,
    pub display: DisplayConfig,
    pub log_dir: PathBuf,
    pub retry: RetryPolicy,
    pub shutdown_timeout_ms: u64,
}
impl Default for GloveConfig {
    fn default() -> Self {
        Self {
            source: SourceConfig::default(),
            desired_rate_hz: 60.0,
            buffer_capacity: 1000,
            filter_window: 10,
            channel_map: ChannelMap::default(),
            calibration: CalibrationConfig::default(),
            display: DisplayConfig::default(),
            log_dir: PathBuf::from("."),
            retry: RetryPolicy::default(),
            shutdown_timeout_ms: 2000,
        }
    }
}
impl GloveConfig {
    /// Read a JSON config; a missing file means defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, GloveError> {
        let config = match fs::read_to_string(path) {
            Ok(text) => serde_json::from_str(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::info!("No config at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }
    pub fn validate(&self) -> Result<(), GloveError> {
        let invalid = |msg: String| Err(GloveError::InvalidConfig(msg));
        interval_for_rate("desired_rate_hz", self.desired_rate_hz)?;
        if self.source.mode == SourceMode::Simulation {
            interval_for_rate("source.simulated_rate_hz", self.source.simulated_rate_hz)?;
        }
        if self.buffer_capacity == 0 {
            return invalid("buffer_capacity must be at least 1".into());
        }
        if self.filter_window == 0 {
            return invalid("filter_window must be at least 1".into());
        }
        let mut angles = self.calibration.angles.clone();
        angles.sort_by(f64::total_cmp);
        angles.dedup();
        if angles.len() < 2 {
            return invalid("calibration.angles needs at least two distinct angles".into());
        }
        self.collect_window()?;
        self.run_limit()?;
        Ok(())
    }
    /// How long each calibration angle is held.
    pub fn collect_window(&self) -> Result<Duration, GloveError> {
        positive_seconds("calibration.collect_seconds", self.calibration.collect_seconds)
    }
    /// Headless run duration, if bounded.
    pub fn run_limit(&self) -> Result<Option<Duration>, GloveError> {
        self.display
            .run_seconds
            .map(|secs| positive_seconds("display.run_seconds", secs))
            .transpose()
    }
    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.display.idle_ms)
    }
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
fn positive_seconds(what: &str, secs: f64) -> Result<Duration, GloveError> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(GloveError::InvalidConfig(format!(
            "{what} must be a positive number of seconds, got {secs}"
        ))),
    }
}
#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn defaults_are_valid() {
        let config = GloveConfig::default();
        config.validate().unwrap();
        assert_eq!(config.buffer_capacity, 1000);
        assert_eq!(config.filter_window, 10);
    }
    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("glove.json");
        fs::write(
            &path,
            r#"{"filter_window": 5, "channel_map": {"angle_channels": [5, 6, 7]}, "source": {"mode": "Serial"}}"#,
        )
        .unwrap();
        let config = GloveConfig::load_or_default(&path).unwrap();
        assert_eq!(config.filter_window, 5);
        assert_eq!(config.channel_map.angle_channels, vec![5, 6, 7]);
        assert_eq!(config.channel_map.pressure_channels, vec![3, 4, 5]);
        assert_eq!(config.source.mode, SourceMode::Serial);
        assert_eq!(config.desired_rate_hz, 60.0);
    }
    #[test]
    fn missing_file_means_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GloveConfig::load_or_default(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, GloveConfig::default());
    }
    #[test]
    fn rejects_invalid_values() {
        let mut config = GloveConfig::default();
        config.filter_window = 0;
        assert!(config.validate().is_err());
        let mut config = GloveConfig::default();
        config.calibration.angles = vec![45.0, 45.0];
        assert!(config.validate().is_err());
        let mut config = GloveConfig::default();
        config.desired_rate_hz = 0.0;
        assert!(config.validate().is_err());
    }
    #[test]
    fn rejects_durations_that_do_not_fit() {
        let mut config = GloveConfig::default();
        config.desired_rate_hz = 1e-20;
        assert!(matches!(config.validate(), Err(GloveError::InvalidConfig(_))));
        for secs in [f64::INFINITY, 1e300, f64::NAN, 0.0] {
            let mut config = GloveConfig::default();
            config.calibration.collect_seconds = secs;
            assert!(config.validate().is_err());
            assert!(config.collect_window().is_err());
        }
        let mut config = GloveConfig::default();
        config.display.run_seconds = Some(1e300);
        assert!(config.validate().is_err());
        config.display.run_seconds = Some(2.5);
        assert_eq!(config.run_limit().unwrap(), Some(Duration::from_millis(2500)));
        assert_eq!(
            GloveConfig::default().collect_window().unwrap(),
            Duration::from_secs(5)
        );
    }
}
