// src/main.rs
mod calibration;
mod config;
mod drivers;
mod engine;
mod gui;
mod recorder;
mod session;
mod types;

use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::channel;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use eframe::egui;

use calibration::{CalibrationPlan, CalibrationTable};
use config::GloveConfig;
use drivers::{GloveError, PlotStyle, RateLimiter, SampleProducer};
use session::LiveSession;

fn read_line() -> Result<String, GloveError> {
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}

fn ask_yes_no(question: &str) -> Result<bool> {
    print!("{question} [Y]es/[n]o: ");
    std::io::stdout().flush()?;
    let answer = read_line()?;
    Ok(!answer.trim().to_lowercase().starts_with('n'))
}

/// Stream from the glove just long enough to calibrate each configured finger.
fn calibrate(config: &GloveConfig) -> Result<CalibrationTable> {
    let (tx, rx) = channel();
    let producer = SampleProducer::new(RateLimiter::new(config.desired_rate_hz)?, tx);
    let acquisition =
        engine::spawn_acquisition(engine::connector(&config.source), producer, config.retry);
    let plan = CalibrationPlan {
        finger_channels: config.channel_map.angle_channels.clone(),
        angles: config.calibration.angles.clone(),
        collect_for: config.collect_window()?,
    };
    let result = calibration::run_interactive(&plan, &rx, |msg| {
        print!("{msg}");
        std::io::stdout().flush()?;
        read_line().map(|_| ())
    });
    for event in acquisition.events() {
        log::info!("{}", event.describe());
    }
    acquisition.shutdown(config.shutdown_timeout());
    let table = result.context("calibration failed")?;

    table
        .save(&config.calibration.path)
        .with_context(|| format!("saving {}", config.calibration.path.display()))?;
    if let Some(plot_path) = &config.calibration.plot_path {
        let png = drivers::render_calibration_png(&table, PlotStyle::default())?;
        drivers::plot::save_png(plot_path, &png)?;
    }
    Ok(table)
}

fn load_calibration(config: &GloveConfig) -> Result<Option<CalibrationTable>> {
    let path = &config.calibration.path;
    if let Some(table) = CalibrationTable::load(path)
        .with_context(|| format!("reading calibration {}", path.display()))?
    {
        return Ok(Some(table));
    }
    if !ask_yes_no("No calibration found. Calibrate now?")? {
        log::warn!("Continuing without calibration; angles will not be shown");
        return Ok(None);
    }
    calibrate(config).map(Some)
}

fn run_gui(session: LiveSession, calibration: Option<CalibrationTable>, config: GloveConfig) -> Result<()> {
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([1280.0, 860.0])
        .with_min_inner_size([900.0, 600.0])
        .with_title("Glove monitor");
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    let app = gui::GloveApp::new(session, calibration, config);
    eframe::run_native(
        "glovestream",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_visuals(egui::Visuals::dark());
            Box::new(app)
        }),
    )
    .map_err(|e| anyhow!("display failed: {e}"))
}

fn main() -> Result<()> {
    env_logger::init();
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("glove.json"));
    let config = GloveConfig::load_or_default(Path::new(&config_path))
        .with_context(|| format!("loading config {}", config_path.display()))?;

    let calibration = load_calibration(&config)?;
    let session = LiveSession::start(&config)?;

    if config.display.headless {
        let stop = Arc::new(AtomicBool::new(false));
        session::watch_stdin_for_quit(Arc::clone(&stop));
        log::info!("Streaming headless; type q and Enter to stop");
        let consumer = session::run_headless(session, calibration.as_ref(), &config, &stop)?;
        log::info!(
            "Logged {} samples to {}",
            consumer.sink().rows_written(),
            consumer.sink().path().display()
        );
        if let Some(path) = &config.display.snapshot_path {
            let view = consumer.view(
                calibration.as_ref(),
                &config.channel_map,
                config.display.pressure_threshold,
            );
            session::save_snapshot(&view, path)?;
        }
        Ok(())
    } else {
        run_gui(session, calibration, config)
    }
}
