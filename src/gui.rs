// src/gui.rs
use eframe::egui;
use egui::Color32;
use egui_plot::{Bar, BarChart, Legend, Line, Plot, PlotPoints};

use crate::calibration::CalibrationTable;
use crate::config::GloveConfig;
use crate::session::{self, LiveSession, SessionView};
use crate::types::LinkEvent;

const PALETTE: [Color32; 6] = [
    Color32::from_rgb(0, 255, 255),
    Color32::YELLOW,
    Color32::from_rgb(255, 0, 255),
    Color32::GREEN,
    Color32::from_rgb(255, 128, 0),
    Color32::LIGHT_BLUE,
];

pub struct GloveApp {
    session: Option<LiveSession>,
    // what the plots keep showing once the session has been shut down
    last_view: Option<SessionView>,
    calibration: Option<CalibrationTable>,
    config: GloveConfig,
    link: Option<LinkEvent>,
    log_messages: Vec<String>,
    error: Option<String>,
}

impl GloveApp {
    pub fn new(
        session: LiveSession,
        calibration: Option<CalibrationTable>,
        config: GloveConfig,
    ) -> Self {
        Self {
            session: Some(session),
            last_view: None,
            calibration,
            config,
            link: None,
            log_messages: vec!["Glove monitor ready.".to_owned()],
            error: None,
        }
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > 8 {
            self.log_messages.remove(0);
        }
    }

    /// Stop acquisition and flush the log; safe to call more than once.
    fn stop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let mut view = session.view(self.calibration.as_ref(), &self.config);
        match session.shutdown(self.config.shutdown_timeout()) {
            Ok(consumer) => {
                self.log(&format!(
                    "Saved {} rows to {}",
                    consumer.sink().rows_written(),
                    consumer.sink().path().display()
                ));
                // includes whatever the final drain picked up
                view = consumer.view(
                    self.calibration.as_ref(),
                    &self.config.channel_map,
                    self.config.display.pressure_threshold,
                );
            }
            Err(e) => {
                log::error!("Shutdown failed: {e}");
                self.error = Some(e.to_string());
            }
        }
        if let Some(path) = &self.config.display.snapshot_path {
            if let Err(e) = session::save_snapshot(&view, path) {
                log::warn!("Snapshot not written: {e}");
            }
        }
        self.last_view = Some(view);
    }

    fn current_view(&self) -> SessionView {
        match &self.session {
            Some(session) => session.view(self.calibration.as_ref(), &self.config),
            None => self.last_view.clone().unwrap_or_default(),
        }
    }

    fn series_lines(times: &[f64], series: &[Vec<f64>], prefix: &str) -> Vec<Line> {
        series
            .iter()
            .enumerate()
            .map(|(i, values)| {
                let points: Vec<[f64; 2]> = times
                    .iter()
                    .zip(values)
                    .map(|(t, v)| [*t, *v])
                    .collect();
                Line::new(PlotPoints::new(points))
                    .name(format!("{prefix}{}", i + 1))
                    .color(PALETTE[i % PALETTE.len()])
            })
            .collect()
    }

    fn draw_angles(&self, ui: &mut egui::Ui, view: &SessionView) {
        let lines = match &view.angles {
            Some(angles) => {
                ui.label("Finger angles (degrees)");
                let degrees: Vec<Vec<f64>> = angles.iter().map(|a| a.degrees.clone()).collect();
                Self::series_lines(&view.frame.times, &degrees, "Finger ")
            }
            None => {
                ui.label(
                    egui::RichText::new("No calibration loaded: showing filtered readings")
                        .color(Color32::YELLOW),
                );
                Self::series_lines(&view.frame.times, &view.frame.filtered, "Ch")
            }
        };
        Plot::new("angle_plot")
            .height(280.0)
            .legend(Legend::default())
            .auto_bounds_x()
            .auto_bounds_y()
            .show(ui, |plot_ui| {
                for line in lines {
                    plot_ui.line(line);
                }
            });
    }

    fn draw_raw(&self, ui: &mut egui::Ui, view: &SessionView) {
        ui.label("Raw vs filtered");
        let raw = Self::series_lines(&view.frame.times, &view.frame.raw, "Raw ");
        let filtered = Self::series_lines(&view.frame.times, &view.frame.filtered, "Filt ");
        Plot::new("raw_plot")
            .height(200.0)
            .legend(Legend::default())
            .show(ui, |plot_ui| {
                for line in raw {
                    plot_ui.line(line.width(1.0));
                }
                for line in filtered {
                    plot_ui.line(line.width(2.0));
                }
            });
    }

    fn draw_pressure(&self, ui: &mut egui::Ui, view: &SessionView) {
        ui.label("Fingertip pressure");
        let bars: Vec<Bar> = view
            .pressure
            .iter()
            .map(|p| {
                let fill = if p.contact {
                    Color32::RED
                } else {
                    Color32::DARK_GRAY
                };
                Bar::new(p.finger as f64 + 1.0, p.value)
                    .name(format!("Finger {}", p.finger + 1))
                    .fill(fill)
            })
            .collect();
        Plot::new("pressure_plot")
            .height(160.0)
            .include_y(0.0)
            .show(ui, |plot_ui| plot_ui.bar_chart(BarChart::new(bars)));
    }
}

impl eframe::App for GloveApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // 1. pull samples and link status
        let mut finished = false;
        if let Some(session) = self.session.as_mut() {
            match session.pump() {
                Ok(events) => {
                    for event in events {
                        log::info!("{}", event.describe());
                        self.log_messages.push(format!("> {}", event.describe()));
                        self.link = Some(event);
                    }
                    if self.log_messages.len() > 8 {
                        let excess = self.log_messages.len() - 8;
                        self.log_messages.drain(..excess);
                    }
                }
                Err(e) => {
                    log::error!("Consumer failed: {e}");
                    self.error = Some(e.to_string());
                    finished = true;
                }
            }
            finished |= session.acquisition_finished();
        }
        if finished {
            self.stop();
        }

        let view = self.current_view();
        let stats = self.session.as_ref().map(|s| (s.stats(), s.rejected()));

        // 2. UI
        egui::SidePanel::left("status").min_width(260.0).show(ctx, |ui| {
            ui.add_space(10.0);
            ui.heading("Glove monitor");
            ui.separator();
            let status = self
                .link
                .as_ref()
                .map(LinkEvent::describe)
                .unwrap_or_else(|| "Starting...".to_owned());
            ui.label(status);
            if let Some((stats, rejected)) = stats {
                ui.monospace(format!("accepted     {}", stats.accepted));
                ui.monospace(format!("rate-limited {}", stats.rate_limited));
                ui.monospace(format!("decode errs  {}", stats.decode_errors));
                ui.monospace(format!("shape errs   {}", stats.shape_errors));
                ui.monospace(format!("rejected     {}", rejected));
            }
            ui.separator();
            ui.checkbox(&mut self.config.display.show_raw, "Show raw channels");
            ui.checkbox(&mut self.config.display.show_pressure, "Show pressure");
            let running = self.session.is_some();
            if ui
                .add_enabled(running, egui::Button::new("⏹ STOP"))
                .clicked()
            {
                self.stop();
            }
            if let Some(err) = &self.error {
                ui.label(egui::RichText::new(err).color(Color32::RED));
            }
            ui.add_space(10.0);
            egui::ScrollArea::vertical().max_height(140.0).show(ui, |ui| {
                for m in &self.log_messages {
                    ui.monospace(m);
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if view.frame.times.is_empty() {
                ui.label("Waiting for samples...");
            }
            self.draw_angles(ui, &view);
            if self.config.display.show_raw {
                self.draw_raw(ui, &view);
            }
            if self.config.display.show_pressure && !view.pressure.is_empty() {
                self.draw_pressure(ui, &view);
            }
        });

        if self.session.is_some() {
            ctx.request_repaint_after(self.config.idle_interval());
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.log("Window closed");
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::{GloveError, ManualSource, NotificationSource};
    use std::thread;
    use std::time::{Duration, Instant};

    #[test]
    fn plots_keep_last_data_after_session_ends() {
        let dir = tempfile::tempdir().unwrap();
        let config = GloveConfig {
            log_dir: dir.path().to_path_buf(),
            ..GloveConfig::default()
        };
        let mut source = Some(ManualSource::from_lines(["1.0,2.0"]));
        let session = LiveSession::spawn(
            move || {
                source
                    .take()
                    .map(|s| Box::new(s) as Box<dyn NotificationSource>)
                    .ok_or_else(|| GloveError::SourceNotFound("manual".into()))
            },
            &config,
        )
        .unwrap();
        let mut app = GloveApp::new(session, None, config);
        let deadline = Instant::now() + Duration::from_secs(2);
        while let Some(session) = app.session.as_mut() {
            if session.acquisition_finished() || Instant::now() > deadline {
                break;
            }
            thread::sleep(Duration::from_millis(5));
        }
        app.stop();
        assert!(app.session.is_none());
        assert!(app.error.is_none());
        let view = app.current_view();
        assert_eq!(view.frame.times.len(), 1);
        assert_eq!(view.frame.raw, vec![vec![1.0], vec![2.0]]);
        // a second stop is harmless and keeps the data
        app.stop();
        assert_eq!(app.current_view().frame.times.len(), 1);
    }
}
