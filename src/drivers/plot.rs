use std::io::Cursor;
use std::path::Path;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::*;
use crate::calibration::CalibrationTable;
use crate::drivers::error::GloveError;
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 600,
            background: RGBColor(10, 10, 10),
            palette: vec![BLUE, RED, GREEN, CYAN, MAGENTA, YELLOW, WHITE],
        }
    }
}
fn padded_bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if !lo.is_finite() || !hi.is_finite() {
        return (-1.0, 1.0);
    }
    let pad = ((hi - lo) * 0.05).max(1e-3);
    (lo - pad, hi + pad)
}
/// Line plot of several series sharing one time axis (seconds).
pub fn render_series_png(
    title: &str,
    y_label: &str,
    times: &[f64],
    series: &[(String, Vec<f64>)],
    style: PlotStyle,
) -> Result<Vec<u8>, GloveError> {
    if times.is_empty() || series.is_empty() {
        return Err(GloveError::Plot("nothing to plot yet".into()));
    }
    if let Some((label, _)) = series.iter().find(|(_, v)| v.len() != times.len()) {
        return Err(GloveError::Plot(format!(
            "series {label:?} does not match the time axis"
        )));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let t0 = times[0];
        let t1 = times[times.len() - 1].max(t0 + 1e-3);
        let (y_min, y_max) = padded_bounds(series.iter().flat_map(|(_, v)| v.iter().copied()));
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(title, ("sans-serif", 20).into_font().color(&WHITE))
            .set_label_area_size(LabelAreaPosition::Left, 55)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(t0..t1, y_min..y_max)?;
        chart
            .configure_mesh()
            .x_desc("Time (s)")
            .y_desc(y_label)
            .axis_desc_style(("sans-serif", 14).into_font().color(&WHITE))
            .label_style(("sans-serif", 12).into_font().color(&WHITE))
            .light_line_style(&WHITE.mix(0.1))
            .draw()?;
        for (idx, (label, values)) in series.iter().enumerate() {
            let color = style.palette[idx % style.palette.len()];
            let points = times.iter().copied().zip(values.iter().copied());
            chart
                .draw_series(LineSeries::new(points, &color))?
                .label(label.clone())
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
        }
        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .label_font(("sans-serif", 12).into_font().color(&WHITE))
            .border_style(&WHITE.mix(0.2))
            .background_style(&style.background)
            .draw()?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
/// Mean reading per known angle (dots) against the fitted line, one color per finger.
pub fn render_calibration_png(
    table: &CalibrationTable,
    style: PlotStyle,
) -> Result<Vec<u8>, GloveError> {
    if table.angles.is_empty() || table.observations.is_empty() {
        return Err(GloveError::Plot(
            "calibration table carries no observations".into(),
        ));
    }
    let (a_min, a_max) = padded_bounds(table.angles.iter().copied());
    let fitted = table.fingers.iter().flat_map(|cal| {
        [a_min, a_max]
            .into_iter()
            .filter_map(move |a| cal.reading_at(a))
    });
    let observed = table.observations.iter().flat_map(|row| row.iter().copied());
    let (r_min, r_max) = padded_bounds(observed.chain(fitted));
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                "Calibration curves",
                ("sans-serif", 20).into_font().color(&WHITE),
            )
            .set_label_area_size(LabelAreaPosition::Left, 55)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(a_min..a_max, r_min..r_max)?;
        chart
            .configure_mesh()
            .x_desc("Angle (degrees)")
            .y_desc("Reading")
            .axis_desc_style(("sans-serif", 14).into_font().color(&WHITE))
            .label_style(("sans-serif", 12).into_font().color(&WHITE))
            .light_line_style(&WHITE.mix(0.1))
            .draw()?;
        for (idx, (cal, row)) in table.fingers.iter().zip(&table.observations).enumerate() {
            let color = style.palette[idx % style.palette.len()];
            chart.draw_series(
                table
                    .angles
                    .iter()
                    .zip(row)
                    .map(|(a, r)| Circle::new((*a, *r), 4, color.filled())),
            )?;
            let line = [a_min, a_max]
                .into_iter()
                .filter_map(|a| cal.reading_at(a).map(|r| (a, r)));
            chart
                .draw_series(LineSeries::new(line, &color))?
                .label(format!("Finger {}", idx + 1))
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
        }
        chart
            .configure_series_labels()
            .label_font(("sans-serif", 12).into_font().color(&WHITE))
            .border_style(&WHITE.mix(0.2))
            .background_style(&style.background)
            .draw()?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
pub fn save_png(path: &Path, png: &[u8]) -> Result<(), GloveError> {
    std::fs::write(path, png)?;
    log::info!("Wrote {}", path.display());
    Ok(())
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, GloveError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| GloveError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::FingerCalibration;
    #[test]
    fn refuses_empty_or_ragged_series() {
        let style = PlotStyle::default();
        assert!(render_series_png("t", "y", &[], &[], style.clone()).is_err());
        let ragged = vec![("a".to_owned(), vec![1.0])];
        assert!(render_series_png("t", "y", &[0.0, 1.0], &ragged, style).is_err());
    }
    #[test]
    fn calibration_plot_needs_observations() {
        let table = CalibrationTable::new(vec![FingerCalibration {
            slope: 1.0,
            intercept: 0.0,
        }]);
        assert!(render_calibration_png(&table, PlotStyle::default()).is_err());
    }
    #[test]
    fn bounds_are_padded_and_never_degenerate() {
        let (lo, hi) = padded_bounds([3.0, 3.0].into_iter());
        assert!(lo < 3.0 && hi > 3.0);
        assert_eq!(padded_bounds(std::iter::empty()), (-1.0, 1.0));
    }
}
