//! PNG rendering of a fitted expected-error curve against its observed
//! envelope.

use crate::{
    analysis::curve::ExponentialFit,
    errors::{Result, TrimsightError},
};
use image::{ExtendedColorType, ImageEncoder, codecs::png::PngEncoder};
use plotters::prelude::*;

const PLOT_WIDTH: u32 = 640;
const PLOT_HEIGHT: u32 = 480;

fn plot_error(error: impl std::fmt::Display) -> TrimsightError {
    TrimsightError::Plot { message: error.to_string() }
}

/// Renders the observed envelope and the model predictions into a PNG,
/// annotated with the fitted equation and r².
pub(crate) fn render_curve_plot(
    x_values: &[f64],
    observed: &[f64],
    predicted: &[f64],
    fit: &ExponentialFit,
    title: &str,
) -> Result<Vec<u8>> {
    let mut rgb_buffer = vec![255u8; (PLOT_WIDTH * PLOT_HEIGHT * 3) as usize];

    {
        let root = BitMapBackend::with_buffer(&mut rgb_buffer, (PLOT_WIDTH, PLOT_HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(plot_error)?;

        let x_max = x_values.last().copied().unwrap_or(1.0).max(1.0);
        let y_max = observed
            .iter()
            .chain(predicted)
            .fold(0.0f64, |max, &value| max.max(value))
            .max(1e-6);

        let mut chart = ChartBuilder::on(&root)
            .caption(title, ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(0.0..x_max, 0.0..y_max * 1.05)
            .map_err(plot_error)?;

        chart
            .configure_mesh()
            .x_desc("Position in Read")
            .y_desc("Expected Error")
            .draw()
            .map_err(plot_error)?;

        chart
            .draw_series(LineSeries::new(
                x_values.iter().zip(observed).map(|(&x, &y)| (x, y)),
                &BLACK,
            ))
            .map_err(plot_error)?
            .label("Observed")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLACK));

        chart
            .draw_series(LineSeries::new(
                x_values.iter().zip(predicted).map(|(&x, &y)| (x, y)),
                &BLUE,
            ))
            .map_err(plot_error)?
            .label("Predicted")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], BLUE));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::UpperLeft)
            .border_style(BLACK)
            .background_style(WHITE.mix(0.8))
            .draw()
            .map_err(plot_error)?;

        let annotation_y = predicted.iter().fold(0.0f64, |max, &value| max.max(value)) * 0.45;
        let equation = fit.to_string();
        let r_squared = format!("r^2={:.6}", fit.r_squared.unwrap_or(f64::NAN));
        chart
            .plotting_area()
            .draw(&Text::new(equation, (0.0, annotation_y), ("sans-serif", 15).into_font()))
            .map_err(plot_error)?;
        chart
            .plotting_area()
            .draw(&Text::new(r_squared, (0.0, annotation_y * 0.9), ("sans-serif", 15).into_font()))
            .map_err(plot_error)?;

        root.present().map_err(plot_error)?;
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(&rgb_buffer, PLOT_WIDTH, PLOT_HEIGHT, ExtendedColorType::Rgb8)
        .map_err(plot_error)?;
    Ok(png)
}
