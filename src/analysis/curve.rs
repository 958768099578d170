//! Percentile envelope of per-position expected error and the exponential
//! model fitted to it.

use crate::{
    analysis::{extract, plot},
    errors::{Result, TrimsightError},
    samples::{ReadDirection, SampleDescriptor},
};
use rayon::prelude::*;
use statrs::statistics::{Data, OrderStatistics};

const INITIAL_GUESS: [f64; 3] = [0.03, 0.015, 0.0];
const LOWER_BOUNDS: [f64; 3] = [-2.0, -1.0, -8.0];
const UPPER_BOUNDS: [f64; 3] = [2.0, 1.0, 8.0];
const MAX_ITERATIONS: usize = 500;

/// A fitted `a·exp(b·x) + c` model of expected error by read position.
#[derive(Debug, Clone)]
pub struct ExponentialFit {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub covariance: Option<[[f64; 3]; 3]>,
    pub r_squared: Option<f64>,
    pub curve_png: Option<Vec<u8>>,
}

impl ExponentialFit {
    #[inline]
    pub fn value(&self, x: f64) -> f64 {
        self.a * (self.b * x).exp() + self.c
    }
}

impl std::fmt::Display for ExponentialFit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.c < 0.0 { '-' } else { '+' };
        write!(
            f,
            "{a:.4}e^({b:.4}x) {sign} {c:.4}",
            a = self.a,
            b = self.b,
            c = self.c.abs()
        )
    }
}

/// The `percentile`-th percentile of `values`.
pub fn percentile_of(values: Vec<f64>, percentile: usize) -> f64 {
    Data::new(values).percentile(percentile)
}

/// Fits the exponential model to `(x_values, y_values)` by damped least
/// squares, reporting r² against the observations. When `plot_title` is
/// given, a rendered PNG of observed and predicted series is attached.
pub fn fit_exponential_curve(x_values: &[f64], y_values: &[f64], plot_title: Option<&str>) -> Result<ExponentialFit> {
    if x_values.len() != y_values.len() || x_values.len() < 3 {
        return Err(TrimsightError::CurveFit {
            message: format!(
                "need at least 3 paired observations, got {x} x-values and {y} y-values",
                x = x_values.len(),
                y = y_values.len()
            ),
        });
    }

    let (params, jtj) = levenberg_marquardt(x_values, y_values)?;
    let [a, b, c] = params;

    let mut fit = ExponentialFit { a, b, c, covariance: None, r_squared: None, curve_png: None };

    let predictions: Vec<f64> = x_values.iter().map(|&x| fit.value(x)).collect();
    let residual_sum: f64 = y_values
        .iter()
        .zip(&predictions)
        .map(|(&y, &p)| (y - p).powi(2))
        .sum();
    if x_values.len() > 3 {
        let residual_variance = residual_sum / (x_values.len() - 3) as f64;
        fit.covariance = invert3(jtj).map(|inverse| inverse.map(|row| row.map(|v| v * residual_variance)));
    }

    let r = pearson_r(y_values, &predictions);
    fit.r_squared = Some(r * r);

    if let Some(title) = plot_title {
        fit.curve_png = Some(plot::render_curve_plot(x_values, y_values, &predictions, &fit, title)?);
    }

    Ok(fit)
}

/// Fits forward and reverse expected-error curves for a classified sample
/// set: per-file percentile vectors (in parallel), averaged into one
/// envelope per direction, then fitted.
pub fn calculate_expected_error_curves(
    samples: &[SampleDescriptor],
    subsample: usize,
    percentile: usize,
    make_plots: bool,
    forward_primer_length: usize,
    reverse_primer_length: usize,
) -> Result<(ExponentialFit, ExponentialFit)> {
    let group_id = samples
        .first()
        .map(|sample| sample.group.clone())
        .ok_or_else(|| TrimsightError::validation("cannot fit expected error curves without any samples"))?;

    let forward_envelope = percentile_envelope(samples, ReadDirection::Forward, subsample, percentile, forward_primer_length)?;
    let reverse_envelope = percentile_envelope(samples, ReadDirection::Reverse, subsample, percentile, reverse_primer_length)?;

    let forward_title = format!("{group_id} forward reads. {} percentile", ordinal(percentile));
    let reverse_title = format!("{group_id} reverse reads. {} percentile", ordinal(percentile));

    let forward_curve = fit_curve_to_envelope(&forward_envelope, make_plots.then_some(forward_title.as_str()))?;
    let reverse_curve = fit_curve_to_envelope(&reverse_envelope, make_plots.then_some(reverse_title.as_str()))?;
    Ok((forward_curve, reverse_curve))
}

fn fit_curve_to_envelope(envelope: &[f64], plot_title: Option<&str>) -> Result<ExponentialFit> {
    let x_values: Vec<f64> = (0..envelope.len()).map(|position| position as f64).collect();
    fit_exponential_curve(&x_values, envelope, plot_title)
}

/// Element-wise mean of the per-file percentile vectors for one direction.
fn percentile_envelope(
    samples: &[SampleDescriptor],
    direction: ReadDirection,
    subsample: usize,
    percentile: usize,
    primer_length: usize,
) -> Result<Vec<f64>> {
    let files: Vec<&SampleDescriptor> = samples.iter().filter(|sample| sample.direction == direction).collect();
    if files.is_empty() {
        return Err(TrimsightError::validation(format!(
            "no {direction:?} reads available for the expected error envelope"
        )));
    }

    let per_file: Vec<Vec<f64>> = files
        .par_iter()
        .map(|sample| extract::expected_error_percentiles_for_file(sample, subsample, percentile, primer_length))
        .collect::<Result<_>>()?;

    let length = per_file[0].len();
    if per_file.iter().any(|vector| vector.len() != length) {
        return Err(TrimsightError::validation(
            "per-file expected error vectors disagree in length; reads are not of uniform length",
        ));
    }

    let mut envelope = vec![0.0; length];
    for vector in &per_file {
        for (total, value) in envelope.iter_mut().zip(vector) {
            *total += value;
        }
    }
    for total in &mut envelope {
        *total /= per_file.len() as f64;
    }
    Ok(envelope)
}

/// Levenberg–Marquardt on the 3-parameter model, with trial steps clamped
/// to the coefficient bounds. Returns the solution and Jᵀ J at the
/// solution (for covariance estimation).
fn levenberg_marquardt(x_values: &[f64], y_values: &[f64]) -> Result<([f64; 3], [[f64; 3]; 3])> {
    let mut params = INITIAL_GUESS;
    let mut sse = sum_squared_error(x_values, y_values, &params);
    if !sse.is_finite() {
        return Err(TrimsightError::CurveFit {
            message: "residuals are not finite at the initial guess".to_string(),
        });
    }

    let mut lambda = 1e-3;
    for _ in 0..MAX_ITERATIONS {
        let (jtj, jtr) = normal_equations(x_values, y_values, &params);

        let mut damped = jtj;
        for i in 0..3 {
            damped[i][i] += lambda * jtj[i][i].max(1e-12);
        }

        let Some(step) = solve3(damped, jtr) else {
            lambda *= 10.0;
            if lambda > 1e12 {
                break;
            }
            continue;
        };

        let mut trial = params;
        for i in 0..3 {
            trial[i] = (params[i] + step[i]).clamp(LOWER_BOUNDS[i], UPPER_BOUNDS[i]);
        }

        let trial_sse = sum_squared_error(x_values, y_values, &trial);
        if trial_sse.is_finite() && trial_sse < sse {
            let improvement = sse - trial_sse;
            let step_norm = step.iter().map(|s| s * s).sum::<f64>().sqrt();
            params = trial;
            sse = trial_sse;
            lambda = (lambda * 0.5).max(1e-12);
            if step_norm < 1e-10 || improvement <= 1e-14 * sse.max(1.0) {
                break;
            }
        } else {
            lambda *= 10.0;
            if lambda > 1e12 {
                break;
            }
        }
    }

    let (jtj, _) = normal_equations(x_values, y_values, &params);
    Ok((params, jtj))
}

fn sum_squared_error(x_values: &[f64], y_values: &[f64], params: &[f64; 3]) -> f64 {
    let [a, b, c] = *params;
    x_values
        .iter()
        .zip(y_values)
        .map(|(&x, &y)| {
            let residual = y - (a * (b * x).exp() + c);
            residual * residual
        })
        .sum()
}

/// Accumulates Jᵀ J and Jᵀ r for the analytic Jacobian
/// `[e^(bx), a·x·e^(bx), 1]`.
fn normal_equations(x_values: &[f64], y_values: &[f64], params: &[f64; 3]) -> ([[f64; 3]; 3], [f64; 3]) {
    let [a, b, c] = *params;
    let mut jtj = [[0.0; 3]; 3];
    let mut jtr = [0.0; 3];

    for (&x, &y) in x_values.iter().zip(y_values) {
        let exponential = (b * x).exp();
        let jacobian = [exponential, a * x * exponential, 1.0];
        let residual = y - (a * exponential + c);

        for i in 0..3 {
            jtr[i] += jacobian[i] * residual;
            for j in 0..3 {
                jtj[i][j] += jacobian[i] * jacobian[j];
            }
        }
    }
    (jtj, jtr)
}

/// Solves a 3×3 system by Gaussian elimination with partial pivoting.
fn solve3(matrix: [[f64; 3]; 3], rhs: [f64; 3]) -> Option<[f64; 3]> {
    let mut augmented = [[0.0; 4]; 3];
    for i in 0..3 {
        augmented[i][..3].copy_from_slice(&matrix[i]);
        augmented[i][3] = rhs[i];
    }

    for column in 0..3 {
        let pivot_row = (column..3).max_by(|&a, &b| augmented[a][column].abs().total_cmp(&augmented[b][column].abs()))?;
        if augmented[pivot_row][column].abs() < 1e-300 {
            return None;
        }
        augmented.swap(column, pivot_row);

        for row in column + 1..3 {
            let factor = augmented[row][column] / augmented[column][column];
            for k in column..4 {
                augmented[row][k] -= factor * augmented[column][k];
            }
        }
    }

    let mut solution = [0.0; 3];
    for row in (0..3).rev() {
        let mut value = augmented[row][3];
        for k in row + 1..3 {
            value -= augmented[row][k] * solution[k];
        }
        solution[row] = value / augmented[row][row];
    }
    solution.iter().all(|v| v.is_finite()).then_some(solution)
}

fn invert3(matrix: [[f64; 3]; 3]) -> Option<[[f64; 3]; 3]> {
    let mut inverse = [[0.0; 3]; 3];
    for column in 0..3 {
        let mut unit = [0.0; 3];
        unit[column] = 1.0;
        let solved = solve3(matrix, unit)?;
        for row in 0..3 {
            inverse[row][column] = solved[row];
        }
    }
    Some(inverse)
}

fn pearson_r(observed: &[f64], predicted: &[f64]) -> f64 {
    let n = observed.len() as f64;
    let mean_observed = observed.iter().sum::<f64>() / n;
    let mean_predicted = predicted.iter().sum::<f64>() / n;

    let mut covariance = 0.0;
    let mut variance_observed = 0.0;
    let mut variance_predicted = 0.0;
    for (&y, &p) in observed.iter().zip(predicted) {
        covariance += (y - mean_observed) * (p - mean_predicted);
        variance_observed += (y - mean_observed).powi(2);
        variance_predicted += (p - mean_predicted).powi(2);
    }

    let denominator = (variance_observed * variance_predicted).sqrt();
    if denominator == 0.0 { 0.0 } else { covariance / denominator }
}

/// "83" -> "83rd", "11" -> "11th".
fn ordinal(number: usize) -> String {
    let suffix = match (number % 10, number % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{number}{suffix}")
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn recovers_exponential_coefficients_from_clean_data() {
        let x: Vec<f64> = (0..=200).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|&x| 0.05 * (0.02 * x).exp() + 0.5).collect();

        let fit = fit_exponential_curve(&x, &y, None).unwrap();
        assert_abs_diff_eq!(fit.a, 0.05, epsilon = 1e-2);
        assert_abs_diff_eq!(fit.b, 0.02, epsilon = 2e-3);
        assert_abs_diff_eq!(fit.c, 0.5, epsilon = 1e-1);
        assert!(fit.r_squared.unwrap() > 0.999);
        assert!(fit.covariance.is_some());
        assert!(fit.curve_png.is_none());
    }

    #[test]
    fn fitted_model_evaluates_the_exponential() {
        let fit = ExponentialFit { a: 2.0, b: 0.1, c: -1.0, covariance: None, r_squared: None, curve_png: None };
        assert_abs_diff_eq!(fit.value(0.0), 1.0);
        assert_abs_diff_eq!(fit.value(10.0), 2.0 * 1f64.exp() - 1.0, epsilon = 1e-12);
        assert_eq!(fit.to_string(), "2.0000e^(0.1000x) - 1.0000");
    }

    #[test]
    fn too_few_points_is_a_curve_fit_error() {
        assert!(fit_exponential_curve(&[0.0, 1.0], &[0.0, 1.0], None).is_err());
        assert!(fit_exponential_curve(&[0.0, 1.0, 2.0], &[0.0, 1.0], None).is_err());
    }

    #[test]
    fn percentile_brackets_the_distribution() {
        let values: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let median = percentile_of(values.clone(), 50);
        assert!((49.0..=52.0).contains(&median));
        assert_abs_diff_eq!(percentile_of(values.clone(), 100), 100.0);
        assert_abs_diff_eq!(percentile_of(vec![7.0; 10], 83), 7.0);
    }

    #[test]
    fn pearson_r_of_identical_series_is_one() {
        let series: Vec<f64> = (0..50).map(|i| (i as f64).sin()).collect();
        assert_abs_diff_eq!(pearson_r(&series, &series), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn ordinals_handle_teens() {
        assert_eq!(ordinal(83), "83rd");
        assert_eq!(ordinal(21), "21st");
        assert_eq!(ordinal(42), "42nd");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(12), "12th");
        assert_eq!(ordinal(50), "50th");
    }
}
