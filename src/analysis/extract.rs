//! Per-file statistics extraction and cross-sample aggregation.
//!
//! Each extractor reads one FASTQ and owns its result; the orchestrator
//! fans them out over a rayon pool and the aggregator restores a
//! deterministic order by walking the canonical sample list.

use crate::{
    analysis::curve,
    errors::{Result, TrimsightError},
    fastq::{FastqReader, ReaderOptions},
    samples::{ReadDirection, SampleDescriptor},
};
use half::f16;
use ndarray::{Array2, Axis, concatenate};
use rayon::prelude::*;

fn open_reader(sample: &SampleDescriptor, subsample: usize, left_trim: usize) -> Result<FastqReader> {
    FastqReader::open(
        &sample.file_path,
        ReaderOptions { subsample, left_trim, ..ReaderOptions::default() },
    )
}

/// Builds a reads × positions matrix of cumulative expected error, cells
/// converted by `convert`, columns starting at `start_position`.
fn expected_error_matrix<T, F>(
    sample: &SampleDescriptor,
    start_position: usize,
    subsample: usize,
    left_trim: usize,
    convert: F,
) -> Result<Array2<T>>
where
    F: Fn(f64) -> T,
{
    let reader = open_reader(sample, subsample, left_trim)?;
    let scheme = reader.scheme();

    let mut cells = Vec::new();
    let mut width: Option<usize> = None;
    let mut read_count = 0usize;

    for record in reader {
        let record = record?;
        let cumulative = scheme.cumulative_expected_error(&record.quality);
        let sliced = &cumulative[start_position.min(cumulative.len())..];

        match width {
            None => width = Some(sliced.len()),
            Some(expected) if expected != sliced.len() => {
                return Err(TrimsightError::format(format!(
                    "reads of mixed length in {path} while building the expected error matrix",
                    path = sample.file_path.display()
                )));
            }
            Some(_) => {}
        }

        cells.extend(sliced.iter().map(|&value| convert(value)));
        read_count += 1;
    }

    Array2::from_shape_vec((read_count, width.unwrap_or(0)), cells)
        .map_err(|e| TrimsightError::invariant(format!("expected error matrix shape mismatch: {e}")))
}

/// Scorer-precision matrix: cumulative expected error truncated to whole
/// errors. A read sitting exactly on an integer threshold is treated as
/// below it.
pub(crate) fn expected_error_matrix_u8(
    sample: &SampleDescriptor,
    start_position: usize,
    subsample: usize,
    left_trim: usize,
) -> Result<Array2<u8>> {
    expected_error_matrix(sample, start_position, subsample, left_trim, |value| value as u8)
}

/// Curve-precision matrix: half-precision cells, full positional extent.
pub(crate) fn expected_error_matrix_f16(
    sample: &SampleDescriptor,
    subsample: usize,
    left_trim: usize,
) -> Result<Array2<f16>> {
    expected_error_matrix(sample, 0, subsample, left_trim, f16::from_f64)
}

/// Per-position percentile of one file's expected-error matrix.
pub(crate) fn expected_error_percentiles_for_file(
    sample: &SampleDescriptor,
    subsample: usize,
    percentile: usize,
    left_trim: usize,
) -> Result<Vec<f64>> {
    let matrix = expected_error_matrix_f16(sample, subsample, left_trim)?;
    let percentiles = matrix
        .columns()
        .into_iter()
        .map(|column| curve::percentile_of(column.iter().map(|value| value.to_f64()).collect(), percentile))
        .collect();
    Ok(percentiles)
}

/// For each read, the first position with quality ≤ 2, or the read length
/// when no such position exists.
pub(crate) fn first_q2_array(sample: &SampleDescriptor, subsample: usize, left_trim: usize) -> Result<Vec<u16>> {
    let reader = open_reader(sample, subsample, left_trim)?;
    let scheme = reader.scheme();

    let mut positions = Vec::new();
    for record in reader {
        let record = record?;
        let first_q2 = record
            .quality
            .iter()
            .position(|&character| scheme.score_of(character) <= 2)
            .unwrap_or(record.len());
        positions.push(first_q2 as u16);
    }
    Ok(positions)
}

/// For each read, the first position holding an `N`, or the read length.
pub(crate) fn first_n_array(sample: &SampleDescriptor, subsample: usize, left_trim: usize) -> Result<Vec<u16>> {
    let reader = open_reader(sample, subsample, left_trim)?;

    let mut positions = Vec::new();
    for record in reader {
        let record = record?;
        let first_n = record
            .sequence
            .iter()
            .position(|&base| base == b'N')
            .unwrap_or(record.len());
        positions.push(first_n as u16);
    }
    Ok(positions)
}

/// Canonical aggregation order: the forward-direction descriptors in
/// enumeration order.
pub(crate) fn sample_order(samples: &[SampleDescriptor]) -> Vec<SampleDescriptor> {
    samples
        .iter()
        .filter(|sample| sample.direction == ReadDirection::Forward)
        .cloned()
        .collect()
}

/// Runs `build` over `files` in parallel and returns the results arranged
/// by `order` (matching on `same_sample`). The first canonical sample must
/// have a result; later canonical samples without one are skipped.
fn per_file_in_canonical_order<T, F>(files: &[SampleDescriptor], order: &[SampleDescriptor], build: F) -> Result<Vec<T>>
where
    T: Send,
    F: Fn(&SampleDescriptor) -> Result<T> + Sync,
{
    let built: Vec<(SampleDescriptor, T)> = files
        .par_iter()
        .map(|sample| Ok((sample.clone(), build(sample)?)))
        .collect::<Result<_>>()?;

    let mut slots: Vec<(SampleDescriptor, Option<T>)> =
        built.into_iter().map(|(descriptor, value)| (descriptor, Some(value))).collect();

    let mut ordered = Vec::with_capacity(slots.len());
    for (index, canonical) in order.iter().enumerate() {
        let matched = slots
            .iter_mut()
            .find(|(descriptor, value)| value.is_some() && descriptor.same_sample(canonical));
        match matched {
            Some((_, value)) => ordered.push(value.take().expect("matched slot is occupied")),
            None if index == 0 => {
                return Err(TrimsightError::invariant(
                    "no per-file result matches the first sample in canonical order",
                ));
            }
            None => {}
        }
    }
    Ok(ordered)
}

fn direction_files(samples: &[SampleDescriptor], direction: ReadDirection) -> Vec<SampleDescriptor> {
    samples.iter().filter(|sample| sample.direction == direction).cloned().collect()
}

fn combined_matrix_for_direction(
    files: &[SampleDescriptor],
    order: &[SampleDescriptor],
    subsample: usize,
    start_position: usize,
    primer_length: usize,
) -> Result<Array2<u8>> {
    let matrices = per_file_in_canonical_order(files, order, |sample| {
        expected_error_matrix_u8(sample, start_position, subsample, primer_length)
    })?;

    let views: Vec<_> = matrices.iter().map(|matrix| matrix.view()).collect();
    let stacked = concatenate(Axis(0), &views).map_err(|e| {
        TrimsightError::validation(format!("per-file expected error matrices do not stack: {e}"))
    })?;

    // Position-major, standard layout: O(1) contiguous row per position.
    Ok(stacked.reversed_axes().as_standard_layout().to_owned())
}

/// Aggregated scorer matrices for both directions, rows indexing positions
/// from the minimum trim position onward and columns indexing reads.
pub(crate) fn combined_error_matrices_for_both_ends(
    samples: &[SampleDescriptor],
    order: &[SampleDescriptor],
    subsample: usize,
    minimum_trim_positions: (usize, usize),
    forward_primer_length: usize,
    reverse_primer_length: usize,
) -> Result<(Array2<u8>, Array2<u8>)> {
    let forward = combined_matrix_for_direction(
        &direction_files(samples, ReadDirection::Forward),
        order,
        subsample,
        minimum_trim_positions.0,
        forward_primer_length,
    )?;
    let reverse = combined_matrix_for_direction(
        &direction_files(samples, ReadDirection::Reverse),
        order,
        subsample,
        minimum_trim_positions.1,
        reverse_primer_length,
    )?;
    Ok((forward, reverse))
}

fn combined_offender_array_for_direction<F>(
    files: &[SampleDescriptor],
    order: &[SampleDescriptor],
    build: F,
) -> Result<Vec<u16>>
where
    F: Fn(&SampleDescriptor) -> Result<Vec<u16>> + Sync,
{
    Ok(per_file_in_canonical_order(files, order, build)?.concat())
}

/// Aggregated first-Q2 arrays for both directions.
pub(crate) fn combined_q2_arrays_for_both_ends(
    samples: &[SampleDescriptor],
    order: &[SampleDescriptor],
    subsample: usize,
    forward_primer_length: usize,
    reverse_primer_length: usize,
) -> Result<(Vec<u16>, Vec<u16>)> {
    let forward = combined_offender_array_for_direction(
        &direction_files(samples, ReadDirection::Forward),
        order,
        |sample| first_q2_array(sample, subsample, forward_primer_length),
    )?;
    let reverse = combined_offender_array_for_direction(
        &direction_files(samples, ReadDirection::Reverse),
        order,
        |sample| first_q2_array(sample, subsample, reverse_primer_length),
    )?;
    Ok((forward, reverse))
}

/// Aggregated first-N arrays for both directions.
pub(crate) fn combined_first_n_arrays_for_both_ends(
    samples: &[SampleDescriptor],
    order: &[SampleDescriptor],
    subsample: usize,
    forward_primer_length: usize,
    reverse_primer_length: usize,
) -> Result<(Vec<u16>, Vec<u16>)> {
    let forward = combined_offender_array_for_direction(
        &direction_files(samples, ReadDirection::Forward),
        order,
        |sample| first_n_array(sample, subsample, forward_primer_length),
    )?;
    let reverse = combined_offender_array_for_direction(
        &direction_files(samples, ReadDirection::Reverse),
        order,
        |sample| first_n_array(sample, subsample, reverse_primer_length),
    )?;
    Ok((forward, reverse))
}
