//! The two analysis pipelines: enumeration and validation of the input
//! directory, parallel per-file extraction, curve fitting, and scoring.

pub mod curve;
pub(crate) mod extract;
pub(crate) mod plot;
pub mod trim;

pub use curve::ExponentialFit;
pub use trim::TrimParameterSet;

use crate::{
    errors::{Result, TrimsightError},
    fastq, io,
    samples::{self, NamingConvention, ReadDirection, SampleDescriptor},
};
use log::{error, info};
use rayon::prelude::*;
use std::path::Path;

/// Gzip ratio used when estimating the uncompressed size of input data.
const GZIP_EXPANSION_FACTOR: f64 = 3.5;

/// Parameters of one analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOptions {
    /// Amplicon length plus the required overlap.
    pub minimum_combined_read_length: usize,
    /// Read every `subsample`-th record; values below 1 behave as 1.
    pub subsample: usize,
    /// Percentile of per-position expected error used for the curve fit.
    pub percentile: usize,
    /// Render the fitted curves to PNG.
    pub make_expected_error_plots: bool,
    pub forward_primer_length: usize,
    pub reverse_primer_length: usize,
    pub naming_convention: NamingConvention,
    /// Worker threads for per-file extraction; defaults to
    /// `max(1, physical cores - 1)`.
    pub workers: Option<usize>,
}

impl AnalysisOptions {
    pub fn new(minimum_combined_read_length: usize) -> AnalysisOptions {
        AnalysisOptions {
            minimum_combined_read_length,
            subsample: 1,
            percentile: 83,
            make_expected_error_plots: false,
            forward_primer_length: 0,
            reverse_primer_length: 0,
            naming_convention: NamingConvention::NoNonsense,
            workers: None,
        }
    }
}

/// The ranked candidate table and the curves it was scored against.
#[derive(Debug)]
pub struct AnalysisResults {
    pub result_table: Vec<TrimParameterSet>,
    pub forward_curve: ExponentialFit,
    pub reverse_curve: ExponentialFit,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Variant {
    Full,
    Lite,
}

/// Full pipeline: expected-error ceilings plus the N and Q2 gates.
pub fn perform_analysis(input_directory: impl AsRef<Path>, options: &AnalysisOptions) -> Result<AnalysisResults> {
    run(input_directory.as_ref(), options, Variant::Full)
}

/// Lite pipeline: expected-error ceilings only.
pub fn perform_analysis_lite(input_directory: impl AsRef<Path>, options: &AnalysisOptions) -> Result<AnalysisResults> {
    run(input_directory.as_ref(), options, Variant::Lite)
}

fn worker_count(requested: Option<usize>) -> usize {
    requested
        .filter(|&workers| workers > 0)
        .unwrap_or_else(|| num_cpus::get_physical().saturating_sub(1).max(1))
}

fn run(input_directory: &Path, options: &AnalysisOptions, variant: Variant) -> Result<AnalysisResults> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(worker_count(options.workers))
        .build()
        .map_err(|e| TrimsightError::invariant(format!("could not build the worker pool: {e}")))?;

    pool.install(|| run_in_pool(input_directory, options, variant))
}

fn run_in_pool(input_directory: &Path, options: &AnalysisOptions, variant: Variant) -> Result<AnalysisResults> {
    let samples = samples::find_samples_in_folder(input_directory, options.naming_convention)?;
    if samples.is_empty() {
        return Err(TrimsightError::validation(format!(
            "no fastq files found in input directory {}",
            input_directory.display()
        )));
    }

    let pair_table = samples::build_pair_table(&samples);
    if !pair_table.unpaired.is_empty() {
        for unpaired in &pair_table.unpaired {
            error!("no mate found for {unpaired}");
        }
        return Err(TrimsightError::validation(
            "some read files have no mate; see the log for the specific files",
        ));
    }

    let order = extract::sample_order(&samples);
    let (forward_read_length, reverse_read_length) = check_read_lengths(&samples)?;
    info!("forward read length: {forward_read_length}");
    info!("reverse read length: {reverse_read_length}");

    if options.forward_primer_length >= forward_read_length || options.reverse_primer_length >= reverse_read_length {
        return Err(TrimsightError::validation(
            "primer length meets or exceeds the read length for at least one direction",
        ));
    }
    let forward_length = forward_read_length - options.forward_primer_length;
    let reverse_length = reverse_read_length - options.reverse_primer_length;

    let (forward_curve, reverse_curve) = curve::calculate_expected_error_curves(
        &samples,
        options.subsample,
        options.percentile,
        options.make_expected_error_plots,
        options.forward_primer_length,
        options.reverse_primer_length,
    )?;

    let minimum_trim_positions =
        trim::minimum_trim_positions(forward_length, reverse_length, options.minimum_combined_read_length);
    let trim_positions =
        trim::all_trim_locations(forward_length, reverse_length, options.minimum_combined_read_length);

    let result_table = match variant {
        Variant::Full => {
            let (forward_q2, reverse_q2) = extract::combined_q2_arrays_for_both_ends(
                &samples,
                &order,
                options.subsample,
                options.forward_primer_length,
                options.reverse_primer_length,
            )?;
            let (forward_first_n, reverse_first_n) = extract::combined_first_n_arrays_for_both_ends(
                &samples,
                &order,
                options.subsample,
                options.forward_primer_length,
                options.reverse_primer_length,
            )?;
            let (forward_matrix, reverse_matrix) = extract::combined_error_matrices_for_both_ends(
                &samples,
                &order,
                options.subsample,
                minimum_trim_positions,
                options.forward_primer_length,
                options.reverse_primer_length,
            )?;

            trim::run_trim_parameter_test(
                &forward_matrix,
                &reverse_matrix,
                &forward_first_n,
                &reverse_first_n,
                &forward_q2,
                &reverse_q2,
                &trim_positions,
                minimum_trim_positions,
                Some(&forward_curve),
                Some(&reverse_curve),
                options.forward_primer_length,
                options.reverse_primer_length,
            )
        }
        Variant::Lite => {
            let (forward_matrix, reverse_matrix) = extract::combined_error_matrices_for_both_ends(
                &samples,
                &order,
                options.subsample,
                minimum_trim_positions,
                options.forward_primer_length,
                options.reverse_primer_length,
            )?;

            trim::run_trim_parameter_test_lite(
                &forward_matrix,
                &reverse_matrix,
                &trim_positions,
                minimum_trim_positions,
                Some(&forward_curve),
                Some(&reverse_curve),
                options.forward_primer_length,
                options.reverse_primer_length,
            )
        }
    };

    Ok(AnalysisResults { result_table, forward_curve, reverse_curve })
}

/// Probes every file's read length in parallel and validates that the
/// directory is analyzable: equal forward/reverse file counts, one uniform
/// length per direction.
pub(crate) fn check_read_lengths(samples: &[SampleDescriptor]) -> Result<(usize, usize)> {
    let length_data: Vec<(ReadDirection, (usize, bool))> = samples
        .par_iter()
        .map(|sample| Ok((sample.direction, fastq::estimate_read_length(&sample.file_path)?)))
        .collect::<Result<_>>()?;

    let lengths_for = |direction: ReadDirection| -> Vec<(usize, bool)> {
        length_data
            .iter()
            .filter(|(d, _)| *d == direction)
            .map(|(_, data)| *data)
            .collect()
    };
    let read1_data = lengths_for(ReadDirection::Forward);
    let read2_data = lengths_for(ReadDirection::Reverse);

    let mut files_pass_check = true;
    if read1_data.len() != read2_data.len() {
        error!(
            "there appear to be different numbers of forward and reverse fastq files in the sequence folder: {} forward and {} reverse",
            read1_data.len(),
            read2_data.len()
        );
        files_pass_check = false;
    }

    fn unique_lengths(mut data: Vec<(usize, bool)>) -> Vec<(usize, bool)> {
        data.sort_unstable();
        data.dedup();
        data
    }
    let read1_set = unique_lengths(read1_data);
    let read2_set = unique_lengths(read2_data);

    for (set, direction) in [(&read1_set, "forward"), (&read2_set, "reverse")] {
        if set.len() != 1 {
            error!("{direction} read files appear to be of different lengths or of varied lengths: {set:?}");
            files_pass_check = false;
        }
        if set.iter().any(|&(_, uniform)| !uniform) {
            error!("{direction} reads appear to not be of consistent length: {set:?}");
            files_pass_check = false;
        }
    }

    if !files_pass_check || read1_set.is_empty() || read2_set.is_empty() {
        return Err(TrimsightError::validation(
            "unable to validate fastq files enough to perform this operation; please check the log for the specific errors",
        ));
    }
    Ok((read1_set[0].0, read2_set[0].0))
}

/// Total input size in bytes, with gzip-compressed files scaled by an
/// empirical expansion factor.
pub fn estimated_fastq_size_sum(samples: &[SampleDescriptor]) -> Result<u64> {
    let mut sum = 0u64;
    for sample in samples {
        let size = std::fs::metadata(&sample.file_path)?.len();
        sum += if io::is_gzipped(&sample.file_path)? {
            (size as f64 * GZIP_EXPANSION_FACTOR).round() as u64
        } else {
            size
        };
    }
    Ok(sum)
}

/// The automatic subsample rate: roughly 10 per gigabyte of input. May be
/// 0 for small inputs; the reader treats that as reading every record.
pub fn auto_subsample_rate(samples: &[SampleDescriptor]) -> Result<usize> {
    let gigabytes = estimated_fastq_size_sum(samples)? as f64 / 1_000_000_000.0;
    Ok((gigabytes * 10.0).round() as usize)
}
