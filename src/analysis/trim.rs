//! Candidate trim-position enumeration and retention scoring.
//!
//! Positions are 0-indexed and relative to the primer-stripped read
//! throughout this module; only the reported [`TrimParameterSet`] positions
//! are 1-indexed and primer-inclusive.

use crate::analysis::curve::ExponentialFit;
use log::error;
use ndarray::Array2;

/// One scored candidate pair. `score` rewards read retention and penalizes
/// permissive expected-error ceilings.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimParameterSet {
    pub forward_trim_position: usize,
    pub reverse_trim_position: usize,
    pub forward_max_expected_error: i64,
    pub reverse_max_expected_error: i64,
    pub read_retention: f64,
    pub score: f64,
}

impl TrimParameterSet {
    pub fn new(
        forward_trim_position: usize,
        reverse_trim_position: usize,
        forward_max_expected_error: i64,
        reverse_max_expected_error: i64,
        read_retention: f64,
    ) -> TrimParameterSet {
        let forward_penalty = (forward_max_expected_error - 1).pow(2);
        let reverse_penalty = (reverse_max_expected_error - 1).pow(2);
        let score = read_retention * 100.0 - (forward_penalty + reverse_penalty) as f64;

        TrimParameterSet {
            forward_trim_position,
            reverse_trim_position,
            forward_max_expected_error,
            reverse_max_expected_error,
            read_retention,
            score,
        }
    }
}

/// Smallest usable post-trim lengths for each direction given the combined
/// length requirement. When the reads cannot reach the requirement at all,
/// the error is logged and the full lengths are returned (a single
/// degenerate candidate). Minimums clamp at one base.
pub fn lowest_trim_base_for_paired_reads(
    forward_length: usize,
    reverse_length: usize,
    minimum_combined_length: usize,
) -> (usize, usize) {
    if forward_length + reverse_length < minimum_combined_length {
        error!("combined read lengths are less than the required combined length");
        return (forward_length, reverse_length);
    }
    let minimum_forward_length = minimum_combined_length.saturating_sub(reverse_length).max(1);
    let minimum_reverse_length = minimum_combined_length.saturating_sub(forward_length).max(1);
    (minimum_forward_length, minimum_reverse_length)
}

/// 0-indexed positions of the first candidate pair; also the start
/// positions from which the scorer's expected-error matrices are built.
pub fn minimum_trim_positions(
    forward_length: usize,
    reverse_length: usize,
    minimum_combined_length: usize,
) -> (usize, usize) {
    let (minimum_forward, minimum_reverse) =
        lowest_trim_base_for_paired_reads(forward_length, reverse_length, minimum_combined_length);
    (minimum_forward - 1, minimum_reverse - 1)
}

/// Every candidate pair: starting from the shortest usable forward read,
/// each step trades one forward base for one reverse base, so every pair
/// meets the combined-length requirement exactly.
pub fn all_trim_locations(
    forward_length: usize,
    reverse_length: usize,
    minimum_combined_length: usize,
) -> Vec<(usize, usize)> {
    let (minimum_forward, _) =
        lowest_trim_base_for_paired_reads(forward_length, reverse_length, minimum_combined_length);

    let mut forward_position = minimum_forward - 1;
    let mut reverse_position = reverse_length - 1;
    let mut trim_positions = Vec::with_capacity(forward_length - minimum_forward + 1);
    while forward_position < forward_length {
        trim_positions.push((forward_position, reverse_position));
        forward_position += 1;
        match reverse_position.checked_sub(1) {
            Some(previous) => reverse_position = previous,
            None => break,
        }
    }
    trim_positions
}

/// Coarse variant of [`all_trim_locations`]: the two endpoints plus up to
/// `intermediate_locations` equispaced pairs between them.
pub fn coarse_trim_locations(
    forward_length: usize,
    reverse_length: usize,
    minimum_combined_length: usize,
    intermediate_locations: usize,
) -> Vec<(usize, usize)> {
    let (minimum_forward, minimum_reverse) =
        lowest_trim_base_for_paired_reads(forward_length, reverse_length, minimum_combined_length);

    let trim_space = forward_length - minimum_forward;
    let intermediate = intermediate_locations.min(trim_space.saturating_sub(2));

    let mut locations = vec![(minimum_forward - 1, reverse_length - 1)];
    let increment = trim_space / (intermediate + 1);
    for i in 1..=intermediate {
        locations.push((minimum_forward - 1 + i * increment, reverse_length - 1 - i * increment));
    }
    locations.push((forward_length - 1, minimum_reverse - 1));
    locations
}

/// Expected-error ceiling padded one unit above the model value:
/// `⌈raw⌉ + 1`.
pub fn pad_max_expected_error(raw_value: f64) -> i64 {
    -((-raw_value).floor() as i64) + 1
}

/// Fallback forward ceiling when no fitted curve is available.
pub fn forward_expected_error_from_read_length(read_length: usize) -> i64 {
    (0.0356 * (0.015 * read_length as f64).exp()).round() as i64 + 1
}

/// Fallback reverse ceiling when no fitted curve is available.
pub fn reverse_expected_error_from_read_length(read_length: usize) -> i64 {
    (0.0289 * (0.0203 * read_length as f64).exp()).round() as i64 + 1
}

/// The per-read inputs to the full variant's N and Q2 gates, aligned by
/// read ordinal with the matrix columns.
pub(crate) struct OffenderGates<'a> {
    pub forward_first_n: &'a [u16],
    pub reverse_first_n: &'a [u16],
    pub forward_first_q2: &'a [u16],
    pub reverse_first_q2: &'a [u16],
}

/// Scores every candidate pair with the full retention predicate (expected
/// error plus N and Q2 gates). Returns the table sorted by score
/// descending, ties in enumeration order.
#[allow(clippy::too_many_arguments)]
pub fn run_trim_parameter_test(
    forward_expected_error_matrix: &Array2<u8>,
    reverse_expected_error_matrix: &Array2<u8>,
    forward_first_n_array: &[u16],
    reverse_first_n_array: &[u16],
    forward_q2_array: &[u16],
    reverse_q2_array: &[u16],
    trim_positions: &[(usize, usize)],
    minimum_trim_positions: (usize, usize),
    forward_curve: Option<&ExponentialFit>,
    reverse_curve: Option<&ExponentialFit>,
    forward_primer_length: usize,
    reverse_primer_length: usize,
) -> Vec<TrimParameterSet> {
    score_candidates(
        forward_expected_error_matrix,
        reverse_expected_error_matrix,
        Some(OffenderGates {
            forward_first_n: forward_first_n_array,
            reverse_first_n: reverse_first_n_array,
            forward_first_q2: forward_q2_array,
            reverse_first_q2: reverse_q2_array,
        }),
        trim_positions,
        minimum_trim_positions,
        forward_curve,
        reverse_curve,
        forward_primer_length,
        reverse_primer_length,
    )
}

/// Scores every candidate pair with the expected-error predicate only.
#[allow(clippy::too_many_arguments)]
pub fn run_trim_parameter_test_lite(
    forward_expected_error_matrix: &Array2<u8>,
    reverse_expected_error_matrix: &Array2<u8>,
    trim_positions: &[(usize, usize)],
    minimum_trim_positions: (usize, usize),
    forward_curve: Option<&ExponentialFit>,
    reverse_curve: Option<&ExponentialFit>,
    forward_primer_length: usize,
    reverse_primer_length: usize,
) -> Vec<TrimParameterSet> {
    score_candidates(
        forward_expected_error_matrix,
        reverse_expected_error_matrix,
        None,
        trim_positions,
        minimum_trim_positions,
        forward_curve,
        reverse_curve,
        forward_primer_length,
        reverse_primer_length,
    )
}

#[allow(clippy::too_many_arguments)]
fn score_candidates(
    forward_matrix: &Array2<u8>,
    reverse_matrix: &Array2<u8>,
    gates: Option<OffenderGates<'_>>,
    trim_positions: &[(usize, usize)],
    minimum_trim_positions: (usize, usize),
    forward_curve: Option<&ExponentialFit>,
    reverse_curve: Option<&ExponentialFit>,
    forward_primer_length: usize,
    reverse_primer_length: usize,
) -> Vec<TrimParameterSet> {
    let (forward_start, reverse_start) = minimum_trim_positions;
    let mut results = Vec::with_capacity(trim_positions.len());

    for &(forward_trim, reverse_trim) in trim_positions {
        let forward_max_expected_error = match forward_curve {
            Some(curve) => pad_max_expected_error(curve.value(forward_trim as f64)),
            None => forward_expected_error_from_read_length(forward_trim),
        };
        let reverse_max_expected_error = match reverse_curve {
            Some(curve) => pad_max_expected_error(curve.value(reverse_trim as f64)),
            None => reverse_expected_error_from_read_length(reverse_trim),
        };

        let forward_errors = forward_matrix.row(forward_trim - forward_start);
        let reverse_errors = reverse_matrix.row(reverse_trim - reverse_start);
        let total_reads = forward_errors.len();

        let mut kept_reads = 0usize;
        for read in 0..total_reads {
            if i64::from(forward_errors[read]) >= forward_max_expected_error
                || i64::from(reverse_errors[read]) >= reverse_max_expected_error
            {
                continue;
            }
            if let Some(gates) = &gates {
                if forward_trim >= gates.forward_first_n[read] as usize
                    || reverse_trim >= gates.reverse_first_n[read] as usize
                {
                    continue;
                }
                if forward_trim >= gates.forward_first_q2[read] as usize
                    || reverse_trim >= gates.reverse_first_q2[read] as usize
                {
                    continue;
                }
            }
            kept_reads += 1;
        }

        let read_retention = if total_reads == 0 {
            0.0
        } else {
            kept_reads as f64 / total_reads as f64
        };

        results.push(TrimParameterSet::new(
            forward_trim + 1 + forward_primer_length,
            reverse_trim + 1 + reverse_primer_length,
            forward_max_expected_error,
            reverse_max_expected_error,
            read_retention,
        ));
    }

    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results
}

#[cfg(test)]
mod test {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;

    #[test]
    fn minimum_lengths_come_from_the_combined_requirement() {
        assert_eq!(lowest_trim_base_for_paired_reads(250, 250, 450), (200, 200));
        assert_eq!(lowest_trim_base_for_paired_reads(233, 229, 450), (221, 217));
        // Impossible requirement degenerates to the full lengths.
        assert_eq!(lowest_trim_base_for_paired_reads(20, 20, 50), (20, 20));
        // Requirement satisfiable by one read alone clamps at one base.
        assert_eq!(lowest_trim_base_for_paired_reads(250, 250, 120), (1, 1));
    }

    #[test]
    fn exhaustive_enumeration_walks_the_diagonal() {
        let locations = all_trim_locations(250, 250, 450);
        assert_eq!(locations.len(), 250 - 200 + 1);
        assert_eq!(locations[0], (199, 249));
        assert_eq!(locations[locations.len() - 1], (249, 199));
        for &(ft, rt) in &locations {
            assert!(ft + rt + 2 >= 450);
            assert!((199..250).contains(&ft));
        }
    }

    #[test]
    fn impossible_requirement_yields_a_single_pair() {
        let locations = all_trim_locations(20, 20, 50);
        assert_eq!(locations, vec![(19, 19)]);
    }

    #[test]
    fn coarse_enumeration_keeps_the_endpoints() {
        let locations = coarse_trim_locations(250, 250, 450, 10);
        assert_eq!(locations.len(), 12);
        assert_eq!(locations[0], (199, 249));
        assert_eq!(locations[locations.len() - 1], (249, 199));
        for window in locations.windows(2) {
            assert!(window[1].0 >= window[0].0);
        }
    }

    #[test]
    fn ceiling_padding_and_heuristics() {
        assert_eq!(pad_max_expected_error(2.3), 4);
        assert_eq!(pad_max_expected_error(2.0), 3);
        assert_eq!(pad_max_expected_error(0.04), 2);
        assert_eq!(pad_max_expected_error(-0.2), 1);

        // round(0.0356 * e^(0.015 * 250)) + 1 = round(1.513...) + 1
        assert_eq!(forward_expected_error_from_read_length(250), 3);
        // round(0.0289 * e^(0.0203 * 250)) + 1 = round(4.59...) + 1
        assert_eq!(reverse_expected_error_from_read_length(250), 6);
    }

    #[test]
    fn score_combines_retention_and_ceiling_penalties() {
        let result = TrimParameterSet::new(240, 210, 3, 2, 0.85);
        assert_abs_diff_eq!(result.score, 85.0 - (4.0 + 1.0), epsilon = 1e-12);
    }

    /// Matrices with one row per position and one column per read, as the
    /// aggregator produces them.
    fn position_major(rows: Vec<Vec<u8>>) -> Array2<u8> {
        let width = rows[0].len();
        Array2::from_shape_vec((rows.len(), width), rows.concat()).unwrap()
    }

    #[test]
    fn lite_scorer_applies_strict_error_ceilings() {
        // Two candidate positions (0-indexed 2 and 3), four reads.
        let forward = position_major(vec![vec![0, 1, 2, 9], vec![0, 2, 3, 9]]);
        let reverse = position_major(vec![vec![0, 0, 0, 0], vec![1, 1, 1, 1]]);
        let trim_positions = [(2, 3), (3, 2)];

        // No curves: heuristic ceilings are 1 (forward) and 1 (reverse) at
        // these tiny lengths... compute from the formulas instead.
        let results = run_trim_parameter_test_lite(&forward, &reverse, &trim_positions, (2, 2), None, None, 0, 0);

        assert_eq!(results.len(), 2);
        // Sorted by score descending.
        assert!(results[0].score >= results[1].score);

        let forward_max = forward_expected_error_from_read_length(2);
        let reverse_max = reverse_expected_error_from_read_length(3);
        assert_eq!(forward_max, 1);
        assert_eq!(reverse_max, 1);
        // Candidate (2, 3): forward row [0,1,2,9] vs ceiling 1, reverse row
        // [1,1,1,1] vs ceiling 1 -> nothing survives the reverse gate.
        let candidate = results.iter().find(|r| r.forward_trim_position == 3).unwrap();
        assert_abs_diff_eq!(candidate.read_retention, 0.0);

        // Candidate (3, 2): forward row [0,2,3,9] vs 1, reverse [0,0,0,0]
        // vs 1 -> only the first read survives.
        let candidate = results.iter().find(|r| r.forward_trim_position == 4).unwrap();
        assert_abs_diff_eq!(candidate.read_retention, 0.25);
    }

    #[test]
    fn full_scorer_rejects_on_n_and_q2_gates() {
        // One candidate position, four reads, no expected error anywhere.
        let forward = position_major(vec![vec![0, 0, 0, 0]]);
        let reverse = position_major(vec![vec![0, 0, 0, 0]]);
        let trim_positions = [(5, 5)];

        let curve = ExponentialFit { a: 0.5, b: 0.0, c: 0.0, covariance: None, r_squared: None, curve_png: None };

        // Read 0 clean; read 1 has an N at position 3; read 2 has a Q2 at
        // position 5; read 3 clean.
        let forward_first_n = [10, 3, 10, 10];
        let reverse_first_n = [10, 10, 10, 10];
        let forward_q2 = [10, 10, 5, 10];
        let reverse_q2 = [10, 10, 10, 10];

        let results = run_trim_parameter_test(
            &forward,
            &reverse,
            &forward_first_n,
            &reverse_first_n,
            &forward_q2,
            &reverse_q2,
            &trim_positions,
            (5, 5),
            Some(&curve),
            Some(&curve),
            2,
            4,
        );

        assert_eq!(results.len(), 1);
        let result = &results[0];
        // ceil(0.5) + 1
        assert_eq!(result.forward_max_expected_error, 2);
        assert_abs_diff_eq!(result.read_retention, 0.5);
        // 1-indexed and primer-adjusted.
        assert_eq!(result.forward_trim_position, 5 + 1 + 2);
        assert_eq!(result.reverse_trim_position, 5 + 1 + 4);
    }
}
