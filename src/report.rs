//! Output writing: the ranked JSON table and the rendered curve PNGs.

use crate::{
    analysis::{AnalysisResults, TrimParameterSet},
    errors::Result,
};
use serde::Serialize;
use serde_json::ser::{PrettyFormatter, Serializer};
use std::path::{Path, PathBuf};

pub const FORWARD_CURVE_FILE_NAME: &str = "forwardExpectedError.png";
pub const REVERSE_CURVE_FILE_NAME: &str = "reverseExpectedError.png";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TrimParameterRow {
    trim_position: [usize; 2],
    max_expected_error: [i64; 2],
    read_retention_percent: f64,
    score: f64,
}

impl From<&TrimParameterSet> for TrimParameterRow {
    fn from(result: &TrimParameterSet) -> TrimParameterRow {
        TrimParameterRow {
            trim_position: [result.forward_trim_position, result.reverse_trim_position],
            max_expected_error: [result.forward_max_expected_error, result.reverse_max_expected_error],
            read_retention_percent: (result.read_retention * 10_000.0).round() / 100.0,
            score: result.score,
        }
    }
}

/// One result as single-line JSON, for echoing to stdout.
pub fn result_json(result: &TrimParameterSet) -> Result<String> {
    Ok(serde_json::to_string(&TrimParameterRow::from(result))?)
}

/// The whole result table as a JSON array indented with 4 spaces.
pub fn result_table_json(results: &[TrimParameterSet]) -> Result<String> {
    let rows: Vec<TrimParameterRow> = results.iter().map(TrimParameterRow::from).collect();

    let mut buffer = Vec::new();
    let mut serializer = Serializer::with_formatter(&mut buffer, PrettyFormatter::with_indent(b"    "));
    rows.serialize(&mut serializer)?;
    Ok(String::from_utf8(buffer).expect("serde_json emits UTF-8"))
}

/// Writes the result table and any rendered curve PNGs into
/// `output_directory`. Returns the paths written.
pub fn save_result_output(
    output_directory: &Path,
    output_file_name: &str,
    analysis: &AnalysisResults,
) -> Result<Vec<PathBuf>> {
    let mut written = Vec::new();

    let table_path = output_directory.join(output_file_name);
    std::fs::write(&table_path, result_table_json(&analysis.result_table)?)?;
    written.push(table_path);

    for (png, file_name) in [
        (&analysis.forward_curve.curve_png, FORWARD_CURVE_FILE_NAME),
        (&analysis.reverse_curve.curve_png, REVERSE_CURVE_FILE_NAME),
    ] {
        if let Some(png) = png {
            let png_path = output_directory.join(file_name);
            std::fs::write(&png_path, png)?;
            written.push(png_path);
        }
    }

    Ok(written)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::analysis::ExponentialFit;

    fn fit_with_png(png: Option<Vec<u8>>) -> ExponentialFit {
        ExponentialFit { a: 0.03, b: 0.015, c: 0.0, covariance: None, r_squared: Some(0.99), curve_png: png }
    }

    #[test]
    fn table_json_is_four_space_indented_with_fixed_keys() {
        let results = vec![TrimParameterSet::new(240, 211, 3, 2, 0.912345)];
        let json = result_table_json(&results).unwrap();

        assert!(json.starts_with("[\n    {\n        \"trimPosition\": [\n"));
        let key_order = ["trimPosition", "maxExpectedError", "readRetentionPercent", "score"];
        let mut last = 0;
        for key in key_order {
            let position = json.find(&format!("\"{key}\"")).unwrap();
            assert!(position > last);
            last = position;
        }
        // Retention is a percentage rounded to two decimals.
        assert!(json.contains("91.23"));
    }

    #[test]
    fn single_result_json_is_one_line() {
        let result = TrimParameterSet::new(240, 211, 3, 2, 1.0);
        let json = result_json(&result).unwrap();
        assert!(!json.contains('\n'));
        assert!(json.contains("\"trimPosition\":[240,211]"));
        assert!(json.contains("\"maxExpectedError\":[3,2]"));
        assert!(json.contains("\"readRetentionPercent\":100.0"));
    }

    #[test]
    fn saves_table_and_present_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let analysis = AnalysisResults {
            result_table: vec![TrimParameterSet::new(240, 211, 3, 2, 1.0)],
            forward_curve: fit_with_png(Some(vec![0x89, b'P', b'N', b'G'])),
            reverse_curve: fit_with_png(None),
        };

        let written = save_result_output(dir.path(), "trimParameters.json", &analysis).unwrap();
        assert_eq!(written.len(), 2);
        assert!(dir.path().join("trimParameters.json").exists());
        assert!(dir.path().join(FORWARD_CURVE_FILE_NAME).exists());
        assert!(!dir.path().join(REVERSE_CURVE_FILE_NAME).exists());

        let round_trip: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("trimParameters.json")).unwrap()).unwrap();
        assert_eq!(round_trip[0]["trimPosition"][0], 240);
    }
}
