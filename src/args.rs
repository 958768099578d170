use crate::{
    errors::{Result, TrimsightError},
    samples::NamingConvention,
};
use clap::{Parser, builder::RangedI64ValueParser};
use std::path::PathBuf;

const OUTPUT_FILE_NAME_CHARSET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz1234567890_.-";

/// The command line arguments. Every flag may also be supplied through the
/// uppercased environment variable of its long name.
#[derive(Parser, Debug)]
#[command(author, version, about = "Recommends trim lengths for paired-end amplicon FASTQ data", long_about = None)]
pub struct Cli {
    /// Length of the amplicon, not including primers
    #[arg(short = 'a', long, env = "AMPLICONLENGTH", value_parser = RangedI64ValueParser::<usize>::new().range(1..))]
    pub amplicon_length: usize,

    /// Length of the forward primer
    #[arg(short = 'f', long, env = "FORWARDPRIMERLENGTH", value_parser = RangedI64ValueParser::<usize>::new().range(0..=50))]
    pub forward_primer_length: usize,

    /// Length of the reverse primer
    #[arg(short = 'r', long, env = "REVERSEPRIMERLENGTH", value_parser = RangedI64ValueParser::<usize>::new().range(0..=50))]
    pub reverse_primer_length: usize,

    /// Directory with the FASTQ files to analyze
    #[arg(short = 'i', long, env = "INPUTDIRECTORY", default_value = ".")]
    pub input_directory: PathBuf,

    /// Directory for outputs
    #[arg(short = 'o', long, env = "OUTPUTDIRECTORY", default_value = ".")]
    pub output_directory: PathBuf,

    /// Output file name for the trim site JSON table
    #[arg(short = 'n', long, env = "OUTPUTFILENAME", default_value = "trimParameters.json")]
    pub output_file_name: String,

    /// Minimum overlap between the paired-end reads
    #[arg(short = 'm', long, env = "MINIMUMOVERLAP", default_value_t = 20, value_parser = RangedI64ValueParser::<usize>::new().range(5..=30))]
    pub minimum_overlap: usize,

    /// Subsampling level (approximately 1/x reads are analyzed; -1 chooses
    /// a level from the input size)
    #[arg(short = 's', long, env = "SUBSAMPLE", default_value_t = -1, allow_negative_numbers = true, value_parser = RangedI64ValueParser::<i64>::new().range(-1..))]
    pub subsample: i64,

    /// Percentile used for the expected error model
    #[arg(short = 'p', long, env = "PERCENTILE", default_value_t = 83, value_parser = RangedI64ValueParser::<usize>::new().range(1..=100))]
    pub percentile: usize,

    /// File naming convention of the input files
    #[arg(short = 'F', long, env = "FILENAMINGSTANDARD", default_value = "nononsense")]
    pub file_naming_standard: String,

    /// Log file path; defaults to a timestamped file in the output directory
    #[arg(short = 'l', long, env = "LOGFILE")]
    pub log_file: Option<PathBuf>,
}

/// Values derived from the raw flags after cross-field validation.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedArgs {
    pub naming_convention: NamingConvention,
    pub minimum_combined_read_length: usize,
}

impl Cli {
    /// Validates the argument combinations clap cannot express and derives
    /// the combined-length requirement.
    pub fn resolved(&self) -> Result<ResolvedArgs> {
        let naming_convention: NamingConvention = self.file_naming_standard.parse()?;

        if let Some(forbidden) = self.output_file_name.chars().find(|&c| !OUTPUT_FILE_NAME_CHARSET.contains(c)) {
            return Err(TrimsightError::argument(format!(
                "unusual character detected for output file name: contains {forbidden:?}"
            )));
        }

        for directory in [&self.input_directory, &self.output_directory] {
            if !directory.is_dir() {
                return Err(TrimsightError::InputNotFound { path: directory.clone() });
            }
        }

        Ok(ResolvedArgs {
            naming_convention,
            minimum_combined_read_length: self.amplicon_length + self.minimum_overlap,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parse(args: &[&str]) -> clap::error::Result<Cli> {
        Cli::try_parse_from(std::iter::once("trimsight").chain(args.iter().copied()))
    }

    #[test]
    fn required_flags_and_defaults() {
        let cli = parse(&["-a", "430", "-f", "17", "-r", "21"]).unwrap();
        assert_eq!(cli.amplicon_length, 430);
        assert_eq!(cli.minimum_overlap, 20);
        assert_eq!(cli.subsample, -1);
        assert_eq!(cli.percentile, 83);
        assert_eq!(cli.output_file_name, "trimParameters.json");
        assert_eq!(cli.file_naming_standard, "nononsense");

        assert!(parse(&["-f", "17", "-r", "21"]).is_err());
    }

    #[test]
    fn ranges_are_enforced() {
        assert!(parse(&["-a", "0", "-f", "17", "-r", "21"]).is_err());
        assert!(parse(&["-a", "430", "-f", "51", "-r", "21"]).is_err());
        assert!(parse(&["-a", "430", "-f", "17", "-r", "21", "-m", "31"]).is_err());
        assert!(parse(&["-a", "430", "-f", "17", "-r", "21", "-m", "4"]).is_err());
        assert!(parse(&["-a", "430", "-f", "17", "-r", "21", "-p", "0"]).is_err());
        assert!(parse(&["-a", "430", "-f", "17", "-r", "21", "-p", "101"]).is_err());

        assert!(parse(&["-a", "ten", "-f", "17", "-r", "21"]).is_err());
    }

    #[test]
    fn primer_length_zero_is_accepted() {
        let cli = parse(&["-a", "430", "-f", "0", "-r", "0"]).unwrap();
        assert_eq!(cli.forward_primer_length, 0);
        assert_eq!(cli.reverse_primer_length, 0);
    }

    #[test]
    fn resolution_checks_filename_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let dir_arg = dir.path().to_str().unwrap();

        let cli = parse(&["-a", "430", "-f", "17", "-r", "21", "-i", dir_arg, "-o", dir_arg]).unwrap();
        let resolved = cli.resolved().unwrap();
        assert_eq!(resolved.minimum_combined_read_length, 450);
        assert_eq!(resolved.naming_convention, NamingConvention::NoNonsense);

        let cli = parse(&["-a", "430", "-f", "17", "-r", "21", "-i", dir_arg, "-o", dir_arg, "-n", "bad/name.json"]).unwrap();
        assert!(matches!(cli.resolved(), Err(TrimsightError::Argument { .. })));

        let cli = parse(&["-a", "430", "-f", "17", "-r", "21", "-i", "/definitely/not/here", "-o", dir_arg]).unwrap();
        assert!(matches!(cli.resolved(), Err(TrimsightError::InputNotFound { .. })));

        let cli = parse(&["-a", "430", "-f", "17", "-r", "21", "-i", dir_arg, "-o", dir_arg, "-F", "mystery"]).unwrap();
        assert!(matches!(cli.resolved(), Err(TrimsightError::Argument { .. })));
    }
}
