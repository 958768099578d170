use chrono::Utc;
use clap::Parser;
use log::{LevelFilter, error};
use std::process::ExitCode;
use trimsight::{
    analysis::{self, AnalysisOptions},
    args::Cli,
    errors::Result,
    logging, report, samples,
};

fn main() -> ExitCode {
    let start_time = Utc::now();
    let args = Cli::parse();

    let log_file = args.log_file.clone().unwrap_or_else(|| {
        let timestamp = start_time.timestamp_micros().to_string();
        args.output_directory.join(logging::default_log_file_name(&timestamp))
    });
    if let Err(e) = logging::init(&log_file, LevelFilter::Info, true) {
        eprintln!("ERROR: could not open log file {path}: {e}", path = log_file.display());
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(()) => {
            let elapsed = Utc::now().signed_duration_since(start_time);
            println!("Run time: {:.2}s", elapsed.num_milliseconds() as f64 / 1000.0);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Cli) -> Result<()> {
    let resolved = args.resolved()?;

    let subsample = if args.subsample < 0 {
        let samples = samples::find_samples_in_folder(&args.input_directory, resolved.naming_convention)?;
        analysis::auto_subsample_rate(&samples)?
    } else {
        args.subsample as usize
    };

    let options = AnalysisOptions {
        minimum_combined_read_length: resolved.minimum_combined_read_length,
        subsample,
        percentile: args.percentile,
        make_expected_error_plots: true,
        forward_primer_length: args.forward_primer_length,
        reverse_primer_length: args.reverse_primer_length,
        naming_convention: resolved.naming_convention,
        workers: None,
    };

    let results = analysis::perform_analysis_lite(&args.input_directory, &options)?;

    for result in &results.result_table {
        println!("{}", report::result_json(result)?);
    }
    report::save_result_output(&args.output_directory, &args.output_file_name, &results)?;

    Ok(())
}
