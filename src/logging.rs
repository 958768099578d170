//! Run logging: `LEVEL:target:message` lines to stderr and to a per-run
//! log file.

use crate::errors::{Result, TrimsightError};
use log::{LevelFilter, Log, Metadata, Record};
use std::{
    fs::File,
    io::Write,
    path::Path,
    sync::Mutex,
};

/// A sink for the `log` facade that tees records to stderr and a file.
struct RunLogger {
    file: Mutex<File>,
    stream: bool,
}

impl Log for RunLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let line = format!("{level}:{target}:{message}\n", level = record.level(), target = record.target(), message = record.args());
        if self.stream {
            eprint!("{line}");
        }
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(line.as_bytes());
            let _ = file.flush();
        }
    }

    fn flush(&self) {
        if let Ok(mut file) = self.file.lock() {
            let _ = file.flush();
        }
    }
}

/// Installs the process-wide logger, writing to `log_file` and (when
/// `stream` is set) stderr.
pub fn init(log_file: &Path, level: LevelFilter, stream: bool) -> Result<()> {
    let file = File::create(log_file)?;
    log::set_boxed_logger(Box::new(RunLogger { file: Mutex::new(file), stream }))
        .map_err(|e| TrimsightError::invariant(format!("logger already installed: {e}")))?;
    log::set_max_level(level);
    Ok(())
}

/// Default log file name for a run started at `timestamp`.
pub fn default_log_file_name(timestamp: &str) -> String {
    format!("trimsight.{timestamp}.log")
}
