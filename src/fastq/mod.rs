//! Streaming FASTQ ingest: record reading, quality decoding, and the
//! per-read expected-error arithmetic the analysis is built on.

pub mod quality;
pub mod reader;
pub mod record;

pub use quality::{EncodingScheme, Formula};
pub use reader::{FastqReader, ReaderOptions, detect_encoding, estimate_read_length};
pub use record::{FastqRecord, ReadMetadata};
