use crate::{
    errors::{Result, TrimsightError},
    fastq::{quality::EncodingScheme, record::{FastqRecord, ReadMetadata}},
    io::{FastqSource, open_fastq_source},
};
use log::error;
use std::{
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

/// Maximum number of records inspected while detecting the quality encoding.
const ENCODING_DETECTION_RECORD_LIMIT: usize = 100;

/// Number of leading records sampled when estimating the read length.
const READ_LENGTH_SAMPLE_SIZE: usize = 100;

/// Options controlling a [`FastqReader`].
#[derive(Debug, Clone, Copy)]
pub struct ReaderOptions {
    /// Emit every `subsample`-th record, by ordinal from 0. Values below 1
    /// behave as 1.
    pub subsample: usize,
    /// Bases removed from the start of every record.
    pub left_trim: usize,
    /// Bases removed from the end of every record.
    pub right_trim: usize,
    /// Parse and require valid metadata on every record.
    pub full_validation: bool,
    /// Skip detection and decode qualities under this scheme.
    pub scheme: Option<EncodingScheme>,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        ReaderOptions {
            subsample: 1,
            left_trim: 0,
            right_trim: 0,
            full_validation: false,
            scheme: None,
        }
    }
}

/// Reads raw four-line groups, skipping blank lines. A trailing partial
/// group is a format error.
struct LineGroups {
    path: PathBuf,
    reader: BufReader<FastqSource>,
    finished: bool,
}

impl LineGroups {
    fn open(path: &Path) -> Result<LineGroups> {
        Ok(LineGroups {
            path: path.to_path_buf(),
            reader: BufReader::new(open_fastq_source(path)?),
            finished: false,
        })
    }

    fn next_group(&mut self) -> Result<Option<[String; 4]>> {
        if self.finished {
            return Ok(None);
        }

        let mut lines: Vec<String> = Vec::with_capacity(4);
        let mut buffer = String::new();
        while lines.len() < 4 {
            buffer.clear();
            if self.reader.read_line(&mut buffer)? == 0 {
                self.finished = true;
                break;
            }
            let line = buffer.trim();
            if !line.is_empty() {
                lines.push(line.to_string());
            }
        }

        match lines.len() {
            4 => {
                let mut lines = lines.into_iter();
                Ok(Some(std::array::from_fn(|_| lines.next().unwrap())))
            }
            0 => Ok(None),
            _ => {
                let message = format!(
                    "FASTQ file at {path} appears to be missing lines (line count is not a multiple of 4)",
                    path = self.path.display()
                );
                error!("{message}");
                Err(TrimsightError::format(message))
            }
        }
    }
}

/// A streaming FASTQ reader: finite, not restartable, sole owner of its
/// file handle. The quality encoding scheme is detected on open (unless
/// supplied) and cached for the lifetime of the reader.
pub struct FastqReader {
    groups: LineGroups,
    scheme: EncodingScheme,
    subsample: usize,
    left_trim: usize,
    right_trim: usize,
    full_validation: bool,
    ordinal: usize,
}

impl FastqReader {
    pub fn open(path: impl AsRef<Path>, options: ReaderOptions) -> Result<FastqReader> {
        let path = path.as_ref();
        let scheme = match options.scheme {
            Some(scheme) => scheme,
            None => detect_encoding(path)?,
        };

        Ok(FastqReader {
            groups: LineGroups::open(path)?,
            scheme,
            subsample: options.subsample.max(1),
            left_trim: options.left_trim,
            right_trim: options.right_trim,
            full_validation: options.full_validation,
            ordinal: 0,
        })
    }

    /// The quality encoding scheme in effect for this reader.
    #[inline]
    pub fn scheme(&self) -> EncodingScheme {
        self.scheme
    }

    /// Cumulative expected error of a record's quality under the reader's
    /// cached scheme.
    #[inline]
    pub fn cumulative_expected_error(&self, record: &FastqRecord) -> Vec<f64> {
        self.scheme.cumulative_expected_error(&record.quality)
    }

    fn next_record(&mut self) -> Result<Option<FastqRecord>> {
        loop {
            let Some([metadata, sequence, _spacer, quality]) = self.groups.next_group()? else {
                return Ok(None);
            };

            let ordinal = self.ordinal;
            self.ordinal += 1;
            if ordinal % self.subsample != 0 {
                continue;
            }

            if sequence.len() != quality.len() {
                let message = format!(
                    "mismatched sequence and quality line lengths in {path} for record {metadata}",
                    path = self.groups.path.display()
                );
                error!("{message}");
                return Err(TrimsightError::format(message));
            }

            if self.full_validation {
                let parsed = ReadMetadata::parse(&metadata)?;
                if !parsed.all_valid() {
                    return Err(TrimsightError::validation(format!("invalid metadata fields for record {metadata}")));
                }
            }

            return Ok(Some(FastqRecord {
                sequence: self.trimmed(sequence.as_bytes()),
                quality: self.trimmed(quality.as_bytes()),
                metadata,
            }));
        }
    }

    fn trimmed(&self, bytes: &[u8]) -> Vec<u8> {
        let end = bytes.len().saturating_sub(self.right_trim);
        let start = self.left_trim.min(end);
        bytes[start..end].to_vec()
    }
}

impl Iterator for FastqReader {
    type Item = Result<FastqRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

/// Detects the quality encoding of the file at `path`.
///
/// Candidate schemes are eliminated as their character sets are violated;
/// the scan stops once a single candidate remains or
/// [`ENCODING_DETECTION_RECORD_LIMIT`] records have been inspected. The
/// first survivor in priority order wins.
pub fn detect_encoding(path: impl AsRef<Path>) -> Result<EncodingScheme> {
    let path = path.as_ref();
    let mut eliminated = [false; EncodingScheme::DETECTION_ORDER.len()];
    let mut groups = LineGroups::open(path)?;

    for _ in 0..ENCODING_DETECTION_RECORD_LIMIT {
        let Some(group) = groups.next_group()? else {
            break;
        };
        let quality = group[3].as_bytes();

        for (slot, scheme) in eliminated.iter_mut().zip(&EncodingScheme::DETECTION_ORDER) {
            if !*slot && !scheme.accepts(quality) {
                *slot = true;
            }
        }

        match eliminated.iter().filter(|&&gone| !gone).count() {
            0 => {
                error!("no valid quality scoring scheme found for FASTQ file {}", path.display());
                return Err(TrimsightError::Encoding { path: path.to_path_buf() });
            }
            1 => break,
            _ => {}
        }
    }

    EncodingScheme::DETECTION_ORDER
        .iter()
        .zip(eliminated)
        .find(|(_, gone)| !gone)
        .map(|(scheme, _)| *scheme)
        .ok_or_else(|| TrimsightError::Encoding { path: path.to_path_buf() })
}

/// Estimates the read length from the first [`READ_LENGTH_SAMPLE_SIZE`]
/// records, returning the rounded mean and whether every sampled read had
/// that same length.
pub fn estimate_read_length(path: impl AsRef<Path>) -> Result<(usize, bool)> {
    let path = path.as_ref();
    let mut groups = LineGroups::open(path)?;
    let mut lengths = Vec::with_capacity(READ_LENGTH_SAMPLE_SIZE);

    while lengths.len() < READ_LENGTH_SAMPLE_SIZE {
        match groups.next_group()? {
            Some(group) => lengths.push(group[1].len()),
            None => break,
        }
    }

    if lengths.is_empty() {
        return Err(TrimsightError::format(format!("no reads found in {}", path.display())));
    }

    let mean = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
    let uniform = lengths.iter().all(|&len| len == lengths[0]);
    Ok((mean.round() as usize, uniform))
}

#[cfg(test)]
mod test {
    use super::*;
    use flate2::{Compression, write::GzEncoder};
    use std::{fs::File, io::Write, path::PathBuf};
    use tempfile::TempDir;

    fn write_plain(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn write_gzipped(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut encoder = GzEncoder::new(File::create(&path).unwrap(), Compression::default());
        encoder.write_all(contents.as_bytes()).unwrap();
        encoder.finish().unwrap();
        path
    }

    const TWO_RECORDS: &str = "@r1 1:N:0:X\nACGTACGT\n+\nIIIIIIII\n@r2 1:N:0:X\nTTTTACGT\n+\nIIII++II\n";

    #[test]
    fn reads_plain_records() {
        let dir = TempDir::new().unwrap();
        let path = write_plain(&dir, "sample_R1.fastq", TWO_RECORDS);

        let reader = FastqReader::open(&path, ReaderOptions::default()).unwrap();
        let records: Vec<FastqRecord> = reader.map(Result::unwrap).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metadata, "@r1 1:N:0:X");
        assert_eq!(records[0].sequence, b"ACGTACGT");
        assert_eq!(records[1].quality, b"IIII++II");
    }

    #[test]
    fn reads_gzipped_records() {
        let dir = TempDir::new().unwrap();
        let path = write_gzipped(&dir, "sample_R1.fastq.gz", TWO_RECORDS);

        let reader = FastqReader::open(&path, ReaderOptions::default()).unwrap();
        assert_eq!(reader.count(), 2);
    }

    #[test]
    fn subsample_keeps_every_nth_record_from_zero() {
        let dir = TempDir::new().unwrap();
        let mut contents = String::new();
        for i in 0..10 {
            contents.push_str(&format!("@r{i}\nACGT\n+\nIIII\n"));
        }
        let path = write_plain(&dir, "sample_R1.fastq", &contents);

        let options = ReaderOptions { subsample: 3, ..ReaderOptions::default() };
        let kept: Vec<String> = FastqReader::open(&path, options)
            .unwrap()
            .map(|r| r.unwrap().metadata)
            .collect();
        assert_eq!(kept, ["@r0", "@r3", "@r6", "@r9"]);
    }

    #[test]
    fn trims_both_ends_of_sequence_and_quality() {
        let dir = TempDir::new().unwrap();
        let path = write_plain(&dir, "sample_R1.fastq", "@r1\nAACCGGTT\n+\n!!IIII++\n");

        let options = ReaderOptions { left_trim: 2, right_trim: 2, ..ReaderOptions::default() };
        let record = FastqReader::open(&path, options).unwrap().next().unwrap().unwrap();
        assert_eq!(record.sequence, b"CCGG");
        assert_eq!(record.quality, b"IIII");
    }

    #[test]
    fn blank_lines_are_skipped() {
        let dir = TempDir::new().unwrap();
        let path = write_plain(&dir, "sample_R1.fastq", "@r1\n\nACGT\n+\n\nIIII\n\n");

        let records: Vec<FastqRecord> = FastqReader::open(&path, ReaderOptions::default())
            .unwrap()
            .map(Result::unwrap)
            .collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sequence, b"ACGT");
    }

    #[test]
    fn truncated_file_is_a_format_error() {
        let dir = TempDir::new().unwrap();
        let path = write_plain(&dir, "sample_R1.fastq", "@r1\nACGT\n+\nIIII\n@r2\nACGT\n");

        let mut reader = FastqReader::open(&path, ReaderOptions::default()).unwrap();
        assert!(reader.next().unwrap().is_ok());
        assert!(matches!(reader.next(), Some(Err(TrimsightError::Format { .. }))));
    }

    #[test]
    fn quality_length_mismatch_is_a_format_error() {
        let dir = TempDir::new().unwrap();
        let path = write_plain(&dir, "sample_R1.fastq", "@r1\nACGT\n+\nIII\n");

        let mut reader = FastqReader::open(&path, ReaderOptions::default()).unwrap();
        assert!(matches!(reader.next(), Some(Err(TrimsightError::Format { .. }))));
    }

    #[test]
    fn full_validation_rejects_bad_metadata() {
        let dir = TempDir::new().unwrap();
        let good = "@M02989:9:FC:1:2112:9890:15606 1:N:0:X\nACGT\n+\nIIII\n";
        let odd_control_bits = "@M02989:9:FC:1:2112:9890:15606 1:N:3:X\nACGT\n+\nIIII\n";

        let options = ReaderOptions { full_validation: true, ..ReaderOptions::default() };

        let path = write_plain(&dir, "good_R1.fastq", good);
        assert!(FastqReader::open(&path, options).unwrap().next().unwrap().is_ok());

        let path = write_plain(&dir, "bad_R1.fastq", odd_control_bits);
        assert!(matches!(
            FastqReader::open(&path, options).unwrap().next(),
            Some(Err(TrimsightError::Validation { .. }))
        ));
    }

    #[test]
    fn detects_sanger_and_illumina_1_3() {
        let dir = TempDir::new().unwrap();

        let sanger = write_plain(&dir, "sanger_R1.fastq", "@r1\nACGT\n+\n!5I+\n");
        assert_eq!(detect_encoding(&sanger).unwrap(), EncodingScheme::SANGER);

        // Qualities spanning '@'..'h' rule out both base-33 schemes and
        // Illumina 1.5-7; Illumina 1.3-4 is the first survivor.
        let illumina13 = write_plain(&dir, "old_R1.fastq", "@r1\nACGT\n+\n@@hh\n");
        assert_eq!(detect_encoding(&illumina13).unwrap(), EncodingScheme::ILLUMINA_1_3);
    }

    #[test]
    fn detection_fails_when_no_scheme_fits() {
        let dir = TempDir::new().unwrap();
        // A space (0x20) is below every scheme's range.
        let path = write_plain(&dir, "bad_R1.fastq", "@r1\nACGT\n+\nI I I\n");
        // Length mismatch aside, detection only looks at the quality line.
        let err = detect_encoding(&path).unwrap_err();
        assert!(matches!(err, TrimsightError::Encoding { .. }));
    }

    #[test]
    fn estimates_read_length_and_uniformity() {
        let dir = TempDir::new().unwrap();

        let uniform = write_plain(&dir, "uniform_R1.fastq", TWO_RECORDS);
        assert_eq!(estimate_read_length(&uniform).unwrap(), (8, true));

        let ragged = write_plain(&dir, "ragged_R1.fastq", "@r1\nACGTACGT\n+\nIIIIIIII\n@r2\nACGT\n+\nIIII\n");
        let (length, uniform) = estimate_read_length(&ragged).unwrap();
        assert_eq!(length, 6);
        assert!(!uniform);
    }
}
