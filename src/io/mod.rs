use crate::errors::{Result, TrimsightError};
use flate2::read::MultiGzDecoder;
use std::{
    fs::File,
    io::{ErrorKind, Read},
    path::Path,
};

/// First two bytes of every gzip member.
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Checks whether the file at `path` is gzip-compressed by sniffing its
/// first two bytes. Files shorter than two bytes are treated as plain.
pub(crate) fn is_gzipped(path: impl AsRef<Path>) -> Result<bool> {
    let mut file = open_checked(path.as_ref())?;
    let mut magic = [0u8; 2];
    let mut filled = 0;

    while filled < magic.len() {
        match file.read(&mut magic[filled..])? {
            0 => return Ok(false),
            n => filled += n,
        }
    }

    Ok(magic == GZIP_MAGIC)
}

/// A byte source for FASTQ data, either a regular file or a gzip member
/// stream decoded lazily.
#[derive(Debug)]
pub(crate) enum FastqSource {
    Plain(File),
    Gzipped(MultiGzDecoder<File>),
}

impl Read for FastqSource {
    #[inline]
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            FastqSource::Plain(inner) => inner.read(buf),
            FastqSource::Gzipped(inner) => inner.read(buf),
        }
    }
}

/// Opens the file at `path`, choosing the decoder by content rather than by
/// extension.
pub(crate) fn open_fastq_source(path: impl AsRef<Path>) -> Result<FastqSource> {
    let path = path.as_ref();

    let source = if is_gzipped(path)? {
        FastqSource::Gzipped(MultiGzDecoder::new(open_checked(path)?))
    } else {
        FastqSource::Plain(open_checked(path)?)
    };

    Ok(source)
}

fn open_checked(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| match e.kind() {
        ErrorKind::NotFound => TrimsightError::InputNotFound { path: path.to_path_buf() },
        _ => TrimsightError::Io(e),
    })
}
