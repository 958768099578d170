//! Filename conventions for paired-end FASTQ data and the pairing of
//! forward/reverse files into samples.

use crate::errors::{Result, TrimsightError};
use foldhash::fast::RandomState;
use regex::Regex;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
    sync::LazyLock,
};

/// File endings recognized as FASTQ during directory enumeration.
pub const EXPECTED_ENDINGS: [&str; 4] = [".fastq", ".fq", ".fastq.gz", ".fq.gz"];

static NO_NONSENSE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_R?([12])(_\d\d\d)?$").unwrap());
static FASTQ_EXTENSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.(fq|fastq)(\.gz)?$").unwrap());

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub enum ReadDirection {
    Forward,
    Reverse,
}

impl ReadDirection {
    #[inline]
    pub fn number(self) -> u8 {
        match self {
            ReadDirection::Forward => 1,
            ReadDirection::Reverse => 2,
        }
    }

    fn from_number(number: i64, file_name: &str) -> Result<ReadDirection> {
        match number {
            1 => Ok(ReadDirection::Forward),
            2 => Ok(ReadDirection::Reverse),
            _ => Err(TrimsightError::validation(format!(
                "read direction must be 1 or 2; {file_name} gave {number}"
            ))),
        }
    }
}

/// A labeled filename convention. Each one parses a file name into
/// `(group, sample_number, direction)`.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum NamingConvention {
    Zymo,
    Illumina,
    KEriksson,
    NoNonsense,
    FVieira,
    YZhang,
}

impl FromStr for NamingConvention {
    type Err = TrimsightError;

    fn from_str(alias: &str) -> Result<NamingConvention> {
        match alias.to_lowercase().as_str() {
            "zymo" | "zymoservices" | "zymoservicesnamingstandard" => Ok(NamingConvention::Zymo),
            "illumina" => Ok(NamingConvention::Illumina),
            "keriksson" => Ok(NamingConvention::KEriksson),
            "nononsense" => Ok(NamingConvention::NoNonsense),
            "fvieira" => Ok(NamingConvention::FVieira),
            "yzhang" => Ok(NamingConvention::YZhang),
            _ => Err(TrimsightError::argument(format!("{alias} is not a valid naming standard identifier"))),
        }
    }
}

impl NamingConvention {
    /// Parses `file_name` under this convention.
    pub fn parse_file_name(self, file_name: &str) -> Result<(String, String, ReadDirection)> {
        match self {
            NamingConvention::Zymo => parse_zymo(file_name),
            NamingConvention::Illumina => parse_illumina(file_name),
            NamingConvention::KEriksson => parse_keriksson(file_name),
            NamingConvention::NoNonsense => parse_no_nonsense(file_name),
            NamingConvention::FVieira => parse_fvieira(file_name),
            NamingConvention::YZhang => parse_yzhang(file_name),
        }
    }
}

fn bad_name(file_name: &str, convention: &str) -> TrimsightError {
    TrimsightError::validation(format!(
        "{file_name} does not appear to be a valid {convention} file name; check the file naming convention argument"
    ))
}

fn stem(file_name: &str) -> &str {
    file_name.split('.').next().unwrap_or(file_name)
}

fn parse_direction_field(field: &str, file_name: &str, convention: &str) -> Result<ReadDirection> {
    let digits = field.trim_start_matches(['R', 'r']);
    let number: i64 = digits.parse().map_err(|_| bad_name(file_name, convention))?;
    ReadDirection::from_number(number, file_name)
}

fn parse_zymo(file_name: &str) -> Result<(String, String, ReadDirection)> {
    let fields: Vec<&str> = stem(file_name).split('_').collect();
    let [group, sample, direction] = fields[..] else {
        return Err(bad_name(file_name, "Zymo Services"));
    };
    let direction = parse_direction_field(direction, file_name, "Zymo Services")?;
    Ok((group.to_string(), sample.to_string(), direction))
}

fn parse_illumina(file_name: &str) -> Result<(String, String, ReadDirection)> {
    let fields: Vec<&str> = stem(file_name).split('_').collect();
    if fields.len() < 4 {
        return Err(bad_name(file_name, "Illumina"));
    }

    let group = fields[..fields.len() - 4].join("_");
    let sample: u32 = fields[fields.len() - 4]
        .strip_prefix('S')
        .unwrap_or(fields[fields.len() - 4])
        .parse()
        .map_err(|_| bad_name(file_name, "Illumina"))?;
    let direction = parse_direction_field(fields[fields.len() - 2], file_name, "Illumina")?;
    Ok((group, sample.to_string(), direction))
}

fn parse_keriksson(file_name: &str) -> Result<(String, String, ReadDirection)> {
    let mut dot_fields = file_name.split('.');
    let (Some(group), Some(sample_and_direction)) = (dot_fields.next(), dot_fields.next()) else {
        return Err(bad_name(file_name, "KEriksson"));
    };

    let underscore_fields: Vec<&str> = sample_and_direction.split('_').collect();
    let [sample, direction] = underscore_fields[..] else {
        return Err(bad_name(file_name, "KEriksson"));
    };
    let direction = parse_direction_field(direction, file_name, "KEriksson")?;
    Ok((group.to_string(), sample.to_string(), direction))
}

fn parse_no_nonsense(file_name: &str) -> Result<(String, String, ReadDirection)> {
    let base_name = FASTQ_EXTENSION.replace(file_name, "");
    let captures = NO_NONSENSE_SUFFIX.captures(&base_name).ok_or_else(|| {
        TrimsightError::validation(format!("could not infer read orientation from filename: {file_name}"))
    })?;

    let direction_number: i64 = captures[1].parse().expect("regex captured a single digit");
    let direction = ReadDirection::from_number(direction_number, file_name)?;
    let sample = NO_NONSENSE_SUFFIX.replace(&base_name, "").to_string();
    Ok((sample.clone(), sample, direction))
}

fn parse_fvieira(file_name: &str) -> Result<(String, String, ReadDirection)> {
    let fields: Vec<&str> = stem(file_name).split('_').collect();
    let [sample, direction] = fields[..] else {
        return Err(bad_name(file_name, "FVieira"));
    };
    let direction = parse_direction_field(direction, file_name, "FVieira")?;
    Ok(("default".to_string(), sample.to_string(), direction))
}

fn parse_yzhang(file_name: &str) -> Result<(String, String, ReadDirection)> {
    let fields: Vec<&str> = stem(file_name).split('_').collect();
    let [sample, _seq_type, direction] = fields[..] else {
        return Err(bad_name(file_name, "YZhang"));
    };
    let direction = parse_direction_field(direction, file_name, "YZhang")?;
    Ok(("default".to_string(), sample.to_string(), direction))
}

/// One FASTQ file classified under a naming convention.
#[derive(Clone, Debug)]
pub struct SampleDescriptor {
    pub file_path: PathBuf,
    pub file_name: String,
    pub group: String,
    pub sample_number: String,
    pub direction: ReadDirection,
}

impl SampleDescriptor {
    pub fn from_path(path: impl Into<PathBuf>, convention: NamingConvention) -> Result<SampleDescriptor> {
        let file_path = path.into();
        let file_name = file_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| TrimsightError::validation(format!("unusable file name in path {}", file_path.display())))?
            .to_string();
        let (group, sample_number, direction) = convention.parse_file_name(&file_name)?;

        Ok(SampleDescriptor {
            file_path,
            file_name,
            group,
            sample_number,
            direction,
        })
    }

    /// Identity of the sample this file belongs to, ignoring direction.
    #[inline]
    pub fn sample_id(&self) -> (String, String) {
        (self.group.clone(), self.sample_number.clone())
    }

    /// Whether `self` and `other` are the two ends of the same sample.
    #[inline]
    pub fn same_sample(&self, other: &SampleDescriptor) -> bool {
        self.group == other.group && self.sample_number == other.sample_number
    }
}

impl PartialEq for SampleDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.same_sample(other) && self.direction == other.direction
    }
}

impl std::fmt::Display for SampleDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.file_path.display())
    }
}

/// Enumerates the FASTQ files in `directory` under `convention`, sorted by
/// file name so downstream ordering is deterministic.
pub fn find_samples_in_folder(directory: impl AsRef<Path>, convention: NamingConvention) -> Result<Vec<SampleDescriptor>> {
    let directory = directory.as_ref();
    if !directory.is_dir() {
        return Err(TrimsightError::InputNotFound { path: directory.to_path_buf() });
    }

    let mut fastq_names: Vec<String> = Vec::new();
    for entry in std::fs::read_dir(directory)? {
        let entry = entry?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        if EXPECTED_ENDINGS.iter().any(|ending| name.ends_with(ending)) {
            fastq_names.push(name);
        }
    }
    fastq_names.sort();

    fastq_names
        .into_iter()
        .map(|name| SampleDescriptor::from_path(directory.join(name), convention))
        .collect()
}

/// Forward/reverse pairings of a set of descriptors, with the files that
/// found no mate reported separately.
#[derive(Debug, Default)]
pub struct PairTable {
    pub pairs: Vec<(SampleDescriptor, SampleDescriptor)>,
    pub unpaired: Vec<SampleDescriptor>,
}

/// Pairs descriptors by `(group, sample_number)`.
pub fn build_pair_table(samples: &[SampleDescriptor]) -> PairTable {
    let mut reverse_by_id: HashMap<(String, String), SampleDescriptor, RandomState> = HashMap::default();
    for sample in samples {
        if sample.direction == ReadDirection::Reverse {
            reverse_by_id.insert(sample.sample_id(), sample.clone());
        }
    }

    let mut table = PairTable::default();
    for sample in samples {
        if sample.direction != ReadDirection::Forward {
            continue;
        }
        match reverse_by_id.remove(&sample.sample_id()) {
            Some(mate) => table.pairs.push((sample.clone(), mate)),
            None => table.unpaired.push(sample.clone()),
        }
    }
    for sample in samples {
        if sample.direction == ReadDirection::Reverse && reverse_by_id.contains_key(&sample.sample_id()) {
            table.unpaired.push(sample.clone());
        }
    }
    table
}
