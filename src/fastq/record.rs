use crate::errors::{Result, TrimsightError};
use log::{error, warn};

/// One FASTQ record. Produced by the reader and consumed immediately; the
/// sequence and quality are guaranteed to have equal length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FastqRecord {
    pub metadata: String,
    pub sequence: Vec<u8>,
    pub quality: Vec<u8>,
}

impl FastqRecord {
    #[inline]
    pub fn len(&self) -> usize {
        self.sequence.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sequence.is_empty()
    }
}

impl std::fmt::Display for FastqRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{meta}\n{seq}\n+\n{qual}",
            meta = self.metadata,
            seq = String::from_utf8_lossy(&self.sequence),
            qual = String::from_utf8_lossy(&self.quality),
        )
    }
}

/// Parsed Illumina 1.8+ metadata line.
///
/// Structural problems (wrong field counts) fail the parse outright. Field
/// values that cannot be cast are logged and recorded as `None`; whether
/// they abort the run is the caller's decision via [`ReadMetadata::all_valid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadMetadata {
    pub instrument_name: String,
    pub run_id: Option<i64>,
    pub flowcell_id: String,
    pub tile_number: Option<i64>,
    pub lane_number: Option<i64>,
    pub x_coordinate: Option<i64>,
    pub y_coordinate: Option<i64>,
    pub direction: Option<u8>,
    pub passed_filter: Option<bool>,
    pub control_bits: Option<i64>,
    pub index: String,
    valid_equipment_info: bool,
    valid_read_info: bool,
}

impl ReadMetadata {
    pub fn parse(raw: &str) -> Result<ReadMetadata> {
        if !raw.starts_with('@') {
            warn!("metadata line does not start with '@'; possible corrupt file. Line: {raw}");
        }

        let pieces: Vec<&str> = raw.trim().split(' ').collect();
        if pieces.len() != 2 {
            let message = format!("metadata line does not have two space-separated sections: {raw}");
            error!("{message}");
            return Err(TrimsightError::format(message));
        }

        let mut metadata = ReadMetadata {
            instrument_name: String::new(),
            run_id: None,
            flowcell_id: String::new(),
            tile_number: None,
            lane_number: None,
            x_coordinate: None,
            y_coordinate: None,
            direction: None,
            passed_filter: None,
            control_bits: None,
            index: String::new(),
            valid_equipment_info: true,
            valid_read_info: true,
        };
        metadata.parse_equipment_info(pieces[0], raw)?;
        metadata.parse_read_info(pieces[1], raw)?;
        Ok(metadata)
    }

    /// Whether every field was individually castable and in range.
    #[inline]
    pub fn all_valid(&self) -> bool {
        self.valid_equipment_info && self.valid_read_info
    }

    /// Whether `self` and `other` describe the two mates of one cluster:
    /// equal equipment coordinates and index, with opposite directions.
    pub fn matches_mate(&self, other: &ReadMetadata) -> bool {
        let shared_fields_match = self.instrument_name == other.instrument_name
            && self.run_id == other.run_id
            && self.flowcell_id == other.flowcell_id
            && self.lane_number == other.lane_number
            && self.tile_number == other.tile_number
            && self.x_coordinate == other.x_coordinate
            && self.y_coordinate == other.y_coordinate
            && self.index == other.index;

        shared_fields_match
            && matches!(
                (self.direction, other.direction),
                (Some(1), Some(2)) | (Some(2), Some(1))
            )
    }

    fn parse_equipment_info(&mut self, equipment_info: &str, raw: &str) -> Result<()> {
        let equipment_info = equipment_info.replace('@', "");
        let fields: Vec<&str> = equipment_info.split(':').collect();
        if fields.len() != 7 {
            let message = format!("equipment info section of metadata did not have 7 elements: {raw}");
            error!("{message}");
            return Err(TrimsightError::format(message));
        }

        self.instrument_name = fields[0].to_string();
        self.flowcell_id = fields[2].to_string();

        fn cast(value: &str, label: &str, raw: &str, valid: &mut bool) -> Option<i64> {
            match value.parse::<i64>() {
                Ok(parsed) => Some(parsed),
                Err(_) => {
                    *valid = false;
                    error!("{label} could not be cast to integer. Metadata line: {raw}");
                    None
                }
            }
        }
        self.run_id = cast(fields[1], "run ID", raw, &mut self.valid_equipment_info);
        self.tile_number = cast(fields[3], "tile number", raw, &mut self.valid_equipment_info);
        self.lane_number = cast(fields[4], "lane number", raw, &mut self.valid_equipment_info);
        self.x_coordinate = cast(fields[5], "x-coordinate", raw, &mut self.valid_equipment_info);
        self.y_coordinate = cast(fields[6], "y-coordinate", raw, &mut self.valid_equipment_info);
        Ok(())
    }

    fn parse_read_info(&mut self, read_info: &str, raw: &str) -> Result<()> {
        let fields: Vec<&str> = read_info.split(':').collect();
        if fields.len() != 4 {
            let message = format!("read info section of metadata did not have 4 elements: {raw}");
            error!("{message}");
            return Err(TrimsightError::format(message));
        }

        match fields[0].parse::<u8>() {
            Ok(direction @ (1 | 2)) => self.direction = Some(direction),
            Ok(_) => {
                self.valid_read_info = false;
                error!("read direction found that was not 1 or 2. Line: {raw}");
            }
            Err(_) => {
                self.valid_read_info = false;
                error!("read direction could not be cast to integer. Line: {raw}");
            }
        }

        match fields[1] {
            "Y" | "y" => self.passed_filter = Some(false),
            "N" | "n" => self.passed_filter = Some(true),
            _ => {
                self.valid_read_info = false;
                error!("got a value for filtered that was not Y or N. Line: {raw}");
            }
        }

        match fields[2].parse::<i64>() {
            Ok(control_bits) if control_bits % 2 == 0 => self.control_bits = Some(control_bits),
            Ok(control_bits) => {
                self.valid_read_info = false;
                error!("got a control bits value of {control_bits}; control bits should be an even number. Line: {raw}");
            }
            Err(_) => {
                self.valid_read_info = false;
                error!("unable to cast control bits to an integer. Line: {raw}");
            }
        }

        self.index = fields[3].to_string();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const VALID_R1: &str = "@M02989:9:000000000-L4PJL:1:2112:9890:15606 1:N:0:AACGCACGAG+GCCTCGGATA";
    const VALID_R2: &str = "@M02989:9:000000000-L4PJL:1:2112:9890:15606 2:N:0:AACGCACGAG+GCCTCGGATA";

    #[test]
    fn parses_valid_illumina_metadata() {
        let metadata = ReadMetadata::parse(VALID_R1).unwrap();
        assert!(metadata.all_valid());
        assert_eq!(metadata.instrument_name, "M02989");
        assert_eq!(metadata.run_id, Some(9));
        assert_eq!(metadata.flowcell_id, "000000000-L4PJL");
        assert_eq!(metadata.tile_number, Some(1));
        assert_eq!(metadata.lane_number, Some(2112));
        assert_eq!(metadata.x_coordinate, Some(9890));
        assert_eq!(metadata.y_coordinate, Some(15606));
        assert_eq!(metadata.direction, Some(1));
        assert_eq!(metadata.passed_filter, Some(true));
        assert_eq!(metadata.control_bits, Some(0));
        assert_eq!(metadata.index, "AACGCACGAG+GCCTCGGATA");
    }

    #[test]
    fn wrong_section_counts_are_format_errors() {
        assert!(ReadMetadata::parse("@only_one_section").is_err());
        assert!(ReadMetadata::parse("@a:b:c 1:N:0:X").is_err());
        assert!(ReadMetadata::parse("@M02989:9:FC:1:2112:9890:15606 1:N:0").is_err());
    }

    #[test]
    fn uncastable_fields_invalidate_without_failing() {
        let metadata = ReadMetadata::parse("@M02989:nine:FC:1:2112:9890:15606 1:N:0:X").unwrap();
        assert!(!metadata.all_valid());
        assert_eq!(metadata.run_id, None);

        let metadata = ReadMetadata::parse("@M02989:9:FC:1:2112:9890:15606 1:N:3:X").unwrap();
        assert!(!metadata.all_valid());
        assert_eq!(metadata.control_bits, None);

        let metadata = ReadMetadata::parse("@M02989:9:FC:1:2112:9890:15606 3:N:0:X").unwrap();
        assert!(!metadata.all_valid());
        assert_eq!(metadata.direction, None);
    }

    #[test]
    fn mate_matching_requires_opposite_directions() {
        let r1 = ReadMetadata::parse(VALID_R1).unwrap();
        let r2 = ReadMetadata::parse(VALID_R2).unwrap();
        assert!(r1.matches_mate(&r2));
        assert!(r2.matches_mate(&r1));
        assert!(!r1.matches_mate(&r1));

        let other_cluster = ReadMetadata::parse("@M02989:9:000000000-L4PJL:1:2112:9890:99999 2:N:0:AACGCACGAG+GCCTCGGATA").unwrap();
        assert!(!r1.matches_mate(&other_cluster));
    }

    #[test]
    fn record_display_is_four_fastq_lines() {
        let record = FastqRecord {
            metadata: "@r1".to_string(),
            sequence: b"ACGT".to_vec(),
            quality: b"IIII".to_vec(),
        };
        assert_eq!(record.to_string(), "@r1\nACGT\n+\nIIII");
    }
}
