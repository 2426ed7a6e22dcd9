// Data structures shared by the HBN and WDM readers

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::constants::*;
use crate::core::error::{HspfError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Header,
    Data,
    Other(u32),
}

impl RecordKind {
    pub fn from_u32(val: u32) -> Self {
        match val {
            0 => RecordKind::Header,
            1 => RecordKind::Data,
            other => RecordKind::Other(other),
        }
    }
}

/// Leader of one HBN record.
#[derive(Debug, Clone)]
pub struct RecordHeader {
    /// Record length in bytes from the mixed-radix bitfield, header included.
    pub length_words: u32,
    pub kind: RecordKind,
    pub operation: String,
    pub element: u32,
    pub group: String,
}

impl RecordHeader {
    /// Payload bytes that follow the 24-byte header.
    pub fn payload_len(&self) -> i64 {
        self.length_words as i64 - RECORD_HEADER_SIZE as i64
    }
}

/// Decodes the 4-byte length bitfield that opens every HBN record.
pub fn decode_length_field(bytes: [u8; 4]) -> u32 {
    let low = bytes[0] as u32 / 4;
    let mid = bytes[1] as u32 * 64 + low;
    let high = bytes[2] as u32 * 16384 + mid;
    bytes[3] as u32 * 4_194_304 + high
}

/// Width of the back pointer trailing a record of `recpos` bytes.
pub fn back_pointer_width(recpos: usize) -> usize {
    let reccnt = recpos * 4 + 1;
    if reccnt >= 256 * 256 {
        3
    } else if reccnt >= 256 {
        2
    } else {
        1
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimePoint {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
}

impl TimePoint {
    /// HBN convention: hour 24 becomes hour 0 of the same day.
    pub fn to_datetime(self) -> Result<NaiveDateTime> {
        let hour = if self.hour == 24 { 0 } else { self.hour };
        NaiveDate::from_ymd_opt(self.year as i32, self.month, self.day)
            .and_then(|d| d.and_hms_opt(hour, self.minute, 0))
            .ok_or_else(|| HspfError::InvalidTimestamp(format!("{:?}", self)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interval {
    Yearly,
    Monthly,
    Daily,
    #[serde(rename = "bivl")]
    BlockInterval,
}

impl Interval {
    pub fn code(self) -> u32 {
        match self {
            Interval::Yearly => 5,
            Interval::Monthly => 4,
            Interval::Daily => 3,
            Interval::BlockInterval => 2,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            5 => Some(Interval::Yearly),
            4 => Some(Interval::Monthly),
            3 => Some(Interval::Daily),
            2 => Some(Interval::BlockInterval),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Interval::Yearly => "yearly",
            Interval::Monthly => "monthly",
            Interval::Daily => "daily",
            Interval::BlockInterval => "bivl",
        }
    }

    /// Calendar frequency, when it is fixed a priori.
    pub fn frequency(self) -> Option<Frequency> {
        match self {
            Interval::Yearly => Some(Frequency::Yearly),
            Interval::Monthly => Some(Frequency::Monthly),
            Interval::Daily => Some(Frequency::Daily),
            Interval::BlockInterval => None,
        }
    }
}

impl FromStr for Interval {
    type Err = HspfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "yearly" => Ok(Interval::Yearly),
            "monthly" => Ok(Interval::Monthly),
            "daily" => Ok(Interval::Daily),
            "bivl" => Ok(Interval::BlockInterval),
            _ => Err(HspfError::InvalidInterval(format!(
                "must be one of \"bivl\", \"daily\", \"monthly\" or \"yearly\", not \"{}\"",
                s
            ))),
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    #[serde(rename = "PERLND")]
    Perlnd,
    #[serde(rename = "IMPLND")]
    Implnd,
    #[serde(rename = "RCHRES")]
    Rchres,
    #[serde(rename = "BMPRAC")]
    Bmprac,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Perlnd => "PERLND",
            Operation::Implnd => "IMPLND",
            Operation::Rchres => "RCHRES",
            Operation::Bmprac => "BMPRAC",
        }
    }

    pub fn allowed_groups(self) -> &'static [&'static str] {
        match self {
            Operation::Perlnd => PERLND_GROUPS,
            Operation::Implnd => IMPLND_GROUPS,
            Operation::Rchres => RCHRES_GROUPS,
            Operation::Bmprac => BMPRAC_GROUPS,
        }
    }
}

impl FromStr for Operation {
    type Err = HspfError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_uppercase().as_str() {
            "PERLND" => Ok(Operation::Perlnd),
            "IMPLND" => Ok(Operation::Implnd),
            "RCHRES" => Ok(Operation::Rchres),
            "BMPRAC" => Ok(Operation::Bmprac),
            _ => Err(HspfError::InvalidLabel(format!(
                "operation type must be one of PERLND, IMPLND, RCHRES or BMPRAC, \
                 or missing (to get all), not {}",
                s
            ))),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fully resolved identity of one HBN series.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DecodedKey {
    pub operation: String,
    pub element: u32,
    pub group: String,
    pub variable: String,
    pub interval_code: u32,
}

impl DecodedKey {
    pub fn interval(&self) -> Option<Interval> {
        Interval::from_code(self.interval_code)
    }

    pub fn column_name(&self) -> String {
        format!("{}_{}_{}", self.operation, self.element, self.variable).replace(' ', "-")
    }
}

impl fmt::Display for DecodedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{}",
            self.operation, self.element, self.group, self.variable, self.interval_code
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TimeSeries {
    pub timestamps: Vec<NaiveDateTime>,
    pub values: Vec<f64>,
}

impl TimeSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            timestamps: Vec::with_capacity(cap),
            values: Vec::with_capacity(cap),
        }
    }

    pub fn push(&mut self, timestamp: NaiveDateTime, value: f64) {
        self.timestamps.push(timestamp);
        self.values.push(value);
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDateTime, f64)> + '_ {
        self.timestamps.iter().copied().zip(self.values.iter().copied())
    }

    pub fn first(&self) -> Option<NaiveDateTime> {
        self.timestamps.first().copied()
    }

    pub fn last(&self) -> Option<NaiveDateTime> {
        self.timestamps.last().copied()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Frequency {
    Yearly,
    Monthly,
    Daily,
    /// Fixed spacing in seconds.
    Every(i64),
    /// Spacing could not be inferred (fewer than two observations).
    Irregular,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Yearly => f.write_str("A"),
            Frequency::Monthly => f.write_str("M"),
            Frequency::Daily => f.write_str("D"),
            Frequency::Every(secs) => write!(f, "{}s", secs),
            Frequency::Irregular => f.write_str("irregular"),
        }
    }
}

/// Span of one series as reported by a catalog scan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub interval_code: u32,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub frequency: Frequency,
}

impl CatalogEntry {
    pub fn start_period(&self) -> String {
        self.period_label(self.start)
    }

    pub fn end_period(&self) -> String {
        self.period_label(self.end)
    }

    fn period_label(&self, ts: NaiveDateTime) -> String {
        let pattern = match self.frequency {
            Frequency::Yearly => "%Y",
            Frequency::Monthly => "%Y-%m",
            Frequency::Daily => "%Y-%m-%d",
            Frequency::Every(_) | Frequency::Irregular => "%Y-%m-%d %H:%M",
        };
        ts.format(pattern).to_string()
    }
}

/// Non-fatal conditions met while decoding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Diagnostic {
    PartialMatch { unmatched: Vec<String> },
    Resync { offset: usize },
    UnknownAttribute { dsn: i32, id: i32, pointer: i32 },
    DatasetCountMismatch { found: usize, declared: i32 },
    DatasetMissing { dsn: i32 },
    EmptyDataset { dsn: i32 },
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::PartialMatch { unmatched } => {
                write!(f, "labels matched no records: {}", unmatched.join(" "))
            }
            Diagnostic::Resync { offset } => write!(f, "resynchronized at byte {}", offset),
            Diagnostic::UnknownAttribute { dsn, id, pointer } => write!(
                f,
                "dataset {}: unknown attribute id {} (pointer {})",
                dsn, id, pointer
            ),
            Diagnostic::DatasetCountMismatch { found, declared } => write!(
                f,
                "found {} dataset records, file declares {}",
                found, declared
            ),
            Diagnostic::DatasetMissing { dsn } => write!(f, "dataset {} not found", dsn),
            Diagnostic::EmptyDataset { dsn } => {
                write!(f, "dataset {} is allocated but holds no data", dsn)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum AttributeData {
    Int(i32),
    Real(f32),
    Str(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeValue {
    pub id: u16,
    pub name: &'static str,
    pub value: AttributeData,
}

impl AttributeValue {
    pub fn as_int(&self) -> Option<i32> {
        match self.value {
            AttributeData::Int(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f32> {
        match self.value {
            AttributeData::Real(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.value {
            AttributeData::Str(v) => Some(v),
            _ => None,
        }
    }
}

/// Zero-based (block, word offset) locator decoded from a pointer-chain word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PointerChainEntry {
    pub block: usize,
    pub offset: usize,
}

impl PointerChainEntry {
    pub fn from_word(word: i32) -> Result<Self> {
        let block = (word >> 9) - 1;
        let offset = (word & 511) - 1;
        if block < 0 || offset < 0 {
            return Err(HspfError::CorruptedData(format!(
                "pointer word {} does not address a block",
                word
            )));
        }
        Ok(Self {
            block: block as usize,
            offset: offset as usize,
        })
    }

    /// Absolute word index of the entry.
    pub fn word_index(&self) -> usize {
        self.block * BLOCK_WORDS + self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_field_mixed_radix() {
        // 24 header bytes + 40 payload bytes
        let v = 64u32;
        let bytes = [((v % 64) * 4) as u8, ((v / 64) % 256) as u8, 0, 0];
        assert_eq!(decode_length_field(bytes), 64);
        // byte0 low bits are flags and must be discarded
        assert_eq!(decode_length_field([0x03, 0, 0, 0]), 0);
        assert_eq!(decode_length_field([4, 1, 1, 1]), 1 + 64 + 16384 + 4_194_304);
    }

    #[test]
    fn test_back_pointer_width_thresholds() {
        assert_eq!(back_pointer_width(28), 1);
        assert_eq!(back_pointer_width(63), 1);
        assert_eq!(back_pointer_width(64), 2);
        assert_eq!(back_pointer_width(16383), 2);
        assert_eq!(back_pointer_width(16384), 3);
    }

    #[test]
    fn test_hour_24_stays_on_same_day() {
        let tp = TimePoint {
            year: 1976,
            month: 1,
            day: 31,
            hour: 24,
            minute: 0,
        };
        let ts = tp.to_datetime().unwrap();
        assert_eq!(ts.to_string(), "1976-01-31 00:00:00");
    }

    #[test]
    fn test_invalid_time_point() {
        let tp = TimePoint {
            year: 1976,
            month: 13,
            day: 1,
            hour: 0,
            minute: 0,
        };
        assert!(matches!(tp.to_datetime(), Err(HspfError::InvalidTimestamp(_))));
    }

    #[test]
    fn test_interval_codes_and_names() {
        for interval in [
            Interval::Yearly,
            Interval::Monthly,
            Interval::Daily,
            Interval::BlockInterval,
        ] {
            assert_eq!(Interval::from_code(interval.code()), Some(interval));
            assert_eq!(interval.name().parse::<Interval>().unwrap(), interval);
        }
        assert_eq!("DAILY".parse::<Interval>().unwrap(), Interval::Daily);
        assert!("hourly".parse::<Interval>().is_err());
        assert_eq!(Interval::from_code(1), None);
    }

    #[test]
    fn test_column_name_replaces_spaces() {
        let key = DecodedKey {
            operation: "PERLND".into(),
            element: 101,
            group: "PWATER".into(),
            variable: "SUP ERO".into(),
            interval_code: 3,
        };
        assert_eq!(key.column_name(), "PERLND_101_SUP-ERO");
    }

    #[test]
    fn test_pointer_chain_entry() {
        let entry = PointerChainEntry::from_word((3 << 9) | 5).unwrap();
        assert_eq!(entry, PointerChainEntry { block: 2, offset: 4 });
        assert_eq!(entry.word_index(), 2 * 512 + 4);
        assert!(PointerChainEntry::from_word(5).is_err());
    }

    #[test]
    fn test_period_labels() {
        let start = NaiveDate::from_ymd_opt(1976, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let mut entry = CatalogEntry {
            interval_code: 4,
            start,
            end: start,
            frequency: Frequency::Monthly,
        };
        assert_eq!(entry.start_period(), "1976-01");
        entry.frequency = Frequency::Yearly;
        assert_eq!(entry.end_period(), "1976");
    }
}
