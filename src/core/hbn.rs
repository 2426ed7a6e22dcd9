// HSPF binary output (HBN) reader

use chrono::NaiveDateTime;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::constants::*;
use crate::core::cursor::ByteCursor;
use crate::core::error::{HspfError, Result};
use crate::core::format::*;
use crate::core::labels::LabelSpec;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Catalog,
    Extract,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    /// Resync attempts tolerated per scan before the stream is declared corrupt.
    pub resync_limit: usize,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            resync_limit: DEFAULT_RESYNC_LIMIT,
        }
    }
}

#[derive(Debug, Clone)]
pub enum ScanData {
    Catalog(BTreeMap<DecodedKey, CatalogEntry>),
    Series(BTreeMap<DecodedKey, TimeSeries>),
}

#[derive(Debug, Clone)]
pub struct ScanOutput {
    /// Sorted union of every matched timestamp.
    pub dates: Vec<NaiveDateTime>,
    pub data: ScanData,
    pub diagnostics: Vec<Diagnostic>,
    pub resyncs: usize,
}

impl ScanData {
    pub fn into_series(self) -> Option<BTreeMap<DecodedKey, TimeSeries>> {
        match self {
            ScanData::Series(s) => Some(s),
            ScanData::Catalog(_) => None,
        }
    }

    pub fn into_catalog(self) -> Option<BTreeMap<DecodedKey, CatalogEntry>> {
        match self {
            ScanData::Catalog(c) => Some(c),
            ScanData::Series(_) => None,
        }
    }
}

impl ScanOutput {
    pub fn series(&self) -> Option<&BTreeMap<DecodedKey, TimeSeries>> {
        match &self.data {
            ScanData::Series(s) => Some(s),
            ScanData::Catalog(_) => None,
        }
    }

    pub fn catalog(&self) -> Option<&BTreeMap<DecodedKey, CatalogEntry>> {
        match &self.data {
            ScanData::Catalog(c) => Some(c),
            ScanData::Series(_) => None,
        }
    }

    pub fn keys(&self) -> Vec<&DecodedKey> {
        match &self.data {
            ScanData::Catalog(c) => c.keys().collect(),
            ScanData::Series(s) => s.keys().collect(),
        }
    }

    /// Flattened `(key, timestamp, value)` records in key order.
    pub fn records(&self) -> Vec<(&DecodedKey, NaiveDateTime, f64)> {
        self.series()
            .map(|series| {
                series
                    .iter()
                    .flat_map(|(key, ts)| ts.iter().map(move |(t, v)| (key, t, v)))
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// HBN file loaded into memory.
pub struct HbnReader {
    path: PathBuf,
    data: Vec<u8>,
}

impl HbnReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = fs::read(&path)?;
        if data.first() != Some(&HBN_MAGIC) {
            return Err(HspfError::NotThisFormat {
                expected: vec![HBN_MAGIC],
                got: data.first().map(|b| vec![*b]).unwrap_or_default(),
            });
        }
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn scan(
        &self,
        selection: &[LabelSpec],
        interval: Option<Interval>,
        mode: ScanMode,
        options: &ScanOptions,
    ) -> Result<ScanOutput> {
        scan_with(&self.data, selection, interval, mode, options)
    }

    pub fn catalog(&self, selection: &[LabelSpec]) -> Result<BTreeMap<DecodedKey, CatalogEntry>> {
        catalog(&self.data, selection)
    }

    pub fn extract(
        &self,
        interval: Interval,
        selection: &[LabelSpec],
    ) -> Result<BTreeMap<DecodedKey, TimeSeries>> {
        extract(&self.data, interval, selection)
    }
}

pub fn catalog(data: &[u8], selection: &[LabelSpec]) -> Result<BTreeMap<DecodedKey, CatalogEntry>> {
    let out = scan(data, selection, None, ScanMode::Catalog)?;
    Ok(out.data.into_catalog().unwrap_or_default())
}

pub fn extract(
    data: &[u8],
    interval: Interval,
    selection: &[LabelSpec],
) -> Result<BTreeMap<DecodedKey, TimeSeries>> {
    let out = scan(data, selection, Some(interval), ScanMode::Extract)?;
    Ok(out.data.into_series().unwrap_or_default())
}

pub fn scan(
    data: &[u8],
    selection: &[LabelSpec],
    interval: Option<Interval>,
    mode: ScanMode,
) -> Result<ScanOutput> {
    scan_with(data, selection, interval, mode, &ScanOptions::default())
}

/// Walks every record of an HBN stream and collects what `selection` asks for.
///
/// An empty selection means "everything".
pub fn scan_with(
    data: &[u8],
    selection: &[LabelSpec],
    interval: Option<Interval>,
    mode: ScanMode,
    options: &ScanOptions,
) -> Result<ScanOutput> {
    if mode == ScanMode::Extract && interval.is_none() {
        return Err(HspfError::InvalidInterval(
            "extracting values requires an interval".to_string(),
        ));
    }

    let specs: Vec<LabelSpec> = if selection.is_empty() {
        vec![LabelSpec::any()]
    } else {
        selection.to_vec()
    };
    let specs: Vec<LabelSpec> = specs.into_iter().map(|s| s.with_interval(interval)).collect();

    let mut scanner = Scanner {
        cursor: ByteCursor::new(data),
        specs: &specs,
        mode,
        resync_limit: options.resync_limit,
        vnames: HashMap::new(),
        matched: vec![false; specs.len()],
        dates: BTreeSet::new(),
        series: BTreeMap::new(),
        observed: BTreeMap::new(),
        diagnostics: Vec::new(),
        resync_offsets: HashSet::new(),
    };
    scanner.run()?;
    scanner.finish()
}

/// Offset just past the record at `offset`, back pointer included, by its length field.
fn record_end(offset: usize, header: &RecordHeader) -> Option<usize> {
    let payload = usize::try_from(header.payload_len()).ok()?;
    let recpos = RECORD_LEADER_SIZE.checked_add(payload)?;
    offset
        .checked_add(recpos)?
        .checked_add(back_pointer_width(recpos))
}

struct Scanner<'a> {
    cursor: ByteCursor<'a>,
    specs: &'a [LabelSpec],
    mode: ScanMode,
    resync_limit: usize,
    vnames: HashMap<(u32, String), Vec<String>>,
    matched: Vec<bool>,
    dates: BTreeSet<NaiveDateTime>,
    series: BTreeMap<DecodedKey, TimeSeries>,
    observed: BTreeMap<DecodedKey, BTreeSet<NaiveDateTime>>,
    diagnostics: Vec<Diagnostic>,
    resync_offsets: HashSet<usize>,
}

impl Scanner<'_> {
    fn run(&mut self) -> Result<()> {
        let magic = self.cursor.read_u8().map_err(|_| HspfError::NotThisFormat {
            expected: vec![HBN_MAGIC],
            got: Vec::new(),
        })?;
        if magic != HBN_MAGIC {
            return Err(HspfError::NotThisFormat {
                expected: vec![HBN_MAGIC],
                got: vec![magic],
            });
        }

        while !self.cursor.is_at_end() {
            let offset = self.cursor.position();
            self.read_record()
                .map_err(|e| match e {
                    HspfError::UnexpectedEnd { .. } => HspfError::TruncatedRecord { offset },
                    other => other,
                })?;
        }
        Ok(())
    }

    fn read_record(&mut self) -> Result<()> {
        let offset = self.cursor.position();
        let header = self.read_record_header()?;
        let mut recpos = RECORD_LEADER_SIZE;

        match header.kind {
            RecordKind::Header => recpos += self.read_variable_names(&header)?,
            RecordKind::Data => recpos += self.read_data(&header)?,
            RecordKind::Other(code) => {
                // A second resync at the same offset means the rewind oscillates.
                let repeated = !self.resync_offsets.insert(offset);
                if repeated || self.resync_offsets.len() > self.resync_limit {
                    return Err(HspfError::ResyncLimitExceeded {
                        attempts: self.resync_offsets.len(),
                        offset,
                    });
                }
                self.diagnostics.push(Diagnostic::Resync { offset });

                // The fixed rewind lands two bytes before this record's leader.
                let rewound = offset + RECORD_LEADER_SIZE + back_pointer_width(RECORD_LEADER_SIZE);
                let landing = rewound
                    .checked_sub(RESYNC_REWIND as usize)
                    .filter(|&pos| self.is_record_start(pos));
                if let Some(pos) = landing {
                    debug!(
                        "Unrecognized record kind {} at byte {}, resyncing to {}",
                        code, offset, pos
                    );
                    return self.cursor.seek_to(pos);
                }

                let skip_to = record_end(offset, &header)
                    .filter(|&pos| pos == self.cursor.len() || self.is_record_start(pos));
                if let Some(pos) = skip_to {
                    debug!(
                        "Unrecognized record kind {} at byte {}, skipping to {}",
                        code, offset, pos
                    );
                    return self.cursor.seek_to(pos);
                }

                debug!("Unrecognized record kind {} at byte {}, rewinding", code, offset);
                self.cursor.seek_relative(-RESYNC_REWIND)?;
            }
        }

        self.cursor.skip(back_pointer_width(recpos))
    }

    /// True when a Header or Data leader of a known operation starts at `pos`.
    fn is_record_start(&self, pos: usize) -> bool {
        let Some(leader) = self.cursor.peek_at(pos, RECORD_LEADER_SIZE) else {
            return false;
        };
        let kind = u32::from_le_bytes([leader[4], leader[5], leader[6], leader[7]]);
        let operation = String::from_utf8_lossy(&leader[8..16]);
        let operation = operation.trim_end_matches(|c: char| c.is_whitespace() || c == '\0');
        matches!(RecordKind::from_u32(kind), RecordKind::Header | RecordKind::Data)
            && operation.parse::<Operation>().is_ok()
    }

    fn read_record_header(&mut self) -> Result<RecordHeader> {
        let mut length = [0u8; 4];
        length.copy_from_slice(self.cursor.read_bytes(LENGTH_FIELD_SIZE)?);
        let kind = RecordKind::from_u32(self.cursor.read_u32()?);
        let operation = self.cursor.read_trimmed(8)?;
        let element = self.cursor.read_u32()?;
        let group = self.cursor.read_trimmed(8)?;

        Ok(RecordHeader {
            length_words: decode_length_field(length),
            kind,
            operation,
            element,
            group,
        })
    }

    /// Reads `(length, name)` pairs until the declared payload is consumed.
    fn read_variable_names(&mut self, header: &RecordHeader) -> Result<usize> {
        let payload = header.payload_len();
        let names = self
            .vnames
            .entry((header.element, header.group.clone()))
            .or_default();

        let mut consumed = 0usize;
        while (consumed as i64) < payload {
            let len = self.cursor.read_u32()? as usize;
            let raw = self.cursor.read_bytes(len)?;
            names.push(String::from_utf8_lossy(raw).into_owned());
            consumed += len + 4;
        }

        debug!(
            "Header {} {} {}: {} variables",
            header.operation,
            header.element,
            header.group,
            names.len()
        );
        Ok(consumed)
    }

    fn read_data(&mut self, header: &RecordHeader) -> Result<usize> {
        let names = self
            .vnames
            .get(&(header.element, header.group.clone()))
            .cloned()
            .ok_or_else(|| HspfError::UnknownCatalogKey {
                element: header.element,
                group: header.group.clone(),
            })?;

        let _unused = self.cursor.read_u32()?;
        let level = self.cursor.read_u32()?;
        let time = TimePoint {
            year: self.cursor.read_u32()?,
            month: self.cursor.read_u32()?,
            day: self.cursor.read_u32()?,
            hour: self.cursor.read_u32()?,
            minute: self.cursor.read_u32()?,
        };
        let values = (0..names.len())
            .map(|_| self.cursor.read_f32())
            .collect::<Result<Vec<_>>>()?;
        let timestamp = time.to_datetime()?;

        for (name, value) in names.iter().zip(values) {
            let candidate = DecodedKey {
                operation: header.operation.clone(),
                element: header.element,
                group: header.group.clone(),
                variable: name.clone(),
                interval_code: level,
            };
            self.collect(&candidate, timestamp, value, level);
        }

        Ok(DATA_PREFIX_SIZE + 4 * names.len())
    }

    fn collect(&mut self, candidate: &DecodedKey, timestamp: NaiveDateTime, value: f32, level: u32) {
        let specs = self.specs;
        for (index, spec) in specs.iter().enumerate() {
            let Some(key) = spec.try_match(candidate) else {
                continue;
            };
            self.matched[index] = true;
            self.dates.insert(timestamp);

            match self.mode {
                ScanMode::Extract => {
                    if spec.interval_code == Some(level) {
                        let series = self.series.entry(key).or_default();
                        // Overlapping specs resolve to the same key; keep one value per record.
                        if series.last() != Some(timestamp) {
                            series.push(timestamp, value as f64);
                        }
                    }
                }
                ScanMode::Catalog => {
                    self.observed.entry(key).or_default().insert(timestamp);
                }
            }
        }
    }

    fn finish(mut self) -> Result<ScanOutput> {
        let empty = match self.mode {
            ScanMode::Extract => self.series.is_empty(),
            ScanMode::Catalog => self.observed.is_empty(),
        };
        if empty {
            return Err(HspfError::NoMatchingRecords {
                labels: self.specs.iter().map(|s| s.to_string()).collect(),
            });
        }

        let unmatched: Vec<String> = self
            .specs
            .iter()
            .zip(&self.matched)
            .filter(|(_, matched)| !**matched)
            .map(|(spec, _)| spec.to_string())
            .collect();
        if !unmatched.is_empty() {
            warn!("Labels matched no records in the binary file: {:?}", unmatched);
            self.diagnostics.push(Diagnostic::PartialMatch { unmatched });
        }

        let data = match self.mode {
            ScanMode::Extract => ScanData::Series(self.series),
            ScanMode::Catalog => ScanData::Catalog(
                self.observed
                    .into_iter()
                    .filter_map(|(key, dates)| {
                        let entry = catalog_entry(&key, &dates)?;
                        Some((key, entry))
                    })
                    .collect(),
            ),
        };

        info!(
            "HBN scan finished: {} dates, {} resyncs",
            self.dates.len(),
            self.resync_offsets.len()
        );

        Ok(ScanOutput {
            dates: self.dates.into_iter().collect(),
            data,
            diagnostics: self.diagnostics,
            resyncs: self.resync_offsets.len(),
        })
    }
}

fn catalog_entry(key: &DecodedKey, dates: &BTreeSet<NaiveDateTime>) -> Option<CatalogEntry> {
    let mut iter = dates.iter().copied();
    let start = iter.next()?;
    let second = iter.next();
    let end = dates.iter().next_back().copied().unwrap_or(start);

    let frequency = match key.interval() {
        Some(interval) => interval.frequency().unwrap_or(match second {
            Some(next) => Frequency::Every((next - start).num_seconds()),
            None => Frequency::Irregular,
        }),
        None => Frequency::Irregular,
    };

    Some(CatalogEntry {
        interval_code: key.interval_code,
        start,
        end,
        frequency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length_field(payload: usize) -> [u8; 4] {
        let v = (RECORD_HEADER_SIZE + payload) as u32;
        [
            ((v % 64) * 4) as u8,
            ((v / 64) % 256) as u8,
            ((v / 16384) % 256) as u8,
            (v / 4_194_304) as u8,
        ]
    }

    fn leader(buf: &mut Vec<u8>, payload: usize, kind: u32, element: u32, group: &str) {
        buf.extend_from_slice(&length_field(payload));
        buf.extend_from_slice(&kind.to_le_bytes());
        buf.extend_from_slice(b"RCHRES  ");
        buf.extend_from_slice(&element.to_le_bytes());
        buf.extend_from_slice(format!("{:<8}", group).as_bytes());
    }

    fn stream(hour: u32) -> Vec<u8> {
        let mut buf = vec![HBN_MAGIC];
        leader(&mut buf, 10, 0, 14, "HYDR");
        for name in ["A", "B"] {
            buf.extend_from_slice(&1u32.to_le_bytes());
            buf.extend_from_slice(name.as_bytes());
        }
        buf.extend_from_slice(&[0u8; 1]);

        leader(&mut buf, 36, 1, 14, "HYDR");
        for word in [0, 3, 1980, 6, 15, hour, 0] {
            buf.extend_from_slice(&(word as u32).to_le_bytes());
        }
        buf.extend_from_slice(&1.5f32.to_le_bytes());
        buf.extend_from_slice(&2.5f32.to_le_bytes());
        buf.extend_from_slice(&[0u8; 2]);
        buf
    }

    #[test]
    fn test_extract_two_variables() {
        let spec = LabelSpec {
            element: Some(14),
            group: Some("HYDR".into()),
            ..LabelSpec::any()
        };
        let out = extract(&stream(12), Interval::Daily, &[spec]).unwrap();
        assert_eq!(out.len(), 2);
        let values: Vec<f64> = out.values().map(|s| s.values[0]).collect();
        assert_eq!(values, vec![1.5, 2.5]);
        let ts = out.values().next().unwrap().timestamps[0];
        assert_eq!(ts.to_string(), "1980-06-15 12:00:00");
    }

    #[test]
    fn test_hour_24_no_rollover() {
        let out = extract(&stream(24), Interval::Daily, &[]).unwrap();
        let ts = out.values().next().unwrap().timestamps[0];
        assert_eq!(ts.to_string(), "1980-06-15 00:00:00");
    }

    #[test]
    fn test_bad_magic() {
        let mut data = stream(0);
        data[0] = 0xFE;
        assert!(matches!(
            extract(&data, Interval::Daily, &[]),
            Err(HspfError::NotThisFormat { .. })
        ));
        assert!(matches!(
            extract(&[], Interval::Daily, &[]),
            Err(HspfError::NotThisFormat { .. })
        ));
    }

    #[test]
    fn test_extract_requires_interval() {
        let err = scan(&stream(0), &[], None, ScanMode::Extract).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_truncated_record() {
        let mut data = stream(0);
        data.truncate(data.len() - 5);
        assert!(matches!(
            extract(&data, Interval::Daily, &[]),
            Err(HspfError::TruncatedRecord { .. })
        ));
    }
}
