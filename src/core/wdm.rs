// WDM (Watershed Data Management) file reader

use chrono::{NaiveDate, NaiveDateTime, TimeDelta};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::compression::decode_runs;
use crate::core::constants::*;
use crate::core::cursor::WordView;
use crate::core::error::{HspfError, Result};
use crate::core::format::*;
use crate::core::timebase::{coarse_grid, group_counts, ticks, TimeUnit};

/// Date packed into one WDM word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedDate {
    pub year: i32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
}

impl PackedDate {
    pub fn from_word(word: i32) -> Self {
        Self {
            year: word.div_euclid(16384).rem_euclid(131072),
            month: word.div_euclid(1024).rem_euclid(16) as u32,
            day: word.div_euclid(32).rem_euclid(32) as u32,
            hour: word.rem_euclid(32) as u32,
        }
    }

    pub fn to_word(self) -> i32 {
        self.year * 16384 + self.month as i32 * 1024 + self.day as i32 * 32 + self.hour as i32
    }

    /// WDM convention: hour 24 rolls over to hour 0 of the next day.
    pub fn to_datetime(self) -> Result<NaiveDateTime> {
        let invalid = || HspfError::InvalidTimestamp(format!("{:?}", self));
        let date = NaiveDate::from_ymd_opt(self.year, self.month, self.day).ok_or_else(invalid)?;
        if self.hour == 24 {
            return date
                .and_hms_opt(23, 0, 0)
                .and_then(|t| t.checked_add_signed(TimeDelta::hours(1)))
                .ok_or_else(invalid);
        }
        date.and_hms_opt(self.hour, 0, 0).ok_or_else(invalid)
    }
}

/// One dataset column decoded from a WDM file.
#[derive(Debug, Clone)]
pub struct WdmSeries {
    pub name: String,
    pub dsn: i32,
    pub attributes: BTreeMap<&'static str, AttributeValue>,
    pub series: TimeSeries,
}

impl WdmSeries {
    pub fn attribute(&self, name: &str) -> Option<&AttributeValue> {
        self.attributes.get(name)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MultiSeries {
    pub columns: Vec<WdmSeries>,
    pub diagnostics: Vec<Diagnostic>,
}

impl MultiSeries {
    pub fn column(&self, dsn: i32) -> Option<&WdmSeries> {
        self.columns.iter().find(|c| c.dsn == dsn)
    }

    /// Outer join of every column on timestamp.
    pub fn rows(&self) -> Vec<(NaiveDateTime, Vec<Option<f64>>)> {
        let lookups: Vec<HashMap<NaiveDateTime, f64>> = self
            .columns
            .iter()
            .map(|c| c.series.iter().collect())
            .collect();
        let index: BTreeSet<NaiveDateTime> = self
            .columns
            .iter()
            .flat_map(|c| c.series.timestamps.iter().copied())
            .collect();

        index
            .into_iter()
            .map(|ts| (ts, lookups.iter().map(|l| l.get(&ts).copied()).collect()))
            .collect()
    }
}

/// WDM file loaded into memory.
pub struct WdmFile {
    path: PathBuf,
    data: Vec<u8>,
}

impl WdmFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let data = fs::read(&path)?;
        check_magic(WordView::new(&data))?;
        if data.len() % (BLOCK_WORDS * WORD_SIZE) != 0 {
            warn!(
                "{} is {} bytes, not a whole number of {}-word blocks",
                path.display(),
                data.len(),
                BLOCK_WORDS
            );
        }
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dataset numbers present in the file, in file order.
    pub fn dataset_numbers(&self) -> Result<Vec<i32>> {
        let words = WordView::new(&self.data);
        check_magic(words)?;
        let (found, _) = find_datasets(words)?;
        found
            .into_iter()
            .map(|index| words.int(index + DSN_ID))
            .collect()
    }

    pub fn extract(&self, dsns: &[i32]) -> Result<MultiSeries> {
        extract(&self.path.to_string_lossy(), &self.data, dsns)
    }
}

fn check_magic(words: WordView<'_>) -> Result<()> {
    let magic = words.int(0).map_err(|_| HspfError::NotThisFormat {
        expected: WDM_MAGIC.to_le_bytes().to_vec(),
        got: Vec::new(),
    })?;
    if magic != WDM_MAGIC {
        return Err(HspfError::NotThisFormat {
            expected: WDM_MAGIC.to_le_bytes().to_vec(),
            got: magic.to_le_bytes().to_vec(),
        });
    }
    Ok(())
}

/// Word indices of dataset label blocks, plus the count the file declares.
fn find_datasets(words: WordView<'_>) -> Result<(Vec<usize>, i32)> {
    let nrecords = words.int(FDR_RECORD_COUNT)?.max(0) as usize;
    let declared = words.int(FDR_DATASET_COUNT)?;
    let blocks = nrecords.min(words.len() / BLOCK_WORDS);
    if blocks < nrecords {
        warn!("File declares {} blocks but holds {}", nrecords, blocks);
    }

    let mut found = Vec::new();
    for index in (BLOCK_WORDS..blocks * BLOCK_WORDS).step_by(BLOCK_WORDS) {
        let free = words.int(index)? == 0
            && words.int(index + 1)? == 0
            && words.int(index + 2)? == 0
            && words.int(index + 3)? != 0;
        if !free && words.int(index + DSN_FLAG)? == 1 {
            found.push(index);
        }
    }
    Ok((found, declared))
}

/// Decodes the attributes of the dataset label at word `index`.
fn read_attributes(
    words: WordView<'_>,
    index: usize,
    dsn: i32,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<BTreeMap<&'static str, AttributeValue>> {
    let mut attrs = BTreeMap::new();
    for (id, name, value) in [
        (29, "TSBDY", AttributeData::Int(1)),
        (30, "TSBHR", AttributeData::Int(1)),
        (28, "TSBMO", AttributeData::Int(1)),
        (27, "TSBYR", AttributeData::Int(1900)),
        (32, "TFILL", AttributeData::Real(DEFAULT_FILL)),
    ] {
        attrs.insert(name, AttributeValue { id, name, value });
    }

    let psa = words.int(index + DSN_ATTR_START)? as i64;
    if psa <= 0 {
        return Ok(attrs);
    }
    let count = words.int_at(index, psa - 1)?.max(0) as i64;

    for i in (psa + 1..psa + 1 + 2 * count).step_by(2) {
        let raw_id = words.int_at(index, i)?;
        let pointer = words.int_at(index, i + 1)?;
        let info = u16::try_from(raw_id).ok().and_then(|id| Some((id, attribute_info(id)?)));
        let Some((id, (name, kind, length))) = info else {
            warn!(
                "Dataset {}: attribute id {} not found (attribute pointer {})",
                dsn, raw_id, pointer
            );
            diagnostics.push(Diagnostic::UnknownAttribute {
                dsn,
                id: raw_id,
                pointer,
            });
            continue;
        };

        let at = pointer as i64 - 1;
        let value = match kind {
            AttributeKind::Int => AttributeData::Int(words.int_at(index, at)?),
            AttributeKind::Real => AttributeData::Real(words.real_at(index, at)?),
            AttributeKind::Str => {
                let mut text = String::with_capacity(length);
                for k in 0..(length / WORD_SIZE) as i64 {
                    let word = words.int_at(index, at + k)?;
                    text.extend(word.to_le_bytes().iter().map(|&b| b as char));
                }
                AttributeData::Str(text.trim_end().to_string())
            }
        };
        attrs.insert(name, AttributeValue { id, name, value });
    }

    Ok(attrs)
}

fn required_int(
    attrs: &BTreeMap<&'static str, AttributeValue>,
    dsn: i32,
    name: &'static str,
) -> Result<i32> {
    attrs
        .get(name)
        .and_then(AttributeValue::as_int)
        .ok_or(HspfError::MissingAttribute { dsn, name })
}

fn read_chain(words: WordView<'_>, index: usize) -> Result<Vec<PointerChainEntry>> {
    let pdat = words.int(index + DSN_CHAIN_START)? as i64;
    let pdatv = words.int(index + DSN_CHAIN_END)? as i64;

    let mut chain = Vec::new();
    for i in pdat + 1..pdatv - 1 {
        let word = words.int_at(index, i)?;
        if word != 0 {
            chain.push(PointerChainEntry::from_word(word)?);
        }
    }
    Ok(chain)
}

fn read_dataset(
    source: &str,
    words: WordView<'_>,
    index: usize,
    dsn: i32,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<Option<WdmSeries>> {
    let attributes = read_attributes(words, index, dsn, diagnostics)?;

    let chain = read_chain(words, index)?;
    let Some(first) = chain.first() else {
        debug!("Dataset {} is preallocated but empty", dsn);
        diagnostics.push(Diagnostic::EmptyDataset { dsn });
        return Ok(None);
    };
    let start = PackedDate::from_word(words.int(first.word_index())?).to_datetime()?;

    let group = TimeUnit::from_code(required_int(&attributes, dsn, "TGROUP")?)?;
    let step = required_int(&attributes, dsn, "TSSTEP")?;
    let tcode = TimeUnit::from_code(required_int(&attributes, dsn, "TCODE")?)?;
    let fill = attributes
        .get("TFILL")
        .and_then(AttributeValue::as_real)
        .unwrap_or(DEFAULT_FILL);

    let coarse = coarse_grid(start, group, chain.len())?;
    let counts = group_counts(&coarse, start, tcode, step)?;
    let total = counts.iter().fold(0usize, |acc, n| acc.saturating_add(*n));

    // Grows with what the runs actually hold, not with the declared span
    let mut floats = Vec::new();
    for (entry, count) in chain.iter().zip(&counts) {
        if floats.len() >= total {
            break;
        }
        decode_runs(words, *entry, *count, &mut floats, total)?;
    }

    let stamps = ticks(start, tcode, step, floats.len())?;
    let mut series = TimeSeries::with_capacity(floats.len());
    for (ts, value) in stamps.iter().zip(&floats) {
        if *value != fill {
            series.push(*ts, *value as f64);
        }
    }

    debug!(
        "Dataset {}: {} groups, {} values, {} kept",
        dsn,
        chain.len(),
        floats.len(),
        series.len()
    );

    Ok(Some(WdmSeries {
        name: format!("{}_{}", source, dsn),
        dsn,
        attributes,
        series,
    }))
}

/// Decodes the requested datasets from a WDM buffer.
///
/// `source` names the columns (`"{source}_{dsn}"`). Requested datasets that
/// are absent or hold no data produce a diagnostic instead of a column.
pub fn extract(source: &str, data: &[u8], dsns: &[i32]) -> Result<MultiSeries> {
    let words = WordView::new(data);
    check_magic(words)?;

    let mut result = MultiSeries::default();
    let (found, declared) = find_datasets(words)?;
    if found.len() as i64 != declared as i64 {
        warn!(
            "Wrong number of dataset records: found {}, file declares {}",
            found.len(),
            declared
        );
        result.diagnostics.push(Diagnostic::DatasetCountMismatch {
            found: found.len(),
            declared,
        });
    }

    let mut by_dsn: HashMap<i32, usize> = HashMap::new();
    for index in found {
        by_dsn.entry(words.int(index + DSN_ID)?).or_insert(index);
    }

    let mut seen = BTreeSet::new();
    for &dsn in dsns {
        if !seen.insert(dsn) {
            continue;
        }
        let Some(&index) = by_dsn.get(&dsn) else {
            warn!("Dataset {} not found in {}", dsn, source);
            result.diagnostics.push(Diagnostic::DatasetMissing { dsn });
            continue;
        };
        if let Some(column) = read_dataset(source, words, index, dsn, &mut result.diagnostics)? {
            result.columns.push(column);
        }
    }

    info!(
        "WDM extract from {}: {} of {} datasets decoded",
        source,
        result.columns.len(),
        seen.len()
    );
    Ok(result)
}
