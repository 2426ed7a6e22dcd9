// Error handling for the HBN and WDM readers

use thiserror::Error;

pub type Result<T> = std::result::Result<T, HspfError>;

#[derive(Error, Debug)]
pub enum HspfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not this format: expected magic {expected:?}, got {got:?}")]
    NotThisFormat { expected: Vec<u8>, got: Vec<u8> },

    #[error("Unexpected end of data at byte {position}: needed {needed}, {available} available")]
    UnexpectedEnd {
        position: usize,
        needed: usize,
        available: usize,
    },

    #[error("Truncated record starting at byte {offset}")]
    TruncatedRecord { offset: usize },

    #[error("Seek of {delta} bytes from byte {position} leaves the buffer")]
    SeekOutOfBounds { position: usize, delta: i64 },

    #[error("Data record references element {element} group '{group}' before any header record")]
    UnknownCatalogKey { element: u32, group: String },

    #[error("Invalid label: {0}")]
    InvalidLabel(String),

    #[error("Invalid range: {0}")]
    InvalidRange(String),

    #[error("Invalid interval: {0}")]
    InvalidInterval(String),

    #[error("The label specifications matched no records: {labels:?}")]
    NoMatchingRecords { labels: Vec<String> },

    #[error("Gave up after {attempts} resync attempts near byte {offset}")]
    ResyncLimitExceeded { attempts: usize, offset: usize },

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Dataset {dsn} is missing required attribute {name}")]
    MissingAttribute { dsn: i32, name: &'static str },

    #[error("Unsupported time code: {0}")]
    UnsupportedTimeCode(i32),

    #[error("Corrupted data: {0}")]
    CorruptedData(String),
}

impl HspfError {
    /// True for the errors a caller can fix by changing its selection.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            HspfError::InvalidLabel(_) | HspfError::InvalidRange(_) | HspfError::InvalidInterval(_)
        )
    }
}
