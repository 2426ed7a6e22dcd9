// HSPF binary (HBN) and WDM reader
// Main library entry point

pub mod core;

// Re-export main types
pub use crate::core::error::{HspfError, Result};
pub use crate::core::format::{
    AttributeData, AttributeValue, CatalogEntry, DecodedKey, Diagnostic, Frequency, Interval,
    Operation, TimeSeries,
};
pub use crate::core::hbn::{HbnReader, ScanData, ScanMode, ScanOptions, ScanOutput};
pub use crate::core::labels::{parse_dsn_list, parse_range, validate, validate_label, validate_labels, LabelSpec};
pub use crate::core::wdm::{MultiSeries, WdmFile, WdmSeries};
