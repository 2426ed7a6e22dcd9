pub mod compression;
pub mod constants;
pub mod cursor;
pub mod error;
pub mod format;
pub mod hbn;
pub mod labels;
pub mod timebase;
pub mod wdm;
