// Format constants for HSPF binary output (HBN) and WDM files

// ---- HBN ----

pub const HBN_MAGIC: u8 = 0xFD;

// Record leader: length bitfield(4) kind(u32) operation(8s) element(u32) group(8s)
pub const LENGTH_FIELD_SIZE: usize = 4;
pub const RECORD_HEADER_SIZE: usize = 4 + 8 + 4 + 8; // 24 bytes
pub const RECORD_LEADER_SIZE: usize = LENGTH_FIELD_SIZE + RECORD_HEADER_SIZE; // 28 bytes

// Data record prefix: unused(u32) interval(u32) year month day hour minute
pub const DATA_PREFIX_SIZE: usize = 7 * 4; // 28 bytes

// Backward seek applied when a record kind is not recognized
pub const RESYNC_REWIND: i64 = 31;

pub const DEFAULT_RESYNC_LIMIT: usize = 64;

/// Variable groups each operation type may write to an HBN file.
pub const PERLND_GROUPS: &[&str] = &[
    "ATEMP", "SNOW", "PWATER", "SEDMNT", "PSTEMP", "PWTGAS", "PQUAL", "MSTLAY", "PEST", "NITR",
    "PHOS", "TRACER",
];
pub const IMPLND_GROUPS: &[&str] = &["ATEMP", "SNOW", "IWATER", "SOLIDS", "IWTGAS", "IQUAL"];
pub const RCHRES_GROUPS: &[&str] = &[
    "HYDR", "CONS", "HTRCH", "SEDTRN", "GQUAL", "OXRX", "NUTRX", "PLANK", "PHCARB", "INFLOW",
    "OFLOW", "ROFLOW",
];
pub const BMPRAC_GROUPS: &[&str] = &[];

pub const ELEMENT_MIN: i64 = 1;
pub const ELEMENT_MAX: i64 = 999;

// ---- WDM ----

pub const WDM_MAGIC: i32 = -998;
pub const WORD_SIZE: usize = 4;
pub const BLOCK_WORDS: usize = 512;

// File definition record (block 0)
pub const FDR_RECORD_COUNT: usize = 28;
pub const FDR_DATASET_COUNT: usize = 31;

// Dataset label record, word offsets from the block start
pub const DSN_FLAG: usize = 5;
pub const DSN_ID: usize = 4;
pub const DSN_ATTR_START: usize = 9;
pub const DSN_CHAIN_START: usize = 10;
pub const DSN_CHAIN_END: usize = 11;

// Data block: word 3 links to the next block (1-based), data resumes at word 4
pub const BLOCK_FORWARD_LINK: usize = 3;
pub const BLOCK_DATA_START: usize = 4;

pub const DEFAULT_FILL: f32 = -999.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Int,
    Real,
    Str,
}

/// Attribute id -> (name, kind, length in bytes).
pub const ATTRIBUTES: &[(u16, &str, AttributeKind, usize)] = &[
    (1, "TSTYPE", AttributeKind::Str, 4),
    (2, "STAID", AttributeKind::Str, 16),
    (7, "ELEV", AttributeKind::Real, 1),
    (8, "LATDEG", AttributeKind::Real, 1),
    (9, "LNGDEG", AttributeKind::Real, 1),
    (10, "DESCRP", AttributeKind::Str, 80),
    (11, "DAREA", AttributeKind::Real, 1),
    (17, "TCODE", AttributeKind::Int, 1),
    (22, "DCODE", AttributeKind::Int, 1),
    (27, "TSBYR", AttributeKind::Int, 1),
    (28, "TSBMO", AttributeKind::Int, 1),
    (29, "TSBDY", AttributeKind::Int, 1),
    (30, "TSBHR", AttributeKind::Int, 1),
    (32, "TFILL", AttributeKind::Real, 1),
    (33, "TSSTEP", AttributeKind::Int, 1),
    (34, "TGROUP", AttributeKind::Int, 1),
    (45, "STNAM", AttributeKind::Str, 48),
    (83, "COMPFG", AttributeKind::Int, 1),
    (84, "TSFORM", AttributeKind::Int, 1),
    (85, "VBTIME", AttributeKind::Int, 1),
    (288, "SCENARIO", AttributeKind::Str, 8),
    (289, "CONSTITUENT", AttributeKind::Str, 8),
    (290, "LOCATION", AttributeKind::Str, 8),
    (443, "A443", AttributeKind::Str, 12),
    (444, "A444", AttributeKind::Str, 12),
];

pub fn attribute_info(id: u16) -> Option<(&'static str, AttributeKind, usize)> {
    ATTRIBUTES
        .iter()
        .find(|(aid, ..)| *aid == id)
        .map(|(_, name, kind, len)| (*name, *kind, *len))
}
