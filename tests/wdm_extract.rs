mod common;

use std::io::Write;
use std::time::{Duration, Instant};

use common::{control, date_word, real, Attr, WdmBuilder, BLOCK};
use hspf_reader::core::wdm;
use hspf_reader::{Diagnostic, HspfError, WdmFile};

const TCODE: i32 = 17;
const TSSTEP: i32 = 33;
const TGROUP: i32 = 34;
const TFILL: i32 = 32;
const STAID: i32 = 2;

/// Three datasets plus a free block:
/// - 1: daily values grouped by month, two groups in block 2
/// - 2: 6-hourly values in one day group that crosses from block 3 into block 4
/// - 3: allocated with an empty pointer chain
/// - block 6 looks like dataset 99 but is marked free
fn sample_builder() -> WdmBuilder {
    let mut w = WdmBuilder::new(8);

    w.dataset(
        1,
        1,
        &[
            (TCODE, Attr::Int(4)),
            (TSSTEP, Attr::Int(1)),
            (TGROUP, Attr::Int(5)),
            (TFILL, Attr::Real(-999.0)),
            (STAID, Attr::Str("01234567", 16)),
            (999, Attr::Int(7)),
        ],
        &[(2, 4), (2, 29)],
    );
    let b2 = 2 * BLOCK;
    let mut january = vec![
        date_word(1980, 1, 1, 0),
        control(10, true),
        real(2.0),
        control(21, false),
    ];
    january.extend((0..21).map(|k| if k == 5 { real(-999.0) } else { real(k as f32) }));
    w.put(b2 + 4, &january);
    w.put(
        b2 + 29,
        &[date_word(1980, 2, 1, 0), control(29, true), real(3.0)],
    );

    w.dataset(
        5,
        2,
        &[
            (TCODE, Attr::Int(3)),
            (TSSTEP, Attr::Int(6)),
            (TGROUP, Attr::Int(4)),
        ],
        &[(3, 508)],
    );
    let b3 = 3 * BLOCK;
    w.put(
        b3 + 508,
        &[date_word(1990, 3, 1, 0), control(4, false), real(1.0), real(2.0)],
    );
    // Forward link is one-based: block 4
    w.set(b3 + 3, 5);
    w.put(4 * BLOCK + 4, &[real(3.0), real(4.0)]);

    let b6 = 6 * BLOCK;
    w.set(b6 + 3, 1).set(b6 + 4, 99).set(b6 + 5, 1);

    w.dataset(7, 3, &[(TCODE, Attr::Int(4))], &[]);

    w.declare_datasets(3);
    w
}

#[test]
fn monthly_groups_of_daily_values() {
    let out = wdm::extract("sample.wdm", &sample_builder().bytes(), &[1]).unwrap();
    let column = out.column(1).unwrap();
    assert_eq!(column.name, "sample.wdm_1");

    // 31 January + 29 February values, one of them the fill value
    let series = &column.series;
    assert_eq!(series.len(), 59);
    assert_eq!(series.first().unwrap().to_string(), "1980-01-01 00:00:00");
    assert_eq!(series.last().unwrap().to_string(), "1980-02-29 00:00:00");
    assert_eq!(&series.values[..10], &[2.0; 10]);
    assert_eq!(&series.values[10..15], &[0.0, 1.0, 2.0, 3.0, 4.0]);
    assert_eq!(series.values[15], 6.0);
    assert_eq!(series.timestamps[15].to_string(), "1980-01-17 00:00:00");
    assert!(series.values[30..].iter().all(|v| *v == 3.0));
}

#[test]
fn attributes_are_decoded_with_defaults() {
    let out = wdm::extract("sample.wdm", &sample_builder().bytes(), &[1]).unwrap();
    let column = out.column(1).unwrap();

    assert_eq!(column.attribute("TCODE").and_then(|a| a.as_int()), Some(4));
    assert_eq!(column.attribute("TFILL").and_then(|a| a.as_real()), Some(-999.0));
    assert_eq!(
        column.attribute("STAID").and_then(|a| a.as_str()),
        Some("01234567")
    );
    assert_eq!(column.attribute("TSBYR").and_then(|a| a.as_int()), Some(1900));
    assert!(column.attribute("A999").is_none());

    assert_eq!(
        out.diagnostics,
        vec![Diagnostic::UnknownAttribute {
            dsn: 1,
            id: 999,
            pointer: 109,
        }]
    );
}

#[test]
fn literal_run_follows_forward_link() {
    let out = wdm::extract("sample.wdm", &sample_builder().bytes(), &[2]).unwrap();
    let series = &out.column(2).unwrap().series;
    let stamps: Vec<String> = series.timestamps.iter().map(|t| t.to_string()).collect();
    assert_eq!(
        stamps,
        vec![
            "1990-03-01 00:00:00",
            "1990-03-01 06:00:00",
            "1990-03-01 12:00:00",
            "1990-03-01 18:00:00",
        ]
    );
    assert_eq!(series.values, vec![1.0, 2.0, 3.0, 4.0]);
}

#[test]
fn missing_free_and_empty_datasets_are_diagnostics() {
    let out = wdm::extract("sample.wdm", &sample_builder().bytes(), &[2, 99, 3, 2]).unwrap();
    assert_eq!(out.columns.len(), 1);
    assert_eq!(out.columns[0].dsn, 2);
    assert_eq!(
        out.diagnostics,
        vec![
            Diagnostic::DatasetMissing { dsn: 99 },
            Diagnostic::EmptyDataset { dsn: 3 },
        ]
    );
}

#[test]
fn columns_follow_requested_order() {
    let out = wdm::extract("sample.wdm", &sample_builder().bytes(), &[2, 1]).unwrap();
    let dsns: Vec<i32> = out.columns.iter().map(|c| c.dsn).collect();
    assert_eq!(dsns, vec![2, 1]);

    let rows = out.rows();
    assert_eq!(rows.len(), 63);
    assert_eq!(rows[0].1, vec![None, Some(2.0)]);
    assert_eq!(rows[62].1, vec![Some(4.0), None]);
}

#[test]
fn dataset_count_mismatch_is_reported() {
    let mut w = sample_builder();
    w.declare_datasets(5);
    let out = wdm::extract("sample.wdm", &w.bytes(), &[2]).unwrap();
    assert_eq!(
        out.diagnostics,
        vec![Diagnostic::DatasetCountMismatch {
            found: 3,
            declared: 5,
        }]
    );
    assert_eq!(out.columns.len(), 1);
}

#[test]
fn missing_group_attribute_is_fatal() {
    let mut w = WdmBuilder::new(3);
    w.dataset(1, 10, &[(TCODE, Attr::Int(4)), (TSSTEP, Attr::Int(1))], &[(2, 4)]);
    w.put(2 * BLOCK + 4, &[date_word(2001, 1, 1, 0), control(31, true), real(1.0)]);
    w.declare_datasets(1);

    let err = wdm::extract("g.wdm", &w.bytes(), &[10]).unwrap_err();
    assert!(matches!(
        err,
        HspfError::MissingAttribute {
            dsn: 10,
            name: "TGROUP"
        }
    ));
}

#[test]
fn unsupported_time_code_is_fatal() {
    let mut w = WdmBuilder::new(3);
    w.dataset(
        1,
        10,
        &[
            (TCODE, Attr::Int(9)),
            (TSSTEP, Attr::Int(1)),
            (TGROUP, Attr::Int(5)),
        ],
        &[(2, 4)],
    );
    w.put(2 * BLOCK + 4, &[date_word(2001, 1, 1, 0), control(31, true), real(1.0)]);
    w.declare_datasets(1);

    let err = wdm::extract("t.wdm", &w.bytes(), &[10]).unwrap_err();
    assert!(matches!(err, HspfError::UnsupportedTimeCode(9)));
}

#[test]
fn century_of_seconds_fails_without_building_the_grid() {
    let mut w = WdmBuilder::new(3);
    w.dataset(
        1,
        10,
        &[
            (TCODE, Attr::Int(1)),
            (TSSTEP, Attr::Int(1)),
            (TGROUP, Attr::Int(7)),
        ],
        &[(2, 4)],
    );
    // One short run, then zeroed words up to a block with no forward link
    w.put(2 * BLOCK + 4, &[date_word(1900, 1, 1, 0), control(5, true), real(1.0)]);
    w.declare_datasets(1);

    let started = Instant::now();
    let err = wdm::extract("c.wdm", &w.bytes(), &[10]).unwrap_err();
    assert!(matches!(err, HspfError::CorruptedData(_)));
    assert!(started.elapsed() < Duration::from_secs(2));
}

#[test]
fn wdm_file_opens_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&sample_builder().bytes()).unwrap();

    let wdm = WdmFile::open(file.path()).unwrap();
    assert_eq!(wdm.dataset_numbers().unwrap(), vec![1, 2, 3]);

    let out = wdm.extract(&[1]).unwrap();
    let expected = format!("{}_1", file.path().display());
    assert_eq!(out.columns[0].name, expected);

    let mut hbn = tempfile::NamedTempFile::new().unwrap();
    hbn.write_all(&[0xFD, 0, 0, 0]).unwrap();
    assert!(matches!(
        WdmFile::open(hbn.path()),
        Err(HspfError::NotThisFormat { .. })
    ));
}
