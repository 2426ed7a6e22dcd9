// Dumps the catalog and series of an HSPF .hbn or .wdm file.
//
// cargo run --example dump_series -- data/run.hbn [daily] [PERLND,101,PWATER,]
// cargo run --example dump_series -- data/basin.wdm [101:103]

use hspf_reader::{parse_dsn_list, validate_labels, HbnReader, Interval, Result, WdmFile};
use tracing::{debug, info, warn, Level};

fn dump_hbn(path: &str, args: &[String]) -> Result<()> {
    let reader = HbnReader::open(path)?;
    let interval: Interval = args.first().map(String::as_str).unwrap_or("daily").parse()?;
    let labels = validate_labels(&args[args.len().min(1)..])?;

    info!("Catalog of {}:", path);
    for (key, entry) in reader.catalog(&labels)? {
        info!(
            "  {:<24} {:>8} {} .. {} ({})",
            key.column_name(),
            key.interval().map(|i| i.name()).unwrap_or("?"),
            entry.start_period(),
            entry.end_period(),
            entry.frequency
        );
    }

    info!("\nExtracting {} values:", interval);
    for (key, series) in reader.extract(interval, &labels)? {
        info!("  {}: {} points", key.column_name(), series.len());
        if let (Some(first), Some(last)) = (series.first(), series.last()) {
            info!("      {} .. {}", first, last);
        }
        for (ts, value) in series.iter().take(3) {
            debug!("      {} {}", ts, value);
        }
    }
    Ok(())
}

fn dump_wdm(path: &str, args: &[String]) -> Result<()> {
    let wdm = WdmFile::open(path)?;
    let dsns = match args.first() {
        Some(spec) => parse_dsn_list(spec)?,
        None => wdm.dataset_numbers()?,
    };
    info!("Datasets requested from {}: {:?}", path, dsns);

    let multi = wdm.extract(&dsns)?;
    for diagnostic in &multi.diagnostics {
        warn!("  {}", diagnostic);
    }
    for column in &multi.columns {
        info!("  {}: {} points", column.name, column.series.len());
        for (name, attr) in &column.attributes {
            debug!("      {} = {:?}", name, attr.value);
        }
    }

    let rows = multi.rows();
    info!("Joined table: {} rows x {} columns", rows.len(), multi.columns.len());
    for (ts, values) in rows.iter().take(5) {
        info!("  {} {:?}", ts, values);
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(path) = args.first() else {
        warn!("usage: dump_series <file.hbn|file.wdm> [options]");
        return Ok(());
    };

    if path.to_ascii_lowercase().ends_with(".wdm") {
        dump_wdm(path, &args[1..])
    } else {
        dump_hbn(path, &args[1..])
    }
}
