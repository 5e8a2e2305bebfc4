use anyhow::{bail, Result};
use report_service::{
    aggregate::DailyPolicy,
    config::{AppConfig, ReportConfig},
    observability,
    pipeline::{parse_bound, Bound, DeviceDirectory, ReadingPages, SheetSink, TimeWindow},
    report::{ReportGenerator, Sheet},
    sinks::CsvSheetSink,
    sources::{HttpReadingSource, ReadingsCsvFileSource},
};
use std::{env, sync::Arc};
use tokio_util::sync::CancellationToken;

const USAGE: &str =
    "usage: daily_report <device_id> <start> <end> <out.csv> [sum|morning] [readings.csv]";

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        bail!(USAGE);
    }
    let device_id: i64 = args[1]
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid device_id '{}': {e}", args[1]))?;
    let out_path = &args[4];
    let policy = match args.get(5) {
        Some(p) => p.parse::<DailyPolicy>().map_err(anyhow::Error::msg)?,
        None => DailyPolicy::default(),
    };

    // With a readings export no backend (and no config file) is needed.
    let readings: Arc<dyn ReadingPages>;
    let directory: Arc<dyn DeviceDirectory>;
    let settings = match args.get(6) {
        Some(path) => {
            let source = Arc::new(ReadingsCsvFileSource::open(path)?);
            readings = source.clone();
            directory = source;
            ReportConfig::default().settings()?
        }
        None => {
            let cfg = AppConfig::load()?;
            let source = Arc::new(HttpReadingSource::from_config(&cfg)?);
            readings = source.clone();
            directory = source;
            cfg.report_settings()?
        }
    };

    let offset = settings.utc_offset;
    let start = parse_bound(&args[2], Bound::Start, offset)
        .map_err(|e| anyhow::anyhow!("invalid start '{}': {e}", args[2]))?;
    let end = parse_bound(&args[3], Bound::End, offset)
        .map_err(|e| anyhow::anyhow!("invalid end '{}': {e}", args[3]))?;
    let window = TimeWindow::new(start, end)?;

    let generator = ReportGenerator::new(readings, directory, settings);
    let outcome = generator
        .daily_report(device_id, window, policy, &CancellationToken::new())
        .await?;

    if outcome.is_empty() {
        bail!("no readings for device {device_id} in the requested window");
    }
    if let Some(reason) = &outcome.truncated {
        tracing::warn!(device_id, %reason, "readings incomplete, exporting what was fetched");
    }

    CsvSheetSink::new(out_path)
        .write(&Sheet::from_daily_report(&outcome))
        .await?;

    Ok(())
}
