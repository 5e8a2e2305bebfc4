use anyhow::{bail, Result};
use report_service::{
    aggregate::VolumePolicy,
    config::AppConfig,
    observability,
    pipeline::{parse_bound, Bound, SheetSink, TimeWindow},
    report::{ReportGenerator, Sheet},
    sinks::CsvSheetSink,
    sources::HttpReadingSource,
};
use std::{env, sync::Arc};
use time::UtcOffset;
use tokio_util::sync::CancellationToken;

const USAGE: &str =
    "usage: region_report <section> <a_start> <a_end> <b_start> <b_end> <out.csv> [daily_sample|daily_sum]";

fn window(start: &str, end: &str, offset: UtcOffset) -> Result<TimeWindow> {
    let start = parse_bound(start, Bound::Start, offset)
        .map_err(|e| anyhow::anyhow!("invalid start '{start}': {e}"))?;
    let end = parse_bound(end, Bound::End, offset)
        .map_err(|e| anyhow::anyhow!("invalid end '{end}': {e}"))?;
    Ok(TimeWindow::new(start, end)?)
}

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let args: Vec<String> = env::args().collect();
    if args.len() < 7 {
        bail!(USAGE);
    }
    let section = &args[1];
    let out_path = &args[6];

    let cfg = AppConfig::load()?;
    let policy = match args.get(7) {
        Some(p) => p.parse::<VolumePolicy>().map_err(anyhow::Error::msg)?,
        None => cfg.report.volume_policy,
    };

    let offset = cfg.utc_offset()?;
    let period_a = window(&args[2], &args[3], offset)?;
    let period_b = window(&args[4], &args[5], offset)?;

    let source = Arc::new(HttpReadingSource::from_config(&cfg)?);
    let generator = ReportGenerator::new(source.clone(), source, cfg.report_settings()?);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let outcome = generator
        .region_report(section, period_a, period_b, policy, &cancel)
        .await?;

    if outcome.all_devices_failed() {
        bail!(
            "readings failed for all {} devices of section {section}",
            outcome.failed_devices.len()
        );
    }
    if outcome.is_empty() {
        bail!("no volume data for section {section} in either period");
    }
    for failed in &outcome.failed_devices {
        tracing::warn!(
            device_id = failed.device_id,
            device = %failed.device_name,
            periods = failed.truncated_periods(),
            reason = %failed.reason,
            "device readings incomplete, volumes cover only what was fetched"
        );
    }

    CsvSheetSink::new(out_path)
        .write(&Sheet::from_region_report(&outcome))
        .await?;

    Ok(())
}
