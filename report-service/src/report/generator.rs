use std::{collections::HashMap, sync::Arc, time::Instant};

use futures::future::join_all;
use serde::Serialize;
use sms_client::domain::Device;
use time::UtcOffset;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{
    aggregate_daily, compute_period_volume, summarize_days, DailyPolicy, DailySummary,
    PeriodSummary, VolumePolicy, VolumeUnit,
};
use crate::pipeline::{DeviceDirectory, PipelineError, ReadingPages, TimeWindow};
use crate::report::region::{build_region_report, RegionReport, VolumePair};
use crate::sources::fetch_all_readings;

#[derive(Debug, Clone, Copy)]
pub struct ReportSettings {
    pub page_size: u32,
    /// Devices fetched concurrently; a batch finishes before the next starts.
    pub batch_size: usize,
    /// Offset defining the local calendar day.
    pub utc_offset: UtcOffset,
}

/// A device whose readings could not be fetched completely.
///
/// Its volumes cover only the readings that did arrive; a period with
/// nothing fetched reads as zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedDevice {
    pub device_id: i64,
    pub device_name: String,
    pub reason: String,
    /// Pages fetched across both periods before the failure.
    pub pages_fetched: u32,
    pub period_a_truncated: bool,
    pub period_b_truncated: bool,
}

impl FailedDevice {
    /// `"A"`, `"B"` or `"A and B"`.
    pub fn truncated_periods(&self) -> &'static str {
        match (self.period_a_truncated, self.period_b_truncated) {
            (true, false) => "A",
            (false, true) => "B",
            _ => "A and B",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RegionReportOutcome {
    pub section_id: String,
    pub period_a: TimeWindow,
    pub period_b: TimeWindow,
    pub policy: VolumePolicy,
    pub unit: VolumeUnit,
    pub report: RegionReport,
    pub failed_devices: Vec<FailedDevice>,
}

impl RegionReportOutcome {
    /// Every device row is zero in both periods.
    pub fn has_no_volume(&self) -> bool {
        self.report
            .device_rows()
            .all(|r| r.period_a == 0.0 && r.period_b == 0.0)
    }

    /// No volume and no failures to report: callers show "no data".
    pub fn is_empty(&self) -> bool {
        self.failed_devices.is_empty() && self.has_no_volume()
    }

    /// Every listed device failed and nothing was fetched for any of them.
    pub fn all_devices_failed(&self) -> bool {
        !self.failed_devices.is_empty()
            && self.failed_devices.len() == self.report.grand_total.device_count
            && self.has_no_volume()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DailyReportOutcome {
    pub device_id: i64,
    pub window: TimeWindow,
    pub policy: DailyPolicy,
    pub days: Vec<DailySummary>,
    pub summary: PeriodSummary,
    /// Error text when the fetch stopped early.
    pub truncated: Option<String>,
}

impl DailyReportOutcome {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

struct DeviceVolumes {
    volumes: VolumePair,
    failure: Option<FailedDevice>,
}

/// Drives fetching and aggregation for one report request.
#[derive(Clone)]
pub struct ReportGenerator {
    readings: Arc<dyn ReadingPages>,
    directory: Arc<dyn DeviceDirectory>,
    settings: ReportSettings,
}

impl ReportGenerator {
    pub fn new(
        readings: Arc<dyn ReadingPages>,
        directory: Arc<dyn DeviceDirectory>,
        settings: ReportSettings,
    ) -> Self {
        Self {
            readings,
            directory,
            settings,
        }
    }

    pub fn settings(&self) -> &ReportSettings {
        &self.settings
    }

    pub fn directory(&self) -> &Arc<dyn DeviceDirectory> {
        &self.directory
    }

    /// Compare two periods for every device of a section.
    ///
    /// Device fetch failures do not fail the report: each period counts the
    /// readings that arrived and the device is listed in `failed_devices`.
    pub async fn region_report(
        &self,
        section_id: &str,
        period_a: TimeWindow,
        period_b: TimeWindow,
        policy: VolumePolicy,
        cancel: &CancellationToken,
    ) -> Result<RegionReportOutcome, PipelineError> {
        let started = Instant::now();
        let devices = self.directory.section_devices(section_id).await?;

        tracing::info!(
            section_id,
            devices = devices.len(),
            batch_size = self.settings.batch_size,
            ?policy,
            "generating region report"
        );

        let mut volumes: HashMap<i64, VolumePair> = HashMap::with_capacity(devices.len());
        let mut failed_devices = Vec::new();

        for batch in devices.chunks(self.settings.batch_size.max(1)) {
            if cancel.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            let results = join_all(
                batch
                    .iter()
                    .map(|d| self.device_volumes(d, period_a, period_b, policy, cancel)),
            )
            .await;

            for (device, result) in batch.iter().zip(results) {
                volumes.insert(device.id, result.volumes);
                if let Some(failure) = result.failure {
                    failed_devices.push(failure);
                }
            }
        }

        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }

        let report = build_region_report(&devices, &volumes);

        metrics::histogram!("report_generation_seconds").record(started.elapsed().as_secs_f64());
        if !failed_devices.is_empty() {
            tracing::warn!(
                section_id,
                failed = failed_devices.len(),
                "region report generated with incomplete device data"
            );
        }

        Ok(RegionReportOutcome {
            section_id: section_id.to_string(),
            period_a,
            period_b,
            policy,
            unit: policy.unit(),
            report,
            failed_devices,
        })
    }

    async fn device_volumes(
        &self,
        device: &Device,
        period_a: TimeWindow,
        period_b: TimeWindow,
        policy: VolumePolicy,
        cancel: &CancellationToken,
    ) -> DeviceVolumes {
        let readings = self.readings.as_ref();
        let page_size = self.settings.page_size;

        let (a, b) = tokio::join!(
            fetch_all_readings(readings, device.id, period_a, page_size, cancel),
            fetch_all_readings(readings, device.id, period_b, page_size, cancel),
        );

        let offset = self.settings.utc_offset;
        let volumes = VolumePair::new(
            compute_period_volume(&a.readings, policy, offset).value,
            compute_period_volume(&b.readings, policy, offset).value,
        );

        let failure = a.error.as_ref().or(b.error.as_ref()).map(|e| {
            metrics::counter!("report_device_failures_total").increment(1);
            FailedDevice {
                device_id: device.id,
                device_name: device.display_name().to_string(),
                reason: e.to_string(),
                pages_fetched: a.pages + b.pages,
                period_a_truncated: a.truncated(),
                period_b_truncated: b.truncated(),
            }
        });

        DeviceVolumes { volumes, failure }
    }

    /// Day-by-day summary of one device.
    pub async fn daily_report(
        &self,
        device_id: i64,
        window: TimeWindow,
        policy: DailyPolicy,
        cancel: &CancellationToken,
    ) -> Result<DailyReportOutcome, PipelineError> {
        let outcome = fetch_all_readings(
            self.readings.as_ref(),
            device_id,
            window,
            self.settings.page_size,
            cancel,
        )
        .await;

        if matches!(outcome.error, Some(PipelineError::Cancelled)) {
            return Err(PipelineError::Cancelled);
        }

        let days = aggregate_daily(&outcome.readings, policy, self.settings.utc_offset);
        let summary = summarize_days(&days);

        tracing::info!(
            device_id,
            readings = outcome.readings.len(),
            days = days.len(),
            ?policy,
            "daily report generated"
        );

        Ok(DailyReportOutcome {
            device_id,
            window,
            policy,
            days,
            summary,
            truncated: outcome.error.map(|e| e.to_string()),
        })
    }
}
