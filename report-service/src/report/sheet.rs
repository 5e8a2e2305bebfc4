use serde::Serialize;

use crate::aggregate::{format_volume, DailySummary, PeriodSummary};
use crate::report::generator::{DailyReportOutcome, RegionReportOutcome};
use crate::report::region::ReportRow;

/// Presentation hint for a sheet row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStyle {
    Title,
    Header,
    Data,
    Subtotal,
    Total,
    Note,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetRow {
    pub style: RowStyle,
    pub cells: Vec<String>,
}

impl SheetRow {
    fn new<I, S>(style: RowStyle, cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            style,
            cells: cells.into_iter().map(Into::into).collect(),
        }
    }
}

/// A finished report table, ready for export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sheet {
    pub name: String,
    pub rows: Vec<SheetRow>,
}

const REGION_HEADER: [&str; 6] = ["#", "Region", "Device", "Period A", "Period B", "Difference"];

const DAILY_HEADER: [&str; 9] = [
    "Date",
    "Volume",
    "Energy",
    "Flow Time",
    "Avg Temp",
    "Avg Static P",
    "Avg Diff P",
    "SG",
    "Readings",
];

fn optional(v: Option<f64>) -> String {
    v.map(format_volume).unwrap_or_default()
}

impl Sheet {
    pub fn from_region_report(outcome: &RegionReportOutcome) -> Self {
        let unit = outcome.unit.label();
        let mut rows = vec![
            SheetRow::new(
                RowStyle::Title,
                [format!(
                    "Section {} volume comparison ({unit}): {} to {} vs {} to {}",
                    outcome.section_id,
                    outcome.period_a.start.date(),
                    outcome.period_a.end.date(),
                    outcome.period_b.start.date(),
                    outcome.period_b.end.date(),
                )],
            ),
            SheetRow::new(RowStyle::Header, REGION_HEADER),
        ];

        for row in &outcome.report.rows {
            rows.push(match row {
                ReportRow::Device(d) => SheetRow::new(
                    RowStyle::Data,
                    [
                        d.seq.to_string(),
                        d.region.clone(),
                        d.device_name.clone(),
                        format_volume(d.period_a),
                        format_volume(d.period_b),
                        format_volume(d.difference),
                    ],
                ),
                ReportRow::Subtotal(s) => SheetRow::new(
                    RowStyle::Subtotal,
                    [
                        String::new(),
                        format!("{} subtotal", s.region),
                        format!("{} devices", s.device_count),
                        format_volume(s.period_a),
                        format_volume(s.period_b),
                        format_volume(s.difference),
                    ],
                ),
            });
        }

        let total = &outcome.report.grand_total;
        rows.push(SheetRow::new(
            RowStyle::Total,
            [
                String::new(),
                "Grand total".to_string(),
                format!("{} devices", total.device_count),
                format_volume(total.period_a),
                format_volume(total.period_b),
                format_volume(total.difference),
            ],
        ));

        if !outcome.failed_devices.is_empty() {
            let names: Vec<String> = outcome
                .failed_devices
                .iter()
                .map(|f| format!("{} (period {})", f.device_name, f.truncated_periods()))
                .collect();
            rows.push(SheetRow::new(
                RowStyle::Note,
                [format!(
                    "{} device(s) have incomplete readings; volumes cover only what was fetched: {}",
                    names.len(),
                    names.join(", ")
                )],
            ));
        }

        Self {
            name: format!("section-{}", outcome.section_id),
            rows,
        }
    }

    pub fn from_daily_report(outcome: &DailyReportOutcome) -> Self {
        let mut rows = vec![SheetRow::new(RowStyle::Header, DAILY_HEADER)];
        rows.extend(outcome.days.iter().map(daily_row));
        rows.push(total_row(&outcome.summary));

        if let Some(reason) = &outcome.truncated {
            rows.push(SheetRow::new(
                RowStyle::Note,
                [format!("readings incomplete: {reason}")],
            ));
        }

        Self {
            name: format!("device-{}", outcome.device_id),
            rows,
        }
    }
}

fn daily_row(d: &DailySummary) -> SheetRow {
    SheetRow::new(
        RowStyle::Data,
        [
            d.date.to_string(),
            format_volume(d.total_volume),
            format_volume(d.total_energy),
            format_volume(d.total_flow_time),
            optional(d.avg_temperature),
            optional(d.avg_pressure),
            optional(d.avg_diff_pressure),
            format_volume(d.specific_gravity),
            d.reading_count.to_string(),
        ],
    )
}

fn total_row(s: &PeriodSummary) -> SheetRow {
    SheetRow::new(
        RowStyle::Total,
        [
            format!("{} days", s.days),
            format_volume(s.total_volume),
            format_volume(s.total_energy),
            format_volume(s.total_flow_time),
            optional(s.avg_temperature),
            optional(s.avg_pressure),
            optional(s.avg_diff_pressure),
            String::new(),
            String::new(),
        ],
    )
}
