use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use sms_client::domain::Device;

pub const UNKNOWN_REGION: &str = "UNKNOWN";

/// City codes used in station locations.
const CITY_CODES: [(&str, &str); 9] = [
    ("FSD", "FAISALABAD"),
    ("LHR", "LAHORE"),
    ("ISB", "ISLAMABAD"),
    ("RWP", "RAWALPINDI"),
    ("MTN", "MULTAN"),
    ("BWP", "BAHAWALPUR"),
    ("SWL", "SAHIWAL"),
    ("GRW", "GUJRANWALA"),
    ("SGD", "SARGODHA"),
];

const COUNTRY_SUFFIXES: [&str; 1] = ["PAKISTAN"];

/// Region of a device from its free-text location.
///
/// `"FSD, PAKISTAN"` → `FAISALABAD`, `"Shujabad, Multan"` → `MULTAN`,
/// `"xyz"` → `XYZ`, blank → `UNKNOWN`.
pub fn normalize_region(location: Option<&str>) -> String {
    let upper = location.unwrap_or("").trim().to_uppercase();

    let mut parts: Vec<&str> = upper
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() > 1 && parts.last().is_some_and(|p| COUNTRY_SUFFIXES.contains(p)) {
        parts.pop();
    }

    let Some(region) = parts.last() else {
        return UNKNOWN_REGION.to_string();
    };

    CITY_CODES
        .iter()
        .find(|(code, _)| code == region)
        .map(|(_, name)| (*name).to_string())
        .unwrap_or_else(|| (*region).to_string())
}

/// Volumes of one device (or group) for the two compared periods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct VolumePair {
    pub period_a: f64,
    pub period_b: f64,
}

impl VolumePair {
    pub fn new(period_a: f64, period_b: f64) -> Self {
        Self { period_a, period_b }
    }

    /// Period B minus period A.
    pub fn difference(&self) -> f64 {
        self.period_b - self.period_a
    }

    fn accumulate(&mut self, other: VolumePair) {
        self.period_a += other.period_a;
        self.period_b += other.period_b;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceReportRow {
    pub seq: usize,
    pub region: String,
    pub device_id: i64,
    pub device_name: String,
    pub period_a: f64,
    pub period_b: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegionSubtotal {
    pub region: String,
    pub device_count: usize,
    pub period_a: f64,
    pub period_b: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GrandTotal {
    pub device_count: usize,
    pub period_a: f64,
    pub period_b: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportRow {
    Device(DeviceReportRow),
    Subtotal(RegionSubtotal),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RegionReport {
    pub rows: Vec<ReportRow>,
    pub grand_total: GrandTotal,
}

impl RegionReport {
    pub fn device_rows(&self) -> impl Iterator<Item = &DeviceReportRow> {
        self.rows.iter().filter_map(|r| match r {
            ReportRow::Device(d) => Some(d),
            ReportRow::Subtotal(_) => None,
        })
    }

    pub fn subtotals(&self) -> impl Iterator<Item = &RegionSubtotal> {
        self.rows.iter().filter_map(|r| match r {
            ReportRow::Subtotal(s) => Some(s),
            ReportRow::Device(_) => None,
        })
    }
}

/// Group devices by normalized region and lay out device rows followed by a
/// subtotal per region. Regions come in lexicographic order, devices keep
/// their input order. A device missing from `volumes` counts as zero.
pub fn build_region_report(devices: &[Device], volumes: &HashMap<i64, VolumePair>) -> RegionReport {
    let mut regions: BTreeMap<String, Vec<&Device>> = BTreeMap::new();
    for d in devices {
        regions
            .entry(normalize_region(d.location.as_deref()))
            .or_default()
            .push(d);
    }

    let mut report = RegionReport::default();
    let mut grand = VolumePair::default();
    let mut seq = 0;

    for (region, members) in regions {
        let mut subtotal = VolumePair::default();

        for d in &members {
            let v = volumes.get(&d.id).copied().unwrap_or_default();
            seq += 1;
            report.rows.push(ReportRow::Device(DeviceReportRow {
                seq,
                region: region.clone(),
                device_id: d.id,
                device_name: d.display_name().to_string(),
                period_a: v.period_a,
                period_b: v.period_b,
                difference: v.difference(),
            }));
            subtotal.accumulate(v);
        }

        report.rows.push(ReportRow::Subtotal(RegionSubtotal {
            region,
            device_count: members.len(),
            period_a: subtotal.period_a,
            period_b: subtotal.period_b,
            difference: subtotal.difference(),
        }));
        grand.accumulate(subtotal);
    }

    report.grand_total = GrandTotal {
        device_count: seq,
        period_a: grand.period_a,
        period_b: grand.period_b,
        difference: grand.difference(),
    };
    report
}
