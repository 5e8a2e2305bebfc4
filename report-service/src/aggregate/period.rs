use serde::{Deserialize, Serialize};
use sms_client::domain::Reading;
use time::UtcOffset;

use super::daily::{aggregate_daily, DailyPolicy};

pub const MCF_PER_MMCF: f64 = 1000.0;

/// How a period's volume is computed. Both halves of a period comparison
/// must use the same policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumePolicy {
    /// Sum of each day's 06:00 reading, reported in MMCF.
    #[default]
    DailySample,
    /// Sum of every hourly reading, reported in MCF.
    DailySum,
}

impl VolumePolicy {
    pub fn unit(self) -> VolumeUnit {
        match self {
            Self::DailySample => VolumeUnit::Mmcf,
            Self::DailySum => VolumeUnit::Mcf,
        }
    }
}

impl std::str::FromStr for VolumePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily_sample" => Ok(Self::DailySample),
            "daily_sum" => Ok(Self::DailySum),
            other => Err(format!(
                "unknown volume policy '{other}' (daily_sample|daily_sum)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VolumeUnit {
    Mcf,
    Mmcf,
}

impl VolumeUnit {
    pub fn label(self) -> &'static str {
        match self {
            Self::Mcf => "MCF",
            Self::Mmcf => "MMCF",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodVolume {
    pub value: f64,
    pub unit: VolumeUnit,
}

pub fn compute_period_volume(
    readings: &[Reading],
    policy: VolumePolicy,
    offset: UtcOffset,
) -> PeriodVolume {
    let value = match policy {
        VolumePolicy::DailySample => {
            let mcf: f64 = aggregate_daily(readings, DailyPolicy::MorningSample, offset)
                .iter()
                .map(|d| d.total_volume)
                .sum();
            mcf_to_mmcf(mcf)
        }
        VolumePolicy::DailySum => readings.iter().map(Reading::volume_or_fallback).sum(),
    };

    PeriodVolume {
        value,
        unit: policy.unit(),
    }
}

pub fn mcf_to_mmcf(mcf: f64) -> f64 {
    mcf / MCF_PER_MMCF
}

/// Display form used in report tables.
pub fn format_volume(v: f64) -> String {
    format!("{v:.3}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{datetime, offset};
    use time::OffsetDateTime;

    fn r(ts: OffsetDateTime, hourly: Option<f64>, generic: Option<f64>) -> Reading {
        let mut r = Reading::at(ts);
        r.last_hour_volume = hourly;
        r.volume = generic;
        r
    }

    #[test]
    fn mcf_converts_to_mmcf_and_formats_to_three_decimals() {
        let mmcf = mcf_to_mmcf(12345.678);
        assert!((mmcf - 12.345678).abs() < 1e-9);
        assert_eq!(format_volume(mmcf), "12.346");
    }

    #[test]
    fn daily_sample_sums_one_reading_per_day_in_mmcf() {
        let readings = vec![
            r(datetime!(2024-03-01 06:00:00 +05:00), Some(1500.0), None),
            r(datetime!(2024-03-01 12:00:00 +05:00), Some(999.0), None),
            r(datetime!(2024-03-02 05:45:00 +05:00), Some(500.0), None),
        ];

        let v = compute_period_volume(&readings, VolumePolicy::DailySample, offset!(+5));
        assert_eq!(v.unit, VolumeUnit::Mmcf);
        assert!((v.value - 2.0).abs() < 1e-9);
    }

    #[test]
    fn daily_sum_adds_every_reading_with_fallback_in_mcf() {
        let readings = vec![
            r(datetime!(2024-03-01 06:00:00 +05:00), Some(10.0), Some(99.0)),
            r(datetime!(2024-03-01 07:00:00 +05:00), None, Some(5.0)),
            r(datetime!(2024-03-01 08:00:00 +05:00), None, None),
        ];

        let v = compute_period_volume(&readings, VolumePolicy::DailySum, offset!(+5));
        assert_eq!(v.unit, VolumeUnit::Mcf);
        assert_eq!(v.value, 15.0);
    }

    #[test]
    fn empty_period_is_zero() {
        for policy in [VolumePolicy::DailySample, VolumePolicy::DailySum] {
            let v = compute_period_volume(&[], policy, offset!(+5));
            assert_eq!(v.value, 0.0);
        }
    }
}
