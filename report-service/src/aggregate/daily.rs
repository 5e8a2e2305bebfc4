use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sms_client::domain::Reading;
use time::{macros::time, Date, Duration, Time, UtcOffset};

/// Morning window used by the once-a-day meter reading.
pub const MORNING_WINDOW_START: Time = time!(05:00);
pub const MORNING_WINDOW_END: Time = time!(07:00);
pub const MORNING_TARGET: Time = time!(06:00);

/// How a calendar day's readings are reduced to one `DailySummary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DailyPolicy {
    /// Every reading of the day contributes.
    #[default]
    Sum,
    /// Only the reading closest to 06:00 within 05:00..=07:00 counts.
    #[serde(alias = "morning")]
    MorningSample,
}

impl std::str::FromStr for DailyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sum" => Ok(Self::Sum),
            "morning" | "morning_sample" => Ok(Self::MorningSample),
            other => Err(format!("unknown daily policy '{other}' (sum|morning)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailySummary {
    pub date: Date,
    pub total_volume: f64,
    pub total_energy: f64,
    pub total_flow_time: f64,
    /// Mean of the non-zero samples; `None` when the day has none.
    pub avg_temperature: Option<f64>,
    pub avg_pressure: Option<f64>,
    pub avg_diff_pressure: Option<f64>,
    pub specific_gravity: f64,
    pub reading_count: usize,
}

/// Totals over a run of days.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PeriodSummary {
    pub days: usize,
    pub total_volume: f64,
    pub total_energy: f64,
    pub total_flow_time: f64,
    /// Averaged over the days that have an average.
    pub avg_temperature: Option<f64>,
    pub avg_pressure: Option<f64>,
    pub avg_diff_pressure: Option<f64>,
}

/// Running mean that ignores zero and missing samples. A zero from a
/// metering device is a sensor gap, not a measurement.
#[derive(Debug, Default, Clone, Copy)]
struct NonZeroMean {
    sum: f64,
    count: usize,
}

impl NonZeroMean {
    fn push(&mut self, v: Option<f64>) {
        match v {
            Some(v) if v != 0.0 => {
                self.sum += v;
                self.count += 1;
            }
            _ => {}
        }
    }

    fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Bucket readings by local calendar day (`offset`) and reduce each day with
/// `policy`. Days without a qualifying reading are absent from the output,
/// which is ordered by date.
pub fn aggregate_daily(
    readings: &[Reading],
    policy: DailyPolicy,
    offset: UtcOffset,
) -> Vec<DailySummary> {
    match policy {
        DailyPolicy::Sum => sum_by_day(readings, offset),
        DailyPolicy::MorningSample => morning_sample_by_day(readings, offset),
    }
}

fn sum_by_day(readings: &[Reading], offset: UtcOffset) -> Vec<DailySummary> {
    let mut days: BTreeMap<Date, Vec<&Reading>> = BTreeMap::new();
    for r in readings {
        days.entry(r.timestamp.to_offset(offset).date())
            .or_default()
            .push(r);
    }

    days.into_iter()
        .map(|(date, mut day)| {
            day.sort_by_key(|r| r.timestamp);

            let mut temperature = NonZeroMean::default();
            let mut pressure = NonZeroMean::default();
            let mut diff_pressure = NonZeroMean::default();
            let mut total_volume = 0.0;
            let mut total_energy = 0.0;
            let mut total_flow_time = 0.0;

            for r in &day {
                total_volume += r.hourly_volume();
                total_energy += r.hourly_energy();
                total_flow_time += r.hourly_flow_time();
                temperature.push(r.last_hour_temperature);
                pressure.push(r.last_hour_static_pressure);
                diff_pressure.push(r.last_hour_diff_pressure);
            }

            DailySummary {
                date,
                total_volume,
                total_energy,
                total_flow_time,
                avg_temperature: temperature.mean(),
                avg_pressure: pressure.mean(),
                avg_diff_pressure: diff_pressure.mean(),
                specific_gravity: day
                    .first()
                    .and_then(|r| r.specific_gravity)
                    .unwrap_or(0.0),
                reading_count: day.len(),
            }
        })
        .collect()
}

fn morning_sample_by_day(readings: &[Reading], offset: UtcOffset) -> Vec<DailySummary> {
    let mut best: BTreeMap<Date, (Duration, &Reading)> = BTreeMap::new();

    for r in readings {
        let local = r.timestamp.to_offset(offset);
        let t = local.time();
        if t < MORNING_WINDOW_START || t > MORNING_WINDOW_END {
            continue;
        }

        let distance = (t - MORNING_TARGET).abs();
        best.entry(local.date())
            .and_modify(|(d, current)| {
                if distance < *d || (distance == *d && r.timestamp < current.timestamp) {
                    *d = distance;
                    *current = r;
                }
            })
            .or_insert((distance, r));
    }

    best.into_iter()
        .map(|(date, (_, r))| {
            let single = |v: Option<f64>| {
                let mut m = NonZeroMean::default();
                m.push(v);
                m.mean()
            };

            DailySummary {
                date,
                total_volume: r.hourly_volume(),
                total_energy: r.hourly_energy(),
                total_flow_time: r.hourly_flow_time(),
                avg_temperature: single(r.last_hour_temperature),
                avg_pressure: single(r.last_hour_static_pressure),
                avg_diff_pressure: single(r.last_hour_diff_pressure),
                specific_gravity: r.specific_gravity.unwrap_or(0.0),
                reading_count: 1,
            }
        })
        .collect()
}

pub fn summarize_days(days: &[DailySummary]) -> PeriodSummary {
    let mut temperature = NonZeroMean::default();
    let mut pressure = NonZeroMean::default();
    let mut diff_pressure = NonZeroMean::default();
    let mut summary = PeriodSummary {
        days: days.len(),
        ..PeriodSummary::default()
    };

    for d in days {
        summary.total_volume += d.total_volume;
        summary.total_energy += d.total_energy;
        summary.total_flow_time += d.total_flow_time;
        temperature.push(d.avg_temperature);
        pressure.push(d.avg_pressure);
        diff_pressure.push(d.avg_diff_pressure);
    }

    summary.avg_temperature = temperature.mean();
    summary.avg_pressure = pressure.mean();
    summary.avg_diff_pressure = diff_pressure.mean();
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime, offset};
    use time::OffsetDateTime;

    const PKT: UtcOffset = offset!(+5);

    fn reading(ts: OffsetDateTime) -> Reading {
        Reading::at(ts)
    }

    fn with_volume(ts: OffsetDateTime, v: f64) -> Reading {
        let mut r = reading(ts);
        r.last_hour_volume = Some(v);
        r
    }

    #[test]
    fn same_local_day_lands_in_one_bucket_regardless_of_order() {
        let readings = vec![
            with_volume(datetime!(2024-02-10 23:00:00 +05:00), 1.0),
            with_volume(datetime!(2024-02-10 00:00:00 +05:00), 2.0),
            with_volume(datetime!(2024-02-10 12:30:00 +05:00), 3.0),
        ];
        let mut reversed = readings.clone();
        reversed.reverse();

        let a = aggregate_daily(&readings, DailyPolicy::Sum, PKT);
        let b = aggregate_daily(&reversed, DailyPolicy::Sum, PKT);

        assert_eq!(a.len(), 1);
        assert_eq!(a, b);
        assert_eq!(a[0].date, date!(2024 - 02 - 10));
        assert_eq!(a[0].total_volume, 6.0);
        assert_eq!(a[0].reading_count, 3);
    }

    #[test]
    fn day_is_taken_in_local_time_not_utc() {
        // 20:00 UTC is 01:00 the next day at +05:00.
        let readings = vec![
            with_volume(datetime!(2024-02-10 18:00:00 UTC), 1.0),
            with_volume(datetime!(2024-02-10 20:00:00 UTC), 1.0),
        ];

        let days = aggregate_daily(&readings, DailyPolicy::Sum, PKT);
        let dates: Vec<Date> = days.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![date!(2024 - 02 - 10), date!(2024 - 02 - 11)]);
        assert_eq!(days.iter().map(|d| d.reading_count).sum::<usize>(), 2);
    }

    #[test]
    fn averages_skip_zero_samples() {
        let temps = [0.0, 50.0, 0.0, 70.0];
        let readings: Vec<Reading> = temps
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut r = reading(datetime!(2024-02-10 08:00:00 +05:00) + Duration::hours(i as i64));
                r.last_hour_temperature = Some(*t);
                r
            })
            .collect();

        let days = aggregate_daily(&readings, DailyPolicy::Sum, PKT);
        assert_eq!(days[0].avg_temperature, Some(60.0));
    }

    #[test]
    fn all_zero_day_has_no_average() {
        let mut r = reading(datetime!(2024-02-10 08:00:00 +05:00));
        r.last_hour_static_pressure = Some(0.0);

        let days = aggregate_daily(&[r], DailyPolicy::Sum, PKT);
        assert_eq!(days[0].avg_pressure, None);
        assert_eq!(days[0].avg_temperature, None);
    }

    #[test]
    fn sums_energy_and_flow_time_and_takes_first_specific_gravity() {
        let mut late = reading(datetime!(2024-02-10 10:00:00 +05:00));
        late.last_hour_energy = Some(2.0);
        late.last_hour_flow_time = Some(60.0);
        late.specific_gravity = Some(0.62);

        let mut early = reading(datetime!(2024-02-10 09:00:00 +05:00));
        early.last_hour_energy = Some(1.5);
        early.last_hour_flow_time = Some(45.0);
        early.specific_gravity = Some(0.60);

        let days = aggregate_daily(&[late, early], DailyPolicy::Sum, PKT);
        assert_eq!(days[0].total_energy, 3.5);
        assert_eq!(days[0].total_flow_time, 105.0);
        assert_eq!(days[0].specific_gravity, 0.60);
    }

    #[test]
    fn morning_sample_picks_reading_closest_to_six() {
        let readings = vec![
            with_volume(datetime!(2024-02-10 04:55:00 +05:00), 1.0),
            with_volume(datetime!(2024-02-10 06:02:00 +05:00), 2.0),
            with_volume(datetime!(2024-02-10 06:58:00 +05:00), 3.0),
            with_volume(datetime!(2024-02-10 07:10:00 +05:00), 4.0),
        ];

        let days = aggregate_daily(&readings, DailyPolicy::MorningSample, PKT);
        assert_eq!(days.len(), 1);
        assert_eq!(days[0].total_volume, 2.0);
        assert_eq!(days[0].reading_count, 1);
    }

    #[test]
    fn morning_sample_ties_go_to_the_earlier_reading() {
        let readings = vec![
            with_volume(datetime!(2024-02-10 06:10:00 +05:00), 2.0),
            with_volume(datetime!(2024-02-10 05:50:00 +05:00), 1.0),
        ];

        let days = aggregate_daily(&readings, DailyPolicy::MorningSample, PKT);
        assert_eq!(days[0].total_volume, 1.0);
    }

    #[test]
    fn day_without_qualifying_reading_is_omitted() {
        let readings = vec![
            with_volume(datetime!(2024-02-10 06:00:00 +05:00), 1.0),
            with_volume(datetime!(2024-02-11 12:00:00 +05:00), 1.0),
            with_volume(datetime!(2024-02-12 06:30:00 +05:00), 1.0),
        ];

        let days = aggregate_daily(&readings, DailyPolicy::MorningSample, PKT);
        let dates: Vec<Date> = days.iter().map(|d| d.date).collect();
        assert_eq!(dates, vec![date!(2024 - 02 - 10), date!(2024 - 02 - 12)]);
    }

    #[test]
    fn policy_names_parse() {
        assert_eq!("morning".parse::<DailyPolicy>(), Ok(DailyPolicy::MorningSample));
        assert_eq!("SUM".parse::<DailyPolicy>(), Ok(DailyPolicy::Sum));
        assert!("hourly".parse::<DailyPolicy>().is_err());
    }

    #[test]
    fn empty_input_yields_no_days() {
        assert!(aggregate_daily(&[], DailyPolicy::Sum, PKT).is_empty());
        assert!(aggregate_daily(&[], DailyPolicy::MorningSample, PKT).is_empty());
    }

    #[test]
    fn period_summary_averages_only_days_with_an_average() {
        let mut a = reading(datetime!(2024-02-10 08:00:00 +05:00));
        a.last_hour_volume = Some(10.0);
        a.last_hour_temperature = Some(40.0);
        let mut b = reading(datetime!(2024-02-11 08:00:00 +05:00));
        b.last_hour_volume = Some(5.0);
        b.last_hour_temperature = Some(0.0);

        let days = aggregate_daily(&[a, b], DailyPolicy::Sum, PKT);
        let summary = summarize_days(&days);

        assert_eq!(summary.days, 2);
        assert_eq!(summary.total_volume, 15.0);
        assert_eq!(summary.avg_temperature, Some(40.0));
        assert_eq!(summary.avg_pressure, None);
    }
}
