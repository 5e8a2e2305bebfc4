use std::{collections::HashMap, fs::File, io::Read, path::Path};

use csv::StringRecord;
use sms_client::domain::{parse_timestamp, Device, Reading, SectionStat};

use crate::pipeline::{DeviceDirectory, PipelineError, ReadingPages, TimeWindow};

/// Offline reading source backed by a readings CSV export.
///
/// Header columns are matched by name, case-insensitively, with spaces read
/// as underscores (so the backend's `Device ID` header works):
/// - device_id
/// - timestamp (RFC3339 or `YYYY-MM-DD HH:MM:SS`, offset-less means UTC)
/// - any of: last_hour_volume, last_hour_energy, last_hour_flow_time,
///   last_hour_temperature, last_hour_static_pressure,
///   last_hour_diff_pressure, specific_gravity, battery, volume
///
/// Blank numeric cells are missing values.
pub struct ReadingsCsvFileSource {
    by_device: HashMap<i64, Vec<Reading>>,
}

impl ReadingsCsvFileSource {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PipelineError> {
        let file = File::open(path.as_ref())
            .map_err(|e| PipelineError::Source(format!("failed to open CSV file: {e}")))?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, PipelineError> {
        let mut rdr = csv::Reader::from_reader(reader);
        let headers: Vec<String> = rdr
            .headers()
            .map_err(|e| PipelineError::Source(format!("failed to read CSV headers: {e}")))?
            .iter()
            .map(normalize_header)
            .collect();

        let mut by_device: HashMap<i64, Vec<Reading>> = HashMap::new();
        for result in rdr.records() {
            let record = result
                .map_err(|e| PipelineError::Source(format!("failed to read CSV record: {e}")))?;

            match record_to_reading(&record, &headers) {
                Ok((device_id, reading)) => by_device.entry(device_id).or_default().push(reading),
                Err(e) => {
                    metrics::counter!("readings_csv_parse_errors_total").increment(1);
                    return Err(e);
                }
            }
        }

        for readings in by_device.values_mut() {
            readings.sort_by_key(|r| r.timestamp);
        }

        Ok(Self { by_device })
    }

    pub fn device_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.by_device.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}

fn normalize_header(h: &str) -> String {
    h.trim().to_ascii_lowercase().replace(' ', "_")
}

fn parse_optional_f64(s: &str, column: &str) -> Result<Option<f64>, PipelineError> {
    let trimmed = s.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    trimmed
        .parse()
        .map(Some)
        .map_err(|e| PipelineError::Source(format!("invalid {column} '{trimmed}': {e}")))
}

fn record_to_reading(
    record: &StringRecord,
    headers: &[String],
) -> Result<(i64, Reading), PipelineError> {
    let get = |name: &str| -> Option<&str> {
        headers
            .iter()
            .position(|h| h == name)
            .and_then(|idx| record.get(idx))
    };
    let required = |name: &str| -> Result<&str, PipelineError> {
        get(name).ok_or_else(|| {
            PipelineError::Source(format!("missing column '{name}' in CSV record"))
        })
    };
    let optional = |name: &str| -> Result<Option<f64>, PipelineError> {
        get(name).map_or(Ok(None), |v| parse_optional_f64(v, name))
    };

    let id_str = required("device_id")?;
    let device_id: i64 = id_str
        .trim()
        .parse()
        .map_err(|e| PipelineError::Source(format!("invalid device_id '{id_str}': {e}")))?;

    let ts_str = required("timestamp")?;
    let timestamp = parse_timestamp(ts_str)
        .map_err(|e| PipelineError::Source(format!("invalid timestamp '{ts_str}': {e}")))?;

    let reading = Reading {
        timestamp,
        last_hour_volume: optional("last_hour_volume")?,
        last_hour_energy: optional("last_hour_energy")?,
        last_hour_flow_time: optional("last_hour_flow_time")?,
        last_hour_temperature: optional("last_hour_temperature")?,
        last_hour_static_pressure: optional("last_hour_static_pressure")?,
        last_hour_diff_pressure: optional("last_hour_diff_pressure")?,
        specific_gravity: optional("specific_gravity")?,
        battery: optional("battery")?,
        volume: optional("volume")?,
    };

    Ok((device_id, reading))
}

#[async_trait::async_trait]
impl ReadingPages for ReadingsCsvFileSource {
    async fn page(
        &self,
        device_id: i64,
        window: TimeWindow,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Reading>, PipelineError> {
        let Some(readings) = self.by_device.get(&device_id) else {
            return Ok(Vec::new());
        };

        let skip = (page.saturating_sub(1) as usize).saturating_mul(page_size as usize);
        Ok(readings
            .iter()
            .filter(|r| window.contains(r.timestamp))
            .skip(skip)
            .take(page_size as usize)
            .cloned()
            .collect())
    }
}

/// An export carries no section data: every section lists every device in
/// the file, without location.
#[async_trait::async_trait]
impl DeviceDirectory for ReadingsCsvFileSource {
    async fn section_devices(&self, _section_id: &str) -> Result<Vec<Device>, PipelineError> {
        Ok(self
            .device_ids()
            .into_iter()
            .map(|id| Device {
                id,
                client_id: format!("device-{id}"),
                device_name: None,
                device_type: None,
                location: None,
                is_active: true,
                last_seen: None,
            })
            .collect())
    }

    async fn section_stats(&self) -> Result<Vec<SectionStat>, PipelineError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const EXPORT: &str = "\
Device ID,Timestamp,Last Hour Volume,Last Hour Temperature,Volume
3,2024-04-02 06:00:00,12.5,61.0,
3,2024-04-01 06:00:00,10.0,,800
4,2024-04-01T06:00:00+05:00,,0,
";

    fn window() -> TimeWindow {
        TimeWindow::new(
            datetime!(2024-04-01 00:00:00 UTC),
            datetime!(2024-04-30 00:00:00 UTC),
        )
        .unwrap()
    }

    #[test]
    fn parses_backend_style_headers() {
        let source = ReadingsCsvFileSource::from_reader(EXPORT.as_bytes()).unwrap();
        assert_eq!(source.device_ids(), vec![3, 4]);

        let device3 = &source.by_device[&3];
        assert_eq!(device3[0].timestamp, datetime!(2024-04-01 06:00:00 UTC));
        assert_eq!(device3[0].volume, Some(800.0));
        assert_eq!(device3[0].last_hour_temperature, None);
        assert_eq!(device3[1].last_hour_volume, Some(12.5));
    }

    #[test]
    fn rejects_bad_number() {
        let csv = "device_id,timestamp,last_hour_volume\n1,2024-04-01 06:00:00,abc\n";
        let res = ReadingsCsvFileSource::from_reader(csv.as_bytes());
        assert!(matches!(res, Err(PipelineError::Source(_))));
    }

    #[test]
    fn rejects_missing_timestamp_column() {
        let csv = "device_id,last_hour_volume\n1,2.0\n";
        let res = ReadingsCsvFileSource::from_reader(csv.as_bytes());
        assert!(matches!(res, Err(PipelineError::Source(_))));
    }

    #[tokio::test]
    async fn pages_through_one_device() {
        let source = ReadingsCsvFileSource::from_reader(EXPORT.as_bytes()).unwrap();

        let first = source.page(3, window(), 1, 1).await.unwrap();
        let second = source.page(3, window(), 2, 1).await.unwrap();
        let third = source.page(3, window(), 3, 1).await.unwrap();

        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert!(third.is_empty());
        assert!(first[0].timestamp < second[0].timestamp);

        assert!(source.page(99, window(), 1, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_file_devices_for_any_section() {
        let source = ReadingsCsvFileSource::from_reader(EXPORT.as_bytes()).unwrap();

        let devices = source.section_devices("II").await.unwrap();
        let ids: Vec<i64> = devices.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![3, 4]);
        assert_eq!(devices[0].display_name(), "device-3");
    }
}
