use serde::{Deserialize, Deserializer};
use time::OffsetDateTime;

use crate::domain::{parse_timestamp, Device, Reading, SectionStat};

#[derive(Deserialize)]
pub(crate) struct IncomingReading {
    #[serde(deserialize_with = "deserialize_timestamp")]
    timestamp: OffsetDateTime,
    #[serde(default)]
    last_hour_volume: Option<f64>,
    #[serde(default)]
    last_hour_energy: Option<f64>,
    #[serde(default)]
    last_hour_flow_time: Option<f64>,
    #[serde(default)]
    last_hour_temperature: Option<f64>,
    #[serde(default)]
    last_hour_static_pressure: Option<f64>,
    #[serde(default)]
    last_hour_diff_pressure: Option<f64>,
    #[serde(default)]
    specific_gravity: Option<f64>,
    #[serde(default)]
    battery: Option<f64>,
    #[serde(default)]
    volume: Option<f64>,
}

impl From<IncomingReading> for Reading {
    fn from(i: IncomingReading) -> Self {
        Reading {
            timestamp: i.timestamp,
            last_hour_volume: i.last_hour_volume,
            last_hour_energy: i.last_hour_energy,
            last_hour_flow_time: i.last_hour_flow_time,
            last_hour_temperature: i.last_hour_temperature,
            last_hour_static_pressure: i.last_hour_static_pressure,
            last_hour_diff_pressure: i.last_hour_diff_pressure,
            specific_gravity: i.specific_gravity,
            battery: i.battery,
            volume: i.volume,
        }
    }
}

/// `/analytics/readings` answers with a paginated envelope; older deployments
/// return the bare array.
#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum ReadingsEnvelope {
    Paged { data: Vec<IncomingReading> },
    Bare(Vec<IncomingReading>),
}

impl ReadingsEnvelope {
    pub(crate) fn into_readings(self) -> Vec<Reading> {
        let incoming = match self {
            Self::Paged { data } => data,
            Self::Bare(data) => data,
        };
        incoming.into_iter().map(Reading::from).collect()
    }
}

#[derive(Deserialize)]
pub(crate) struct SectionDevicesEnvelope {
    #[serde(default)]
    pub(crate) devices: Vec<Device>,
}

#[derive(Deserialize)]
pub(crate) struct SectionStatsEnvelope {
    #[serde(default)]
    pub(crate) sections: Vec<SectionStat>,
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .map_err(|e| serde::de::Error::custom(format!("invalid timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn paged_envelope_decodes_nulls_as_missing() {
        let body = r#"{
            "total": 1, "page": 1, "page_size": 1000, "total_pages": 1,
            "data": [{
                "id": 1, "device_id": 3, "client_id": "SMS-I-003",
                "timestamp": "2024-01-02T06:00:00+05:00",
                "last_hour_volume": 12.5, "last_hour_temperature": null
            }]
        }"#;

        let env: ReadingsEnvelope = serde_json::from_str(body).unwrap();
        let readings = env.into_readings();

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].timestamp, datetime!(2024-01-02 06:00:00 +05:00));
        assert_eq!(readings[0].last_hour_volume, Some(12.5));
        assert_eq!(readings[0].last_hour_temperature, None);
        assert_eq!(readings[0].battery, None);
    }

    #[test]
    fn bare_array_decodes() {
        let body = r#"[{"timestamp": "2024-01-02 07:00:00", "volume": 3.0}]"#;
        let env: ReadingsEnvelope = serde_json::from_str(body).unwrap();
        let readings = env.into_readings();

        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].volume, Some(3.0));
    }

    #[test]
    fn bad_timestamp_fails_decoding() {
        let body = r#"[{"timestamp": "not a time"}]"#;
        assert!(serde_json::from_str::<ReadingsEnvelope>(body).is_err());
    }
}
