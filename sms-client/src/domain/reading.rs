use time::OffsetDateTime;

/// One hourly telemetry sample reported by an SMS unit.
///
/// Numeric fields are optional because the backend omits or nulls them when
/// the device did not report a value. Aggregation treats a missing value as
/// `0` when summing and skips it when averaging.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub timestamp: OffsetDateTime,
    /// T112, MCF
    pub last_hour_volume: Option<f64>,
    /// T113
    pub last_hour_energy: Option<f64>,
    /// T18, minutes
    pub last_hour_flow_time: Option<f64>,
    /// T111, °F
    pub last_hour_temperature: Option<f64>,
    /// T110, PSI
    pub last_hour_static_pressure: Option<f64>,
    /// T19, IWC
    pub last_hour_diff_pressure: Option<f64>,
    /// T114
    pub specific_gravity: Option<f64>,
    /// T15, V
    pub battery: Option<f64>,
    /// T14, generic volume register (MCF)
    pub volume: Option<f64>,
}

impl Reading {
    /// A reading at `timestamp` with no reported values.
    pub fn at(timestamp: OffsetDateTime) -> Self {
        Self {
            timestamp,
            last_hour_volume: None,
            last_hour_energy: None,
            last_hour_flow_time: None,
            last_hour_temperature: None,
            last_hour_static_pressure: None,
            last_hour_diff_pressure: None,
            specific_gravity: None,
            battery: None,
            volume: None,
        }
    }

    pub fn hourly_volume(&self) -> f64 {
        self.last_hour_volume.unwrap_or(0.0)
    }

    /// `last_hour_volume`, or the generic `volume` register when the hourly
    /// value was not reported at all.
    pub fn volume_or_fallback(&self) -> f64 {
        self.last_hour_volume.or(self.volume).unwrap_or(0.0)
    }

    pub fn hourly_energy(&self) -> f64 {
        self.last_hour_energy.unwrap_or(0.0)
    }

    pub fn hourly_flow_time(&self) -> f64 {
        self.last_hour_flow_time.unwrap_or(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn missing_values_read_as_zero() {
        let r = Reading::at(datetime!(2024-01-01 06:00:00 UTC));
        assert_eq!(r.hourly_volume(), 0.0);
        assert_eq!(r.hourly_energy(), 0.0);
        assert_eq!(r.hourly_flow_time(), 0.0);
        assert_eq!(r.volume_or_fallback(), 0.0);
    }

    #[test]
    fn volume_fallback_only_applies_when_hourly_volume_is_absent() {
        let mut r = Reading::at(datetime!(2024-01-01 06:00:00 UTC));
        r.volume = Some(42.0);
        assert_eq!(r.volume_or_fallback(), 42.0);

        r.last_hour_volume = Some(0.0);
        assert_eq!(r.volume_or_fallback(), 0.0);

        r.last_hour_volume = Some(3.5);
        assert_eq!(r.volume_or_fallback(), 3.5);
    }
}
