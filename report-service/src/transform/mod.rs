use std::collections::HashSet;

use sms_client::domain::Reading;
use time::macros::datetime;

use crate::pipeline::PipelineError;

/// Pure validation of a fetched `Reading`.
///
/// Rules:
/// - timestamp must be within a broad sanity window [2000-01-01, 2100-01-01].
/// - every reported numeric value must be finite.
pub fn validate_reading(r: &Reading) -> Result<(), PipelineError> {
    let min_ts = datetime!(2000-01-01 00:00:00 UTC);
    let max_ts = datetime!(2100-01-01 00:00:00 UTC);

    if r.timestamp < min_ts || r.timestamp > max_ts {
        return Err(PipelineError::Transform("timestamp out of allowed range".to_string()));
    }

    let values = [
        r.last_hour_volume,
        r.last_hour_energy,
        r.last_hour_flow_time,
        r.last_hour_temperature,
        r.last_hour_static_pressure,
        r.last_hour_diff_pressure,
        r.specific_gravity,
        r.battery,
        r.volume,
    ];
    if values.iter().flatten().any(|v| !v.is_finite()) {
        return Err(PipelineError::Transform("non-finite reading value".to_string()));
    }

    Ok(())
}

/// Stable identity of a reading: the backend keys readings by
/// `(device_id, timestamp)`.
pub fn reading_fingerprint(device_id: i64, r: &Reading) -> [u8; 32] {
    let mut h = blake3::Hasher::new();
    h.update(&device_id.to_le_bytes());
    h.update(&r.timestamp.unix_timestamp_nanos().to_le_bytes());
    *h.finalize().as_bytes()
}

/// Drops invalid readings and repeats of an already accepted reading.
///
/// Offset pagination over a table that is still being written to can hand
/// out the same row on two consecutive pages.
pub struct ReadingFilter {
    device_id: i64,
    seen: HashSet<[u8; 32]>,
    rejected: usize,
    duplicates: usize,
}

impl ReadingFilter {
    pub fn new(device_id: i64) -> Self {
        Self {
            device_id,
            seen: HashSet::new(),
            rejected: 0,
            duplicates: 0,
        }
    }

    pub fn accept(&mut self, r: &Reading) -> bool {
        if let Err(e) = validate_reading(r) {
            tracing::debug!(device_id = self.device_id, error = %e, "dropping reading");
            metrics::counter!("report_readings_rejected_total").increment(1);
            self.rejected += 1;
            return false;
        }

        if !self.seen.insert(reading_fingerprint(self.device_id, r)) {
            metrics::counter!("report_duplicate_readings_total").increment(1);
            self.duplicates += 1;
            return false;
        }

        true
    }

    pub fn rejected(&self) -> usize {
        self.rejected
    }

    pub fn duplicates(&self) -> usize {
        self.duplicates
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_validation_accepts_valid_record() {
        let mut r = Reading::at(datetime!(2024-01-01 06:00:00 UTC));
        r.last_hour_volume = Some(1.0);
        assert!(validate_reading(&r).is_ok());
    }

    #[test]
    fn reading_validation_rejects_out_of_range_ts() {
        let r = Reading::at(datetime!(1970-01-01 00:00:00 UTC));
        assert!(matches!(validate_reading(&r), Err(PipelineError::Transform(_))));
    }

    #[test]
    fn reading_validation_rejects_nan() {
        let mut r = Reading::at(datetime!(2024-01-01 06:00:00 UTC));
        r.last_hour_temperature = Some(f64::NAN);
        assert!(matches!(validate_reading(&r), Err(PipelineError::Transform(_))));
    }

    #[test]
    fn fingerprint_ignores_values_but_not_device() {
        let mut a = Reading::at(datetime!(2024-01-01 06:00:00 UTC));
        let b = a.clone();
        a.last_hour_volume = Some(9.0);

        assert_eq!(reading_fingerprint(1, &a), reading_fingerprint(1, &b));
        assert_ne!(reading_fingerprint(1, &a), reading_fingerprint(2, &a));
    }

    #[test]
    fn filter_keeps_first_of_duplicate_timestamps() {
        let mut filter = ReadingFilter::new(5);
        let r = Reading::at(datetime!(2024-01-01 06:00:00 UTC));
        let same_instant = Reading::at(datetime!(2024-01-01 11:00:00 +05:00));

        assert!(filter.accept(&r));
        assert!(!filter.accept(&same_instant));
        assert_eq!(filter.duplicates(), 1);

        assert!(!filter.accept(&Reading::at(datetime!(1999-12-31 00:00:00 UTC))));
        assert_eq!(filter.rejected(), 1);
    }
}
