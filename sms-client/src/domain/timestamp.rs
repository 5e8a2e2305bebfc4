use time::{
    format_description::well_known::Rfc3339, macros::format_description, Duration, OffsetDateTime,
    PrimitiveDateTime,
};

/// Parse a backend timestamp.
///
/// Accepts RFC 3339 (`2024-01-01T06:00:00+05:00`, `...Z`) as well as the
/// offset-less forms the backend emits for naive columns
/// (`2024-01-01T06:00:00.123456`, `2024-01-01 06:00:00`). Offset-less values
/// are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, time::error::Parse> {
    let normalized = raw.trim().replacen(' ', "T", 1);

    if let Ok(ts) = OffsetDateTime::parse(&normalized, &Rfc3339) {
        return Ok(ts);
    }

    let (main, fraction) = match normalized.split_once('.') {
        Some((main, fraction)) => (main, Some(fraction)),
        None => (normalized.as_str(), None),
    };

    let naive = PrimitiveDateTime::parse(
        main,
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    )?;
    let nanos = fraction.map(fraction_nanos).unwrap_or(0);

    Ok(naive.assume_utc() + Duration::nanoseconds(nanos))
}

fn fraction_nanos(fraction: &str) -> i64 {
    let digits: String = fraction
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .take(9)
        .collect();
    if digits.is_empty() {
        return 0;
    }

    let scale = 10_i64.pow(9 - digits.len() as u32);
    digits.parse::<i64>().map(|v| v * scale).unwrap_or(0)
}
