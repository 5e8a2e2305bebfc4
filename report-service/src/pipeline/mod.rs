use std::time::Duration;

use sms_client::domain::{parse_timestamp, Device, Reading, SectionStat};
use time::{
    macros::{format_description, time},
    Date, OffsetDateTime, Time, UtcOffset,
};

use crate::report::Sheet;

/// Inclusive `[start, end]` time range of a report period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct TimeWindow {
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl TimeWindow {
    pub fn new(start: OffsetDateTime, end: OffsetDateTime) -> Result<Self, PipelineError> {
        if end < start {
            return Err(PipelineError::InvalidWindow(format!(
                "end {end} is before start {start}"
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        self.start <= ts && ts <= self.end
    }
}

/// Which end of a window a user-supplied bound describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    Start,
    End,
}

/// RFC3339, offset-less timestamps (UTC), or a bare `YYYY-MM-DD` which covers
/// the whole local day at `offset`.
pub fn parse_bound(
    raw: &str,
    bound: Bound,
    offset: UtcOffset,
) -> Result<OffsetDateTime, time::error::Parse> {
    let raw = raw.trim();
    if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        let at = match bound {
            Bound::Start => Time::MIDNIGHT,
            Bound::End => time!(23:59:59.999_999_999),
        };
        return Ok(date.with_time(at).assume_offset(offset));
    }
    parse_timestamp(raw)
}

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("source error: {0}")]
    Source(String),
    #[error("transform error: {0}")]
    Transform(String),
    #[error("sink error: {0}")]
    Sink(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("report generation cancelled")]
    Cancelled,
    #[error("config error: {0}")]
    Config(String),
    #[error("invalid window: {0}")]
    InvalidWindow(String),
}

/// Paged access to a device's readings.
#[async_trait::async_trait]
pub trait ReadingPages: Send + Sync {
    /// Page `page` (1-based) of at most `page_size` readings for `device_id`
    /// inside `window`.
    async fn page(
        &self,
        device_id: i64,
        window: TimeWindow,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Reading>, PipelineError>;
}

#[async_trait::async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn section_devices(&self, section_id: &str) -> Result<Vec<Device>, PipelineError>;

    async fn section_stats(&self) -> Result<Vec<SectionStat>, PipelineError>;
}

/// Destination for a rendered report table.
#[async_trait::async_trait]
pub trait SheetSink: Send + Sync {
    async fn write(&self, sheet: &Sheet) -> Result<(), PipelineError>;
}
