use std::time::Duration;

use serde::de::DeserializeOwned;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

use super::{
    error::ApiError,
    wire::{ReadingsEnvelope, SectionDevicesEnvelope, SectionStatsEnvelope},
};
use crate::domain::{Device, Reading, SectionStat};

/// Parameters of one `/analytics/readings` page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadingsQuery {
    pub device_id: i64,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
    /// 1-based.
    pub page: u32,
    pub page_size: u32,
}

/// Typed client for the SMS backend API.
///
/// `base_url` is the API root including the version prefix, for example
/// `http://backend:8000/api/v1`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    auth_bearer_token: Option<String>,
}

impl ApiClient {
    pub fn new(
        base_url: &str,
        request_timeout: Duration,
        auth_bearer_token: Option<String>,
    ) -> Result<Self, ApiError> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ApiError::InvalidRequest(format!(
                "base url must be http(s): '{base_url}'"
            )));
        }

        let http = reqwest::Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            http,
            base_url,
            auth_bearer_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch a single page of readings, oldest-first order is not guaranteed.
    pub async fn readings_page(&self, query: &ReadingsQuery) -> Result<Vec<Reading>, ApiError> {
        let start = format_rfc3339(query.start)?;
        let end = format_rfc3339(query.end)?;

        let params = [
            ("device_id", query.device_id.to_string()),
            ("start_date", start),
            ("end_date", end),
            ("page", query.page.to_string()),
            ("page_size", query.page_size.to_string()),
        ];

        let env: ReadingsEnvelope = self.get_json("/analytics/readings", &params).await?;
        Ok(env.into_readings())
    }

    pub async fn section_devices(&self, section_id: &str) -> Result<Vec<Device>, ApiError> {
        if section_id.is_empty() || section_id.contains('/') {
            return Err(ApiError::InvalidRequest(format!(
                "invalid section id '{section_id}'"
            )));
        }

        let path = format!("/sections/{section_id}/devices");
        let env: SectionDevicesEnvelope = self.get_json(&path, &[]).await?;
        Ok(env.devices)
    }

    pub async fn section_stats(&self) -> Result<Vec<SectionStat>, ApiError> {
        let env: SectionStatsEnvelope = self.get_json("/sections/stats", &[]).await?;
        Ok(env.sections)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);

        let mut request = self.http.get(&url).query(params);
        if let Some(token) = &self.auth_bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(%url, status = status.as_u16(), "backend returned error status");
            return Err(ApiError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn format_rfc3339(ts: OffsetDateTime) -> Result<String, ApiError> {
    ts.format(&Rfc3339)
        .map_err(|e| ApiError::InvalidRequest(format!("unformattable timestamp: {e}")))
}
