use std::{future::Future, time::Duration};

use sms_client::{
    domain::{Device, Reading, SectionStat},
    ApiClient, ApiError, ReadingsQuery,
};

use crate::config::AppConfig;
use crate::pipeline::{DeviceDirectory, PipelineError, ReadingPages, TimeWindow};

/// Backend API as a reading/device source.
///
/// Every call is bounded by `request_timeout`, on top of the HTTP client's
/// own timeout, so a stalled connection cannot hold a report batch forever.
#[derive(Clone)]
pub struct HttpReadingSource {
    client: ApiClient,
    request_timeout: Duration,
}

impl HttpReadingSource {
    pub fn new(client: ApiClient, request_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout,
        }
    }

    pub fn from_config(cfg: &AppConfig) -> Result<Self, PipelineError> {
        let timeout = cfg.request_timeout();
        let client = ApiClient::new(&cfg.api.base_url, timeout, cfg.api.auth_bearer_token.clone())
            .map_err(|e| PipelineError::Config(e.to_string()))?;
        Ok(Self::new(client, timeout))
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, PipelineError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        match tokio::time::timeout(self.request_timeout, call).await {
            Ok(Ok(v)) => Ok(v),
            Ok(Err(e)) if e.is_timeout() => Err(PipelineError::Timeout(self.request_timeout)),
            Ok(Err(e)) => Err(PipelineError::Source(e.to_string())),
            Err(_elapsed) => Err(PipelineError::Timeout(self.request_timeout)),
        }
    }
}

#[async_trait::async_trait]
impl ReadingPages for HttpReadingSource {
    async fn page(
        &self,
        device_id: i64,
        window: TimeWindow,
        page: u32,
        page_size: u32,
    ) -> Result<Vec<Reading>, PipelineError> {
        let query = ReadingsQuery {
            device_id,
            start: window.start,
            end: window.end,
            page,
            page_size,
        };

        let started = std::time::Instant::now();
        let res = self.bounded(self.client.readings_page(&query)).await;
        metrics::histogram!("report_page_fetch_seconds").record(started.elapsed().as_secs_f64());
        res
    }
}

#[async_trait::async_trait]
impl DeviceDirectory for HttpReadingSource {
    async fn section_devices(&self, section_id: &str) -> Result<Vec<Device>, PipelineError> {
        self.bounded(self.client.section_devices(section_id)).await
    }

    async fn section_stats(&self) -> Result<Vec<SectionStat>, PipelineError> {
        self.bounded(self.client.section_stats()).await
    }
}
