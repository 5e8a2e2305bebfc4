use std::{fs, path::PathBuf, time::Duration};

use serde::Deserialize;
use time::UtcOffset;

use crate::aggregate::VolumePolicy;
use crate::pipeline::PipelineError;
use crate::report::ReportSettings;

/// Largest page the readings endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// e.g. `http://backend:8000/api/v1`
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub auth_bearer_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportConfig {
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Whole hours east of UTC that define the reporting day.
    #[serde(default = "default_utc_offset_hours")]
    pub utc_offset_hours: i8,
    #[serde(default)]
    pub volume_policy: VolumePolicy,
}

impl ReportConfig {
    pub fn utc_offset(&self) -> Result<UtcOffset, PipelineError> {
        let hours = self.utc_offset_hours;
        if !(-12..=14).contains(&hours) {
            return Err(PipelineError::Config(format!(
                "report.utc_offset_hours out of range: {hours}"
            )));
        }
        UtcOffset::from_hms(hours, 0, 0).map_err(|e| PipelineError::Config(e.to_string()))
    }

    pub fn settings(&self) -> Result<ReportSettings, PipelineError> {
        Ok(ReportSettings {
            page_size: self.page_size,
            batch_size: self.batch_size,
            utc_offset: self.utc_offset()?,
        })
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            batch_size: default_batch_size(),
            utc_offset_hours: default_utc_offset_hours(),
            volume_policy: VolumePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatchlistConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub server: ServerConfig,
    pub metrics: Option<MetricsConfig>,
    pub watchlist: Option<WatchlistConfig>,
}

fn default_request_timeout_ms() -> u64 {
    30_000
}

fn default_page_size() -> u32 {
    MAX_PAGE_SIZE
}

fn default_batch_size() -> usize {
    5
}

fn default_utc_offset_hours() -> i8 {
    5
}

fn default_bind_addr() -> String {
    "0.0.0.0:8090".to_string()
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("REPORT_CONFIG").unwrap_or_else(|_| "report-config.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config {path}: {e}"))?;
        let cfg = Self::from_toml_str(&contents)?;
        tracing::debug!(%path, "configuration loaded");
        Ok(cfg)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, PipelineError> {
        let cfg: AppConfig =
            toml::from_str(contents).map_err(|e| PipelineError::Config(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://"))
        {
            return Err(PipelineError::Config(format!(
                "api.base_url must be http(s): {}",
                self.api.base_url
            )));
        }
        if self.api.request_timeout_ms == 0 {
            return Err(PipelineError::Config(
                "api.request_timeout_ms must be positive".to_string(),
            ));
        }
        if !(1..=MAX_PAGE_SIZE).contains(&self.report.page_size) {
            return Err(PipelineError::Config(format!(
                "report.page_size must be between 1 and {MAX_PAGE_SIZE}: {}",
                self.report.page_size
            )));
        }
        if self.report.batch_size == 0 {
            return Err(PipelineError::Config(
                "report.batch_size must be positive".to_string(),
            ));
        }
        self.utc_offset()?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.api.request_timeout_ms)
    }

    pub fn utc_offset(&self) -> Result<UtcOffset, PipelineError> {
        self.report.utc_offset()
    }

    pub fn report_settings(&self) -> Result<ReportSettings, PipelineError> {
        self.report.settings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [api]
            base_url = "http://localhost:8000/api/v1"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.report.page_size, 1000);
        assert_eq!(cfg.report.batch_size, 5);
        assert_eq!(cfg.report.volume_policy, VolumePolicy::DailySample);
        assert_eq!(cfg.request_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.server.bind_addr, "0.0.0.0:8090");
        assert_eq!(cfg.utc_offset().unwrap(), UtcOffset::from_hms(5, 0, 0).unwrap());
        assert!(cfg.metrics.is_none());
        assert!(cfg.watchlist.is_none());
    }

    #[test]
    fn full_config_parses() {
        let cfg = AppConfig::from_toml_str(
            r#"
            [api]
            base_url = "https://sms.example.com/api/v1"
            request_timeout_ms = 5000
            auth_bearer_token = "secret"

            [report]
            page_size = 500
            batch_size = 2
            utc_offset_hours = 0
            volume_policy = "daily_sum"

            [server]
            bind_addr = "127.0.0.1:9000"

            [metrics]
            bind_addr = "127.0.0.1:9100"

            [watchlist]
            path = "/var/lib/report-service/state.json"
            "#,
        )
        .unwrap();

        assert_eq!(cfg.report.volume_policy, VolumePolicy::DailySum);
        assert_eq!(cfg.api.auth_bearer_token.as_deref(), Some("secret"));
        let settings = cfg.report_settings().unwrap();
        assert_eq!(settings.page_size, 500);
        assert_eq!(settings.utc_offset, UtcOffset::UTC);
        assert!(cfg.watchlist.is_some());
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let res = AppConfig::from_toml_str(
            r#"
            [api]
            base_url = "http://localhost"
            [report]
            batch_size = 0
            "#,
        );
        assert!(matches!(res, Err(PipelineError::Config(_))));
    }

    #[test]
    fn page_size_above_backend_limit_is_rejected() {
        let res = AppConfig::from_toml_str(
            r#"
            [api]
            base_url = "http://localhost"
            [report]
            page_size = 2000
            "#,
        );
        assert!(matches!(res, Err(PipelineError::Config(msg)) if msg.contains("page_size")));

        let at_limit = AppConfig::from_toml_str(
            r#"
            [api]
            base_url = "http://localhost"
            [report]
            page_size = 1000
            "#,
        );
        assert!(at_limit.is_ok());
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let res = AppConfig::from_toml_str(
            r#"
            [api]
            base_url = "http://localhost"
            [report]
            utc_offset_hours = 20
            "#,
        );
        assert!(matches!(res, Err(PipelineError::Config(_))));
    }

    #[test]
    fn missing_api_section_is_rejected() {
        assert!(AppConfig::from_toml_str("[report]\npage_size = 10\n").is_err());
    }
}
