use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use time::UtcOffset;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::aggregate::{DailyPolicy, VolumePolicy};
use crate::pipeline::{parse_bound, Bound, PipelineError, TimeWindow};
use crate::report::{ReportGenerator, Sheet};
use crate::sinks::encode_csv;
use crate::watchlist::Watchlist;

/// Number of devices with incomplete readings in a region report.
pub const FAILED_DEVICES_HEADER: &str = "x-failed-devices";

#[derive(Clone)]
pub struct AppState {
    pub generator: ReportGenerator,
    /// Used when a region request does not name a policy.
    pub default_volume_policy: VolumePolicy,
    pub watchlist: Option<Arc<Mutex<Watchlist>>>,
    /// Cancelled on shutdown; every request works under a child token.
    pub shutdown: CancellationToken,
}

/// Handler error, rendered as `{"error": ..., "code": ...}`.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Upstream(String),
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl From<PipelineError> for HttpError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::Source(_) | PipelineError::Timeout(_) => Self::Upstream(e.to_string()),
            PipelineError::Cancelled => Self::Unavailable(e.to_string()),
            PipelineError::InvalidWindow(_) => Self::BadRequest(e.to_string()),
            PipelineError::Transform(_) | PipelineError::Sink(_) | PipelineError::Config(_) => {
                Self::Internal(e.to_string())
            }
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_ERROR"),
            Self::Unavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE"),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let body = json!({ "error": self.to_string(), "code": code });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/sections", get(section_stats))
        .route("/reports/daily", get(daily_report))
        .route("/reports/region", get(region_report))
        .route("/watchlist", get(list_watchlist))
        .route(
            "/watchlist/:device_id",
            post(watch_device).delete(unwatch_device),
        )
        .with_state(state)
}

/// Serve until `state.shutdown` is cancelled.
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let shutdown = state.shutdown.clone();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "report server listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn health() -> &'static str {
    "ok"
}

async fn section_stats(State(state): State<AppState>) -> Result<Response, HttpError> {
    let sections = state.generator.directory().section_stats().await?;
    Ok(Json(json!({ "sections": sections })).into_response())
}

fn window(
    names: (&str, &str),
    start: &str,
    end: &str,
    offset: UtcOffset,
) -> Result<TimeWindow, HttpError> {
    let parse = |name: &str, raw: &str, bound: Bound| {
        parse_bound(raw, bound, offset)
            .map_err(|e| HttpError::BadRequest(format!("invalid {name} '{raw}': {e}")))
    };
    let start = parse(names.0, start, Bound::Start)?;
    let end = parse(names.1, end, Bound::End)?;
    TimeWindow::new(start, end).map_err(|_| {
        HttpError::BadRequest(format!("{} must not be before {}", names.1, names.0))
    })
}

#[derive(Debug, Deserialize)]
struct DailyParams {
    device_id: i64,
    start: String,
    end: String,
    #[serde(default)]
    policy: DailyPolicy,
}

async fn daily_report(
    State(state): State<AppState>,
    Query(params): Query<DailyParams>,
) -> Result<Response, HttpError> {
    metrics::counter!("http_report_requests_total", "endpoint" => "daily").increment(1);

    let offset = state.generator.settings().utc_offset;
    let window = window(("start", "end"), &params.start, &params.end, offset)?;
    let cancel = state.shutdown.child_token();

    let outcome = state
        .generator
        .daily_report(params.device_id, window, params.policy, &cancel)
        .await?;

    if outcome.is_empty() {
        return Err(HttpError::NotFound(format!(
            "no readings for device {} between {} and {}",
            params.device_id, params.start, params.end
        )));
    }

    Ok(Json(outcome).into_response())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ReportFormat {
    #[default]
    Json,
    Csv,
}

#[derive(Debug, Deserialize)]
struct RegionParams {
    section: String,
    a_start: String,
    a_end: String,
    b_start: String,
    b_end: String,
    policy: Option<VolumePolicy>,
    #[serde(default)]
    format: ReportFormat,
}

async fn region_report(
    State(state): State<AppState>,
    Query(params): Query<RegionParams>,
) -> Result<Response, HttpError> {
    metrics::counter!("http_report_requests_total", "endpoint" => "region").increment(1);

    let section = params.section.trim();
    if section.is_empty() {
        return Err(HttpError::BadRequest("section must not be empty".to_string()));
    }

    let offset = state.generator.settings().utc_offset;
    let period_a = window(("a_start", "a_end"), &params.a_start, &params.a_end, offset)?;
    let period_b = window(("b_start", "b_end"), &params.b_start, &params.b_end, offset)?;
    let policy = params.policy.unwrap_or(state.default_volume_policy);
    let cancel = state.shutdown.child_token();

    let outcome = state
        .generator
        .region_report(section, period_a, period_b, policy, &cancel)
        .await?;

    let failed = outcome.failed_devices.len();
    if outcome.all_devices_failed() {
        let reason = outcome
            .failed_devices
            .first()
            .map(|f| f.reason.as_str())
            .unwrap_or_default();
        return Err(HttpError::Upstream(format!(
            "readings failed for all {failed} devices of section {section}: {reason}"
        )));
    }
    if outcome.is_empty() {
        return Err(HttpError::NotFound(format!(
            "no volume data for section {section} in either period"
        )));
    }

    let mut response = match params.format {
        ReportFormat::Json => Json(outcome).into_response(),
        ReportFormat::Csv => {
            let sheet = Sheet::from_region_report(&outcome);
            let bytes = encode_csv(&sheet)?;
            (
                [
                    (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                    (
                        header::CONTENT_DISPOSITION,
                        format!("attachment; filename=\"{}.csv\"", sheet.name),
                    ),
                ],
                bytes,
            )
                .into_response()
        }
    };

    if failed > 0 {
        response.headers_mut().insert(
            HeaderName::from_static(FAILED_DEVICES_HEADER),
            HeaderValue::from(failed),
        );
    }
    Ok(response)
}

fn watchlist(state: &AppState) -> Result<Arc<Mutex<Watchlist>>, HttpError> {
    state
        .watchlist
        .clone()
        .ok_or_else(|| HttpError::NotFound("watchlist is not configured".to_string()))
}

async fn list_watchlist(State(state): State<AppState>) -> Result<Response, HttpError> {
    let list = watchlist(&state)?;
    let devices = list.lock().await.devices();
    Ok(Json(json!({ "devices": devices })).into_response())
}

async fn watch_device(
    State(state): State<AppState>,
    Path(device_id): Path<i64>,
) -> Result<Response, HttpError> {
    let list = watchlist(&state)?;
    let mut list = list.lock().await;

    if !list.add(device_id) {
        return Ok(StatusCode::OK.into_response());
    }
    list.save()
        .await
        .map_err(|e| HttpError::Internal(e.to_string()))?;

    tracing::info!(device_id, "device added to watchlist");
    Ok(StatusCode::CREATED.into_response())
}

async fn unwatch_device(
    State(state): State<AppState>,
    Path(device_id): Path<i64>,
) -> Result<Response, HttpError> {
    let list = watchlist(&state)?;
    let mut list = list.lock().await;

    if !list.remove(device_id) {
        return Err(HttpError::NotFound(format!(
            "device {device_id} is not on the watchlist"
        )));
    }
    list.save()
        .await
        .map_err(|e| HttpError::Internal(e.to_string()))?;

    tracing::info!(device_id, "device removed from watchlist");
    Ok(StatusCode::NO_CONTENT.into_response())
}
