//! HTTP surface for report intake.
//!
//! Routes:
//! - `POST /reports` - create a report, returns an upload token
//! - `POST /reports/:id/evidence` - attach evidence, needs the upload token
//! - `GET /health`
//! - `GET /metrics` when enabled
//!
//! Both write routes pass admission control before anything else runs.
//! The evidence route verifies the token before touching the store, so an
//! unauthorized caller learns nothing about whether the report exists.

use crate::config::RateQuota;
use crate::error::ApiError;
use crate::reports::{Evidence, NewReport};
use crate::security::{RateLimitDecision, resolve_client_identity};
use crate::state::AppState;
use crate::telemetry::{RequestTimer, spans};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{Instrument, info};

/// Admission namespace for report creation.
pub const CREATE_NAMESPACE: &str = "reports:create";

/// Admission namespace for evidence uploads.
pub const EVIDENCE_NAMESPACE: &str = "reports:evidence";

/// Request header carrying the upload token.
pub const UPLOAD_TOKEN_HEADER: &str = "x-upload-token";

/// Build the application router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/reports", post(create_report))
        .route("/reports/:id/evidence", post(attach_evidence));

    if state.config.server.metrics {
        app = app.route("/metrics", get(metrics_handler));
    }

    app.with_state(state)
}

/// Serve the application on an already bound listener.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "HTTP server listening");
    }
    axum::serve(listener, router(state)).await
}

async fn health() -> &'static str {
    "ok"
}

/// Handler for GET /metrics - returns Prometheus metrics in text format.
async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

fn admit(
    state: &AppState,
    namespace: &str,
    headers: &HeaderMap,
    quota: RateQuota,
) -> Result<RateLimitDecision, ApiError> {
    let decision = state
        .rate_limiter
        .check(namespace, headers, quota.limit, quota.window);
    if decision.allowed {
        Ok(decision)
    } else {
        Err(ApiError::RateLimited(Box::new(decision)))
    }
}

fn bad_body(rejection: JsonRejection) -> ApiError {
    ApiError::BadRequest(rejection.body_text())
}

#[derive(Debug, Serialize)]
struct CreatedReport {
    id: String,
    /// `None` when upload authorization is unavailable.
    upload_token: Option<String>,
}

async fn create_report(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Result<Json<NewReport>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let _timer = RequestTimer::new("create_report");
    let span = spans::request("create_report", &resolve_client_identity(&headers));
    handle_create(&state, &headers, body).instrument(span).await
}

async fn handle_create(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Json<NewReport>, JsonRejection>,
) -> Result<(StatusCode, HeaderMap, Json<CreatedReport>), ApiError> {
    let decision = admit(
        state,
        CREATE_NAMESPACE,
        headers,
        state.config.rate_limits.create_quota(),
    )?;

    let Json(new_report) = body.map_err(bad_body)?;
    if new_report.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title is required".to_string()));
    }

    let report = state.reports.create(new_report).await?;
    let upload_token = state.tokens.issue(&report.id);
    info!(
        report = %report.id,
        upload_token = upload_token.is_some(),
        "report created"
    );

    let body = CreatedReport {
        id: report.id,
        upload_token,
    };
    Ok((StatusCode::CREATED, decision.headers(), Json(body)))
}

#[derive(Debug, Deserialize)]
struct EvidenceRequest {
    #[serde(flatten)]
    evidence: Evidence,
    /// Alternative to the `x-upload-token` header.
    #[serde(default)]
    upload_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct AttachedEvidence {
    report_id: String,
    evidence_count: usize,
}

async fn attach_evidence(
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<EvidenceRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let _timer = RequestTimer::new("attach_evidence");
    let span = spans::report(
        "attach_evidence",
        &resolve_client_identity(&headers),
        &report_id,
    );
    handle_evidence(&state, report_id, &headers, body)
        .instrument(span)
        .await
}

async fn handle_evidence(
    state: &AppState,
    report_id: String,
    headers: &HeaderMap,
    body: Result<Json<EvidenceRequest>, JsonRejection>,
) -> Result<(StatusCode, HeaderMap, Json<AttachedEvidence>), ApiError> {
    let decision = admit(
        state,
        EVIDENCE_NAMESPACE,
        headers,
        state.config.rate_limits.evidence_quota(),
    )?;

    let header_token = headers
        .get(UPLOAD_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty());
    let body_token = body
        .as_ref()
        .ok()
        .and_then(|json| json.0.upload_token.as_deref());

    state.tokens.verify(&report_id, header_token.or(body_token))?;

    let Json(request) = body.map_err(bad_body)?;
    if request.evidence.url.trim().is_empty() {
        return Err(ApiError::BadRequest("url is required".to_string()));
    }

    let evidence_count = state
        .reports
        .attach_evidence(&report_id, request.evidence)
        .await?;
    info!(evidence_count, "evidence attached");

    let body = AttachedEvidence {
        report_id,
        evidence_count,
    };
    Ok((StatusCode::CREATED, decision.headers(), Json(body)))
}
