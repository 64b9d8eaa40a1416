use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use client_core::{catalog::CaseCatalog, ingest::SampleImageResolver, mock::MockAnalysisBackend};
use shared::{
    domain::{CaseId, CaseRecord},
    error::ErrorInfo,
    protocol::{AnalysisResult, AnalyzeRequest},
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod api;
mod app_state;
mod config;

use api::{analyze, case_detail, list_cases, ApiContext, CaseDetail};
use app_state::AppState;
use config::load_settings;

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorInfo>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let settings = load_settings()?;
    let api = ApiContext {
        catalog: Arc::new(CaseCatalog::builtin()),
        images: Arc::new(
            SampleImageResolver::new(settings.sample_image_base_url.clone())
                .with_latency(Duration::ZERO),
        ),
        analysis: MockAnalysisBackend::new(settings.analysis_latency()),
    };
    let app = build_router(Arc::new(AppState { api }));

    let addr: SocketAddr = settings.bind_addr.parse()?;
    info!(%addr, latency_ms = settings.analysis_latency_ms, "imaging server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/cases", get(http_list_cases))
        .route("/cases/:case_id", get(http_case_detail))
        .route("/analyze", post(http_analyze))
        .with_state(state)
}

fn reject(info: ErrorInfo) -> (StatusCode, Json<ErrorInfo>) {
    let status =
        StatusCode::from_u16(info.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warn!(%status, code = ?info.code, message = %info.message, "request rejected");
    (status, Json(info))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_list_cases(State(state): State<Arc<AppState>>) -> Json<Vec<CaseRecord>> {
    Json(list_cases(&state.api))
}

async fn http_case_detail(
    State(state): State<Arc<AppState>>,
    Path(case_id): Path<String>,
) -> ApiResult<CaseDetail> {
    case_detail(&state.api, &CaseId::new(case_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_analyze(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AnalyzeRequest>,
) -> ApiResult<AnalysisResult> {
    analyze(&state.api, request).await.map(Json).map_err(reject)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
