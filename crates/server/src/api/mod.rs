use std::sync::Arc;

use client_core::{catalog::CaseCatalog, ingest::CaseImageResolver, mock::MockAnalysisBackend};
use serde::Serialize;
use shared::{
    domain::{CaseId, CaseRecord},
    error::ErrorInfo,
    protocol::{AnalysisResult, AnalyzeRequest},
};
use tracing::debug;

#[derive(Clone)]
pub struct ApiContext {
    pub catalog: Arc<CaseCatalog>,
    pub images: Arc<dyn CaseImageResolver>,
    pub analysis: MockAnalysisBackend,
}

/// A catalog record together with the URI of its sample image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CaseDetail {
    #[serde(flatten)]
    pub record: CaseRecord,
    pub image_uri: String,
}

pub fn list_cases(ctx: &ApiContext) -> Vec<CaseRecord> {
    ctx.catalog.list().to_vec()
}

pub async fn case_detail(ctx: &ApiContext, case_id: &CaseId) -> Result<CaseDetail, ErrorInfo> {
    let record = ctx.catalog.lookup(case_id)?.clone();
    let image_uri = ctx.images.resolve(&record).await?;
    Ok(CaseDetail { record, image_uri })
}

pub async fn analyze(ctx: &ApiContext, request: AnalyzeRequest) -> Result<AnalysisResult, ErrorInfo> {
    debug!(image_ref = %request.image_ref, mode = %request.mode, "analysis requested");
    ctx.analysis
        .analyze_reference(&request.image_ref, request.mode)
        .await
        .map_err(ErrorInfo::from)
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
