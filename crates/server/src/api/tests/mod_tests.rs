use super::*;
use client_core::{ingest::SampleImageResolver, mock::synthesize};
use shared::{domain::AnalysisMode, error::ErrorCode};
use std::time::Duration;

fn context() -> ApiContext {
    ApiContext {
        catalog: Arc::new(CaseCatalog::builtin()),
        images: Arc::new(SampleImageResolver::default().with_latency(Duration::ZERO)),
        analysis: MockAnalysisBackend::new(Duration::ZERO),
    }
}

#[test]
fn lists_catalog_in_order() {
    let ids: Vec<String> = list_cases(&context())
        .into_iter()
        .map(|record| record.id.0)
        .collect();
    assert_eq!(ids, vec!["P001", "P002", "P003"]);
}

#[tokio::test]
async fn case_detail_includes_sample_image() {
    let detail = case_detail(&context(), &CaseId::new("P003"))
        .await
        .expect("detail");
    assert_eq!(detail.record.patient_name, "Wang Wu");
    assert_eq!(detail.image_uri, "https://example.com/samples/P003.jpg");
}

#[tokio::test]
async fn unknown_case_is_not_found() {
    let err = case_detail(&context(), &CaseId::new("P404"))
        .await
        .expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
    assert!(err.message.contains("P404"));
}

#[tokio::test]
async fn analyze_matches_the_in_process_mock() {
    let result = analyze(
        &context(),
        AnalyzeRequest {
            image_ref: "P001".into(),
            mode: AnalysisMode::Classification,
        },
    )
    .await
    .expect("analyze");
    assert_eq!(result, synthesize("P001", AnalysisMode::Classification));
}

#[tokio::test]
async fn blank_image_ref_is_a_validation_error() {
    let err = analyze(
        &context(),
        AnalyzeRequest {
            image_ref: " ".into(),
            mode: AnalysisMode::Prediction,
        },
    )
    .await
    .expect_err("blank");
    assert_eq!(err.code, ErrorCode::Validation);
}
