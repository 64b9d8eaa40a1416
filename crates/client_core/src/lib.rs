//! Client-side core of the imaging dashboard: case lookup, image intake and
//! the staged analysis workflow behind the prediction and classification
//! views.

pub mod analysis;
pub mod catalog;
pub mod error;
pub mod ingest;
pub mod mock;
pub mod workflow;

#[cfg(test)]
mod test_support;

pub use analysis::{AnalysisBackend, HttpAnalysisBackend, MissingAnalysisBackend};
pub use catalog::CaseCatalog;
pub use error::WorkflowError;
pub use ingest::{
    CaseImageResolver, HttpCaseImageResolver, ImageIngestor, IngestConfig, IngestSource,
    SampleImageResolver,
};
pub use mock::MockAnalysisBackend;
pub use workflow::{
    CompletionOutcome, Phase, RequestToken, WorkflowConfig, WorkflowController, WorkflowEvent,
    WorkflowState, WorkflowView,
};
