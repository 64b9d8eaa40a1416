//! Staged intake → analysis state machine shared by the prediction and
//! classification views.
//!
//! The controller owns its [`WorkflowState`] exclusively. Ingestion and
//! analysis run as futures parked in the controller and are driven by
//! [`WorkflowController::next_completion`]; their results are applied in the
//! order they finish, and any result whose request token is no longer current
//! is dropped without touching state.

use std::{future::Future, panic::AssertUnwindSafe, sync::Arc, time::Duration};

use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use serde::Serialize;
use shared::{
    domain::{AnalysisMode, CaseId, CaseRecord, ImageHandle},
    error::ErrorInfo,
    protocol::AnalysisResult,
};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::{
    analysis::AnalysisBackend,
    catalog::CaseCatalog,
    error::WorkflowError,
    ingest::{ImageIngestor, IngestSource},
};

pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(10);
const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Ingesting,
    Analyzing,
    Complete,
    Failed,
}

impl Phase {
    /// Position in the four-step progress indicator. `Failed` has none.
    pub fn progress_step(self) -> Option<u8> {
        match self {
            Self::Idle => Some(0),
            Self::Ingesting => Some(1),
            Self::Analyzing => Some(2),
            Self::Complete => Some(3),
            Self::Failed => None,
        }
    }

    pub fn is_busy(self) -> bool {
        matches!(self, Self::Ingesting | Self::Analyzing)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RequestToken(pub u64);

impl RequestToken {
    fn next(self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub phase: Phase,
    pub active_image: Option<ImageHandle>,
    pub result: Option<AnalysisResult>,
    pub error: Option<ErrorInfo>,
    pub request_token: RequestToken,
}

impl Default for WorkflowState {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            active_image: None,
            result: None,
            error: None,
            request_token: RequestToken(0),
        }
    }
}

/// Read-only projection handed to the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowView {
    pub mode: AnalysisMode,
    pub phase: Phase,
    pub progress_step: Option<u8>,
    pub busy: bool,
    pub display_uri: Option<String>,
    pub case: Option<CaseRecord>,
    pub result: Option<AnalysisResult>,
    pub error: Option<ErrorInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowEvent {
    PhaseChanged {
        token: RequestToken,
        from: Phase,
        to: Phase,
    },
    StaleCompletionDiscarded {
        token: RequestToken,
        current: RequestToken,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionOutcome {
    Applied(Phase),
    Discarded { token: RequestToken },
}

#[derive(Debug, Clone)]
pub struct WorkflowConfig {
    pub mode: AnalysisMode,
    pub analysis_timeout: Duration,
}

impl WorkflowConfig {
    pub fn new(mode: AnalysisMode) -> Self {
        Self {
            mode,
            analysis_timeout: DEFAULT_ANALYSIS_TIMEOUT,
        }
    }

    pub fn with_analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout = timeout;
        self
    }
}

enum Completion {
    Ingested {
        token: RequestToken,
        outcome: Result<ImageHandle, WorkflowError>,
    },
    Analyzed {
        token: RequestToken,
        outcome: Result<AnalysisResult, WorkflowError>,
    },
}

impl Completion {
    fn token(&self) -> RequestToken {
        match self {
            Self::Ingested { token, .. } | Self::Analyzed { token, .. } => *token,
        }
    }

    fn expected_phase(&self) -> Phase {
        match self {
            Self::Ingested { .. } => Phase::Ingesting,
            Self::Analyzed { .. } => Phase::Analyzing,
        }
    }
}

pub struct WorkflowController {
    config: WorkflowConfig,
    catalog: Arc<CaseCatalog>,
    ingestor: Arc<ImageIngestor>,
    backend: Arc<dyn AnalysisBackend>,
    state: WorkflowState,
    in_flight: FuturesUnordered<BoxFuture<'static, Completion>>,
    events: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowController {
    pub fn new(
        config: WorkflowConfig,
        catalog: Arc<CaseCatalog>,
        ingestor: Arc<ImageIngestor>,
        backend: Arc<dyn AnalysisBackend>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            config,
            catalog,
            ingestor,
            backend,
            state: WorkflowState::default(),
            in_flight: FuturesUnordered::new(),
            events,
        }
    }

    pub fn mode(&self) -> AnalysisMode {
        self.config.mode
    }

    pub fn catalog(&self) -> &CaseCatalog {
        &self.catalog
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn view(&self) -> WorkflowView {
        let case = self
            .state
            .active_image
            .as_ref()
            .and_then(ImageHandle::case_id)
            .and_then(|id| self.catalog.lookup(&id).ok().cloned());

        WorkflowView {
            mode: self.config.mode,
            phase: self.state.phase,
            progress_step: self.state.phase.progress_step(),
            busy: self.state.phase.is_busy(),
            display_uri: self
                .state
                .active_image
                .as_ref()
                .map(|image| image.display_uri.clone()),
            case,
            result: self.state.result.clone(),
            error: self.state.error.clone(),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.events.subscribe()
    }

    /// Number of ingestions/analyses still running, stale ones included.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Starts ingesting a catalog case. An unknown id fails with
    /// [`WorkflowError::NotFound`] and leaves the state untouched.
    pub fn select_case(&mut self, id: &CaseId) -> Result<RequestToken, WorkflowError> {
        let record = self.catalog.lookup(id)?.clone();
        debug!(case_id = %id, mode = %self.config.mode, "case selected");
        Ok(self.begin_ingestion(IngestSource::Case(record)))
    }

    /// Starts ingesting uploaded bytes. Validation problems surface as a
    /// `Failed` phase once the ingestion completes.
    pub fn upload_image(
        &mut self,
        bytes: Vec<u8>,
        declared_mime: impl Into<String>,
    ) -> RequestToken {
        let declared_mime = declared_mime.into();
        debug!(size = bytes.len(), mime = %declared_mime, mode = %self.config.mode, "image uploaded");
        self.begin_ingestion(IngestSource::Upload {
            bytes,
            declared_mime,
        })
    }

    pub fn reset(&mut self) {
        self.state.request_token = self.state.request_token.next();
        self.state.active_image = None;
        self.state.result = None;
        self.state.error = None;
        self.transition(Phase::Idle);
    }

    /// Waits for the next in-flight operation to finish and applies it.
    /// Returns `None` when nothing is in flight.
    pub async fn next_completion(&mut self) -> Option<CompletionOutcome> {
        let completion = self.in_flight.next().await?;
        Some(self.apply(completion))
    }

    /// Drives in-flight work until the current request leaves the busy
    /// phases. Stale completions that finish first are discarded on the way.
    ///
    /// Superseded operations still running when the current request settles
    /// stay in flight; later `next_completion` calls discard them. Check
    /// `in_flight` to drain them.
    pub async fn run_until_settled(&mut self) -> &WorkflowState {
        while self.state.phase.is_busy() {
            if self.next_completion().await.is_none() {
                break;
            }
        }
        &self.state
    }

    fn begin_ingestion(&mut self, source: IngestSource) -> RequestToken {
        let token = self.state.request_token.next();
        self.state.request_token = token;
        self.state.result = None;
        self.state.error = None;
        self.transition(Phase::Ingesting);

        let ingestor = Arc::clone(&self.ingestor);
        let ingestion = shielded(async move { ingestor.ingest(source).await });
        self.in_flight.push(
            ingestion
                .map(move |outcome| Completion::Ingested { token, outcome })
                .boxed(),
        );
        token
    }

    fn begin_analysis(&mut self, token: RequestToken, image: ImageHandle) {
        self.state.active_image = Some(image.clone());
        self.transition(Phase::Analyzing);

        let backend = Arc::clone(&self.backend);
        let mode = self.config.mode;
        let limit = self.config.analysis_timeout;
        let analysis = shielded(async move {
            match tokio::time::timeout(limit, backend.submit(&image, mode)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(WorkflowError::Timeout(limit)),
            }
        });
        self.in_flight.push(
            analysis
                .map(move |outcome| Completion::Analyzed { token, outcome })
                .boxed(),
        );
    }

    fn apply(&mut self, completion: Completion) -> CompletionOutcome {
        let token = completion.token();
        let current = self.state.request_token;
        if token != current || self.state.phase != completion.expected_phase() {
            debug!(
                token = token.0,
                current = current.0,
                phase = ?self.state.phase,
                "discarding stale completion"
            );
            let _ = self
                .events
                .send(WorkflowEvent::StaleCompletionDiscarded { token, current });
            return CompletionOutcome::Discarded { token };
        }

        match completion {
            Completion::Ingested {
                outcome: Ok(image), ..
            } => self.begin_analysis(token, image),
            Completion::Analyzed {
                outcome: Ok(result),
                ..
            } => match self.check_result(result) {
                Ok(result) => {
                    info!(token = token.0, mode = %self.config.mode, "analysis complete");
                    self.state.result = Some(result);
                    self.transition(Phase::Complete);
                }
                Err(err) => self.fail(err),
            },
            Completion::Ingested { outcome: Err(err), .. }
            | Completion::Analyzed { outcome: Err(err), .. } => self.fail(err),
        }
        CompletionOutcome::Applied(self.state.phase)
    }

    fn check_result(&self, result: AnalysisResult) -> Result<AnalysisResult, WorkflowError> {
        if result.mode() != self.config.mode {
            return Err(WorkflowError::unavailable(format!(
                "backend answered a {} request with a {} result",
                self.config.mode,
                result.mode()
            )));
        }
        result.validate().map_err(|e| {
            WorkflowError::unavailable(format!("backend returned an invalid result: {e}"))
        })?;
        Ok(result)
    }

    fn fail(&mut self, err: WorkflowError) {
        warn!(
            token = self.state.request_token.0,
            phase = ?self.state.phase,
            error = %err,
            "workflow request failed"
        );
        self.state.error = Some(ErrorInfo::from(&err));
        self.transition(Phase::Failed);
    }

    fn transition(&mut self, to: Phase) {
        let from = self.state.phase;
        let token = self.state.request_token;
        self.state.phase = to;
        debug!(token = token.0, ?from, ?to, mode = %self.config.mode, "phase transition");
        let _ = self
            .events
            .send(WorkflowEvent::PhaseChanged { token, from, to });
    }
}

/// Converts a panic inside an in-flight operation into a reported failure.
fn shielded<T, F>(future: F) -> impl Future<Output = Result<T, WorkflowError>> + Send + 'static
where
    F: Future<Output = Result<T, WorkflowError>> + Send + 'static,
    T: Send + 'static,
{
    AssertUnwindSafe(future).catch_unwind().map(|outcome| {
        outcome.unwrap_or_else(|_| {
            warn!("in-flight operation panicked");
            Err(WorkflowError::unexpected())
        })
    })
}

#[cfg(test)]
#[path = "tests/workflow_tests.rs"]
mod tests;
