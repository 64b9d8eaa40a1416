use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    AnalysisBackend, CaseCatalog, CaseImageResolver, HttpAnalysisBackend, HttpCaseImageResolver,
    ImageIngestor, IngestConfig, MockAnalysisBackend, Phase, SampleImageResolver, WorkflowConfig,
    WorkflowController, WorkflowEvent,
};
use shared::domain::{AnalysisMode, CaseId};
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser, Debug)]
#[command(about = "Run a case or an uploaded image through the imaging analysis workflow")]
struct Args {
    #[arg(long, value_enum, default_value_t = Mode::Prediction)]
    mode: Mode,
    /// Imaging server to use for the catalog and analysis. Without it the
    /// built-in catalog and the in-process mock are used.
    #[arg(long)]
    server_url: Option<Url>,
    #[arg(long, default_value_t = 10_000)]
    analysis_timeout_ms: u64,
    /// Delay of the in-process mock analysis.
    #[arg(long, default_value_t = 2_000)]
    latency_ms: u64,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the case catalog.
    Cases,
    /// Analyze a catalog case.
    Select { case_id: String },
    /// Analyze an image file.
    Upload {
        path: PathBuf,
        /// Declared content type; guessed from the file extension when omitted.
        #[arg(long)]
        mime: Option<String>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Mode {
    Prediction,
    Classification,
}

impl From<Mode> for AnalysisMode {
    fn from(value: Mode) -> Self {
        match value {
            Mode::Prediction => AnalysisMode::Prediction,
            Mode::Classification => AnalysisMode::Classification,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let catalog = Arc::new(load_catalog(args.server_url.as_ref()).await?);
    let mut controller = build_controller(&args, Arc::clone(&catalog))?;
    let mut events = controller.subscribe();

    match args.command {
        Command::Cases => {
            println!("{}", serde_json::to_string_pretty(catalog.list())?);
            return Ok(());
        }
        Command::Select { case_id } => {
            controller.select_case(&CaseId::new(case_id))?;
        }
        Command::Upload { path, mime } => {
            let bytes = tokio::fs::read(&path)
                .await
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            let mime = mime.unwrap_or_else(|| declared_mime(&path));
            info!(path = %path.display(), %mime, size = bytes.len(), "uploading image");
            controller.upload_image(bytes, mime);
        }
    }

    report(&mut events);
    while controller.state().phase.is_busy() {
        if controller.next_completion().await.is_none() {
            break;
        }
        report(&mut events);
    }

    let view = controller.view();
    println!("{}", serde_json::to_string_pretty(&view)?);
    if view.phase == Phase::Failed {
        let message = view
            .error
            .map(|error| error.message)
            .unwrap_or_else(|| "unknown failure".into());
        bail!("analysis failed: {message}");
    }
    Ok(())
}

async fn load_catalog(server_url: Option<&Url>) -> Result<CaseCatalog> {
    match server_url {
        Some(url) => CaseCatalog::fetch(&reqwest::Client::new(), url)
            .await
            .with_context(|| format!("failed to load the case catalog from {url}")),
        None => Ok(CaseCatalog::builtin()),
    }
}

fn build_controller(args: &Args, catalog: Arc<CaseCatalog>) -> Result<WorkflowController> {
    let timeout = Duration::from_millis(args.analysis_timeout_ms);
    let (backend, images): (Arc<dyn AnalysisBackend>, Arc<dyn CaseImageResolver>) =
        match &args.server_url {
            Some(url) => (
                Arc::new(HttpAnalysisBackend::new(url)?.with_timeout(timeout)),
                Arc::new(HttpCaseImageResolver::new(url)),
            ),
            None => (
                Arc::new(MockAnalysisBackend::new(Duration::from_millis(args.latency_ms))),
                Arc::new(SampleImageResolver::default()),
            ),
        };
    let ingestor = ImageIngestor::new(IngestConfig::default(), images);
    let config = WorkflowConfig::new(args.mode.into()).with_analysis_timeout(timeout);
    Ok(WorkflowController::new(
        config,
        catalog,
        Arc::new(ingestor),
        backend,
    ))
}

fn declared_mime(path: &std::path::Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

fn report(events: &mut broadcast::Receiver<WorkflowEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            WorkflowEvent::PhaseChanged { token, from, to } => {
                let step = to
                    .progress_step()
                    .map(|step| format!("{step}/3"))
                    .unwrap_or_else(|| "-".into());
                eprintln!("[request {}] {from:?} -> {to:?} ({step})", token.0);
            }
            WorkflowEvent::StaleCompletionDiscarded { token, current } => {
                eprintln!("[request {}] discarded, superseded by {}", token.0, current.0);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn mime_is_guessed_from_extension() {
        assert_eq!(declared_mime(Path::new("scan.PNG")), "image/png");
        assert_eq!(declared_mime(Path::new("scan.jpg")), "image/jpeg");
        assert_eq!(declared_mime(Path::new("report")), "application/octet-stream");
    }

    #[test]
    fn select_defaults_to_prediction_against_the_mock() {
        let args = Args::try_parse_from(["workbench", "select", "P001"]).expect("args");
        assert_eq!(args.mode, Mode::Prediction);
        assert!(args.server_url.is_none());
        assert_eq!(args.analysis_timeout_ms, 10_000);
        assert!(matches!(args.command, Command::Select { ref case_id } if case_id == "P001"));
    }

    #[test]
    fn upload_accepts_mode_and_explicit_mime() {
        let args = Args::try_parse_from([
            "workbench",
            "--mode",
            "classification",
            "--server-url",
            "http://127.0.0.1:8080/",
            "upload",
            "scan.bin",
            "--mime",
            "image/png",
        ])
        .expect("args");
        assert_eq!(AnalysisMode::from(args.mode), AnalysisMode::Classification);
        assert_eq!(
            args.server_url.as_ref().map(Url::as_str),
            Some("http://127.0.0.1:8080/")
        );
        assert!(matches!(
            args.command,
            Command::Upload { ref mime, .. } if mime.as_deref() == Some("image/png")
        ));
    }

    #[test]
    fn unknown_mode_is_rejected() {
        assert!(Args::try_parse_from(["workbench", "--mode", "staging", "cases"]).is_err());
    }
}
