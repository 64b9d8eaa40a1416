//! Resolves uploads and catalog cases into displayable image handles.

use std::{io::Cursor, sync::Arc, time::Duration};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, ImageReader};
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use shared::domain::{CaseRecord, ImageHandle, SourceKind};
use tracing::debug;
use url::Url;

use crate::{analysis::DEFAULT_HTTP_TIMEOUT, error::WorkflowError};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;
pub const DEFAULT_MAX_DIMENSION: u32 = 8192;
pub const DEFAULT_CASE_FETCH_LATENCY: Duration = Duration::from_millis(1000);
pub const DEFAULT_SAMPLE_IMAGE_BASE_URL: &str = "https://example.com/samples/";
const UPLOAD_TOKEN_HEX_LEN: usize = 16;

pub const ACCEPTED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/bmp",
];

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub max_upload_bytes: usize,
    pub max_dimension: u32,
    pub accepted_mime_types: Vec<String>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
            accepted_mime_types: ACCEPTED_MIME_TYPES.iter().map(|m| m.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum IngestSource {
    Upload {
        bytes: Vec<u8>,
        declared_mime: String,
    },
    Case(CaseRecord),
}

/// Finds the canonical sample image for a catalog case.
#[async_trait]
pub trait CaseImageResolver: Send + Sync {
    async fn resolve(&self, record: &CaseRecord) -> Result<String, WorkflowError>;
}

/// Serves `<base_url>/<case id>.jpg` after a simulated fetch delay.
pub struct SampleImageResolver {
    base_url: String,
    latency: Duration,
}

impl SampleImageResolver {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            latency: DEFAULT_CASE_FETCH_LATENCY,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn base(&self) -> Result<Url, WorkflowError> {
        let mut base = Url::parse(&self.base_url).map_err(|e| {
            WorkflowError::unavailable(format!("sample image base '{}': {e}", self.base_url))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        Ok(base)
    }
}

impl Default for SampleImageResolver {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_IMAGE_BASE_URL)
    }
}

#[async_trait]
impl CaseImageResolver for SampleImageResolver {
    async fn resolve(&self, record: &CaseRecord) -> Result<String, WorkflowError> {
        tokio::time::sleep(self.latency).await;

        let id = addressable_id(record)?;
        let uri = self
            .base()?
            .join(&format!("{id}.jpg"))
            .map_err(|e| WorkflowError::unavailable(format!("sample image url: {e}")))?;
        Ok(uri.into())
    }
}

/// Reads the `imageUri` an imaging server reports at `GET /cases/<id>`.
pub struct HttpCaseImageResolver {
    http: Client,
    base_url: Url,
    timeout: Duration,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CaseImage {
    image_uri: String,
}

impl HttpCaseImageResolver {
    pub fn new(base_url: &Url) -> Self {
        Self {
            http: Client::new(),
            base_url: base_url.clone(),
            timeout: DEFAULT_HTTP_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }
}

#[async_trait]
impl CaseImageResolver for HttpCaseImageResolver {
    async fn resolve(&self, record: &CaseRecord) -> Result<String, WorkflowError> {
        let id = addressable_id(record)?;
        let url = self
            .base_url
            .join(&format!("cases/{id}"))
            .map_err(|e| WorkflowError::unavailable(format!("invalid case image url: {e}")))?;

        let response = self
            .http
            .get(url.clone())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| WorkflowError::unavailable(format!("case image request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            return Err(WorkflowError::unavailable(format!(
                "case image lookup for {id} responded with {status}"
            )));
        }

        let image: CaseImage = response
            .json()
            .await
            .map_err(|e| WorkflowError::unavailable(format!("malformed case image payload: {e}")))?;
        debug!(%url, image_uri = %image.image_uri, "resolved case image remotely");
        Ok(image.image_uri)
    }
}

fn addressable_id(record: &CaseRecord) -> Result<&str, WorkflowError> {
    let id = record.id.as_str();
    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(WorkflowError::unavailable(format!(
            "no sample image can be addressed for case {id:?}"
        )));
    }
    Ok(id)
}

pub struct ImageIngestor {
    config: IngestConfig,
    resolver: Arc<dyn CaseImageResolver>,
}

impl ImageIngestor {
    pub fn new(config: IngestConfig, resolver: Arc<dyn CaseImageResolver>) -> Self {
        Self { config, resolver }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub async fn ingest(&self, source: IngestSource) -> Result<ImageHandle, WorkflowError> {
        match source {
            IngestSource::Upload {
                bytes,
                declared_mime,
            } => self.ingest_upload(&bytes, &declared_mime).await,
            IngestSource::Case(record) => self.ingest_case(&record).await,
        }
    }

    pub async fn ingest_upload(
        &self,
        bytes: &[u8],
        declared_mime: &str,
    ) -> Result<ImageHandle, WorkflowError> {
        let declared = normalize_mime(declared_mime);
        if !declared.starts_with("image/") {
            return Err(WorkflowError::validation(format!(
                "declared type '{declared}' is not an image"
            )));
        }
        if !self.config.accepted_mime_types.iter().any(|m| *m == declared) {
            return Err(WorkflowError::validation(format!(
                "image type '{declared}' is not supported"
            )));
        }
        if bytes.is_empty() {
            return Err(WorkflowError::validation("upload is empty"));
        }
        if bytes.len() > self.config.max_upload_bytes {
            return Err(WorkflowError::validation(format!(
                "upload of {} bytes exceeds the {} byte limit",
                bytes.len(),
                self.config.max_upload_bytes
            )));
        }

        let format = image::guess_format(bytes)
            .map_err(|_| WorkflowError::validation("upload content is not a recognised image"))?;
        if format.to_mime_type() != declared {
            return Err(WorkflowError::validation(format!(
                "upload declared as '{declared}' but contains {}",
                format.to_mime_type()
            )));
        }
        self.check_dimensions(bytes, format)?;

        let token = upload_token(bytes);
        debug!(%token, mime = %declared, size = bytes.len(), "ingested upload");
        Ok(ImageHandle {
            source_kind: SourceKind::Uploaded,
            origin_ref: token,
            display_uri: format!("data:{declared};base64,{}", STANDARD.encode(bytes)),
        })
    }

    pub async fn ingest_case(&self, record: &CaseRecord) -> Result<ImageHandle, WorkflowError> {
        let display_uri = self.resolver.resolve(record).await?;
        debug!(case_id = %record.id, %display_uri, "resolved case image");
        Ok(ImageHandle {
            source_kind: SourceKind::CaseSelected,
            origin_ref: record.id.as_str().to_string(),
            display_uri,
        })
    }

    fn check_dimensions(&self, bytes: &[u8], format: ImageFormat) -> Result<(), WorkflowError> {
        let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
            .into_dimensions()
            .map_err(|e| WorkflowError::validation(format!("unreadable image header: {e}")))?;
        let max = self.config.max_dimension;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(WorkflowError::validation(format!(
                "image of {width}x{height} pixels is outside the supported 1..={max} range"
            )));
        }
        Ok(())
    }
}

fn normalize_mime(declared: &str) -> String {
    let essence = declared
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match essence.as_str() {
        "image/jpg" | "image/pjpeg" => "image/jpeg".to_string(),
        _ => essence,
    }
}

fn upload_token(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("upload-{}", &hex[..UPLOAD_TOKEN_HEX_LEN])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::CaseCatalog, test_support::encoded_image};
    use shared::domain::CaseId;

    fn ingestor() -> ImageIngestor {
        ImageIngestor::new(
            IngestConfig::default(),
            Arc::new(SampleImageResolver::default().with_latency(Duration::ZERO)),
        )
    }

    #[tokio::test]
    async fn valid_png_upload_becomes_data_uri_handle() {
        let bytes = encoded_image(4, 4, ImageFormat::Png);
        let handle = ingestor()
            .ingest_upload(&bytes, "image/png")
            .await
            .expect("ingest");

        assert_eq!(handle.source_kind, SourceKind::Uploaded);
        assert!(handle.origin_ref.starts_with("upload-"));
        assert_eq!(handle.origin_ref.len(), "upload-".len() + UPLOAD_TOKEN_HEX_LEN);
        assert!(handle.display_uri.starts_with("data:image/png;base64,"));
    }

    #[tokio::test]
    async fn identical_bytes_share_an_upload_token() {
        let bytes = encoded_image(3, 3, ImageFormat::Jpeg);
        let first = ingestor().ingest_upload(&bytes, "image/jpeg").await.expect("first");
        let second = ingestor().ingest_upload(&bytes, "image/jpg").await.expect("second");
        assert_eq!(first.origin_ref, second.origin_ref);
    }

    #[tokio::test]
    async fn non_image_mime_type_is_rejected() {
        let bytes = encoded_image(4, 4, ImageFormat::Png);
        let err = ingestor()
            .ingest_upload(&bytes, "application/pdf")
            .await
            .expect_err("pdf must be rejected");
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[tokio::test]
    async fn unsupported_image_subtype_is_rejected() {
        let bytes = encoded_image(4, 4, ImageFormat::Png);
        let err = ingestor()
            .ingest_upload(&bytes, "image/svg+xml")
            .await
            .expect_err("svg must be rejected");
        assert!(err.to_string().contains("not supported"));
    }

    #[tokio::test]
    async fn content_must_match_declared_type() {
        let bytes = encoded_image(4, 4, ImageFormat::Png);
        let err = ingestor()
            .ingest_upload(&bytes, "image/jpeg")
            .await
            .expect_err("mismatch must be rejected");
        assert!(err.to_string().contains("contains image/png"));

        let err = ingestor()
            .ingest_upload(b"definitely not pixels", "image/png")
            .await
            .expect_err("garbage must be rejected");
        assert!(matches!(err, WorkflowError::Validation(_)));
    }

    #[tokio::test]
    async fn empty_and_oversized_uploads_are_rejected() {
        let err = ingestor()
            .ingest_upload(&[], "image/png")
            .await
            .expect_err("empty");
        assert_eq!(err, WorkflowError::validation("upload is empty"));

        let small_limit = ImageIngestor::new(
            IngestConfig {
                max_upload_bytes: 16,
                ..IngestConfig::default()
            },
            Arc::new(SampleImageResolver::default()),
        );
        let bytes = encoded_image(8, 8, ImageFormat::Png);
        let err = small_limit
            .ingest_upload(&bytes, "image/png")
            .await
            .expect_err("too large");
        assert!(err.to_string().contains("byte limit"));
    }

    #[tokio::test]
    async fn oversized_dimensions_are_rejected() {
        let narrow = ImageIngestor::new(
            IngestConfig {
                max_dimension: 8,
                ..IngestConfig::default()
            },
            Arc::new(SampleImageResolver::default()),
        );
        let bytes = encoded_image(16, 4, ImageFormat::Png);
        let err = narrow
            .ingest_upload(&bytes, "image/png")
            .await
            .expect_err("too wide");
        assert!(err.to_string().contains("16x4"));
    }

    #[tokio::test]
    async fn case_resolves_to_sample_image_under_base_url() {
        let catalog = CaseCatalog::builtin();
        let record = catalog.lookup(&CaseId::new("P001")).expect("P001");
        let handle = ingestor().ingest_case(record).await.expect("ingest");

        assert_eq!(handle.source_kind, SourceKind::CaseSelected);
        assert_eq!(handle.origin_ref, "P001");
        assert_eq!(handle.display_uri, "https://example.com/samples/P001.jpg");
    }

    #[tokio::test]
    async fn base_url_without_trailing_slash_keeps_its_last_segment() {
        let resolver =
            SampleImageResolver::new("https://images.local/cases").with_latency(Duration::ZERO);
        let record = CaseCatalog::builtin().list()[1].clone();
        let uri = resolver.resolve(&record).await.expect("resolve");
        assert_eq!(uri, "https://images.local/cases/P002.jpg");
    }

    #[tokio::test(start_paused = true)]
    async fn case_resolution_waits_for_configured_latency() {
        let resolver = SampleImageResolver::default().with_latency(Duration::from_secs(3));
        let record = CaseCatalog::builtin().list()[0].clone();
        let started = tokio::time::Instant::now();
        resolver.resolve(&record).await.expect("resolve");
        assert!(started.elapsed() >= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn malformed_base_url_fails_resolution() {
        let resolver = SampleImageResolver::new("not a url").with_latency(Duration::ZERO);
        let record = CaseCatalog::builtin().list()[0].clone();
        let err = resolver.resolve(&record).await.expect_err("bad base");
        assert!(matches!(err, WorkflowError::ServiceUnavailable(_)));
    }

    async fn serve(app: axum::Router) -> Url {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("serve");
        });
        Url::parse(&format!("http://{addr}/")).expect("url")
    }

    #[tokio::test]
    async fn remote_resolver_uses_reported_image_uri() {
        use axum::{extract::Path, routing::get, Json};

        let app = axum::Router::new().route(
            "/cases/:case_id",
            get(|Path(case_id): Path<String>| async move {
                Json(serde_json::json!({
                    "id": case_id,
                    "imageUri": format!("https://images.local/{case_id}.png"),
                }))
            }),
        );
        let resolver = HttpCaseImageResolver::new(&serve(app).await);
        let record = CaseCatalog::builtin().list()[1].clone();

        let ingested = ImageIngestor::new(IngestConfig::default(), Arc::new(resolver))
            .ingest_case(&record)
            .await
            .expect("ingest");
        assert_eq!(ingested.origin_ref, "P002");
        assert_eq!(ingested.display_uri, "https://images.local/P002.png");
    }

    #[tokio::test]
    async fn remote_resolver_reports_missing_case_as_unavailable() {
        use axum::{http::StatusCode, routing::get};

        let app = axum::Router::new()
            .route("/cases/:case_id", get(|| async { StatusCode::NOT_FOUND }));
        let resolver = HttpCaseImageResolver::new(&serve(app).await);
        let record = CaseCatalog::builtin().list()[0].clone();

        let err = resolver.resolve(&record).await.expect_err("404");
        assert!(matches!(err, WorkflowError::ServiceUnavailable(_)));
        assert!(err.to_string().contains("404"));
    }

    #[tokio::test]
    async fn unaddressable_case_id_is_service_unavailable() {
        let mut record = CaseCatalog::builtin().list()[0].clone();
        record.id = CaseId::new("../etc/passwd");
        let err = ingestor()
            .ingest_case(&record)
            .await
            .expect_err("must not resolve");
        assert!(matches!(err, WorkflowError::ServiceUnavailable(_)));
    }
}
