//! HTTP surface: routes, shared state and the error → response mapping.
//!
//! # Routes
//!
//! - `POST /extract` - titles and speaker notes of a PPTX behind a URL
//! - `POST /combine` - narrated slideshow video of a drive-hosted PPTX
//! - `POST /html-to-pdf` - raw HTML body in, `application/pdf` out
//! - `POST /html-to-pdf/async` - same, rendered on a detached task
//! - `GET /health` - liveness probe
//!
//! Every non-2xx response carries `{"detail": "..."}`.

use crate::combine;
use crate::config::ServiceConfig;
use crate::error::SlidecastError;
use crate::graph::GraphClient;
use crate::pipeline::input::Downloader;
use crate::pipeline::{pdf, pptx};
use crate::schema::{
    CombineRequest, CombineResponse, ErrorResponse, ExtractRequest, ExtractResponse, HealthResponse,
};
use axum::body::Bytes;
use axum::extract::rejection::{BytesRejection, JsonRejection};
use axum::extract::{DefaultBodyLimit, State};
use axum::http::{header, StatusCode};
use axum::middleware;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

/// Largest request body accepted (HTML documents can embed images).
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Bytes of a bare error body carried over into `detail`.
const MAX_BARE_ERROR_BODY: usize = 4096;

/// State shared by every request.
#[derive(Debug)]
pub struct AppState {
    pub config: ServiceConfig,
    pub downloader: Arc<Downloader>,
    pub graph: GraphClient,
}

impl AppState {
    /// Build the HTTP clients and the download limiter for `config`.
    pub fn new(config: ServiceConfig) -> Result<Self, SlidecastError> {
        let downloader = Arc::new(Downloader::new(&config)?);
        let graph = GraphClient::new(&config, Arc::clone(&downloader))?;
        Ok(Self {
            config,
            downloader,
            graph,
        })
    }
}

/// Build the application router.
pub fn app(state: Arc<AppState>) -> Router {
    let timeout = state.config.request_timeout();

    Router::new()
        .route("/extract", post(extract))
        .route("/combine", post(combine_handler))
        .route("/html-to-pdf", post(html_to_pdf))
        .route("/html-to-pdf/async", post(html_to_pdf_async))
        .route("/health", get(health))
        .fallback(not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(timeout))
        .layer(middleware::map_response(detail_body))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

impl IntoResponse for SlidecastError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            error!("{} → {}", self, status);
        } else {
            warn!("{} → {}", self, status);
        }

        let body = ErrorResponse {
            detail: self.detail(),
        };
        (status, Json(body)).into_response()
    }
}

/// Unwrap a JSON body, turning axum's rejection into our error shape.
fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, SlidecastError> {
    payload.map(|Json(v)| v).map_err(|rejection| SlidecastError::InvalidRequest {
        status: rejection.status().as_u16(),
        message: rejection.body_text(),
    })
}

/// Unwrap a raw body, turning axum's rejection (e.g. the size limit) into our
/// error shape.
fn raw_body(payload: Result<Bytes, BytesRejection>) -> Result<Bytes, SlidecastError> {
    payload.map_err(|rejection| SlidecastError::InvalidRequest {
        status: rejection.status().as_u16(),
        message: rejection.body_text(),
    })
}

/// Give error responses produced outside our handlers (timeout, method not
/// allowed) the `{"detail": ...}` body. JSON error bodies pass untouched.
async fn detail_body(response: Response) -> Response {
    let status = response.status();
    if !status.is_client_error() && !status.is_server_error() {
        return response;
    }
    let is_json = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"));
    if is_json {
        return response;
    }

    if status == StatusCode::REQUEST_TIMEOUT {
        return SlidecastError::RequestTimeout.into_response();
    }

    let body = axum::body::to_bytes(response.into_body(), MAX_BARE_ERROR_BODY)
        .await
        .unwrap_or_default();
    let text = String::from_utf8_lossy(&body).trim().to_string();
    let message = if text.is_empty() {
        status.canonical_reason().unwrap_or("Request failed").to_string()
    } else {
        text
    };
    SlidecastError::InvalidRequest {
        status: status.as_u16(),
        message,
    }
    .into_response()
}

async fn not_found() -> SlidecastError {
    SlidecastError::InvalidRequest {
        status: StatusCode::NOT_FOUND.as_u16(),
        message: "Not Found".into(),
    }
}

async fn extract(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ExtractRequest>, JsonRejection>,
) -> Result<Json<ExtractResponse>, SlidecastError> {
    let request = json_body(payload)?;
    info!("Extracting notes from '{}'", request.file_name);

    let downloaded = state.downloader.fetch(&request.file_url).await?;
    pptx::looks_like_pptx(downloaded.content_type.as_deref(), &downloaded.bytes)?;

    let bytes = downloaded.bytes;
    let (bytes, parsed) = tokio::task::spawn_blocking(move || {
        let parsed = pptx::parse_presentation(&bytes);
        (bytes, parsed)
    })
    .await
    .map_err(|e| SlidecastError::Internal(format!("Parse task panicked: {}", e)))?;
    let presentation = parsed?;

    let file_content = request
        .include_file_content
        .then(|| STANDARD.encode(&bytes));

    info!(
        "Extracted {} slides from '{}'",
        presentation.slide_count(),
        request.file_name
    );

    Ok(Json(ExtractResponse {
        filename: request.file_name,
        file_content,
        slide_count: presentation.slide_count(),
        slides: presentation.slides,
    }))
}

async fn combine_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<CombineRequest>, JsonRejection>,
) -> Result<Json<CombineResponse>, SlidecastError> {
    let request = json_body(payload)?;
    let response = combine::combine(&state.config, &state.graph, &request).await?;
    Ok(Json(response))
}

async fn html_to_pdf(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, SlidecastError> {
    let body = raw_body(body)?;
    check_html(&body)?;
    let pdf = pdf::html_to_pdf(&state.config.tools.html_to_pdf, &body).await?;
    Ok(pdf_response(pdf))
}

/// Renders on a detached task: a client that disconnects does not abort the
/// conversion.
async fn html_to_pdf_async(
    State(state): State<Arc<AppState>>,
    body: Result<Bytes, BytesRejection>,
) -> Result<Response, SlidecastError> {
    let body = raw_body(body)?;
    check_html(&body)?;
    let binary = state.config.tools.html_to_pdf.clone();

    let task = tokio::spawn(async move { pdf::html_to_pdf(&binary, &body).await });
    let pdf = task
        .await
        .map_err(|e| SlidecastError::Internal(format!("PDF task failed: {}", e)))??;
    Ok(pdf_response(pdf))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

fn check_html(body: &[u8]) -> Result<(), SlidecastError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(SlidecastError::InvalidInput("HTML body must not be empty".into()));
    }
    Ok(())
}

fn pdf_response(pdf: Vec<u8>) -> Response {
    ([(header::CONTENT_TYPE, "application/pdf")], pdf).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_html_is_rejected() {
        assert!(check_html(b"").is_err());
        assert!(check_html(b"  \n\t").is_err());
        assert!(check_html(b"<p/>").is_ok());
    }

    #[test]
    fn error_response_uses_mapped_status() {
        let response = SlidecastError::PptxDownloadFailed("missing".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = SlidecastError::PdfGenerationFailed {
            detail: "boom".into(),
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    async fn detail_of(response: Response) -> (StatusCode, String) {
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let v: serde_json::Value = serde_json::from_slice(&body).unwrap();
        (status, v["detail"].as_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn bare_timeout_gets_detail_body() {
        let (status, detail) = detail_of(detail_body(StatusCode::REQUEST_TIMEOUT.into_response()).await).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(detail, "Request timed out");
    }

    #[tokio::test]
    async fn plain_text_error_is_wrapped() {
        let bare = (StatusCode::PAYLOAD_TOO_LARGE, "length limit exceeded").into_response();
        let (status, detail) = detail_of(detail_body(bare).await).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(detail, "length limit exceeded");

        let empty = StatusCode::METHOD_NOT_ALLOWED.into_response();
        let (status, detail) = detail_of(detail_body(empty).await).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(detail, "Method Not Allowed");
    }

    #[tokio::test]
    async fn success_and_json_errors_pass_through() {
        let ok = detail_body(Json(HealthResponse { status: "ok".into() }).into_response()).await;
        assert_eq!(ok.status(), StatusCode::OK);

        let (status, detail) =
            detail_of(detail_body(SlidecastError::PptxDownloadFailed("missing".into()).into_response()).await)
                .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(detail, "Unable to download PPTX: missing");
    }
}
