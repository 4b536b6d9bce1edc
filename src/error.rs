//! Error types for the slidecast service.
//!
//! Two types cover the two ways a request can fail:
//!
//! * [`SlidecastError`] — the request cannot be completed. Every handler
//!   returns `Result<_, SlidecastError>` and the server maps each variant to
//!   an HTTP status with [`SlidecastError::status_code`].
//!
//! * [`ToolError`] — an external binary (soffice, ffmpeg, the HTML renderer)
//!   exited unsuccessfully or could not be started. It keeps the command line
//!   and both output streams so the caller sees the tool's own message.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// HTTP status codes used by the error mapping. Kept as plain `u16` so the
/// library error type does not depend on a particular `http` crate version.
pub mod status {
    pub const BAD_REQUEST: u16 = 400;
    pub const REQUEST_TIMEOUT: u16 = 408;
    pub const UNPROCESSABLE_ENTITY: u16 = 422;
    pub const INTERNAL_SERVER_ERROR: u16 = 500;
    pub const BAD_GATEWAY: u16 = 502;
    pub const GATEWAY_TIMEOUT: u16 = 504;
}

/// All errors a request can end with.
#[derive(Debug, Error)]
pub enum SlidecastError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The request body parsed but a field is unusable.
    #[error("{0}")]
    InvalidInput(String),

    /// The request body was rejected before reaching the handler.
    #[error("{message}")]
    InvalidRequest { status: u16, message: String },

    /// The downloaded bytes are not a PowerPoint Open XML package.
    #[error("Only .pptx files are supported")]
    NotAPresentation { detail: String },

    // ── Download errors ───────────────────────────────────────────────────
    /// The upstream server answered with a non-success status.
    #[error("Unable to download file: HTTP {status} from '{url}'")]
    DownloadRejected { url: String, status: u16 },

    /// The upstream server could not be reached or the body was cut off.
    #[error("Unable to download file from '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// Connect or read timeout while downloading.
    #[error("Download timed out for '{url}'")]
    DownloadTimeout { url: String },

    // ── Cloud storage errors ──────────────────────────────────────────────
    /// No usable credentials, or the token endpoint refused them.
    #[error("Graph authentication failed: {0}")]
    GraphAuth(String),

    /// A Graph API call returned a non-success status.
    #[error("Graph request failed with HTTP {status}: {message}")]
    GraphRequest { status: u16, message: String },

    /// The Graph API could not be reached.
    #[error("Graph transport error: {0}")]
    GraphTransport(String),

    /// `/combine` could not fetch the presentation from the drive.
    #[error("Unable to download PPTX: {0}")]
    PptxDownloadFailed(String),

    /// `/combine` produced a video but the drive refused it.
    #[error("Unable to upload video: {0}")]
    UploadFailed(String),

    // ── Rendering errors ──────────────────────────────────────────────────
    /// An external binary failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Slide rasterisation failed.
    #[error("Slide rendering failed: {0}")]
    RenderFailed(String),

    /// The HTML renderer failed or produced something that is not a PDF.
    #[error("PDF generation failed")]
    PdfGenerationFailed { detail: String },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Temporary file bookkeeping failed.
    #[error("Failed to write '{path}': {source}")]
    TempFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Server errors ─────────────────────────────────────────────────────
    /// The request ran past the worker timeout and was abandoned.
    #[error("Request timed out")]
    RequestTimeout,

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SlidecastError {
    /// HTTP status the server answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::NotAPresentation { .. } => status::UNPROCESSABLE_ENTITY,
            Self::InvalidRequest { status, .. } => *status,
            Self::DownloadRejected { .. } | Self::PptxDownloadFailed(_) => status::BAD_REQUEST,
            Self::DownloadFailed { .. } | Self::UploadFailed(_) => status::BAD_GATEWAY,
            Self::DownloadTimeout { .. } => status::GATEWAY_TIMEOUT,
            Self::RequestTimeout => status::REQUEST_TIMEOUT,
            Self::GraphAuth(_)
            | Self::GraphRequest { .. }
            | Self::GraphTransport(_)
            | Self::Tool(_)
            | Self::RenderFailed(_)
            | Self::PdfGenerationFailed { .. }
            | Self::TempFile { .. }
            | Self::InvalidConfig(_)
            | Self::Internal(_) => status::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message placed in the `detail` field of the error body.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

/// An external command that did not succeed.
#[derive(Debug, Clone, Error)]
pub struct ToolError {
    /// Program that was invoked.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// Exit code, `None` when the process never started or was killed by a signal.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: Vec<u8>,
    /// Captured standard error, or the spawn error when the process never started.
    pub stderr: Vec<u8>,
}

impl ToolError {
    /// Standard error as lossy UTF-8, trimmed.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// Full command line, for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "'{}' exited with status {}", self.program, code)?,
            None => write!(f, "'{}' did not run to completion", self.program)?,
        }
        let stderr = self.stderr_text();
        if !stderr.is_empty() {
            write!(f, ": {}", stderr)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_a_presentation_has_fixed_detail() {
        let e = SlidecastError::NotAPresentation {
            detail: "invalid Zip archive".into(),
        };
        assert_eq!(e.detail(), "Only .pptx files are supported");
        assert_eq!(e.status_code(), 422);
    }

    #[test]
    fn pptx_download_failure_is_client_error() {
        let e = SlidecastError::PptxDownloadFailed("missing".into());
        assert_eq!(e.detail(), "Unable to download PPTX: missing");
        assert_eq!(e.status_code(), 400);
    }

    #[test]
    fn download_errors_map_to_distinct_statuses() {
        let rejected = SlidecastError::DownloadRejected {
            url: "https://example.com/a".into(),
            status: 404,
        };
        let failed = SlidecastError::DownloadFailed {
            url: "https://example.com/a".into(),
            reason: "connection refused".into(),
        };
        let timeout = SlidecastError::DownloadTimeout {
            url: "https://example.com/a".into(),
        };
        assert_eq!(rejected.status_code(), 400);
        assert_eq!(failed.status_code(), 502);
        assert_eq!(timeout.status_code(), 504);
        assert!(rejected.detail().contains("HTTP 404"));
    }

    #[test]
    fn tool_error_surfaces_stderr() {
        let tool = ToolError {
            program: "ffmpeg".into(),
            args: vec!["-i".into(), "in.png".into()],
            code: Some(1),
            stdout: Vec::new(),
            stderr: b"in.png: No such file or directory\n".to_vec(),
        };
        assert_eq!(tool.command_line(), "ffmpeg -i in.png");
        let e = SlidecastError::from(tool);
        assert_eq!(e.status_code(), 500);
        assert!(e.detail().contains("No such file or directory"), "got: {}", e.detail());
        assert!(e.detail().contains("status 1"));
    }

    #[test]
    fn request_timeout_is_408() {
        assert_eq!(SlidecastError::RequestTimeout.status_code(), 408);
        assert_eq!(SlidecastError::RequestTimeout.detail(), "Request timed out");
    }

    #[test]
    fn pdf_failure_hides_tool_output() {
        let e = SlidecastError::PdfGenerationFailed {
            detail: "weasyprint: boom".into(),
        };
        assert_eq!(e.detail(), "PDF generation failed");
    }
}
