//! HTML → PDF conversion through an external renderer.
//!
//! The renderer is invoked as `<binary> - -`: HTML on stdin, PDF on stdout.
//! weasyprint and wkhtmltopdf both accept that form.

use crate::error::SlidecastError;
use crate::pipeline::process::run_cmd;
use std::path::Path;
use tracing::{error, info};

const PDF_MAGIC: &[u8] = b"%PDF";

/// Render `html` to PDF bytes.
pub async fn html_to_pdf(binary: &Path, html: &[u8]) -> Result<Vec<u8>, SlidecastError> {
    let args = vec!["-".to_string(), "-".to_string()];

    let output = run_cmd(binary, &args, Some(html)).await.map_err(|e| {
        error!("PDF generation failed: {}", e);
        SlidecastError::PdfGenerationFailed {
            detail: e.to_string(),
        }
    })?;

    if !output.stdout.starts_with(PDF_MAGIC) {
        error!(
            "{} produced {} bytes without a PDF header",
            binary.display(),
            output.stdout.len()
        );
        return Err(SlidecastError::PdfGenerationFailed {
            detail: "renderer output is not a PDF".into(),
        });
    }

    info!("Rendered {} bytes of HTML into {} byte PDF", html.len(), output.stdout.len());
    Ok(output.stdout)
}
