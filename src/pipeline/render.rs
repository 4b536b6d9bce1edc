//! Slide rendering: PPTX → PDF via LibreOffice, PDF → PNG stills via pdfium.
//!
//! LibreOffice is run headless with a per-request user profile inside the
//! request's temp directory. soffice refuses to start a second instance that
//! shares a profile, so concurrent `/combine` requests would otherwise fail.
//!
//! pdfium is not async-safe; rasterisation runs inside `spawn_blocking`.

use crate::config::ToolPaths;
use crate::error::SlidecastError;
use crate::pipeline::process::run_cmd;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Convert a presentation to PDF with headless LibreOffice.
///
/// Returns the path of the PDF written into `out_dir`.
pub async fn pptx_to_pdf(
    tools: &ToolPaths,
    pptx_path: &Path,
    out_dir: &Path,
) -> Result<PathBuf, SlidecastError> {
    let profile_dir = out_dir.join("lo-profile");
    let args = vec![
        format!("-env:UserInstallation=file://{}", profile_dir.display()),
        "--headless".to_string(),
        "--norestore".to_string(),
        "--convert-to".to_string(),
        "pdf".to_string(),
        "--outdir".to_string(),
        out_dir.display().to_string(),
        pptx_path.display().to_string(),
    ];

    run_cmd(&tools.soffice, &args, None).await?;

    let stem = pptx_path
        .file_stem()
        .ok_or_else(|| SlidecastError::Internal(format!("no file stem in {}", pptx_path.display())))?;
    let pdf_path = out_dir.join(format!("{}.pdf", stem.to_string_lossy()));

    if !tokio::fs::try_exists(&pdf_path).await.unwrap_or(false) {
        return Err(SlidecastError::RenderFailed(format!(
            "soffice reported success but {} was not written",
            pdf_path.display()
        )));
    }

    info!("Converted {} to PDF", pptx_path.display());
    Ok(pdf_path)
}

/// Rasterise every page of `pdf_path` to `slide-NNN.png` in `out_dir`.
///
/// Returns the image paths in page order.
pub async fn rasterise_pdf(
    pdf_path: &Path,
    out_dir: &Path,
    width_px: u32,
    pdfium_lib_dir: Option<&Path>,
) -> Result<Vec<PathBuf>, SlidecastError> {
    let pdf = pdf_path.to_path_buf();
    let out = out_dir.to_path_buf();
    let lib_dir = pdfium_lib_dir.map(Path::to_path_buf);

    tokio::task::spawn_blocking(move || rasterise_blocking(&pdf, &out, width_px, lib_dir.as_deref()))
        .await
        .map_err(|e| SlidecastError::Internal(format!("Render task panicked: {}", e)))?
}

/// Bind pdfium from an explicit directory, or from the system library path.
fn bind_pdfium(lib_dir: Option<&Path>) -> Result<Pdfium, SlidecastError> {
    let bindings = match lib_dir {
        Some(dir) => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(dir)),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| SlidecastError::RenderFailed(format!("failed to load pdfium: {:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn rasterise_blocking(
    pdf_path: &Path,
    out_dir: &Path,
    width_px: u32,
    lib_dir: Option<&Path>,
) -> Result<Vec<PathBuf>, SlidecastError> {
    let pdfium = bind_pdfium(lib_dir)?;

    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| SlidecastError::RenderFailed(format!("{}: {:?}", pdf_path.display(), e)))?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(width_px as i32)
        .set_maximum_height(width_px as i32);

    let mut images = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            SlidecastError::RenderFailed(format!("page {}: {:?}", idx + 1, e))
        })?;

        let image = bitmap.as_image();
        let path = out_dir.join(slide_image_name(idx));
        image
            .save_with_format(&path, ImageFormat::Png)
            .map_err(|e| SlidecastError::RenderFailed(format!("page {}: {}", idx + 1, e)))?;

        debug!(
            "Rendered slide {} → {}x{} px",
            idx + 1,
            image.width(),
            image.height()
        );
        images.push(path);
    }

    if images.is_empty() {
        return Err(SlidecastError::RenderFailed(format!(
            "{} has no pages",
            pdf_path.display()
        )));
    }

    info!("Rasterised {} slides", images.len());
    Ok(images)
}

/// File name of the still for the 0-based slide `idx`.
pub fn slide_image_name(idx: usize) -> String {
    format!("slide-{:03}.png", idx + 1)
}
