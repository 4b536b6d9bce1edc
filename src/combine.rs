//! The `/combine` pipeline: a drive-hosted deck in, a narrated slideshow out.
//!
//! Every intermediate file lives in one [`TempDir`] owned by the request. It
//! is removed when [`combine`] returns, on success and on every error path.

use crate::config::{validate_timing, ServiceConfig};
use crate::error::SlidecastError;
use crate::graph::{DriveItem, GraphClient};
use crate::pipeline::{render, video};
use crate::pipeline::video::SlideshowPlan;
use crate::schema::{CombineRequest, CombineResponse};
use futures::stream::{self, StreamExt};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Name used for the video when the deck's own name gives no usable stem.
pub const FALLBACK_STEM: &str = "slideshow";

/// Run the full pipeline for one request.
pub async fn combine(
    config: &ServiceConfig,
    graph: &GraphClient,
    request: &CombineRequest,
) -> Result<CombineResponse, SlidecastError> {
    let total_start = Instant::now();
    check_ids(request)?;
    let (slide_duration, crossfade) = resolve_timing(config, request)?;
    info!(
        "Combining item {} from drive {} into folder {}",
        request.pptx_file_id, request.drive_id, request.folder_id
    );

    // ── Step 1: Fetch the deck ───────────────────────────────────────────
    let pptx = graph
        .download_file(&request.drive_id, &request.pptx_file_id)
        .await
        .map_err(pptx_download_error)?;

    // ── Step 2: Name the output after the deck ───────────────────────────
    let stem = match graph.get_item_name(&request.drive_id, &request.pptx_file_id).await {
        Ok(name) => video_stem(&name),
        Err(e) => {
            warn!("Could not read item name, using '{}': {}", FALLBACK_STEM, e);
            FALLBACK_STEM.to_string()
        }
    };

    let workdir = TempDir::new().map_err(|e| SlidecastError::TempFile {
        path: std::env::temp_dir(),
        source: e,
    })?;
    let work = workdir.path();
    debug!("Working in {}", work.display());

    // ── Step 3: Render slide stills ──────────────────────────────────────
    let pptx_path = work.join("deck.pptx");
    write_file(&pptx_path, &pptx).await?;
    let pdf_path = render::pptx_to_pdf(&config.tools, &pptx_path, work).await?;

    let slides_dir = work.join("slides");
    create_dir(&slides_dir).await?;
    let images = render::rasterise_pdf(
        &pdf_path,
        &slides_dir,
        config.render_width_px,
        config.tools.pdfium_lib_dir.as_deref(),
    )
    .await?;

    // ── Step 4: Collect narration ────────────────────────────────────────
    let children = graph
        .list_folder_children(&request.drive_id, &request.folder_id)
        .await?;
    let tracks = narration_tracks(children);
    let track_paths = download_narration(config, graph, &request.drive_id, &tracks, work).await?;

    // ── Step 5: Synthesise the video ─────────────────────────────────────
    let plan = SlideshowPlan {
        slide_count: images.len(),
        slide_duration,
        crossfade,
        fps: config.video_fps,
        width: config.render_width_px,
    };
    let silent = work.join("slides.mp4");
    video::synthesize(&config.tools.ffmpeg, &images, &plan, &silent).await?;

    let final_video = if track_paths.is_empty() {
        info!("No narration found, video stays silent");
        silent
    } else {
        let narration = work.join("narration.m4a");
        video::concat_audio(&config.tools.ffmpeg, &track_paths, &narration).await?;
        let muxed = work.join("narrated.mp4");
        video::mux_audio(
            &config.tools.ffmpeg,
            &silent,
            &narration,
            plan.total_duration(),
            &muxed,
        )
        .await?;
        muxed
    };

    // ── Step 6: Upload ───────────────────────────────────────────────────
    let bytes = tokio::fs::read(&final_video)
        .await
        .map_err(|e| SlidecastError::TempFile {
            path: final_video.clone(),
            source: e,
        })?;
    let filename = format!("{}.mp4", stem);
    let video_url = graph
        .upload_file(&request.drive_id, &request.folder_id, &filename, bytes)
        .await
        .map_err(|e| SlidecastError::UploadFailed(graph_message(e)))?;

    info!(
        "Combined {} slides and {} narration tracks into {} in {}ms",
        images.len(),
        track_paths.len(),
        filename,
        total_start.elapsed().as_millis()
    );

    Ok(CombineResponse { video_url })
}

fn check_ids(request: &CombineRequest) -> Result<(), SlidecastError> {
    for (field, value) in [
        ("drive_id", &request.drive_id),
        ("folder_id", &request.folder_id),
        ("pptx_file_id", &request.pptx_file_id),
    ] {
        if value.trim().is_empty() {
            return Err(SlidecastError::InvalidInput(format!("{} must not be empty", field)));
        }
    }
    Ok(())
}

/// Slide duration and crossfade for this request: overrides, else the service
/// defaults. An invalid pair is the caller's fault, so it maps to 422.
fn resolve_timing(config: &ServiceConfig, request: &CombineRequest) -> Result<(f64, f64), SlidecastError> {
    let d = request.slide_duration_secs.unwrap_or(config.slide_duration_secs);
    let c = request.crossfade_secs.unwrap_or(config.crossfade_secs);
    validate_timing(d, c).map_err(|e| match e {
        SlidecastError::InvalidConfig(msg) => SlidecastError::InvalidInput(msg),
        other => other,
    })?;
    Ok((d, c))
}

/// File stem of the deck's name, or [`FALLBACK_STEM`].
pub fn video_stem(item_name: &str) -> String {
    Path::new(item_name.trim())
        .file_stem()
        .map(|s| s.to_string_lossy().trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_STEM.to_string())
}

/// Audio children of the folder in narration order.
pub fn narration_tracks(children: Vec<DriveItem>) -> Vec<DriveItem> {
    let mut tracks: Vec<DriveItem> = children
        .into_iter()
        .filter(|item| video::is_audio_name(&item.name))
        .collect();
    tracks.sort_by(|a, b| video::narration_order(&a.name, &b.name));
    tracks
}

/// Download `tracks` into `work`, at most `max_concurrent_downloads` at once.
/// Returns local paths in the same order as `tracks`.
async fn download_narration(
    config: &ServiceConfig,
    graph: &GraphClient,
    drive_id: &str,
    tracks: &[DriveItem],
    work: &Path,
) -> Result<Vec<PathBuf>, SlidecastError> {
    if tracks.is_empty() {
        return Ok(Vec::new());
    }
    info!("Downloading {} narration tracks", tracks.len());

    let mut results: Vec<(usize, Result<PathBuf, SlidecastError>)> =
        stream::iter(tracks.iter().cloned().enumerate().map(|(idx, item)| async move {
            let result = async {
                let bytes = graph.download_file(drive_id, &item.id).await?;
                let ext = Path::new(&item.name)
                    .extension()
                    .map(|e| e.to_string_lossy().to_lowercase())
                    .unwrap_or_else(|| "audio".to_string());
                let path = work.join(format!("narration-{:03}.{}", idx + 1, ext));
                write_file(&path, &bytes).await?;
                Ok::<_, SlidecastError>(path)
            }
            .await;
            (idx, result)
        }))
        .buffer_unordered(config.max_concurrent_downloads)
        .collect()
        .await;

    results.sort_by_key(|(idx, _)| *idx);
    results.into_iter().map(|(_, r)| r).collect()
}

/// Map a Graph failure on the deck download to the 400 the caller sees.
fn pptx_download_error(e: SlidecastError) -> SlidecastError {
    SlidecastError::PptxDownloadFailed(graph_message(e))
}

/// The upstream message of a Graph error, without our own prefix.
fn graph_message(e: SlidecastError) -> String {
    match e {
        SlidecastError::GraphRequest { message, .. } => message,
        other => other.to_string(),
    }
}

async fn write_file(path: &Path, bytes: &[u8]) -> Result<(), SlidecastError> {
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| SlidecastError::TempFile {
            path: path.to_path_buf(),
            source: e,
        })
}

async fn create_dir(path: &Path) -> Result<(), SlidecastError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| SlidecastError::TempFile {
            path: path.to_path_buf(),
            source: e,
        })
}
