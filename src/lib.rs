//! # slidecast
//!
//! HTTP glue service for low-code automation workflows around PowerPoint
//! decks.
//!
//! ## Endpoints
//!
//! ```text
//! POST /extract            URL → PPTX → [{title, notes}, …]
//! POST /combine            drive PPTX → slide stills → crossfaded MP4
//!                          (+ narration from the same folder) → drive upload
//! POST /html-to-pdf        HTML → PDF
//! POST /html-to-pdf/async  HTML → PDF on a detached task
//! GET  /health             {"status":"ok"}
//! ```
//!
//! Rendering is delegated to external tools: LibreOffice converts decks to
//! PDF, pdfium rasterises pages, ffmpeg encodes the video and an HTML
//! renderer such as weasyprint produces PDFs.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use slidecast::{app, AppState, ServiceConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServiceConfig::builder().max_concurrent_downloads(8).build()?;
//!     let state = Arc::new(AppState::new(config)?);
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     axum::serve(listener, app(state)).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `slidecast` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod combine;
pub mod config;
pub mod error;
pub mod graph;
pub mod pipeline;
pub mod schema;
pub mod server;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GraphAuth, GraphConfig, ServiceConfig, ServiceConfigBuilder, ToolPaths};
pub use error::{SlidecastError, ToolError};
pub use graph::{DriveItem, GraphClient};
pub use pipeline::pptx::{parse_presentation, Presentation};
pub use schema::{CombineRequest, CombineResponse, ExtractRequest, ExtractResponse, SlideData};
pub use server::{app, AppState};
