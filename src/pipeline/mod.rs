//! Processing stages behind the HTTP handlers.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! /extract     input ──▶ pptx
//!              (URL)     (titles + notes)
//!
//! /combine     graph ──▶ render ──────────▶ video ──▶ graph
//!              (PPTX)    (soffice, pdfium)  (ffmpeg)  (upload)
//!
//! /html-to-pdf pdf
//!              (external renderer)
//! ```
//!
//! 1. [`input`]   — bounded HTTP download of a pointer URL
//! 2. [`pptx`]    — read slide order, titles and speaker notes from the package
//! 3. [`render`]  — PPTX → PDF with LibreOffice, PDF → PNG with pdfium; pdfium
//!    runs in `spawn_blocking`
//! 4. [`video`]   — crossfaded slideshow and narration muxing with ffmpeg
//! 5. [`pdf`]     — HTML → PDF through an external renderer
//!
//! [`process`] runs every external binary.

pub mod input;
pub mod pdf;
pub mod pptx;
pub mod process;
pub mod render;
pub mod video;
