//! Slideshow synthesis with ffmpeg.
//!
//! Each slide still becomes a looped input of `slide_duration` seconds.
//! Consecutive slides are joined by an `xfade` crossfade of `crossfade`
//! seconds, so the finished video lasts
//!
//! ```text
//! n·d − (n−1)·c
//! ```
//!
//! for `n` slides. Narration tracks are concatenated into one AAC stream and
//! muxed on top, trimmed to the video length.

use crate::error::SlidecastError;
use crate::pipeline::process::run_cmd;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use tracing::info;

/// File extensions treated as narration audio.
pub const AUDIO_EXTENSIONS: &[&str] = &["mp3", "wav", "m4a", "aac", "ogg", "flac"];

/// Timing and geometry of one slideshow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlideshowPlan {
    pub slide_count: usize,
    pub slide_duration: f64,
    pub crossfade: f64,
    pub fps: u32,
    pub width: u32,
}

impl SlideshowPlan {
    /// Expected length of the video in seconds.
    pub fn total_duration(&self) -> f64 {
        match self.slide_count {
            0 => 0.0,
            n => n as f64 * self.slide_duration - (n - 1) as f64 * self.crossfade,
        }
    }

    /// 16:9 frame height for `width`, rounded down to an even number for yuv420p.
    pub fn height(&self) -> u32 {
        (self.width * 9 / 16) & !1
    }

    /// Start of the `k`-th transition (1-based) on the output timeline.
    fn transition_offset(&self, k: usize) -> f64 {
        k as f64 * (self.slide_duration - self.crossfade)
    }
}

/// The `-filter_complex` graph for `plan`. Output label: `[vout]`.
pub fn filter_graph(plan: &SlideshowPlan) -> String {
    let n = plan.slide_count;
    let (w, h) = (plan.width, plan.height());

    let mut chains: Vec<String> = (0..n)
        .map(|i| {
            let label = if n == 1 { "vout".to_string() } else { format!("v{i}") };
            format!(
                "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=decrease,\
                 pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:color=black,setsar=1,\
                 fps={fps},format=yuv420p[{label}]",
                fps = plan.fps
            )
        })
        .collect();

    if n > 1 {
        if plan.crossfade > 0.0 {
            let mut prev = "v0".to_string();
            for k in 1..n {
                let out = if k == n - 1 { "vout".to_string() } else { format!("x{k}") };
                chains.push(format!(
                    "[{prev}][v{k}]xfade=transition=fade:duration={:.3}:offset={:.3}[{out}]",
                    plan.crossfade,
                    plan.transition_offset(k)
                ));
                prev = out;
            }
        } else {
            let inputs: String = (0..n).map(|i| format!("[v{i}]")).collect();
            chains.push(format!("{inputs}concat=n={n}:v=1:a=0[vout]"));
        }
    }

    chains.join(";")
}

/// Render the stills in `images` into a silent H.264 MP4 at `out`.
pub async fn synthesize(
    ffmpeg: &Path,
    images: &[PathBuf],
    plan: &SlideshowPlan,
    out: &Path,
) -> Result<(), SlidecastError> {
    if images.is_empty() {
        return Err(SlidecastError::RenderFailed("no slides to render".into()));
    }

    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into(), "-loglevel".into(), "error".into()];
    for image in images {
        args.extend([
            "-loop".to_string(),
            "1".to_string(),
            "-framerate".to_string(),
            plan.fps.to_string(),
            "-t".to_string(),
            format!("{:.3}", plan.slide_duration),
            "-i".to_string(),
            image.display().to_string(),
        ]);
    }
    args.extend([
        "-filter_complex".to_string(),
        filter_graph(plan),
        "-map".to_string(),
        "[vout]".to_string(),
        "-c:v".to_string(),
        "libx264".to_string(),
        "-pix_fmt".to_string(),
        "yuv420p".to_string(),
        "-r".to_string(),
        plan.fps.to_string(),
        "-movflags".to_string(),
        "+faststart".to_string(),
        out.display().to_string(),
    ]);

    run_cmd(ffmpeg, &args, None).await?;
    info!(
        "Synthesised {} slides into {:.1}s video",
        images.len(),
        plan.total_duration()
    );
    Ok(())
}

/// Concatenate narration tracks, in order, into one AAC file at `out`.
pub async fn concat_audio(ffmpeg: &Path, tracks: &[PathBuf], out: &Path) -> Result<(), SlidecastError> {
    if tracks.is_empty() {
        return Err(SlidecastError::Internal("no narration tracks to concatenate".into()));
    }

    let mut args: Vec<String> = vec!["-y".into(), "-hide_banner".into(), "-loglevel".into(), "error".into()];
    for track in tracks {
        args.push("-i".into());
        args.push(track.display().to_string());
    }
    let inputs: String = (0..tracks.len()).map(|i| format!("[{i}:a]")).collect();
    args.extend([
        "-filter_complex".to_string(),
        format!("{inputs}concat=n={}:v=0:a=1[aout]", tracks.len()),
        "-map".to_string(),
        "[aout]".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        out.display().to_string(),
    ]);

    run_cmd(ffmpeg, &args, None).await?;
    Ok(())
}

/// Mux `audio` onto `video`, copying the video stream and cutting the result
/// at `duration` seconds.
pub async fn mux_audio(
    ffmpeg: &Path,
    video: &Path,
    audio: &Path,
    duration: f64,
    out: &Path,
) -> Result<(), SlidecastError> {
    let args: Vec<String> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-i".into(),
        video.display().to_string(),
        "-i".into(),
        audio.display().to_string(),
        "-map".into(),
        "0:v:0".into(),
        "-map".into(),
        "1:a:0".into(),
        "-c:v".into(),
        "copy".into(),
        "-c:a".into(),
        "aac".into(),
        "-t".into(),
        format!("{:.3}", duration),
        "-movflags".into(),
        "+faststart".into(),
        out.display().to_string(),
    ];

    run_cmd(ffmpeg, &args, None).await?;
    Ok(())
}

/// Whether `name` has one of the [`AUDIO_EXTENSIONS`].
pub fn is_audio_name(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| AUDIO_EXTENSIONS.iter().any(|a| a.eq_ignore_ascii_case(e)))
        .unwrap_or(false)
}

static TRAILING_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)\D*$").expect("static regex"));

/// Narration order: by the last number in the file stem (`slide2.mp3` before
/// `slide10.mp3`), names without a number last, ties broken by name.
/// Digits in the extension (`mp3`, `m4a`) never count.
pub fn narration_order(a: &str, b: &str) -> Ordering {
    let number = |s: &str| {
        let stem = Path::new(s).file_stem().and_then(|s| s.to_str()).unwrap_or(s);
        TRAILING_NUMBER
            .captures(stem)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u64>().ok())
    };
    match (number(a), number(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
