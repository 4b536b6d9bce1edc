//! Service configuration.
//!
//! Every knob lives in [`ServiceConfig`], built through
//! [`ServiceConfigBuilder`]. The binary maps environment variables and CLI
//! flags onto the builder; tests build configs directly.
//!
//! # Example
//! ```rust
//! use slidecast::{GraphAuth, ServiceConfig};
//!
//! let config = ServiceConfig::builder()
//!     .max_concurrent_downloads(8)
//!     .slide_duration_secs(4.0)
//!     .crossfade_secs(0.5)
//!     .graph_auth(GraphAuth::Token("eyJ0eXAi...".into()))
//!     .build()
//!     .unwrap();
//! assert_eq!(config.max_concurrent_downloads, 8);
//! ```

use crate::error::SlidecastError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// Default Graph API root.
pub const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Default identity platform root used by the client-credentials flow.
pub const DEFAULT_AUTHORITY_URL: &str = "https://login.microsoftonline.com";

/// Accepted range for the slide render width, in pixels.
pub const MIN_RENDER_WIDTH: u32 = 16;
pub const MAX_RENDER_WIDTH: u32 = 7680;

/// Configuration shared by every request.
#[derive(Clone)]
pub struct ServiceConfig {
    /// TCP connect timeout for outbound downloads, in seconds. Default: 10.
    pub connect_timeout_secs: u64,

    /// Read timeout for outbound downloads, in seconds. Default: 60.
    ///
    /// Applies between received chunks, not to the whole transfer, so large
    /// presentations on a slow but live connection still complete.
    pub read_timeout_secs: u64,

    /// Maximum number of downloads in flight across all requests. Default: 4.
    pub max_concurrent_downloads: usize,

    /// Per-request timeout, in seconds. Default: 300.
    ///
    /// Rendering a long deck through soffice and ffmpeg can take minutes.
    pub request_timeout_secs: u64,

    /// Tokio worker threads. Default: available parallelism.
    pub workers: usize,

    /// Seconds each slide stays on screen, crossfade included. Default: 5.0.
    pub slide_duration_secs: f64,

    /// Length of the crossfade between consecutive slides. Default: 1.0.
    ///
    /// Must be shorter than `slide_duration_secs`; zero gives hard cuts.
    pub crossfade_secs: f64,

    /// Width of rendered slide images and of the output video. Default: 1920.
    pub render_width_px: u32,

    /// Output video frame rate. Default: 25.
    pub video_fps: u32,

    /// Locations of the external binaries.
    pub tools: ToolPaths,

    /// Cloud storage endpoint and credentials.
    pub graph: GraphConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            read_timeout_secs: 60,
            max_concurrent_downloads: 4,
            request_timeout_secs: 300,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            slide_duration_secs: 5.0,
            crossfade_secs: 1.0,
            render_width_px: 1920,
            video_fps: 25,
            tools: ToolPaths::default(),
            graph: GraphConfig::default(),
        }
    }
}

impl fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("read_timeout_secs", &self.read_timeout_secs)
            .field("max_concurrent_downloads", &self.max_concurrent_downloads)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("workers", &self.workers)
            .field("slide_duration_secs", &self.slide_duration_secs)
            .field("crossfade_secs", &self.crossfade_secs)
            .field("render_width_px", &self.render_width_px)
            .field("video_fps", &self.video_fps)
            .field("tools", &self.tools)
            .field("graph", &self.graph)
            .finish()
    }
}

impl ServiceConfig {
    /// Create a new builder for `ServiceConfig`.
    pub fn builder() -> ServiceConfigBuilder {
        ServiceConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Paths (or bare names resolved through `PATH`) of the external tools.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    /// LibreOffice, used headless to convert PPTX to PDF. Default: `soffice`.
    pub soffice: PathBuf,
    /// ffmpeg, used for the crossfade video and the audio mux. Default: `ffmpeg`.
    pub ffmpeg: PathBuf,
    /// HTML renderer invoked as `<bin> - -`. Default: `weasyprint`.
    pub html_to_pdf: PathBuf,
    /// Directory containing the pdfium shared library. `None` binds the system library.
    pub pdfium_lib_dir: Option<PathBuf>,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            soffice: PathBuf::from("soffice"),
            ffmpeg: PathBuf::from("ffmpeg"),
            html_to_pdf: PathBuf::from("weasyprint"),
            pdfium_lib_dir: None,
        }
    }
}

/// Graph API endpoint and credentials.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// API root, e.g. `https://graph.microsoft.com/v1.0`.
    pub base_url: String,
    /// Identity platform root for the client-credentials flow.
    pub authority_url: String,
    /// How requests are authenticated.
    pub auth: GraphAuth,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GRAPH_BASE_URL.to_string(),
            authority_url: DEFAULT_AUTHORITY_URL.to_string(),
            auth: GraphAuth::None,
        }
    }
}

/// Credentials for the Graph API.
#[derive(Clone, Default)]
pub enum GraphAuth {
    /// No credentials configured; Graph calls fail with an auth error.
    #[default]
    None,
    /// A pre-issued bearer token.
    Token(String),
    /// OAuth2 client-credentials grant against the tenant's token endpoint.
    ClientCredentials {
        tenant_id: String,
        client_id: String,
        client_secret: String,
    },
}

impl GraphAuth {
    /// Pick credentials from optional parts. A static token wins over client
    /// credentials; client credentials need all three parts.
    pub fn from_parts(
        token: Option<String>,
        tenant_id: Option<String>,
        client_id: Option<String>,
        client_secret: Option<String>,
    ) -> Self {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
        if let Some(token) = non_empty(token) {
            return GraphAuth::Token(token);
        }
        match (non_empty(tenant_id), non_empty(client_id), non_empty(client_secret)) {
            (Some(tenant_id), Some(client_id), Some(client_secret)) => {
                GraphAuth::ClientCredentials {
                    tenant_id,
                    client_id,
                    client_secret,
                }
            }
            _ => GraphAuth::None,
        }
    }
}

impl fmt::Debug for GraphAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphAuth::None => f.write_str("None"),
            GraphAuth::Token(_) => f.write_str("Token(<redacted>)"),
            GraphAuth::ClientCredentials {
                tenant_id,
                client_id,
                ..
            } => f
                .debug_struct("ClientCredentials")
                .field("tenant_id", tenant_id)
                .field("client_id", client_id)
                .field("client_secret", &"<redacted>")
                .finish(),
        }
    }
}

/// Builder for [`ServiceConfig`].
#[derive(Debug)]
pub struct ServiceConfigBuilder {
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    pub fn connect_timeout_secs(mut self, secs: u64) -> Self {
        self.config.connect_timeout_secs = secs;
        self
    }

    pub fn read_timeout_secs(mut self, secs: u64) -> Self {
        self.config.read_timeout_secs = secs;
        self
    }

    pub fn max_concurrent_downloads(mut self, n: usize) -> Self {
        self.config.max_concurrent_downloads = n;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn slide_duration_secs(mut self, secs: f64) -> Self {
        self.config.slide_duration_secs = secs;
        self
    }

    pub fn crossfade_secs(mut self, secs: f64) -> Self {
        self.config.crossfade_secs = secs;
        self
    }

    pub fn render_width_px(mut self, px: u32) -> Self {
        self.config.render_width_px = px;
        self
    }

    pub fn video_fps(mut self, fps: u32) -> Self {
        self.config.video_fps = fps.clamp(1, 120);
        self
    }

    pub fn soffice(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tools.soffice = path.into();
        self
    }

    pub fn ffmpeg(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tools.ffmpeg = path.into();
        self
    }

    pub fn html_to_pdf(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tools.html_to_pdf = path.into();
        self
    }

    pub fn pdfium_lib_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.tools.pdfium_lib_dir = Some(dir.into());
        self
    }

    pub fn graph_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.graph.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn graph_authority_url(mut self, url: impl Into<String>) -> Self {
        self.config.graph.authority_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn graph_auth(mut self, auth: GraphAuth) -> Self {
        self.config.graph.auth = auth;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ServiceConfig, SlidecastError> {
        let c = &self.config;
        if c.max_concurrent_downloads == 0 {
            return Err(SlidecastError::InvalidConfig(
                "max_concurrent_downloads must be ≥ 1".into(),
            ));
        }
        if c.connect_timeout_secs == 0 || c.read_timeout_secs == 0 {
            return Err(SlidecastError::InvalidConfig(
                "HTTP timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.request_timeout_secs == 0 {
            return Err(SlidecastError::InvalidConfig(
                "request timeout must be ≥ 1 second".into(),
            ));
        }
        validate_timing(c.slide_duration_secs, c.crossfade_secs)?;
        if !(MIN_RENDER_WIDTH..=MAX_RENDER_WIDTH).contains(&c.render_width_px)
            || c.render_width_px % 2 != 0
        {
            // yuv420p needs even frame dimensions.
            return Err(SlidecastError::InvalidConfig(format!(
                "render width must be an even number in [{}, {}], got {}",
                MIN_RENDER_WIDTH, MAX_RENDER_WIDTH, c.render_width_px
            )));
        }
        if !c.graph.base_url.starts_with("http://") && !c.graph.base_url.starts_with("https://") {
            return Err(SlidecastError::InvalidConfig(format!(
                "Graph base URL must be http(s), got '{}'",
                c.graph.base_url
            )));
        }
        Ok(self.config)
    }
}

/// Check a slide duration / crossfade pair. Shared by config validation and
/// per-request overrides on `/combine`.
pub fn validate_timing(slide_duration_secs: f64, crossfade_secs: f64) -> Result<(), SlidecastError> {
    if !slide_duration_secs.is_finite() || slide_duration_secs <= 0.0 {
        return Err(SlidecastError::InvalidConfig(format!(
            "slide duration must be > 0, got {}",
            slide_duration_secs
        )));
    }
    if !crossfade_secs.is_finite() || crossfade_secs < 0.0 || crossfade_secs >= slide_duration_secs
    {
        return Err(SlidecastError::InvalidConfig(format!(
            "crossfade must be in [0, {}), got {}",
            slide_duration_secs, crossfade_secs
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ServiceConfig::builder().build().expect("defaults build");
        assert_eq!(config.max_concurrent_downloads, 4);
        assert_eq!(config.request_timeout_secs, 300);
        assert_eq!(config.graph.base_url, DEFAULT_GRAPH_BASE_URL);
        assert!(matches!(config.graph.auth, GraphAuth::None));
    }

    #[test]
    fn zero_download_cap_is_rejected() {
        let err = ServiceConfig::builder()
            .max_concurrent_downloads(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, SlidecastError::InvalidConfig(_)));
    }

    #[test]
    fn render_width_must_be_even_and_bounded() {
        assert!(ServiceConfig::builder().render_width_px(1280).build().is_ok());
        assert!(ServiceConfig::builder().render_width_px(MAX_RENDER_WIDTH).build().is_ok());
        for bad in [1279, 0, 14, MAX_RENDER_WIDTH + 2, u32::MAX] {
            let err = ServiceConfig::builder().render_width_px(bad).build().unwrap_err();
            assert!(matches!(err, SlidecastError::InvalidConfig(_)), "width {bad}");
        }
    }

    #[test]
    fn crossfade_must_be_shorter_than_slide() {
        assert!(validate_timing(5.0, 1.0).is_ok());
        assert!(validate_timing(5.0, 0.0).is_ok());
        assert!(validate_timing(5.0, 5.0).is_err());
        assert!(validate_timing(0.0, 0.0).is_err());
        assert!(validate_timing(5.0, -0.5).is_err());
        assert!(validate_timing(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn graph_base_url_trailing_slash_is_trimmed() {
        let config = ServiceConfig::builder()
            .graph_base_url("http://localhost:9000/v1.0/")
            .build()
            .unwrap();
        assert_eq!(config.graph.base_url, "http://localhost:9000/v1.0");
    }

    #[test]
    fn static_token_wins_over_client_credentials() {
        let auth = GraphAuth::from_parts(
            Some("tok".into()),
            Some("tenant".into()),
            Some("client".into()),
            Some("secret".into()),
        );
        assert!(matches!(auth, GraphAuth::Token(ref t) if t == "tok"));

        let auth = GraphAuth::from_parts(
            Some("  ".into()),
            Some("tenant".into()),
            Some("client".into()),
            Some("secret".into()),
        );
        assert!(matches!(auth, GraphAuth::ClientCredentials { .. }));

        let auth = GraphAuth::from_parts(None, Some("tenant".into()), None, Some("secret".into()));
        assert!(matches!(auth, GraphAuth::None));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let auth = GraphAuth::ClientCredentials {
            tenant_id: "t".into(),
            client_id: "c".into(),
            client_secret: "super-secret".into(),
        };
        let rendered = format!("{:?}", auth);
        assert!(!rendered.contains("super-secret"));
        assert!(!format!("{:?}", GraphAuth::Token("abc".into())).contains("abc"));
    }
}
