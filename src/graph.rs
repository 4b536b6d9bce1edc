//! Microsoft Graph drive client.
//!
//! Covers the four calls `/combine` needs: download an item's content, read
//! an item's name, list a folder, and upload a file into a folder.
//!
//! ## Redirects
//!
//! `/content` answers with a redirect to a pre-authenticated storage URL.
//! Automatic redirects are disabled on the client and followed here instead,
//! so the `Authorization` header is sent on every hop (reqwest drops it on
//! cross-origin redirects).
//!
//! ## Authentication
//!
//! Either a static bearer token, or an OAuth2 client-credentials grant whose
//! token is cached until shortly before it expires.

use crate::config::{GraphAuth, GraphConfig, ServiceConfig};
use crate::error::SlidecastError;
use crate::pipeline::input::Downloader;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, LOCATION};
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Redirect hops followed before a download is abandoned.
pub const MAX_REDIRECTS: usize = 10;

/// Scope requested by the client-credentials grant.
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";

/// Tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Longest error body quoted back to the caller.
const MAX_ERROR_BODY: usize = 500;

/// A child item of a drive folder.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DriveItem {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
}

#[derive(Deserialize)]
struct ChildrenPage {
    #[serde(default)]
    value: Vec<DriveItem>,
    #[serde(rename = "@odata.nextLink")]
    next_link: Option<String>,
}

#[derive(Deserialize)]
struct ItemMetadata {
    #[serde(default)]
    name: String,
}

#[derive(Deserialize)]
struct UploadedItem {
    #[serde(rename = "webUrl")]
    web_url: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    3599
}

#[derive(Deserialize)]
struct GraphErrorBody {
    error: GraphErrorDetail,
}

#[derive(Deserialize)]
struct GraphErrorDetail {
    message: String,
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

/// Client for the Graph drive endpoints.
pub struct GraphClient {
    http: reqwest::Client,
    config: GraphConfig,
    downloader: Arc<Downloader>,
    token: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GraphClient {
    /// Build a client sharing `downloader`'s transfer slots.
    pub fn new(config: &ServiceConfig, downloader: Arc<Downloader>) -> Result<Self, SlidecastError> {
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .connect_timeout(config.connect_timeout())
            .read_timeout(config.read_timeout())
            .build()
            .map_err(|e| SlidecastError::Internal(format!("Graph HTTP client: {}", e)))?;

        Ok(Self {
            http,
            config: config.graph.clone(),
            downloader,
            token: Mutex::new(None),
        })
    }

    /// Download the content of `item_id`.
    pub async fn download_file(&self, drive_id: &str, item_id: &str) -> Result<Vec<u8>, SlidecastError> {
        let mut url = self.endpoint(&["drives", drive_id, "items", item_id, "content"])?;
        let auth = self.authorization().await?;
        let _slot = self.downloader.acquire().await?;

        for hop in 0..=MAX_REDIRECTS {
            debug!("Graph GET {} (hop {})", url, hop);
            let response = self
                .http
                .get(url.clone())
                .header(AUTHORIZATION, &auth)
                .send()
                .await
                .map_err(transport_error)?;

            if is_redirect(response.status()) {
                url = redirect_target(&url, &response)?;
                continue;
            }

            let response = ensure_success(response).await?;
            let bytes = response.bytes().await.map_err(transport_error)?;
            info!("Downloaded item {} ({} bytes)", item_id, bytes.len());
            return Ok(bytes.to_vec());
        }

        Err(SlidecastError::GraphTransport(format!(
            "too many redirects downloading item {}",
            item_id
        )))
    }

    /// Upload `content` as `filename` into `folder_id` and return its web URL.
    pub async fn upload_file(
        &self,
        drive_id: &str,
        folder_id: &str,
        filename: &str,
        content: Vec<u8>,
    ) -> Result<String, SlidecastError> {
        let folder_segment = format!("{}:", folder_id);
        let name_segment = format!("{}:", filename);
        let url = self.endpoint(&["drives", drive_id, "items", &folder_segment, &name_segment, "content"])?;
        let auth = self.authorization().await?;
        let size = content.len();

        let response = self
            .http
            .put(url)
            .header(AUTHORIZATION, auth)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(content)
            .send()
            .await
            .map_err(transport_error)?;
        let response = ensure_success(response).await?;
        let status = response.status().as_u16();

        let item: UploadedItem = response.json().await.map_err(transport_error)?;
        let web_url = item.web_url.filter(|u| !u.is_empty()).ok_or_else(|| SlidecastError::GraphRequest {
            status,
            message: "upload response has no webUrl".into(),
        })?;

        info!("Uploaded {} ({} bytes) to {}", filename, size, web_url);
        Ok(web_url)
    }

    /// All children of `folder_id`, following `@odata.nextLink` pages.
    pub async fn list_folder_children(
        &self,
        drive_id: &str,
        folder_id: &str,
    ) -> Result<Vec<DriveItem>, SlidecastError> {
        let mut next = Some(self.endpoint(&["drives", drive_id, "items", folder_id, "children"])?);
        let mut items = Vec::new();

        while let Some(url) = next.take() {
            let page: ChildrenPage = self.get_json(url).await?;
            items.extend(page.value);
            next = match page.next_link {
                Some(link) => Some(Url::parse(&link).map_err(|e| {
                    SlidecastError::GraphTransport(format!("bad nextLink '{}': {}", link, e))
                })?),
                None => None,
            };
        }

        debug!("Folder {} has {} children", folder_id, items.len());
        Ok(items)
    }

    /// File name of `item_id`.
    pub async fn get_item_name(&self, drive_id: &str, item_id: &str) -> Result<String, SlidecastError> {
        let url = self.endpoint(&["drives", drive_id, "items", item_id])?;
        let meta: ItemMetadata = self.get_json(url).await?;
        Ok(meta.name)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SlidecastError> {
        let auth = self.authorization().await?;
        let response = self
            .http
            .get(url)
            .header(AUTHORIZATION, auth)
            .send()
            .await
            .map_err(transport_error)?;
        ensure_success(response)
            .await?
            .json()
            .await
            .map_err(transport_error)
    }

    /// `base_url` with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, SlidecastError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| SlidecastError::InvalidConfig(format!("graph base URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| SlidecastError::InvalidConfig("graph base URL cannot be a base".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Value of the `Authorization` header.
    async fn authorization(&self) -> Result<String, SlidecastError> {
        match &self.config.auth {
            GraphAuth::None => Err(SlidecastError::GraphAuth(
                "no Graph credentials configured (set GRAPH_TOKEN or client credentials)".into(),
            )),
            GraphAuth::Token(token) => Ok(format!("Bearer {}", token)),
            GraphAuth::ClientCredentials {
                tenant_id,
                client_id,
                client_secret,
            } => {
                let mut cached = self.token.lock().await;
                if let Some(token) = cached.as_ref().filter(|t| Instant::now() < t.refresh_at) {
                    return Ok(format!("Bearer {}", token.value));
                }

                let fresh = self.request_token(tenant_id, client_id, client_secret).await?;
                let header = format!("Bearer {}", fresh.value);
                *cached = Some(fresh);
                Ok(header)
            }
        }
    }

    async fn request_token(
        &self,
        tenant_id: &str,
        client_id: &str,
        client_secret: &str,
    ) -> Result<CachedToken, SlidecastError> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.authority_url.trim_end_matches('/'),
            tenant_id
        );
        let form = [
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("scope", GRAPH_SCOPE),
        ];

        let response = self
            .http
            .post(&url)
            .form(&form)
            .send()
            .await
            .map_err(|e| SlidecastError::GraphAuth(format!("token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            warn!("Token endpoint answered HTTP {}", status);
            return Err(SlidecastError::GraphAuth(format!(
                "token endpoint answered HTTP {}: {}",
                status,
                truncate(&body)
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| SlidecastError::GraphAuth(format!("malformed token response: {}", e)))?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        info!("Acquired Graph token (valid for {}s)", token.expires_in);
        Ok(CachedToken {
            value: token.access_token,
            refresh_at: Instant::now() + lifetime,
        })
    }
}

fn is_redirect(status: StatusCode) -> bool {
    matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308)
}

fn redirect_target(current: &Url, response: &Response) -> Result<Url, SlidecastError> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            SlidecastError::GraphTransport(format!(
                "HTTP {} from {} without a Location header",
                response.status().as_u16(),
                current
            ))
        })?;
    current
        .join(location)
        .map_err(|e| SlidecastError::GraphTransport(format!("bad redirect '{}': {}", location, e)))
}

/// Pass 2xx responses through; turn anything else into `GraphRequest`,
/// preferring Graph's own `error.message` as the message.
async fn ensure_success(response: Response) -> Result<Response, SlidecastError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<GraphErrorBody>(&body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| {
            let text = truncate(&body);
            if text.is_empty() {
                status.canonical_reason().unwrap_or("request failed").to_string()
            } else {
                text
            }
        });

    warn!("Graph answered HTTP {}: {}", status.as_u16(), message);
    Err(SlidecastError::GraphRequest {
        status: status.as_u16(),
        message,
    })
}

fn transport_error(e: reqwest::Error) -> SlidecastError {
    SlidecastError::GraphTransport(e.to_string())
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    match trimmed.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => format!("{}…", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    fn client(server: &MockServer, auth: GraphAuth) -> GraphClient {
        let config = ServiceConfig::builder()
            .graph_base_url(server.base_url())
            .graph_authority_url(server.base_url())
            .graph_auth(auth)
            .build()
            .unwrap();
        let downloader = Arc::new(Downloader::new(&config).unwrap());
        GraphClient::new(&config, downloader).unwrap()
    }

    fn token(t: &str) -> GraphAuth {
        GraphAuth::Token(t.to_string())
    }

    #[tokio::test]
    async fn download_follows_redirects_with_auth() {
        let server = MockServer::start();
        let first = server.mock(|when, then| {
            when.method(GET)
                .path("/drives/d1/items/i1/content")
                .header("Authorization", "Bearer t");
            then.status(302).header("Location", "/r1");
        });
        let second = server.mock(|when, then| {
            when.method(GET).path("/r1").header("Authorization", "Bearer t");
            then.status(301).header("Location", "/r2");
        });
        let last = server.mock(|when, then| {
            when.method(GET).path("/r2").header("Authorization", "Bearer t");
            then.status(200).body("final");
        });

        let bytes = client(&server, token("t")).download_file("d1", "i1").await.unwrap();

        assert_eq!(bytes, b"final");
        first.assert();
        second.assert();
        last.assert();
    }

    #[tokio::test]
    async fn redirect_loop_is_abandoned() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/drives/d/items/i/content");
            then.status(307).header("Location", "/drives/d/items/i/content");
        });

        let err = client(&server, token("t")).download_file("d", "i").await.unwrap_err();
        assert!(matches!(err, SlidecastError::GraphTransport(ref m) if m.contains("too many redirects")));
    }

    #[tokio::test]
    async fn graph_error_message_is_surfaced() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/drives/d/items/p/content");
            then.status(404)
                .json_body(json!({"error": {"code": "itemNotFound", "message": "missing"}}));
        });

        let err = client(&server, token("t")).download_file("d", "p").await.unwrap_err();
        match err {
            SlidecastError::GraphRequest { status, message } => {
                assert_eq!(status, 404);
                assert_eq!(message, "missing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_returns_web_url() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(PUT)
                .path("/drives/d/items/f:/deck.mp4:/content")
                .header("Authorization", "Bearer t")
                .body("video");
            then.status(201)
                .json_body(json!({"id": "new", "webUrl": "https://share/deck.mp4"}));
        });

        let url = client(&server, token("t"))
            .upload_file("d", "f", "deck.mp4", b"video".to_vec())
            .await
            .unwrap();

        mock.assert();
        assert_eq!(url, "https://share/deck.mp4");
    }

    #[tokio::test]
    async fn upload_without_web_url_fails() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PUT).path("/drives/d/items/f:/x.mp4:/content");
            then.status(200).json_body(json!({"id": "new"}));
        });

        let err = client(&server, token("t"))
            .upload_file("d", "f", "x.mp4", Vec::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SlidecastError::GraphRequest { .. }), "got: {err:?}");
    }

    #[tokio::test]
    async fn children_are_collected_across_pages() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/drives/d/items/f/children");
            then.status(200).json_body(json!({
                "value": [{"id": "1", "name": "slide1.mp3"}],
                "@odata.nextLink": server.url("/page2"),
            }));
        });
        server.mock(|when, then| {
            when.method(GET).path("/page2");
            then.status(200).json_body(json!({
                "value": [{"id": "2", "name": "deck.pptx"}],
            }));
        });

        let items = client(&server, token("t")).list_folder_children("d", "f").await.unwrap();
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["slide1.mp3", "deck.pptx"]);
    }

    #[tokio::test]
    async fn item_name_is_read_from_metadata() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/drives/d/items/p");
            then.status(200).json_body(json!({"id": "p", "name": "Quarterly Review.pptx"}));
        });

        let name = client(&server, token("t")).get_item_name("d", "p").await.unwrap();
        assert_eq!(name, "Quarterly Review.pptx");
    }

    #[tokio::test]
    async fn client_credentials_token_is_cached() {
        let server = MockServer::start();
        let token_mock = server.mock(|when, then| {
            when.method(POST)
                .path("/tenant/oauth2/v2.0/token")
                .body_contains("grant_type=client_credentials")
                .body_contains("client_id=app");
            then.status(200)
                .json_body(json!({"access_token": "abc", "expires_in": 3600, "token_type": "Bearer"}));
        });
        let item_mock = server.mock(|when, then| {
            when.method(GET).path("/drives/d/items/p").header("Authorization", "Bearer abc");
            then.status(200).json_body(json!({"name": "deck.pptx"}));
        });

        let graph = client(
            &server,
            GraphAuth::ClientCredentials {
                tenant_id: "tenant".into(),
                client_id: "app".into(),
                client_secret: "secret".into(),
            },
        );
        graph.get_item_name("d", "p").await.unwrap();
        graph.get_item_name("d", "p").await.unwrap();

        token_mock.assert_hits(1);
        item_mock.assert_hits(2);
    }

    #[tokio::test]
    async fn missing_credentials_fail_before_any_request() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.path_contains("/");
            then.status(200);
        });

        let err = client(&server, GraphAuth::None).get_item_name("d", "p").await.unwrap_err();
        assert!(matches!(err, SlidecastError::GraphAuth(_)));
        mock.assert_hits(0);
    }
}
