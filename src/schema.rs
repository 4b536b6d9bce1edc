//! Request and response bodies of the HTTP API.

use serde::{Deserialize, Serialize};

/// Body of `POST /extract`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractRequest {
    /// HTTP(S) URL the presentation is downloaded from.
    pub file_url: String,
    /// Caller's name for the file; echoed back unchanged.
    pub file_name: String,
    /// Include the downloaded bytes, base64-encoded, in the response.
    #[serde(default)]
    pub include_file_content: bool,
}

/// Title and speaker notes of one slide. Absent values are empty strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlideData {
    pub title: String,
    pub notes: String,
}

/// Response of `POST /extract`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractResponse {
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_content: Option<String>,
    pub slide_count: usize,
    pub slides: Vec<SlideData>,
}

/// Body of `POST /combine`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineRequest {
    pub drive_id: String,
    pub folder_id: String,
    pub pptx_file_id: String,
    /// Overrides the configured seconds per slide.
    #[serde(default)]
    pub slide_duration_secs: Option<f64>,
    /// Overrides the configured crossfade length.
    #[serde(default)]
    pub crossfade_secs: Option<f64>,
}

/// Response of `POST /combine`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombineResponse {
    pub video_url: String,
}

/// Response of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
}

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub detail: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_content_is_omitted_when_absent() {
        let response = ExtractResponse {
            filename: "deck.pptx".into(),
            file_content: None,
            slide_count: 0,
            slides: vec![],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("file_content").is_none());
        assert_eq!(json["filename"], "deck.pptx");
    }

    #[test]
    fn combine_overrides_are_optional() {
        let req: CombineRequest =
            serde_json::from_str(r#"{"drive_id":"d","folder_id":"f","pptx_file_id":"p"}"#).unwrap();
        assert_eq!(req.slide_duration_secs, None);
        assert_eq!(req.crossfade_secs, None);
    }
}
