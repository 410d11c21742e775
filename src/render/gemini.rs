//! Image generation through the Gemini `generateContent` endpoint

use super::{RenderError, RenderRequest, RenderResult, SceneRenderer};
use crate::config::RenderConfig;
use crate::graph::RenderArtifact;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiImageRenderer {
    client: Client,
    config: RenderConfig,
    api_base_url: String,
}

#[derive(Serialize)]
struct Request {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize, Default)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(
        default,
        rename = "inlineData",
        alias = "inline_data",
        skip_serializing_if = "Option::is_none"
    )]
    inline_data: Option<InlineData>,
}

#[derive(Serialize, Deserialize)]
struct InlineData {
    #[serde(rename = "mimeType", alias = "mime_type")]
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseModalities")]
    response_modalities: Vec<&'static str>,
    temperature: f32,
}

#[derive(Deserialize)]
struct Response {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

impl GeminiImageRenderer {
    pub fn new(config: &RenderConfig) -> RenderResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| RenderError::Config(e.to_string()))?;

        Ok(Self {
            client,
            api_base_url: config
                .api_base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            config: config.clone(),
        })
    }

    fn build_request(&self, request: &RenderRequest) -> Request {
        let mut parts = vec![Part {
            text: Some(request.prompt()),
            inline_data: None,
        }];
        if let Some(snapshot) = &request.canvas_snapshot {
            parts.push(Part {
                text: None,
                inline_data: Some(InlineData {
                    mime_type: crate::graph::PNG_MEDIA_TYPE.to_string(),
                    data: STANDARD.encode(snapshot),
                }),
            });
        }

        Request {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts,
            }],
            generation_config: GenerationConfig {
                response_modalities: vec!["IMAGE", "TEXT"],
                temperature: 0.8,
            },
        }
    }
}

/// First inline image of the response
fn extract_image(response: Response) -> RenderResult<(String, String)> {
    response
        .candidates
        .unwrap_or_default()
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().find_map(|p| p.inline_data))
        .map(|d| (d.mime_type, d.data))
        .ok_or_else(|| RenderError::Schema("no image found in response".to_string()))
}

fn api_error(status: StatusCode, body: &str) -> RenderError {
    if status == StatusCode::TOO_MANY_REQUESTS || body.contains("RESOURCE_EXHAUSTED") {
        RenderError::Api(
            "API quota exceeded. Wait a minute and try again, or check your quotas".to_string(),
        )
    } else if status == StatusCode::FORBIDDEN || body.contains("PERMISSION_DENIED") {
        RenderError::Api(
            "Permission denied. Make sure the API is enabled for this key or project".to_string(),
        )
    } else if body.to_lowercase().contains("not available in your country") {
        RenderError::Api("Image generation is not available in your region".to_string())
    } else {
        RenderError::Api(format!("Gemini error {}: {}", status, body))
    }
}

#[async_trait]
impl SceneRenderer for GeminiImageRenderer {
    async fn render_scene(&self, request: &RenderRequest) -> RenderResult<RenderArtifact> {
        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| RenderError::Config("Gemini requires API key".to_string()))?;

        info!(
            "Rendering '{}' with {} ({})",
            request.scene_name, self.config.model, request.style
        );

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base_url, self.config.model, api_key
        );
        let resp = self
            .client
            .post(&url)
            .json(&self.build_request(request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    RenderError::Timeout(self.config.timeout_secs)
                } else {
                    RenderError::Network(e.to_string())
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(api_error(status, &text));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| RenderError::Schema(e.to_string()))?;
        let (mime_type, data) = extract_image(result)?;
        let bytes = STANDARD
            .decode(data.as_bytes())
            .map_err(|e| RenderError::Schema(e.to_string()))?;
        debug!("Received {} byte {} image", bytes.len(), mime_type);

        Ok(RenderArtifact::new(mime_type, bytes).with_style(request.style.phrase()))
    }
}
