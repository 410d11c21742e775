//! HTTP client for chat-style LLM endpoints

use crate::config::{LlmConfig, LlmProvider};
use crate::llm::{GenerationError, GenerationResult};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct LlmClient {
    client: Client,
    config: LlmConfig,
    api_base_url: String,
}

impl LlmClient {
    pub fn new(config: &LlmConfig) -> GenerationResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| GenerationError::Config(e.to_string()))?;

        let api_base_url = config.api_base_url.clone().unwrap_or_else(|| match config.provider {
            LlmProvider::OpenAI => "https://api.openai.com/v1".to_string(),
            LlmProvider::Ollama => "http://localhost:11434".to_string(),
            LlmProvider::Gemini => "https://generativelanguage.googleapis.com/v1beta".to_string(),
        });

        Ok(Self {
            client,
            config: config.clone(),
            api_base_url,
        })
    }

    pub fn provider(&self) -> LlmProvider {
        self.config.provider
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Send one prompt and return the raw text answer
    pub async fn complete(&self, system_prompt: &str, prompt: &str) -> GenerationResult<String> {
        let system_prompt = self.config.system_prompt.as_deref().unwrap_or(system_prompt);
        debug!(
            "Sending {} character prompt to {:?} model {}",
            prompt.len(),
            self.config.provider,
            self.config.model
        );

        match self.config.provider {
            LlmProvider::OpenAI => self.openai_chat(system_prompt, prompt).await,
            LlmProvider::Ollama => self.ollama_chat(system_prompt, prompt).await,
            LlmProvider::Gemini => self.gemini_chat(system_prompt, prompt).await,
        }
    }

    async fn openai_chat(&self, system_prompt: &str, prompt: &str) -> GenerationResult<String> {
        #[derive(Serialize)]
        struct Message<'a> {
            role: &'a str,
            content: &'a str,
        }

        #[derive(Serialize)]
        struct ResponseFormat {
            #[serde(rename = "type")]
            kind: &'static str,
        }

        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            messages: Vec<Message<'a>>,
            temperature: f32,
            response_format: ResponseFormat,
        }

        #[derive(Deserialize)]
        struct Response {
            choices: Vec<Choice>,
        }

        #[derive(Deserialize)]
        struct Choice {
            message: MessageContent,
        }

        #[derive(Deserialize)]
        struct MessageContent {
            content: String,
        }

        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| GenerationError::Config("OpenAI requires API key".to_string()))?;

        let url = format!("{}/chat/completions", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .json(&Request {
                model: &self.config.model,
                messages: vec![
                    Message {
                        role: "system",
                        content: system_prompt,
                    },
                    Message {
                        role: "user",
                        content: prompt,
                    },
                ],
                temperature: 0.7,
                response_format: ResponseFormat {
                    kind: "json_object",
                },
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(api_error("OpenAI", status, &text));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| GenerationError::Schema(e.to_string()))?;
        result
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| GenerationError::Schema("OpenAI returned no choices".to_string()))
    }

    async fn ollama_chat(&self, system_prompt: &str, prompt: &str) -> GenerationResult<String> {
        #[derive(Serialize)]
        struct Request<'a> {
            model: &'a str,
            prompt: &'a str,
            system: &'a str,
            format: &'a str,
            stream: bool,
        }

        #[derive(Deserialize)]
        struct Response {
            response: String,
        }

        let url = format!("{}/api/generate", self.api_base_url);
        let resp = self
            .client
            .post(&url)
            .json(&Request {
                model: &self.config.model,
                prompt,
                system: system_prompt,
                format: "json",
                stream: false,
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(api_error("Ollama", status, &text));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| GenerationError::Schema(e.to_string()))?;
        Ok(result.response)
    }

    async fn gemini_chat(&self, system_prompt: &str, prompt: &str) -> GenerationResult<String> {
        #[derive(Serialize)]
        struct Request {
            contents: Vec<Content>,
            #[serde(rename = "generationConfig")]
            generation_config: GenerationConfig,
        }

        #[derive(Serialize, Deserialize)]
        struct Content {
            role: Option<String>,
            #[serde(default)]
            parts: Vec<Part>,
        }

        #[derive(Serialize, Deserialize)]
        struct Part {
            #[serde(default)]
            text: String,
        }

        #[derive(Serialize)]
        struct GenerationConfig {
            temperature: f32,
            #[serde(rename = "responseMimeType")]
            response_mime_type: &'static str,
        }

        #[derive(Deserialize)]
        struct Response {
            candidates: Option<Vec<Candidate>>,
        }

        #[derive(Deserialize)]
        struct Candidate {
            content: Content,
        }

        let api_key = self
            .config
            .api_key
            .as_ref()
            .ok_or_else(|| GenerationError::Config("Gemini requires API key".to_string()))?;

        // v1beta has no system role on every endpoint; prepend the instruction
        let full_prompt = format!("{}\n\n{}", system_prompt, prompt);

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.api_base_url, self.config.model, api_key
        );

        let resp = self
            .client
            .post(&url)
            .json(&Request {
                contents: vec![Content {
                    role: Some("user".to_string()),
                    parts: vec![Part { text: full_prompt }],
                }],
                generation_config: GenerationConfig {
                    temperature: 0.7,
                    response_mime_type: "application/json",
                },
            })
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(api_error("Gemini", status, &text));
        }

        let result: Response = resp
            .json()
            .await
            .map_err(|e| GenerationError::Schema(e.to_string()))?;

        result
            .candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| GenerationError::Schema("Gemini returned no candidates".to_string()))
    }

    fn transport_error(&self, e: reqwest::Error) -> GenerationError {
        if e.is_timeout() {
            GenerationError::Timeout(self.config.timeout_secs)
        } else {
            GenerationError::Network(e.to_string())
        }
    }
}

fn api_error(provider: &str, status: StatusCode, body: &str) -> GenerationError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => GenerationError::Api(format!(
            "{} rate limit or quota exceeded; wait and retry",
            provider
        )),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::Config(format!(
            "{} rejected the API key ({})",
            provider, status
        )),
        _ => GenerationError::Api(format!("{} error {}: {}", provider, status, body)),
    }
}
