//! ---
//! psc_section: "05-agent-reasoning"
//! psc_subsection: "module"
//! psc_type: "source"
//! psc_scope: "code"
//! psc_description: "Specialist agents and coordinator synthesis."
//! psc_version: "v0.0.0-prealpha"
//! psc_owner: "tbd"
//! ---
use anyhow::{bail, Context, Result};
use reqwest::{Client as HttpClient, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::warn;

use r_psc_common::config::LlmConfig;

/// Supported chat providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    /// OpenAI-compatible API (OpenAI, Ollama, LM Studio, proxies).
    OpenAiCompatible,
    /// Google Generative AI.
    Gemini,
}

impl std::str::FromStr for LlmProvider {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" | "ollama" | "lmstudio" | "local" | "openrouter" => {
                Ok(LlmProvider::OpenAiCompatible)
            }
            "google" | "gemini" => Ok(LlmProvider::Gemini),
            other => Err(format!("unknown LLM provider: {}", other)),
        }
    }
}

/// Non-streaming chat client. One completion per call; the caller owns
/// deadlines (the driver wraps every agent in its own timeout).
pub struct LlmClient {
    http: HttpClient,
    provider: LlmProvider,
    model: String,
    base_url: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: u32,
}

impl LlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let provider: LlmProvider = config
            .provider
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        let api_key = std::env::var(&config.api_key_env).ok();
        if api_key.is_none() {
            warn!(env = %config.api_key_env, "LLM API key variable unset; requests may be rejected");
        }
        let http = HttpClient::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            provider,
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key,
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    /// One system+user completion, returning the assistant text.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAiCompatible => self.complete_openai(system, prompt).await,
            LlmProvider::Gemini => self.complete_gemini(system, prompt).await,
        }
    }

    async fn complete_openai(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = OpenAiRequest {
            model: &self.model,
            messages: vec![
                OpenAiMessage {
                    role: "system",
                    content: system,
                },
                OpenAiMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };
        let mut request = self.http.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request
            .send()
            .await
            .context("failed to send request to chat endpoint")?;
        match response.status() {
            StatusCode::OK => {
                let parsed: OpenAiResponse = response
                    .json()
                    .await
                    .context("failed to parse chat response")?;
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .ok_or_else(|| anyhow::anyhow!("chat response contained no choices"))
            }
            StatusCode::UNAUTHORIZED => bail!("authentication failed; check the API key"),
            StatusCode::TOO_MANY_REQUESTS => bail!("rate limit exceeded"),
            status => bail!("chat request failed with status {}", status),
        }
    }

    async fn complete_gemini(&self, system: &str, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            self.api_key.as_deref().unwrap_or_default()
        );
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: "user",
                parts: vec![GeminiPart {
                    text: prompt.to_owned(),
                }],
            }],
            system_instruction: Some(GeminiContent {
                role: "system",
                parts: vec![GeminiPart {
                    text: system.to_owned(),
                }],
            }),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: self.max_tokens,
                temperature: self.temperature,
            },
        };
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .context("failed to send request to Gemini")?;
        match response.status() {
            StatusCode::OK => {
                let parsed: GeminiResponse = response
                    .json()
                    .await
                    .context("failed to parse Gemini response")?;
                parsed
                    .candidates
                    .into_iter()
                    .next()
                    .and_then(|c| c.content.parts.into_iter().next())
                    .map(|p| p.text)
                    .ok_or_else(|| anyhow::anyhow!("Gemini response contained no candidates"))
            }
            StatusCode::UNAUTHORIZED => bail!("authentication failed; check the API key"),
            StatusCode::TOO_MANY_REQUESTS => bail!("rate limit exceeded"),
            status => bail!("Gemini request failed with status {}", status),
        }
    }
}

/// Narrative source for agent reasoning. `Template` keeps the kernel fully
/// deterministic; `Llm` swaps richer prose in where the call succeeds and
/// falls back to the template text where it does not.
pub enum Narrator {
    Llm(LlmClient),
    Template,
}

impl Narrator {
    pub fn from_config(config: &LlmConfig) -> Self {
        if !config.enabled {
            return Narrator::Template;
        }
        match LlmClient::from_config(config) {
            Ok(client) => Narrator::Llm(client),
            Err(err) => {
                warn!(error = %err, "LLM client unavailable; using template narration");
                Narrator::Template
            }
        }
    }

    pub fn is_llm(&self) -> bool {
        matches!(self, Narrator::Llm(_))
    }

    /// Narrative text for a recommendation. Never fails: any LLM error
    /// degrades to the deterministic fallback.
    pub async fn narrate(&self, role: &str, prompt: &str, fallback: String) -> String {
        match self {
            Narrator::Template => fallback,
            Narrator::Llm(client) => match client.complete(role, prompt).await {
                Ok(text) if !text.trim().is_empty() => text,
                Ok(_) => fallback,
                Err(err) => {
                    warn!(error = %err, "LLM narration failed; using template text");
                    fallback
                }
            },
        }
    }

    /// Raw completion for the coordinator's optional synthesis step.
    pub async fn complete(&self, system: &str, prompt: &str) -> Result<String> {
        match self {
            Narrator::Template => bail!("no LLM configured"),
            Narrator::Llm(client) => client.complete(system, prompt).await,
        }
    }
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct OpenAiMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    choices: Vec<OpenAiChoice>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: OpenAiResponseMessage,
}

#[derive(Deserialize)]
struct OpenAiResponseMessage {
    content: String,
}

#[derive(Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(rename = "generationConfig")]
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    role: &'static str,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiResponseContent,
}

#[derive(Deserialize)]
struct GeminiResponseContent {
    parts: Vec<GeminiPart>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn template_narrator_returns_fallback() {
        let narrator = Narrator::Template;
        let text = narrator
            .narrate("safety officer", "assess", "fallback text".to_owned())
            .await;
        assert_eq!(text, "fallback text");
        assert!(!narrator.is_llm());
    }

    #[test]
    fn provider_parsing() {
        assert_eq!(
            "openai".parse::<LlmProvider>().unwrap(),
            LlmProvider::OpenAiCompatible
        );
        assert_eq!("gemini".parse::<LlmProvider>().unwrap(), LlmProvider::Gemini);
        assert!("carrier-pigeon".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn disabled_config_yields_template() {
        let narrator = Narrator::from_config(&r_psc_common::config::LlmConfig::default());
        assert!(!narrator.is_llm());
    }
}
