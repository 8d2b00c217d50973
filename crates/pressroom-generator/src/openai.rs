use async_trait::async_trait;
use pressroom_core::config::GeneratorConfig;
use pressroom_core::{Artifact, GenerationParams};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::content::{finish, parse_reply};
use crate::error::{GenerationError, Result};
use crate::ArtifactGenerator;

const SYSTEM_PROMPT: &str =
    "You are an expert content writer who creates engaging, well-structured blog posts.";

/// Generator backed by an OpenAI-compatible chat completions endpoint.
pub struct OpenAiGenerator {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAiGenerator {
    /// Build from config; the key falls back to `OPENAI_API_KEY`.
    pub fn from_config(cfg: &GeneratorConfig) -> Result<Self> {
        let api_key = cfg
            .api_key
            .clone()
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .filter(|k| !k.is_empty())
            .ok_or_else(|| {
                GenerationError::Config(
                    "generator.api_key is not set and OPENAI_API_KEY is empty".into(),
                )
            })?;
        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: cfg.temperature,
        })
    }
}

#[async_trait]
impl ArtifactGenerator for OpenAiGenerator {
    fn name(&self) -> &str {
        "openai"
    }

    async fn generate(
        &self,
        job_id: &str,
        topic: &str,
        params: &GenerationParams,
    ) -> Result<Artifact> {
        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(topic, params) },
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
            "response_format": { "type": "json_object" },
        });

        debug!(job_id, model = %self.model, %topic, "requesting draft");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            warn!(job_id, status, body = %text, "generator API error");
            return Err(GenerationError::Api {
                status,
                message: text,
            });
        }

        let api_resp: ApiResponse = resp
            .json()
            .await
            .map_err(|e| GenerationError::Parse(e.to_string()))?;
        let reply = api_resp
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| GenerationError::Parse("model returned no content".into()))?;

        let draft = finish(parse_reply(&reply, topic), topic, params.max_words);
        info!(job_id, title = %draft.title, words = draft.content.split_whitespace().count(), "draft generated");

        Ok(
            Artifact::new(job_id, topic, draft.title, draft.content, draft.tags)
                .with_post_options(params),
        )
    }
}

fn build_prompt(topic: &str, params: &GenerationParams) -> String {
    let (tone, structure) = params.style.template();
    let category = params
        .category
        .as_deref()
        .map(|c| format!("\n- Category: {c}"))
        .unwrap_or_default();
    format!(
        "Create a high-quality blog post about \"{topic}\" for {audience}.\n\
         \n\
         Requirements:\n\
         - Maximum {max_words} words\n\
         - Writing style: {tone}\n\
         - Structure: {structure}\n\
         - Include an engaging title\n\
         - Add relevant subheadings (H2, H3)\n\
         - Include 3-5 relevant tags{category}\n\
         \n\
         Respond with a JSON object: {{\"title\": string, \"content\": markdown string, \"tags\": [string]}}",
        audience = params.audience,
        max_words = params.max_words,
    )
}

#[derive(Deserialize)]
struct ApiResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}
