use async_trait::async_trait;
use pressroom_core::{Artifact, PublishTarget};
use serde_json::json;
use tracing::debug;

use crate::adapter::{Adapter, Receipt};
use crate::auth::apply_auth;
use crate::error::PublishError;
use crate::http::{extract_receipt, send_json};

const EXCERPT_CHARS: usize = 150;
const WORDS_PER_MINUTE: usize = 200;

/// Next.js admin API: `POST {endpoint}` with a session blob header.
pub struct NextJsAdapter {
    client: reqwest::Client,
}

impl NextJsAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Adapter for NextJsAdapter {
    fn kind(&self) -> &str {
        "nextjs"
    }

    async fn submit(
        &self,
        artifact: &Artifact,
        target: &PublishTarget,
    ) -> Result<Receipt, PublishError> {
        let body = json!({
            "title": artifact.title,
            "content": artifact.body,
            "excerpt": excerpt(&artifact.body),
            "slug": slugify(&artifact.title),
            "read_time": read_time(artifact.word_count()),
            "category": artifact.category,
            "status": artifact.publish_status,
            "tags": artifact.tags,
            "ai_generated": true,
            "generated_at": artifact.generated_at,
        });

        debug!(target_id = %target.id, "submitting to Next.js admin API");
        let req = apply_auth(self.client.post(&target.endpoint), target).json(&body);
        extract_receipt(&send_json(req).await?)
    }
}

/// First 150 characters plus an ellipsis, or the whole body if shorter.
pub fn excerpt(body: &str) -> String {
    match body.char_indices().nth(EXCERPT_CHARS) {
        Some((idx, _)) => format!("{}...", body[..idx].trim()),
        None => body.to_string(),
    }
}

/// `"Hello, World!"` → `"hello-world"`.
pub fn slugify(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    cleaned
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Minutes at 200 wpm, never less than one.
pub fn read_time(words: usize) -> String {
    let minutes = words.div_ceil(WORDS_PER_MINUTE).max(1);
    format!("{minutes} min")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slug_strips_punctuation() {
        assert_eq!(slugify("Hello, World!"), "hello-world");
        assert_eq!(slugify("  Rust  2026: async   traits "), "rust-2026-async-traits");
    }

    #[test]
    fn excerpt_cuts_at_150_chars() {
        let short = "short body";
        assert_eq!(excerpt(short), short);

        let long = "é".repeat(400);
        let ex = excerpt(&long);
        assert_eq!(ex.chars().count(), 153);
        assert!(ex.ends_with("..."));
    }

    #[test]
    fn read_time_rounds_up() {
        assert_eq!(read_time(0), "1 min");
        assert_eq!(read_time(200), "1 min");
        assert_eq!(read_time(201), "2 min");
        assert_eq!(read_time(800), "4 min");
    }
}
