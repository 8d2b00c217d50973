use async_trait::async_trait;
use pressroom_core::{Artifact, PublishTarget};
use serde_json::json;
use tracing::debug;

use crate::adapter::{Adapter, Receipt};
use crate::auth::apply_auth;
use crate::error::PublishError;
use crate::http::{extract_receipt, send_json};

/// Generic site exposing `POST {endpoint}/api/posts`, answering `{id, url}`.
pub struct RestAdapter {
    client: reqwest::Client,
}

impl RestAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Adapter for RestAdapter {
    fn kind(&self) -> &str {
        "rest"
    }

    async fn submit(
        &self,
        artifact: &Artifact,
        target: &PublishTarget,
    ) -> Result<Receipt, PublishError> {
        let url = format!("{}/api/posts", super::base_url(&target.endpoint));
        let mut body = json!({
            "title": artifact.title,
            "content": artifact.body,
            "tags": artifact.tags,
            "status": artifact.publish_status,
            "ai_generated": true,
            "generated_at": artifact.generated_at,
        });
        if let Some(ref category) = artifact.category {
            body["category"] = json!(category);
        }

        debug!(target_id = %target.id, %url, "submitting to REST site");
        let req = apply_auth(self.client.post(&url), target)
            .header("accept", "application/json")
            .json(&body);
        extract_receipt(&send_json(req).await?)
    }
}
