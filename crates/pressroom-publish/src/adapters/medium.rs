use async_trait::async_trait;
use dashmap::DashMap;
use pressroom_core::{Artifact, ErrorKind, PublishTarget};
use serde_json::json;
use tracing::debug;

use crate::adapter::{Adapter, Receipt};
use crate::auth::apply_auth;
use crate::error::PublishError;
use crate::http::{extract_receipt, send_json};

/// Medium accepts at most five tags per post.
const MAX_TAGS: usize = 5;

/// Medium publishing API. Needs the author id, resolved once per target via
/// `GET {endpoint}/me` and cached.
pub struct MediumAdapter {
    client: reqwest::Client,
    user_ids: DashMap<String, String>,
}

impl MediumAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            user_ids: DashMap::new(),
        }
    }

    async fn user_id(&self, target: &PublishTarget) -> Result<String, PublishError> {
        if let Some(id) = self.user_ids.get(&target.id) {
            return Ok(id.clone());
        }
        let url = format!("{}/me", super::base_url(&target.endpoint));
        let body = send_json(apply_auth(self.client.get(&url), target)).await?;
        let id = body["data"]["id"]
            .as_str()
            .map(String::from)
            .ok_or_else(|| PublishError::new(ErrorKind::Validation, "/me returned no user id"))?;
        debug!(target_id = %target.id, user_id = %id, "resolved Medium author");
        self.user_ids.insert(target.id.clone(), id.clone());
        Ok(id)
    }
}

#[async_trait]
impl Adapter for MediumAdapter {
    fn kind(&self) -> &str {
        "medium"
    }

    async fn submit(
        &self,
        artifact: &Artifact,
        target: &PublishTarget,
    ) -> Result<Receipt, PublishError> {
        let user_id = self.user_id(target).await?;
        let url = format!(
            "{}/users/{}/posts",
            super::base_url(&target.endpoint),
            user_id
        );
        let tags: Vec<&String> = artifact.tags.iter().take(MAX_TAGS).collect();
        let body = json!({
            "title": artifact.title,
            "contentFormat": "markdown",
            "content": artifact.body,
            "publishStatus": publish_status(&artifact.publish_status),
            "tags": tags,
            "notifyFollowers": false,
        });

        let req = apply_auth(self.client.post(&url), target).json(&body);
        match send_json(req).await {
            Ok(resp) => extract_receipt(&resp),
            Err(e) => {
                if e.kind == ErrorKind::Auth {
                    // Token may have been rotated to another account.
                    self.user_ids.remove(&target.id);
                }
                Err(e)
            }
        }
    }
}

/// Medium knows `public`, `draft` and `unlisted`.
fn publish_status(status: &str) -> &str {
    match status {
        "published" | "publish" | "public" => "public",
        "unlisted" => "unlisted",
        _ => "draft",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(publish_status("published"), "public");
        assert_eq!(publish_status("unlisted"), "unlisted");
        assert_eq!(publish_status("draft"), "draft");
        assert_eq!(publish_status("private"), "draft");
    }
}
