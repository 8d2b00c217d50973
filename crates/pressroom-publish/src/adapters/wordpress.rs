use async_trait::async_trait;
use dashmap::DashMap;
use pressroom_core::{Artifact, ErrorKind, PublishTarget};
use serde_json::{json, Value};
use tracing::debug;

use crate::adapter::{Adapter, Receipt};
use crate::auth::apply_auth;
use crate::error::PublishError;
use crate::http::{extract_receipt, send_json};

const API_ROOT: &str = "wp-json/wp/v2";

/// WordPress REST API (`POST {endpoint}/wp-json/wp/v2/posts`).
///
/// Tags and the category are sent as term ids. Each name is looked up with
/// `?search=` and created when missing; resolved ids are cached per target.
pub struct WordPressAdapter {
    client: reqwest::Client,
    /// (target id, taxonomy, lowercased name) -> term id
    terms: DashMap<(String, &'static str, String), u64>,
}

impl WordPressAdapter {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            terms: DashMap::new(),
        }
    }

    async fn term_ids(
        &self,
        target: &PublishTarget,
        taxonomy: &'static str,
        names: &[String],
    ) -> Result<Vec<u64>, PublishError> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let id = self.term_id(target, taxonomy, name).await?;
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        Ok(ids)
    }

    async fn term_id(
        &self,
        target: &PublishTarget,
        taxonomy: &'static str,
        name: &str,
    ) -> Result<u64, PublishError> {
        let key = (target.id.clone(), taxonomy, name.to_lowercase());
        if let Some(id) = self.terms.get(&key) {
            return Ok(*id);
        }

        let url = format!("{}/{API_ROOT}/{taxonomy}", super::base_url(&target.endpoint));
        let found = send_json(
            apply_auth(self.client.get(&url), target).query(&[("search", name), ("per_page", "100")]),
        )
        .await?;
        let existing = found.as_array().and_then(|terms| {
            terms
                .iter()
                .find(|t| {
                    t["name"]
                        .as_str()
                        .is_some_and(|n| n.eq_ignore_ascii_case(name))
                })
                .and_then(|t| t["id"].as_u64())
        });

        let id = match existing {
            Some(id) => id,
            None => {
                let created =
                    send_json(apply_auth(self.client.post(&url), target).json(&json!({ "name": name })))
                        .await?;
                created["id"].as_u64().ok_or_else(|| {
                    PublishError::new(
                        ErrorKind::Validation,
                        format!("creating {taxonomy} term '{name}' returned no id"),
                    )
                })?
            }
        };
        debug!(target_id = %target.id, taxonomy, name, term_id = id, "resolved WordPress term");
        self.terms.insert(key, id);
        Ok(id)
    }
}

#[async_trait]
impl Adapter for WordPressAdapter {
    fn kind(&self) -> &str {
        "wordpress"
    }

    async fn submit(
        &self,
        artifact: &Artifact,
        target: &PublishTarget,
    ) -> Result<Receipt, PublishError> {
        let tags = self.term_ids(target, "tags", &artifact.tags).await?;
        let categories = match artifact.category {
            Some(ref category) => {
                self.term_ids(target, "categories", std::slice::from_ref(category))
                    .await?
            }
            None => Vec::new(),
        };

        let url = format!("{}/{API_ROOT}/posts", super::base_url(&target.endpoint));
        let body = json!({
            "title": artifact.title,
            "content": artifact.body,
            "status": post_status(&artifact.publish_status),
            "tags": tags,
            "categories": categories,
            "meta": {
                "ai_generated": "true",
                "generated_at": artifact.generated_at,
            },
        });

        debug!(target_id = %target.id, %url, "submitting to WordPress");
        let resp = send_json(apply_auth(self.client.post(&url), target).json(&body)).await?;
        extract_receipt(&with_link_as_url(resp))
    }
}

/// WordPress reports the public address as `link`.
fn with_link_as_url(mut resp: Value) -> Value {
    if resp["url"].is_null() {
        if let Some(link) = resp["link"].as_str().map(String::from) {
            resp["url"] = json!(link);
        }
    }
    resp
}

/// WordPress knows `publish`, `draft`, `pending` and `private`.
fn post_status(status: &str) -> &str {
    match status {
        "published" | "publish" | "public" => "publish",
        "pending" => "pending",
        "private" => "private",
        _ => "draft",
    }
}
