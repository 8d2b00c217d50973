use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::RequestBuilder;
use serde_json::Value;
use tracing::debug;

use crate::adapter::Receipt;
use crate::error::PublishError;
use pressroom_core::ErrorKind;

/// Send `req` and return the JSON body of a 2xx response. Anything else is
/// mapped to a [`PublishError`] carrying the status and Retry-After hint.
pub async fn send_json(req: RequestBuilder) -> Result<Value, PublishError> {
    let resp = req.send().await?;
    let status = resp.status().as_u16();

    if !resp.status().is_success() {
        let retry_after = retry_after_hint(resp.headers());
        let body = resp.text().await.unwrap_or_default();
        debug!(status, ?retry_after, "platform rejected submission");
        return Err(PublishError::from_status(status, retry_after, &body));
    }

    let text = resp.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text).map_err(|e| PublishError {
        kind: ErrorKind::Validation,
        http_status: Some(status),
        retry_after: None,
        message: format!("unreadable response body: {e}"),
    })
}

/// Numeric `Retry-After` (delta-seconds). HTTP-date values are ignored.
pub fn retry_after_hint(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Pull `{id, url}` out of a response, looking at the top level and under
/// `data`. `id` may be a string or a number; `_id` and `slug` are accepted as
/// fallbacks for the id and url respectively.
pub fn extract_receipt(body: &Value) -> Result<Receipt, PublishError> {
    let candidates = [body, &body["data"]];
    for obj in candidates {
        let id = scalar(&obj["id"]).or_else(|| scalar(&obj["_id"]));
        if let Some(platform_id) = id {
            let published_url = obj["url"]
                .as_str()
                .or_else(|| obj["slug"].as_str())
                .map(String::from);
            return Ok(Receipt {
                platform_id,
                published_url,
            });
        }
    }
    Err(PublishError::new(
        ErrorKind::Validation,
        "platform accepted the request but returned no post id",
    ))
}

fn scalar(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn receipt_from_flat_and_nested_bodies() {
        let flat = extract_receipt(&json!({"id": "p1", "url": "https://x/p1"})).unwrap();
        assert_eq!(flat.platform_id, "p1");
        assert_eq!(flat.published_url.as_deref(), Some("https://x/p1"));

        let nested = extract_receipt(&json!({"data": {"id": 42, "url": "https://m/42"}})).unwrap();
        assert_eq!(nested.platform_id, "42");

        let mongo = extract_receipt(&json!({"_id": "abc", "slug": "hello-world"})).unwrap();
        assert_eq!(mongo.platform_id, "abc");
        assert_eq!(mongo.published_url.as_deref(), Some("hello-world"));
    }

    #[test]
    fn missing_id_is_a_validation_error() {
        let err = extract_receipt(&json!({"ok": true})).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Validation);
        assert!(extract_receipt(&Value::Null).is_err());
    }

    #[test]
    fn retry_after_parses_seconds_only() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "5".parse().unwrap());
        assert_eq!(retry_after_hint(&headers), Some(Duration::from_secs(5)));

        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2026 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after_hint(&headers), None);
    }
}
