use pressroom_core::{AuthScheme, PublishTarget};
use reqwest::RequestBuilder;

/// Attach the target's credential according to its auth scheme.
pub fn apply_auth(req: RequestBuilder, target: &PublishTarget) -> RequestBuilder {
    match &target.auth {
        AuthScheme::ApiKey { header } => req.header(header.as_str(), &target.credential),
        AuthScheme::BearerJwt => req.bearer_auth(&target.credential),
        AuthScheme::SessionBlob { header } => req.header(header.as_str(), &target.credential),
    }
}
