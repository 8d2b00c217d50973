//! Built-in platform adapters.

pub mod medium;
pub mod nextjs;
pub mod rest;
pub mod wordpress;

pub use medium::MediumAdapter;
pub use nextjs::NextJsAdapter;
pub use rest::RestAdapter;
pub use wordpress::WordPressAdapter;

/// Strip trailing slashes so `format!("{base}/path")` never doubles them.
pub(crate) fn base_url(endpoint: &str) -> &str {
    endpoint.trim_end_matches('/')
}
