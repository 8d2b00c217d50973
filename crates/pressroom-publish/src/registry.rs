use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pressroom_core::PublishTarget;
use tracing::info;

use crate::adapter::Adapter;
use crate::adapters::{MediumAdapter, NextJsAdapter, RestAdapter, WordPressAdapter};

/// Maps `platform_kind` to the adapter that serves it.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn Adapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `rest`, `medium` and `nextjs` adapters sharing one client.
    pub fn with_builtin(client: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(RestAdapter::new(client.clone())));
        registry.register(Arc::new(MediumAdapter::new(client.clone())));
        registry.register(Arc::new(NextJsAdapter::new(client.clone())));
        registry.register(Arc::new(WordPressAdapter::new(client)));
        registry
    }

    /// HTTP client shared by the built-in adapters.
    pub fn default_client(connect_timeout: Duration) -> reqwest::Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .user_agent(concat!("pressroom/", env!("CARGO_PKG_VERSION")))
            .build()
    }

    /// Add or replace the adapter for its kind.
    pub fn register(&mut self, adapter: Arc<dyn Adapter>) {
        let kind = adapter.kind().to_string();
        info!(%kind, "adapter registered");
        self.adapters.insert(kind, adapter);
    }

    pub fn adapter_for(&self, target: &PublishTarget) -> Option<Arc<dyn Adapter>> {
        self.adapters.get(&target.platform_kind).cloned()
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.adapters.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}
