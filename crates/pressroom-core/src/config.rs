use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::types::{GenerationParams, PublishTarget, Schedule};

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const MAX_PAYLOAD_BYTES: usize = 64 * 1024; // inbound observer frames are tiny
pub const HANDSHAKE_TIMEOUT_MS: u64 = 10_000; // close if client doesn't send `connect` in 10s

/// Top-level config (pressroom.toml + PRESSROOM_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PressroomConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub broadcast: BroadcastConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub targets: Vec<PublishTarget>,
    /// Jobs registered at startup unless a job with the same id is stored.
    #[serde(default)]
    pub jobs: Vec<JobSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default)]
    pub auth: AuthConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub mode: AuthMode,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMode {
    Token,
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Coordinating loop cadence.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
    #[serde(default = "default_generation_timeout_secs")]
    pub generation_timeout_secs: u64,
    /// Wall-clock cap for one job-cycle. Derived from the other timeouts when unset.
    pub cycle_budget_secs: Option<u64>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
            generation_timeout_secs: default_generation_timeout_secs(),
            cycle_budget_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_submit_timeout_secs")]
    pub submit_timeout_secs: u64,
    /// Retry-After hints above this are treated as a permanent failure.
    #[serde(default = "default_max_rate_limit_wait_secs")]
    pub max_rate_limit_wait_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            submit_timeout_secs: default_submit_timeout_secs(),
            max_rate_limit_wait_secs: default_max_rate_limit_wait_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    #[serde(default = "default_max_observers")]
    pub max_observers: usize,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Consecutive unanswered heartbeats before an observer is pruned.
    #[serde(default = "default_missed_heartbeats")]
    pub missed_heartbeats: u32,
    /// Per-observer outbound queue; a full queue marks the observer as slow.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            max_observers: default_max_observers(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            missed_heartbeats: default_missed_heartbeats(),
            queue_depth: default_queue_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    /// Falls back to OPENAI_API_KEY when unset.
    pub api_key: Option<String>,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

/// Job definition declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSeed {
    pub id: String,
    pub name: String,
    pub topics: Vec<String>,
    pub schedule: Schedule,
    pub targets: Vec<String>,
    #[serde(default)]
    pub params: GenerationParams,
    #[serde(default)]
    pub paused: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.pressroom/pressroom.db", home)
}
fn default_tick_secs() -> u64 {
    30
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    4
}
fn default_base_delay_ms() -> u64 {
    2_000
}
fn default_max_delay_ms() -> u64 {
    60_000
}
fn default_submit_timeout_secs() -> u64 {
    60
}
fn default_max_rate_limit_wait_secs() -> u64 {
    300
}
fn default_max_observers() -> usize {
    64
}
fn default_heartbeat_interval_secs() -> u64 {
    30
}
fn default_missed_heartbeats() -> u32 {
    3
}
fn default_queue_depth() -> usize {
    256
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_max_tokens() -> u32 {
    2_000
}
fn default_temperature() -> f32 {
    0.7
}

impl SchedulerConfig {
    /// Budget for one cycle: generation timeout plus the worst-case retry
    /// horizon of a single target (targets run concurrently).
    pub fn cycle_budget(&self, publish: &PublishConfig) -> std::time::Duration {
        if let Some(secs) = self.cycle_budget_secs {
            return std::time::Duration::from_secs(secs);
        }
        let per_attempt = publish.submit_timeout_secs * 1000
            + publish
                .max_delay_ms
                .max(publish.max_rate_limit_wait_secs * 1000);
        let horizon_ms = per_attempt * u64::from(publish.max_attempts.max(1));
        std::time::Duration::from_millis(self.generation_timeout_secs * 1000 + horizon_ms)
    }
}

impl PressroomConfig {
    /// Load config from a TOML file with PRESSROOM_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.pressroom/pressroom.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        let config: PressroomConfig = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("PRESSROOM_").split("__"))
            .extract()
            .map_err(|e| crate::error::PressroomError::Config(e.to_string()))?;

        Ok(config)
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.pressroom/pressroom.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AuthScheme;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = PressroomConfig::default();
        assert_eq!(cfg.publish.max_attempts, 4);
        assert_eq!(cfg.broadcast.max_observers, 64);
        assert_eq!(cfg.broadcast.missed_heartbeats, 3);
        assert_eq!(cfg.scheduler.tick_secs, 30);
        assert_eq!(cfg.gateway.auth.mode, AuthMode::None);
    }

    #[test]
    fn explicit_budget_wins() {
        let sched = SchedulerConfig {
            cycle_budget_secs: Some(90),
            ..SchedulerConfig::default()
        };
        assert_eq!(
            sched.cycle_budget(&PublishConfig::default()),
            std::time::Duration::from_secs(90)
        );
    }

    #[test]
    fn derived_budget_covers_generation_and_retries() {
        let sched = SchedulerConfig::default();
        let publish = PublishConfig::default();
        let budget = sched.cycle_budget(&publish);
        // 60s generation + 4 * (60s submit + 300s rate-limit wait)
        assert_eq!(budget, std::time::Duration::from_secs(60 + 4 * 360));
    }

    #[test]
    fn loads_targets_and_jobs_from_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[gateway]
port = 9000

[gateway.auth]
mode = "token"
token = "observer-secret"

[publish]
max_attempts = 5

[[targets]]
id = "company-blog"
platform_kind = "nextjs"
endpoint = "https://example.com/api/admin/blog"
credential = "session-blob"
auth = {{ scheme = "session_blob" }}

[[jobs]]
id = "daily-ai"
name = "Daily AI post"
topics = ["AI agents", "Rust async"]
targets = ["company-blog"]
schedule = {{ kind = "daily", hour = 9, minute = 0 }}
"#
        )
        .unwrap();

        let cfg = PressroomConfig::load(file.path().to_str()).unwrap();
        assert_eq!(cfg.gateway.port, 9000);
        assert_eq!(cfg.gateway.auth.mode, AuthMode::Token);
        assert_eq!(cfg.publish.max_attempts, 5);
        // untouched sections keep their defaults
        assert_eq!(cfg.publish.max_rate_limit_wait_secs, 300);

        assert_eq!(cfg.targets.len(), 1);
        let target = &cfg.targets[0];
        assert_eq!(target.id, "company-blog");
        assert_eq!(
            target.auth,
            AuthScheme::SessionBlob {
                header: "x-admin-session".into()
            }
        );

        assert_eq!(cfg.jobs.len(), 1);
        assert_eq!(cfg.jobs[0].schedule, Schedule::Daily { hour: 9, minute: 0 });
        assert_eq!(cfg.jobs[0].params.max_words, 800);
        assert!(!cfg.jobs[0].paused);
    }
}
