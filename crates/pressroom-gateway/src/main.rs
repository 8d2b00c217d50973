use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use pressroom_core::config::PressroomConfig;
use pressroom_core::{Artifact, EventSink, GenerationParams};
use pressroom_generator::{ArtifactGenerator, GenerationError, OpenAiGenerator};
use pressroom_publish::{AdapterRegistry, PublishOrchestrator};
use pressroom_scheduler::{Job, Scheduler, SqliteJobStore};
use tracing::{info, warn};

mod app;
mod cycle;
mod http;
mod ws;

#[derive(Parser)]
#[command(
    name = "pressroom-gateway",
    version,
    about = "Scheduled content generation and multi-platform publishing"
)]
struct Cli {
    /// Config file path (falls back to PRESSROOM_CONFIG, then ~/.pressroom/pressroom.toml)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pressroom_gateway=info,pressroom_scheduler=info,pressroom_publish=info,tower_http=info"
                    .into()
            }),
        )
        .init();

    // load config: --config > PRESSROOM_CONFIG env > ~/.pressroom/pressroom.toml
    let cli = Cli::parse();
    let config_path = cli.config.or_else(|| std::env::var("PRESSROOM_CONFIG").ok());
    let config = PressroomConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        PressroomConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");

    let db = rusqlite::Connection::open(db_path)?;
    db.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    let store = Arc::new(SqliteJobStore::new(db)?);

    // status feed: scheduler + orchestrator → broadcast manager
    let (events, mut event_rx) = EventSink::channel();

    let scheduler = Arc::new(Scheduler::load(store, events.clone())?);
    seed_jobs(&scheduler, &config);

    let client = AdapterRegistry::default_client(Duration::from_secs(10))?;
    let registry = AdapterRegistry::with_builtin(client);
    info!(kinds = ?registry.kinds(), targets = config.targets.len(), "adapter registry ready");
    let orchestrator = PublishOrchestrator::new(
        registry,
        config.targets.iter().cloned(),
        &config.publish,
        events.clone(),
    );

    let executor: Arc<dyn pressroom_scheduler::CycleExecutor> = Arc::new(cycle::PublishCycle::new(
        build_generator(&config),
        orchestrator,
        Duration::from_secs(config.scheduler.generation_timeout_secs),
        events,
    ));

    let tick = Duration::from_secs(config.scheduler.tick_secs.max(1));
    let budget = config.scheduler.cycle_budget(&config.publish);
    let heartbeat = Duration::from_secs(config.broadcast.heartbeat_interval_secs.max(1));
    let bind = config.gateway.bind.clone();
    let port = config.gateway.port;

    let state = Arc::new(app::AppState::new(config, Arc::clone(&scheduler)));
    let router = app::build_router(state.clone());

    // event pump: every status event goes through the broadcast manager
    let pump_state = Arc::clone(&state);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            pump_state.broadcast.publish_event(event);
        }
    });

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    // heartbeat sweep
    let sweep_state = Arc::clone(&state);
    let mut sweep_shutdown = shutdown_rx.clone();
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval_at(tokio::time::Instant::now() + heartbeat, heartbeat);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let pruned = sweep_state.broadcast.sweep();
                    if pruned > 0 {
                        info!(pruned, "heartbeat sweep pruned observers");
                    }
                }
                _ = sweep_shutdown.changed() => break,
            }
        }
    });

    // spawn scheduler loop in background
    let scheduler_task = tokio::spawn(scheduler.run(executor, tick, budget, shutdown_rx));

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Pressroom gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // stop the scheduler loop and the heartbeat sweep
    let _ = shutdown_tx.send(true);
    let _ = scheduler_task.await;
    info!("shutdown complete");
    Ok(())
}

/// Register config-declared jobs whose id is not stored yet.
fn seed_jobs(scheduler: &Scheduler, config: &PressroomConfig) {
    for seed in &config.jobs {
        if scheduler.get(&seed.id).is_some() {
            continue;
        }
        let job = Job::new(
            seed.id.clone(),
            seed.name.clone(),
            seed.topics.clone(),
            seed.schedule.clone(),
            seed.targets.clone(),
            seed.params.clone(),
        );
        match scheduler.register(job) {
            Ok(job) => {
                info!(job_id = %job.id, next_run_at = ?job.next_run_at, "seeded job");
                if seed.paused {
                    if let Err(e) = scheduler.pause(&job.id) {
                        warn!(job_id = %job.id, "failed to pause seeded job: {e}");
                    }
                }
            }
            Err(e) => warn!(job_id = %seed.id, "skipping seed job: {e}"),
        }
    }
}

fn build_generator(config: &PressroomConfig) -> Arc<dyn ArtifactGenerator> {
    match OpenAiGenerator::from_config(&config.generator) {
        Ok(generator) => {
            info!(model = %config.generator.model, base_url = %config.generator.base_url, "generator ready");
            Arc::new(generator)
        }
        Err(e) => {
            warn!("{e}; every cycle will fail at generation");
            Arc::new(NullGenerator)
        }
    }
}

/// Ensure the parent directory for a file path exists.
fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}

/// Placeholder generator when no API key is available.
struct NullGenerator;

#[async_trait::async_trait]
impl ArtifactGenerator for NullGenerator {
    fn name(&self) -> &str {
        "null"
    }

    async fn generate(
        &self,
        _job_id: &str,
        _topic: &str,
        _params: &GenerationParams,
    ) -> pressroom_generator::Result<Artifact> {
        Err(GenerationError::Config(
            "no generator configured; set generator.api_key in pressroom.toml".into(),
        ))
    }
}
