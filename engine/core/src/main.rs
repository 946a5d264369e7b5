// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Buka Engine Server
//!
//! The `buka-engine` binary serves the store onboarding & crowd-verification
//! HTTP API. Backend selection comes from configuration: PostgreSQL when
//! `database_url` is set, in-memory repositories otherwise; likewise the
//! intent oracle is the HTTP client when `intent_endpoint` is set and the
//! null extractor otherwise.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use buka_core::application::{DialogueEngine, StoreLifecycleService, VerificationQuorumService};
use buka_core::config::EngineConfig;
use buka_core::domain::dialogue::IntentExtractor;
use buka_core::domain::repository::{StoreRepository, VerificationRepository};
use buka_core::infrastructure::db::Database;
use buka_core::infrastructure::event_bus::EventBus;
use buka_core::infrastructure::intent_client::{HttpIntentExtractor, NullIntentExtractor};
use buka_core::infrastructure::repositories::postgres::run_migrations;
use buka_core::infrastructure::repositories::postgres_store::PostgresStoreRepository;
use buka_core::infrastructure::repositories::postgres_verification::PostgresVerificationRepository;
use buka_core::infrastructure::repositories::InMemoryDirectory;
use buka_core::infrastructure::session_store::SessionStore;
use buka_core::presentation::api;

/// Buka store onboarding & crowd-verification engine
#[derive(Parser)]
#[command(name = "buka-engine")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, env = "BUKA_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "BUKA_LOG_LEVEL", default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level)?;

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)?,
        None => EngineConfig::default(),
    };

    let (stores, verifications): (Arc<dyn StoreRepository>, Arc<dyn VerificationRepository>) =
        match &config.database_url {
            Some(url) => {
                let database = Database::new(url)
                    .await
                    .context("Failed to connect to PostgreSQL")?;
                run_migrations(database.get_pool())
                    .await
                    .context("Failed to run schema migrations")?;
                info!("Using PostgreSQL persistence");
                (
                    Arc::new(PostgresStoreRepository::new_with_pool(
                        database.get_pool().clone(),
                    )),
                    Arc::new(PostgresVerificationRepository::new_with_pool(
                        database.get_pool().clone(),
                    )),
                )
            }
            None => {
                info!("No database configured, using in-memory repositories");
                let directory = InMemoryDirectory::new();
                (Arc::new(directory.clone()), Arc::new(directory))
            }
        };

    let extractor: Arc<dyn IntentExtractor> = match &config.intent_endpoint {
        Some(endpoint) => {
            info!(%endpoint, "Using HTTP intent extractor");
            Arc::new(HttpIntentExtractor::new(endpoint.clone()))
        }
        None => {
            info!("No intent endpoint configured, dialogue extraction unavailable");
            Arc::new(NullIntentExtractor)
        }
    };

    let event_bus = EventBus::with_default_capacity();
    let lifecycle = Arc::new(StoreLifecycleService::new(
        stores.clone(),
        event_bus.clone(),
        config.default_page_size,
        config.max_page_size,
    ));
    let verification = Arc::new(VerificationQuorumService::new(
        stores,
        verifications,
        event_bus.clone(),
        config.quorum_threshold,
        config.confirm_retry.clone(),
    ));
    let sessions = SessionStore::new(config.session_idle_timeout);
    let dialogue = Arc::new(DialogueEngine::new(
        sessions,
        extractor,
        lifecycle.clone(),
        event_bus.clone(),
        config.share_link_base.clone(),
    ));

    let app = api::app(lifecycle, verification, dialogue, event_bus);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(
        "Buka engine listening on {} (quorum threshold {})",
        config.bind_addr, config.quorum_threshold
    );
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    Ok(())
}
