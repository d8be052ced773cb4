use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use latch_api::{config::LatchApiConfig, server};
use latch_db::storage::{Storage, memory::MemoryStorage, mongodb::MongoDBStorage};
use latch_engine::Engine;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = LatchApiConfig::parse();

    if config.dump_openapi {
        let engine = Engine::new(Arc::new(MemoryStorage::new()), config.engine_config());
        let (_, api) = server::make(config, engine)?;
        print!("{}", api.to_pretty_json()?);
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or("latch_api=info,latch_engine=info,latch_db=info".into()),
        )
        .pretty()
        .init();

    let db: Arc<dyn Storage> = if config.in_memory {
        warn!("Using in-memory storage, data will be lost on shutdown");
        Arc::new(MemoryStorage::new())
    } else {
        let db = MongoDBStorage::new(&config.mongodb_uri)
            .await
            .context("Failed to connect to MongoDB")?;
        db.ensure_indexes()
            .await
            .context("Failed to create MongoDB indexes")?;
        Arc::new(db)
    };

    let engine = Engine::new(db, config.engine_config());
    if let Some(every) = config.cleanup_interval() {
        info!(?every, "Scheduling periodic binding cleanup");
        server::spawn_cleanup(engine.clone(), every);
    }

    let bind_addr = config.bind_addr;
    let (router, _) = server::make(config, engine)?;

    let listener = TcpListener::bind(bind_addr)
        .await
        .context("Failed to bind to address")?;

    info!("Listening on http://{:?}", bind_addr);

    axum::serve(listener, router)
        .await
        .context("Failed to start server")?;

    Ok(())
}
