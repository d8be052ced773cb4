use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use latch_db::storage::mongodb::MongoDBStorage;
use latch_engine::{DEFAULT_MAX_BATCH_SIZE, Engine, EngineConfig};

use crate::commands::{GenerateParams, ListParams, RedeemParams};

mod commands;

#[derive(Parser)]
pub struct Args {
    #[clap(subcommand)]
    command: Command,

    #[clap(
        short = 'D',
        long,
        env = "LATCH_DB_URL",
        default_value = "mongodb://localhost:27017/latch"
    )]
    db_url: String,

    #[clap(long, env = "LATCH_API_MAX_BATCH_SIZE", default_value_t = DEFAULT_MAX_BATCH_SIZE)]
    max_batch_size: u32,
}

#[derive(Clone, Subcommand)]
pub enum Command {
    /// Generate a batch of activation codes
    Generate(GenerateParams),

    /// List activation codes
    List(ListParams),

    /// Delete a code and release its machine
    Delete {
        /// ID of the code
        id: String,
    },

    /// Redeem a code on behalf of a machine
    Redeem(RedeemParams),

    /// Release machines whose code has expired
    Cleanup,

    /// Show code counts by status
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let stg = MongoDBStorage::new(&args.db_url)
        .await
        .context("Failed to connect to MongoDB")?;
    stg.ensure_indexes()
        .await
        .context("Failed to create MongoDB indexes")?;

    let engine = Engine::new(
        Arc::new(stg),
        EngineConfig {
            max_batch_size: args.max_batch_size,
        },
    );

    let mut out = std::io::stdout().lock();
    match args.command {
        Command::Generate(params) => commands::generate(&engine, params, &mut out).await,
        Command::List(params) => commands::list(&engine, params, &mut out).await,
        Command::Delete { id } => commands::delete(&engine, &id, &mut out).await,
        Command::Redeem(params) => commands::redeem(&engine, params, &mut out).await,
        Command::Cleanup => commands::cleanup(&engine, &mut out).await,
        Command::Stats => commands::stats(&engine, &mut out).await,
    }
}
