use clap::Parser;
use std::{net::SocketAddr, time::Duration};

use latch_engine::{DEFAULT_MAX_BATCH_SIZE, EngineConfig};

#[derive(Clone, Debug, Parser)]
pub struct LatchApiConfig {
    #[clap(
        short,
        long,
        env = "LATCH_API_BIND_ADDR",
        default_value = "0.0.0.0:4000"
    )]
    pub bind_addr: SocketAddr,

    /// Origin of the admin console, allowed by CORS.
    #[clap(
        long,
        env = "LATCH_API_PUBLIC_URL",
        default_value = "http://localhost:4000"
    )]
    pub public_url: String,

    #[clap(long, default_value_t = false)]
    pub dump_openapi: bool,

    /// MongoDB connection string. The server must be a replica set, since
    /// redemptions run in transactions.
    #[clap(
        long,
        env = "LATCH_API_MONGODB_URI",
        default_value = "mongodb://localhost:27017/latch"
    )]
    pub mongodb_uri: String,

    /// Keep everything in process memory instead of MongoDB. Data is lost on
    /// restart.
    #[clap(long, env = "LATCH_API_IN_MEMORY", default_value_t = false)]
    pub in_memory: bool,

    /// Name shown to visitors of the public pages.
    #[clap(long, env = "LATCH_API_SYSTEM_NAME", default_value = "Latch")]
    pub system_name: String,

    /// Largest number of codes a single generate request may ask for.
    #[clap(long, env = "LATCH_API_MAX_BATCH_SIZE", default_value_t = DEFAULT_MAX_BATCH_SIZE)]
    pub max_batch_size: u32,

    /// Release bindings of expired codes every this many seconds. Zero
    /// disables the background task.
    #[clap(long, env = "LATCH_API_CLEANUP_INTERVAL_SECS", default_value_t = 0)]
    pub cleanup_interval_secs: u64,
}

impl LatchApiConfig {
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_batch_size: self.max_batch_size,
        }
    }

    pub fn cleanup_interval(&self) -> Option<Duration> {
        (self.cleanup_interval_secs > 0).then(|| Duration::from_secs(self.cleanup_interval_secs))
    }
}
