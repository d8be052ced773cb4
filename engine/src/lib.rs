//! The activation-code engine.
//!
//! [`Engine`] exposes the operations the outside world may perform on codes:
//!
//! - [`Engine::generate`] creates a batch of codes with one validity policy.
//! - [`Engine::redeem`] binds a code to a machine, once.
//! - [`Engine::list`] and [`Engine::delete`] back the admin console.
//! - [`Engine::cleanup_expired_bindings`] frees machines whose code expired.
//! - [`Engine::stats`] produces the dashboard counts.
//!
//! Every operation that depends on time takes `now` as an argument. Whether a
//! code is expired is always decided by [`latch_common::expiry`].

use std::{fmt, sync::Arc};

use latch_db::{
    models::DbUlidSequence,
    storage::{Storage, StoreError},
};
use parking_lot::Mutex;

mod catalog;
mod error;
mod generator;
mod maintenance;
mod redeem;

pub use error::{EngineError, EngineResult};
pub use generator::generate_token;

/// Largest batch accepted by [`Engine::generate`] unless configured otherwise.
pub const DEFAULT_MAX_BATCH_SIZE: u32 = 1000;

#[derive(Debug, Clone, Copy)]
pub struct EngineConfig {
    /// Upper bound for the `amount` of a generation request.
    pub max_batch_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    db: Arc<dyn Storage>,
    config: EngineConfig,

    /// Shared so ids stay in creation order across batches.
    ids: Arc<Mutex<DbUlidSequence>>,
}

impl Engine {
    pub fn new(db: Arc<dyn Storage>, config: EngineConfig) -> Self {
        Self {
            db,
            config,
            ids: Arc::new(Mutex::new(DbUlidSequence::new())),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn ping(&self) -> Result<(), StoreError> {
        self.db.ping().await
    }
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
