use latch_engine::Engine;

use crate::config::LatchApiConfig;

#[derive(Debug, Clone)]
pub struct ApiContext {
    pub config: LatchApiConfig,
    pub engine: Engine,
}

impl ApiContext {
    pub fn new(config: LatchApiConfig, engine: Engine) -> Self {
        Self { config, engine }
    }
}
