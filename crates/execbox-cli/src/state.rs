//! Application state

use std::sync::Arc;

use execbox::{Config, ConfigError, HealthProbe, Runner};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<Runner>,
    pub probe: Arc<HealthProbe>,
}

impl AppState {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let runner = Runner::new(config)?;
        let probe = HealthProbe::new(runner.config(), runner.registry());

        Ok(Self {
            runner: Arc::new(runner),
            probe: Arc::new(probe),
        })
    }
}
