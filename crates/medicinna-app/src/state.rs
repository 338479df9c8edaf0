use std::sync::Arc;

use medicinna_client::SessionContext;
use medicinna_config::Config;
use tokio::sync::RwLock;

pub struct AppState {
    pub config: Arc<RwLock<Config>>,
    pub session: SessionContext,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            session: SessionContext::new(),
        }
    }
}
