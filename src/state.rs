use std::sync::Arc;

use crate::auth::TokenService;
use crate::config::AppConfig;
use crate::database::ConnectionProvider;
use crate::middleware::ProxyTrust;

/// Shared handles injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: ConnectionProvider,
    pub tokens: Arc<TokenService>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            db: ConnectionProvider::new(config.database.clone()),
            tokens: Arc::new(TokenService::from_config(&config.security)),
            config: Arc::new(config),
        }
    }

    pub fn proxy_trust(&self) -> ProxyTrust {
        ProxyTrust::new(self.config.security.trust_proxy_headers)
    }
}
