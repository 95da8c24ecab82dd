//! Application state for dependency injection.

use std::sync::Arc;

use fiscal_service_lib::service::FiscalService;

use crate::config::GatewayConfig;
use crate::middleware::{Cache, TokenVerifier};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub fiscal: Arc<dyn FiscalService>,
    pub cache: Arc<Cache>,
    pub tokens: Arc<TokenVerifier>,
    pub config: GatewayConfig,
}

impl AppState {
    /// Create new app state.
    pub fn new(fiscal: Arc<dyn FiscalService>, cache: Arc<Cache>, config: GatewayConfig) -> Self {
        let tokens = Arc::new(TokenVerifier::new(&config.jwt));
        Self {
            fiscal,
            cache,
            tokens,
            config,
        }
    }
}
