pub mod error;
pub mod handlers;
pub mod models;
pub mod router;
pub mod services;
pub mod validation;

pub use error::*;
pub use models::*;
pub use router::create_token_allocation_router;
pub use services::*;

use std::sync::Arc;

use shared_config::AppConfig;
use shared_utils::rate_limit::RateLimiter;

/// Shared state of the token allocation routes.
pub struct TokenAllocationState {
    pub config: Arc<AppConfig>,
    pub allocation: Arc<AllocationService>,
    pub registry: Arc<SlotRegistry>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl TokenAllocationState {
    pub fn new(config: Arc<AppConfig>, store: Arc<dyn TokenStore>) -> Self {
        let locks = Arc::new(SlotLocks::new());
        let registry = Arc::new(SlotRegistry::new(
            store.clone(),
            locks,
            config.default_slot_capacity,
        ));
        let allocation = Arc::new(AllocationService::new(store, registry.clone()));
        let rate_limiter = Arc::new(RateLimiter::from_config(&config));

        Self {
            config,
            allocation,
            registry,
            rate_limiter,
        }
    }

    /// State over whichever store the config selects.
    pub async fn from_config(config: Arc<AppConfig>) -> Result<Self, TokenAllocationError> {
        let store = connect_store(&config).await?;
        Ok(Self::new(config, store))
    }

    pub fn in_memory(config: Arc<AppConfig>) -> Self {
        Self::new(config, Arc::new(InMemoryTokenStore::new()))
    }
}
