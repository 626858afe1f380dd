use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use tracing::info;
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::TokenAllocationError;
use crate::models::{Slot, SlotKey, SlotQuery, Token, TokenQuery};
use crate::services::memory_store::InMemoryTokenStore;
use crate::services::redis_store::RedisTokenStore;

/// Everything one operation writes, applied by [`TokenStore::commit`] as a unit.
#[derive(Debug, Clone, Default)]
pub struct SlotChanges {
    pub slot: Option<Slot>,
    pub tokens: Vec<Token>,
    pub deleted_tokens: Vec<Uuid>,
}

impl SlotChanges {
    pub fn slot_only(slot: Slot) -> Self {
        Self {
            slot: Some(slot),
            ..Self::default()
        }
    }

    pub fn token(&self, token_id: Uuid) -> Option<&Token> {
        self.tokens.iter().find(|token| token.id == token_id)
    }

    pub fn is_empty(&self) -> bool {
        self.slot.is_none() && self.tokens.is_empty() && self.deleted_tokens.is_empty()
    }
}

/// Persistence for slots and tokens.
///
/// `commit` must apply all of its changes or none of them, and
/// `next_token_sequence` must be atomic per (doctor, date).
#[async_trait]
pub trait TokenStore: Send + Sync + 'static {
    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<Slot>, TokenAllocationError>;

    async fn find_slot_by_key(&self, key: &SlotKey) -> Result<Option<Slot>, TokenAllocationError>;

    /// Store `slot` unless another slot already has its key.
    /// Returns the stored slot and whether it was newly created.
    async fn insert_slot_if_absent(&self, slot: Slot) -> Result<(Slot, bool), TokenAllocationError>;

    async fn list_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>, TokenAllocationError>;

    async fn delete_slot(&self, slot_id: Uuid) -> Result<bool, TokenAllocationError>;

    async fn get_token(&self, token_id: Uuid) -> Result<Option<Token>, TokenAllocationError>;

    /// Tokens for the given ids; unknown ids are skipped.
    async fn get_tokens(&self, token_ids: &[Uuid]) -> Result<Vec<Token>, TokenAllocationError>;

    async fn search_tokens(&self, query: &TokenQuery) -> Result<Vec<Token>, TokenAllocationError>;

    /// Number of tokens currently stored for a doctor on a day.
    async fn count_tokens(&self, doctor_id: Uuid, date: NaiveDate) -> Result<u32, TokenAllocationError>;

    /// Next issue sequence for a doctor on a day, starting at 1.
    async fn next_token_sequence(&self, doctor_id: Uuid, date: NaiveDate) -> Result<u32, TokenAllocationError>;

    async fn commit(&self, changes: SlotChanges) -> Result<(), TokenAllocationError>;
}

/// Redis when configured, memory otherwise.
pub async fn connect_store(config: &AppConfig) -> Result<Arc<dyn TokenStore>, TokenAllocationError> {
    if config.is_redis_configured() {
        let store = RedisTokenStore::new(config).await?;
        info!("Using Redis token store");
        Ok(Arc::new(store))
    } else {
        info!("Using in-memory token store");
        Ok(Arc::new(InMemoryTokenStore::new()))
    }
}
