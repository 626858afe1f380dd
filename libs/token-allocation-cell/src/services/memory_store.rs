use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use crate::error::TokenAllocationError;
use crate::models::{Slot, SlotKey, SlotQuery, Token, TokenQuery};
use crate::services::store::{SlotChanges, TokenStore};

#[derive(Debug, Default)]
struct MemoryState {
    slots: HashMap<Uuid, Slot>,
    slot_index: HashMap<SlotKey, Uuid>,
    tokens: HashMap<Uuid, Token>,
    sequences: HashMap<(Uuid, NaiveDate), u32>,
}

/// Process-local store. A single `RwLock` makes every commit atomic.
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    state: RwLock<MemoryState>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<Slot>, TokenAllocationError> {
        let state = self.state.read().await;
        Ok(state.slots.get(&slot_id).cloned())
    }

    async fn find_slot_by_key(&self, key: &SlotKey) -> Result<Option<Slot>, TokenAllocationError> {
        let state = self.state.read().await;
        Ok(state
            .slot_index
            .get(key)
            .and_then(|id| state.slots.get(id))
            .cloned())
    }

    async fn insert_slot_if_absent(&self, slot: Slot) -> Result<(Slot, bool), TokenAllocationError> {
        let mut state = self.state.write().await;
        let key = slot.key();

        if let Some(existing) = state.slot_index.get(&key).and_then(|id| state.slots.get(id)) {
            return Ok((existing.clone(), false));
        }

        state.slot_index.insert(key, slot.id);
        state.slots.insert(slot.id, slot.clone());
        debug!("Slot {} stored", slot.id);
        Ok((slot, true))
    }

    async fn list_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>, TokenAllocationError> {
        let state = self.state.read().await;
        Ok(state
            .slots
            .values()
            .filter(|slot| query.matches(slot))
            .cloned()
            .collect())
    }

    async fn delete_slot(&self, slot_id: Uuid) -> Result<bool, TokenAllocationError> {
        let mut state = self.state.write().await;
        match state.slots.remove(&slot_id) {
            Some(slot) => {
                state.slot_index.remove(&slot.key());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_token(&self, token_id: Uuid) -> Result<Option<Token>, TokenAllocationError> {
        let state = self.state.read().await;
        Ok(state.tokens.get(&token_id).cloned())
    }

    async fn get_tokens(&self, token_ids: &[Uuid]) -> Result<Vec<Token>, TokenAllocationError> {
        let state = self.state.read().await;
        Ok(token_ids
            .iter()
            .filter_map(|id| state.tokens.get(id))
            .cloned()
            .collect())
    }

    async fn search_tokens(&self, query: &TokenQuery) -> Result<Vec<Token>, TokenAllocationError> {
        let state = self.state.read().await;
        Ok(state
            .tokens
            .values()
            .filter(|token| query.matches(token))
            .cloned()
            .collect())
    }

    async fn count_tokens(&self, doctor_id: Uuid, date: NaiveDate) -> Result<u32, TokenAllocationError> {
        let state = self.state.read().await;
        let count = state
            .tokens
            .values()
            .filter(|token| token.doctor_id == doctor_id && token.appointment_date == date)
            .count();
        Ok(count as u32)
    }

    async fn next_token_sequence(&self, doctor_id: Uuid, date: NaiveDate) -> Result<u32, TokenAllocationError> {
        let mut state = self.state.write().await;
        let sequence = state.sequences.entry((doctor_id, date)).or_insert(0);
        *sequence += 1;
        Ok(*sequence)
    }

    async fn commit(&self, changes: SlotChanges) -> Result<(), TokenAllocationError> {
        let mut state = self.state.write().await;

        if let Some(slot) = changes.slot {
            state.slot_index.insert(slot.key(), slot.id);
            state.slots.insert(slot.id, slot);
        }

        for token in changes.tokens {
            state.tokens.insert(token.id, token);
        }

        for token_id in changes.deleted_tokens {
            state.tokens.remove(&token_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> SlotKey {
        SlotKey::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2024, 12, 28).unwrap(), "10:00 AM")
    }

    #[tokio::test]
    async fn test_insert_slot_if_absent_is_idempotent() {
        let store = InMemoryTokenStore::new();
        let key = key();

        let (first, created) = store.insert_slot_if_absent(Slot::new(key.clone(), 10, None)).await.unwrap();
        assert!(created);

        let (second, created) = store.insert_slot_if_absent(Slot::new(key.clone(), 5, None)).await.unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(second.max_capacity, 10);

        let found = store.find_slot_by_key(&key).await.unwrap().unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_sequences_are_scoped_to_doctor_and_day() {
        let store = InMemoryTokenStore::new();
        let doctor = Uuid::new_v4();
        let day = NaiveDate::from_ymd_opt(2024, 12, 28).unwrap();
        let next_day = day.succ_opt().unwrap();

        assert_eq!(store.next_token_sequence(doctor, day).await.unwrap(), 1);
        assert_eq!(store.next_token_sequence(doctor, day).await.unwrap(), 2);
        assert_eq!(store.next_token_sequence(doctor, next_day).await.unwrap(), 1);
        assert_eq!(store.next_token_sequence(Uuid::new_v4(), day).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_slot_frees_key() {
        let store = InMemoryTokenStore::new();
        let key = key();
        let (slot, _) = store.insert_slot_if_absent(Slot::new(key.clone(), 10, None)).await.unwrap();

        assert!(store.delete_slot(slot.id).await.unwrap());
        assert!(!store.delete_slot(slot.id).await.unwrap());
        assert!(store.find_slot_by_key(&key).await.unwrap().is_none());
    }
}
