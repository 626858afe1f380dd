use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::TokenAllocationError;
use crate::models::{
    CreateSlotRequest, QueueMembership, Slot, SlotDetails, SlotKey, SlotQuery, SlotStatistics, Token, TokenType,
    UpdateSlotRequest,
};
use crate::services::locks::SlotLocks;
use crate::services::store::{SlotChanges, TokenStore};

/// Per-slot capacity, load and membership lists.
pub struct SlotRegistry {
    store: Arc<dyn TokenStore>,
    locks: Arc<SlotLocks>,
    default_capacity: u32,
}

impl SlotRegistry {
    pub fn new(store: Arc<dyn TokenStore>, locks: Arc<SlotLocks>, default_capacity: u32) -> Self {
        Self {
            store,
            locks,
            default_capacity,
        }
    }

    pub fn default_capacity(&self) -> u32 {
        self.default_capacity
    }

    /// Serialize writers of one slot. Held from read to commit.
    pub async fn lock_slot(&self, key: &SlotKey) -> OwnedMutexGuard<()> {
        self.locks.acquire(key).await
    }

    /// Forget locks of slots nobody is writing to.
    pub async fn prune_locks(&self) -> usize {
        self.locks.prune().await
    }

    /// Exact-key lookup, creating an empty slot with the default capacity
    /// when none exists. Different slot names are different slots.
    pub async fn get_or_create_slot(
        &self,
        key: &SlotKey,
        doctor_name: Option<String>,
    ) -> Result<Slot, TokenAllocationError> {
        if let Some(slot) = self.store.find_slot_by_key(key).await? {
            return Ok(slot);
        }

        let (slot, created) = self
            .store
            .insert_slot_if_absent(Slot::new(key.clone(), self.default_capacity, doctor_name))
            .await?;
        if created {
            info!("Created slot {} for {} with capacity {}", slot.id, key, slot.max_capacity);
        }
        Ok(slot)
    }

    #[instrument(skip(self, request), fields(doctor_id = %request.doctor_id, slot_name = %request.slot_name))]
    pub async fn create_slot(&self, request: CreateSlotRequest) -> Result<Slot, TokenAllocationError> {
        let key = SlotKey::new(request.doctor_id, request.date, request.slot_name.clone());
        let capacity = request.max_capacity.unwrap_or(self.default_capacity);

        let mut slot = Slot::new(key.clone(), capacity, request.doctor_name);
        if let Some(start_time) = request.start_time {
            slot.start_time = start_time;
        }
        if let Some(end_time) = request.end_time {
            slot.end_time = end_time;
        }

        let (slot, created) = self.store.insert_slot_if_absent(slot).await?;
        if !created {
            return Err(TokenAllocationError::SlotAlreadyExists(key.to_string()));
        }

        info!("Slot {} created for {}", slot.id, key);
        Ok(slot)
    }

    pub async fn get_slot(&self, slot_id: Uuid) -> Result<Slot, TokenAllocationError> {
        self.store
            .get_slot(slot_id)
            .await?
            .ok_or(TokenAllocationError::SlotNotFound(slot_id))
    }

    pub async fn slot_details(&self, slot_id: Uuid) -> Result<SlotDetails, TokenAllocationError> {
        let slot = self.get_slot(slot_id).await?;
        let statistics = self.statistics_for(&slot).await?;
        Ok(SlotDetails { slot, statistics })
    }

    /// Change capacity, open flag or notes in place.
    ///
    /// Raising capacity does not promote anyone; callers run reallocation
    /// explicitly.
    #[instrument(skip(self, request))]
    pub async fn update_slot(&self, slot_id: Uuid, request: UpdateSlotRequest) -> Result<Slot, TokenAllocationError> {
        let key = self.get_slot(slot_id).await?.key();
        let _guard = self.lock_slot(&key).await;

        let mut slot = self.get_slot(slot_id).await?;
        if let Some(max_capacity) = request.max_capacity {
            slot.max_capacity = max_capacity;
        }
        if let Some(is_open) = request.is_open {
            slot.is_open = is_open;
        }
        if let Some(notes) = request.notes {
            slot.notes = Some(notes);
        }
        slot.refresh_is_full();
        slot.updated_at = Utc::now();

        self.store.commit(SlotChanges::slot_only(slot.clone())).await?;
        debug!("Slot {} updated", slot_id);
        Ok(slot)
    }

    /// Remove the slot record. Its tokens are left in place.
    #[instrument(skip(self))]
    pub async fn delete_slot(&self, slot_id: Uuid) -> Result<Slot, TokenAllocationError> {
        let key = self.get_slot(slot_id).await?.key();
        let _guard = self.lock_slot(&key).await;

        let slot = self.get_slot(slot_id).await?;
        self.store.delete_slot(slot_id).await?;
        info!("Slot {} deleted for {}", slot_id, key);
        Ok(slot)
    }

    /// Slots ordered by date, then slot name.
    pub async fn list_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>, TokenAllocationError> {
        let mut slots = self.store.list_slots(query).await?;
        slots.sort_by(|a, b| a.date.cmp(&b.date).then_with(|| a.slot_name.cmp(&b.slot_name)));
        Ok(slots)
    }

    pub async fn slots_by_doctor(
        &self,
        doctor_id: Uuid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Slot>, TokenAllocationError> {
        let query = SlotQuery {
            doctor_id: Some(doctor_id),
            date,
            ..SlotQuery::default()
        };
        self.list_slots(&query).await
    }

    pub async fn available_slots(
        &self,
        doctor_id: Option<Uuid>,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Slot>, TokenAllocationError> {
        self.list_slots(&SlotQuery::available(doctor_id, date)).await
    }

    /// Read-only projection; takes no lock.
    pub async fn statistics(&self, slot_id: Uuid) -> Result<SlotStatistics, TokenAllocationError> {
        let slot = self.get_slot(slot_id).await?;
        self.statistics_for(&slot).await
    }

    async fn statistics_for(&self, slot: &Slot) -> Result<SlotStatistics, TokenAllocationError> {
        let ids: Vec<Uuid> = slot
            .allocated_tokens
            .iter()
            .chain(slot.waiting_list_tokens.iter())
            .copied()
            .collect();
        let tokens = self.store.get_tokens(&ids).await?;
        Ok(compute_statistics(slot, &tokens))
    }
}

/// Per-type counts of a slot's two lists plus its terminal counters.
pub fn compute_statistics(slot: &Slot, tokens: &[Token]) -> SlotStatistics {
    let mut allocated_by_type: BTreeMap<TokenType, u32> = BTreeMap::new();
    let mut waitlist_by_type: BTreeMap<TokenType, u32> = BTreeMap::new();

    for token in tokens {
        match slot.membership_of(token.id) {
            Some(QueueMembership::Allocated) => *allocated_by_type.entry(token.token_type).or_default() += 1,
            Some(QueueMembership::Waitlisted) => *waitlist_by_type.entry(token.token_type).or_default() += 1,
            None => {}
        }
    }

    SlotStatistics {
        slot: slot.summary(),
        allocated_count: slot.allocated_tokens.len() as u32,
        allocated_by_type,
        waitlist_count: slot.waiting_list_tokens.len() as u32,
        waitlist_by_type,
        completed_count: slot.completed_count,
        no_show_count: slot.no_show_count,
        cancelled_count: slot.cancelled_count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenStatus;

    fn token(slot: &Slot, token_type: TokenType) -> Token {
        let now = Utc::now();
        Token {
            id: Uuid::new_v4(),
            token_number: "TOKEN-TEST".to_string(),
            sequence: 1,
            patient_id: Uuid::new_v4(),
            patient_name: None,
            patient_email: None,
            doctor_id: slot.doctor_id,
            doctor_name: None,
            appointment_date: slot.date,
            appointment_time: slot.slot_name.clone(),
            token_type,
            priority_level: token_type.priority_level(),
            status: TokenStatus::Waiting,
            queue_position: 0,
            is_on_waiting_list: false,
            is_reallocated: false,
            notes: None,
            allocated_at: now,
            called_at: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_statistics_group_by_list_and_type() {
        let key = SlotKey::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2024, 12, 28).unwrap(), "09:00 AM");
        let mut slot = Slot::new(key, 2, None);

        let walk_in = token(&slot, TokenType::WalkIn);
        let second_walk_in = token(&slot, TokenType::WalkIn);
        let paid = token(&slot, TokenType::PaidPriority);
        let stray = token(&slot, TokenType::Emergency);

        slot.allocated_tokens = vec![walk_in.id, second_walk_in.id];
        slot.waiting_list_tokens = vec![paid.id];
        slot.current_load = 2;
        slot.cancelled_count = 3;

        let stats = compute_statistics(&slot, &[walk_in, second_walk_in, paid, stray]);
        assert_eq!(stats.allocated_count, 2);
        assert_eq!(stats.allocated_by_type.get(&TokenType::WalkIn), Some(&2));
        assert_eq!(stats.waitlist_count, 1);
        assert_eq!(stats.waitlist_by_type.get(&TokenType::PaidPriority), Some(&1));
        assert!(!stats.allocated_by_type.contains_key(&TokenType::Emergency));
        assert_eq!(stats.cancelled_count, 3);
        assert_eq!(stats.slot.available_spots, 0);
    }
}
