use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use chrono::Utc;
use tracing::warn;
use uuid::Uuid;

use crate::models::{QueueMembership, Slot, Token};
use crate::services::store::SlotChanges;

/// Serving order: priority descending, then creation time, then issue sequence.
pub fn priority_order(a: &Token, b: &Token) -> Ordering {
    b.priority_level
        .cmp(&a.priority_level)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.sequence.cmp(&b.sequence))
}

/// Working copy of one slot: the slot record with its two ordered id lists,
/// and an arena of the token records those lists point at.
///
/// All queue mutations happen here; the caller persists the result with a
/// single [`SlotChanges`] commit.
#[derive(Debug, Clone)]
pub struct SlotBook {
    slot: Slot,
    tokens: HashMap<Uuid, Token>,
    touched: BTreeSet<Uuid>,
}

impl SlotBook {
    pub fn new(mut slot: Slot, tokens: Vec<Token>) -> Self {
        let tokens: HashMap<Uuid, Token> = tokens.into_iter().map(|token| (token.id, token)).collect();

        let allocated_before = slot.allocated_tokens.len();
        slot.allocated_tokens.retain(|id| tokens.contains_key(id));
        slot.waiting_list_tokens.retain(|id| tokens.contains_key(id));

        let dangling = allocated_before - slot.allocated_tokens.len();
        if dangling > 0 {
            warn!(
                "Slot {} referenced {} missing allocated tokens, dropping them",
                slot.id, dangling
            );
            slot.current_load = slot.current_load.saturating_sub(dangling as u32);
            slot.refresh_is_full();
        }

        Self {
            slot,
            tokens,
            touched: BTreeSet::new(),
        }
    }

    pub fn slot(&self) -> &Slot {
        &self.slot
    }

    pub fn slot_mut(&mut self) -> &mut Slot {
        &mut self.slot
    }

    pub fn token(&self, token_id: Uuid) -> Option<&Token> {
        self.tokens.get(&token_id)
    }

    /// Mutable access marks the token for persistence.
    pub fn token_mut(&mut self, token_id: Uuid) -> Option<&mut Token> {
        let token = self.tokens.get_mut(&token_id)?;
        self.touched.insert(token_id);
        Some(token)
    }

    /// Allocated tokens in serving order.
    pub fn allocated(&self) -> Vec<&Token> {
        self.slot
            .allocated_tokens
            .iter()
            .filter_map(|id| self.tokens.get(id))
            .collect()
    }

    pub fn waitlisted(&self) -> Vec<&Token> {
        self.slot
            .waiting_list_tokens
            .iter()
            .filter_map(|id| self.tokens.get(id))
            .collect()
    }

    /// Token at queue position 1.
    pub fn head(&self) -> Option<&Token> {
        self.slot
            .allocated_tokens
            .first()
            .and_then(|id| self.tokens.get(id))
    }

    /// First allocated token that is currently called or in consultation.
    pub fn serving(&self) -> Option<&Token> {
        self.allocated()
            .into_iter()
            .find(|token| token.status.is_being_served())
    }

    /// Seat a new token or put it on the waitlist.
    ///
    /// The capacity check reads the load before this token is counted.
    /// Emergency tokens skip the check and may push the load past capacity.
    pub fn admit(&mut self, mut token: Token) -> QueueMembership {
        let seated = token.token_type.bypasses_capacity() || self.slot.has_capacity();
        let token_id = token.id;

        let membership = if seated {
            token.is_on_waiting_list = false;
            self.slot.allocated_tokens.push(token_id);
            self.slot.current_load += 1;
            QueueMembership::Allocated
        } else {
            token.is_on_waiting_list = true;
            token.queue_position = 0;
            self.slot.waiting_list_tokens.push(token_id);
            QueueMembership::Waitlisted
        };

        self.tokens.insert(token_id, token);
        self.touched.insert(token_id);
        self.slot.refresh_is_full();

        let overflow = self.slot.overflow();
        if membership == QueueMembership::Allocated && overflow > 0 {
            self.slot.notes = Some(format!(
                "Emergency token added. Capacity exceeded by {}",
                overflow
            ));
        }

        self.reorder_allocated();
        membership
    }

    /// Promote waitlisted tokens into free seats, best priority first.
    /// Returns the promoted ids; no-op when there is no free seat or no waitlist.
    pub fn promote_from_waitlist(&mut self) -> Vec<Uuid> {
        let available = self.slot.available_spots() as usize;
        if available == 0 || self.slot.waiting_list_tokens.is_empty() {
            return Vec::new();
        }

        self.sort_waitlist();

        let take = available.min(self.slot.waiting_list_tokens.len());
        let promoted: Vec<Uuid> = self.slot.waiting_list_tokens.drain(..take).collect();
        let now = Utc::now();

        for token_id in &promoted {
            if let Some(token) = self.tokens.get_mut(token_id) {
                token.is_on_waiting_list = false;
                token.is_reallocated = true;
                token.updated_at = now;
            }
            self.touched.insert(*token_id);
            self.slot.allocated_tokens.push(*token_id);
            self.slot.current_load += 1;
        }

        self.slot.refresh_is_full();
        self.reorder_allocated();
        promoted
    }

    /// Take a token out of whichever list holds it.
    /// Returns the list it was removed from.
    pub fn release(&mut self, token_id: Uuid) -> Option<QueueMembership> {
        let membership = self.slot.membership_of(token_id)?;

        match membership {
            QueueMembership::Allocated => {
                self.slot.allocated_tokens.retain(|id| *id != token_id);
                self.slot.current_load = self.slot.current_load.saturating_sub(1);
                self.slot.refresh_is_full();
            }
            QueueMembership::Waitlisted => {
                self.slot.waiting_list_tokens.retain(|id| *id != token_id);
            }
        }

        if let Some(token) = self.token_mut(token_id) {
            token.queue_position = 0;
            token.is_on_waiting_list = false;
        }

        if membership == QueueMembership::Allocated {
            self.reorder_allocated();
        }

        Some(membership)
    }

    /// Re-sort the allocated list and rewrite every position as 1..N.
    pub fn reorder_allocated(&mut self) {
        let tokens = &self.tokens;
        self.slot.allocated_tokens.sort_by(|a, b| match (tokens.get(a), tokens.get(b)) {
            (Some(a), Some(b)) => priority_order(a, b),
            _ => Ordering::Equal,
        });

        for (index, token_id) in self.slot.allocated_tokens.iter().enumerate() {
            let position = index as u32 + 1;
            if let Some(token) = self.tokens.get_mut(token_id) {
                if token.queue_position != position {
                    token.queue_position = position;
                    self.touched.insert(*token_id);
                }
            }
        }
    }

    fn sort_waitlist(&mut self) {
        let tokens = &self.tokens;
        self.slot.waiting_list_tokens.sort_by(|a, b| match (tokens.get(a), tokens.get(b)) {
            (Some(a), Some(b)) => priority_order(a, b),
            _ => Ordering::Equal,
        });
    }

    pub fn into_changes(mut self) -> SlotChanges {
        let now = Utc::now();
        self.slot.updated_at = now;

        let mut tokens = Vec::with_capacity(self.touched.len());
        for token_id in &self.touched {
            if let Some(mut token) = self.tokens.remove(token_id) {
                token.updated_at = now;
                tokens.push(token);
            }
        }

        SlotChanges {
            slot: Some(self.slot),
            tokens,
            deleted_tokens: Vec::new(),
        }
    }
}
