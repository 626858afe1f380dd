use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::TokenAllocationError;
use crate::models::{
    AllocateTokenRequest, EmergencyTokenRequest, QueueMembership, Slot, Token, TokenAllocation, TokenQuery,
    TokenStatus,
};
use crate::services::slot_book::SlotBook;
use crate::services::slot_registry::SlotRegistry;
use crate::services::store::{SlotChanges, TokenStore};
use crate::services::token_number::issue_token_number;

const ALLOCATED_MESSAGE: &str = "Token allocated successfully.";
const WAITLISTED_MESSAGE: &str = "Added to waiting list. Will be allocated when slot opens.";

/// Result of a terminal transition: the finished token and whoever was
/// promoted into the seat it freed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminalTransition {
    pub token: Token,
    pub reallocated: Vec<Token>,
}

pub struct AllocationService {
    store: Arc<dyn TokenStore>,
    registry: Arc<SlotRegistry>,
}

impl AllocationService {
    pub fn new(store: Arc<dyn TokenStore>, registry: Arc<SlotRegistry>) -> Self {
        Self { store, registry }
    }

    pub fn registry(&self) -> &Arc<SlotRegistry> {
        &self.registry
    }

    async fn load_book(&self, slot: Slot) -> Result<SlotBook, TokenAllocationError> {
        let ids: Vec<Uuid> = slot
            .allocated_tokens
            .iter()
            .chain(slot.waiting_list_tokens.iter())
            .copied()
            .collect();
        let tokens = self.store.get_tokens(&ids).await?;
        Ok(SlotBook::new(slot, tokens))
    }

    async fn require_token(&self, token_id: Uuid) -> Result<Token, TokenAllocationError> {
        self.store
            .get_token(token_id)
            .await?
            .ok_or(TokenAllocationError::TokenNotFound(token_id))
    }

    /// Issue a token for the request's slot, seating it if the slot has room
    /// and waitlisting it otherwise. Emergency tokens always seat.
    #[instrument(
        skip(self, request),
        fields(
            patient_id = %request.patient_id,
            doctor_id = %request.doctor_id,
            token_type = %request.token_type
        )
    )]
    pub async fn allocate(&self, request: AllocateTokenRequest) -> Result<TokenAllocation, TokenAllocationError> {
        if request.appointment_time.trim().is_empty() {
            return Err(TokenAllocationError::MissingRequiredField("appointmentTime"));
        }

        let key = request.slot_key();
        let _guard = self.registry.lock_slot(&key).await;

        let slot = self
            .registry
            .get_or_create_slot(&key, request.doctor_name.clone())
            .await?;
        let slot_id = slot.id;
        let mut book = self.load_book(slot).await?;

        let (sequence, token_number) =
            issue_token_number(self.store.as_ref(), request.doctor_id, request.appointment_date).await?;

        let now = Utc::now();
        let token = Token {
            id: Uuid::new_v4(),
            token_number,
            sequence,
            patient_id: request.patient_id,
            patient_name: request.patient_name,
            patient_email: request.patient_email,
            doctor_id: request.doctor_id,
            doctor_name: request.doctor_name,
            appointment_date: request.appointment_date,
            appointment_time: request.appointment_time,
            token_type: request.token_type,
            priority_level: request.token_type.priority_level(),
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
        };
        let token_id = token.id;

        let membership = book.admit(token);
        let changes = book.into_changes();
        let token = changes
            .token(token_id)
            .cloned()
            .ok_or(TokenAllocationError::TokenNotFound(token_id))?;
        let slot = changes
            .slot
            .clone()
            .ok_or(TokenAllocationError::SlotNotFound(slot_id))?;

        self.store.commit(changes).await?;

        let is_on_waiting_list = membership == QueueMembership::Waitlisted;
        if is_on_waiting_list {
            info!("Token {} waitlisted for slot {}", token.token_number, key);
        } else {
            info!(
                "Token {} allocated at position {} in slot {} (load {}/{})",
                token.token_number, token.queue_position, key, slot.current_load, slot.max_capacity
            );
        }

        Ok(TokenAllocation {
            token,
            slot,
            is_on_waiting_list,
            message: if is_on_waiting_list {
                WAITLISTED_MESSAGE.to_string()
            } else {
                ALLOCATED_MESSAGE.to_string()
            },
        })
    }

    /// Allocate with type `emergency`, seating past capacity if needed.
    pub async fn add_emergency_token(
        &self,
        request: EmergencyTokenRequest,
    ) -> Result<TokenAllocation, TokenAllocationError> {
        self.allocate(request.into()).await
    }

    /// Promote waitlisted tokens into free seats. Returns the promoted tokens
    /// in serving order; empty when there was nothing to do.
    #[instrument(skip(self))]
    pub async fn reallocate_from_waitlist(&self, slot_id: Uuid) -> Result<Vec<Token>, TokenAllocationError> {
        let key = self.registry.get_slot(slot_id).await?.key();
        let _guard = self.registry.lock_slot(&key).await;

        let slot = self.registry.get_slot(slot_id).await?;
        let mut book = self.load_book(slot).await?;
        let promoted = book.promote_from_waitlist();
        if promoted.is_empty() {
            debug!("Nothing to reallocate in slot {}", slot_id);
            return Ok(Vec::new());
        }

        let changes = book.into_changes();
        let tokens = collect_promoted(&changes, &promoted);
        self.store.commit(changes).await?;

        info!("Reallocated {} tokens from waitlist in slot {}", tokens.len(), slot_id);
        Ok(tokens)
    }

    /// Call the token at the head of the slot's queue.
    #[instrument(skip(self))]
    pub async fn call_next_token(&self, slot_id: Uuid) -> Result<Token, TokenAllocationError> {
        let key = self.registry.get_slot(slot_id).await?.key();
        let _guard = self.registry.lock_slot(&key).await;

        let slot = self.registry.get_slot(slot_id).await?;
        let mut book = self.load_book(slot).await?;

        if let Some(serving) = book.serving() {
            warn!("Slot {} is still serving {}", slot_id, serving.token_number);
            return Err(TokenAllocationError::AlreadyInProgress {
                token_number: serving.token_number.clone(),
            });
        }

        let head_id = book
            .head()
            .map(|token| token.id)
            .ok_or(TokenAllocationError::QueueEmpty(slot_id))?;

        let now = Utc::now();
        if let Some(head) = book.token_mut(head_id) {
            head.status = TokenStatus::Called;
            head.called_at = Some(now);
        }

        let changes = book.into_changes();
        let token = changes
            .token(head_id)
            .cloned()
            .ok_or(TokenAllocationError::TokenNotFound(head_id))?;
        self.store.commit(changes).await?;

        info!("Called token {} in slot {}", token.token_number, slot_id);
        Ok(token)
    }

    /// `called -> in_progress`.
    #[instrument(skip(self))]
    pub async fn start_consultation(&self, token_id: Uuid) -> Result<Token, TokenAllocationError> {
        let key = self.require_token(token_id).await?.slot_key();
        let _guard = self.registry.lock_slot(&key).await;

        let mut token = self.require_token(token_id).await?;
        ensure_transition(&token, TokenStatus::InProgress)?;

        token.status = TokenStatus::InProgress;
        token.touch();

        self.store
            .commit(SlotChanges {
                tokens: vec![token.clone()],
                ..SlotChanges::default()
            })
            .await?;

        info!("Consultation started for token {}", token.token_number);
        Ok(token)
    }

    pub async fn complete_token(&self, token_id: Uuid) -> Result<TerminalTransition, TokenAllocationError> {
        self.finish(token_id, TokenStatus::Completed).await
    }

    pub async fn cancel_token(&self, token_id: Uuid) -> Result<TerminalTransition, TokenAllocationError> {
        self.finish(token_id, TokenStatus::Cancelled).await
    }

    pub async fn no_show_token(&self, token_id: Uuid) -> Result<TerminalTransition, TokenAllocationError> {
        self.finish(token_id, TokenStatus::NoShow).await
    }

    /// Move a token to a terminal status, drop it from its slot, bump the
    /// matching counter and, if it held a seat, refill the seat from the
    /// waitlist. All of it lands in one commit.
    #[instrument(skip(self))]
    async fn finish(&self, token_id: Uuid, target: TokenStatus) -> Result<TerminalTransition, TokenAllocationError> {
        let key = self.require_token(token_id).await?.slot_key();
        let _guard = self.registry.lock_slot(&key).await;

        let mut token = self.require_token(token_id).await?;
        ensure_transition(&token, target)?;

        let now = Utc::now();
        let Some(slot) = self.store.find_slot_by_key(&key).await? else {
            warn!("Token {} has no slot {}, updating the token only", token.token_number, key);
            apply_terminal(&mut token, target, now);
            self.store
                .commit(SlotChanges {
                    tokens: vec![token.clone()],
                    ..SlotChanges::default()
                })
                .await?;
            return Ok(TerminalTransition {
                token,
                reallocated: Vec::new(),
            });
        };

        let mut book = self.load_book(slot).await?;
        let membership = book.release(token_id);

        let counters = book.slot_mut();
        match target {
            TokenStatus::Completed => counters.completed_count += 1,
            TokenStatus::NoShow => counters.no_show_count += 1,
            TokenStatus::Cancelled => counters.cancelled_count += 1,
            _ => {}
        }

        let held_in_book = match book.token_mut(token_id) {
            Some(held) => {
                apply_terminal(held, target, now);
                true
            }
            None => false,
        };

        let promoted = if membership == Some(QueueMembership::Allocated) {
            book.promote_from_waitlist()
        } else {
            Vec::new()
        };

        let mut changes = book.into_changes();
        if !held_in_book {
            apply_terminal(&mut token, target, now);
            changes.tokens.push(token);
        }

        let finished = changes
            .token(token_id)
            .cloned()
            .ok_or(TokenAllocationError::TokenNotFound(token_id))?;
        let reallocated = collect_promoted(&changes, &promoted);
        self.store.commit(changes).await?;

        info!(
            "Token {} is {}; {} promoted from waitlist",
            finished.token_number,
            target,
            reallocated.len()
        );
        Ok(TerminalTransition {
            token: finished,
            reallocated,
        })
    }

    /// Remove a token record and its list membership. No counter moves and
    /// no reallocation runs.
    #[instrument(skip(self))]
    pub async fn delete_token(&self, token_id: Uuid) -> Result<Token, TokenAllocationError> {
        let key = self.require_token(token_id).await?.slot_key();
        let _guard = self.registry.lock_slot(&key).await;

        let token = self.require_token(token_id).await?;

        let mut changes = match self.store.find_slot_by_key(&key).await? {
            Some(slot) => {
                let mut book = self.load_book(slot).await?;
                book.release(token_id);
                book.into_changes()
            }
            None => SlotChanges::default(),
        };
        changes.tokens.retain(|touched| touched.id != token_id);
        changes.deleted_tokens.push(token_id);

        self.store.commit(changes).await?;
        info!("Token {} deleted", token.token_number);
        Ok(token)
    }

    pub async fn get_token(&self, token_id: Uuid) -> Result<Token, TokenAllocationError> {
        self.require_token(token_id).await
    }

    /// Matching tokens ordered by queue position; tokens without a position
    /// follow in creation order.
    pub async fn search_tokens(&self, query: &TokenQuery) -> Result<Vec<Token>, TokenAllocationError> {
        let mut tokens = self.store.search_tokens(query).await?;
        tokens.sort_by(|a, b| {
            (a.queue_position == 0, a.queue_position, a.created_at).cmp(&(
                b.queue_position == 0,
                b.queue_position,
                b.created_at,
            ))
        });
        Ok(tokens)
    }

    pub async fn tokens_by_doctor_and_date(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
    ) -> Result<Vec<Token>, TokenAllocationError> {
        let query = TokenQuery {
            doctor_id: Some(doctor_id),
            date: Some(date),
            ..TokenQuery::default()
        };
        self.search_tokens(&query).await
    }

    /// The patient's tokens still in `waiting`, newest first.
    pub async fn waiting_tokens_by_patient(&self, patient_id: Uuid) -> Result<Vec<Token>, TokenAllocationError> {
        let query = TokenQuery {
            patient_id: Some(patient_id),
            status: Some(TokenStatus::Waiting),
            ..TokenQuery::default()
        };
        let mut tokens = self.store.search_tokens(&query).await?;
        tokens.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tokens)
    }
}

fn ensure_transition(token: &Token, target: TokenStatus) -> Result<(), TokenAllocationError> {
    if token.status.can_transition_to(&target) {
        return Ok(());
    }

    warn!(
        "Rejected transition of token {} from {} to {}",
        token.token_number, token.status, target
    );
    Err(TokenAllocationError::InvalidStateTransition {
        token_id: token.id,
        from: token.status,
        to: target,
    })
}

fn apply_terminal(token: &mut Token, target: TokenStatus, now: DateTime<Utc>) {
    token.status = target;
    token.queue_position = 0;
    token.is_on_waiting_list = false;
    if target == TokenStatus::Completed {
        token.completed_at = Some(now);
    }
    token.updated_at = now;
}

fn collect_promoted(changes: &SlotChanges, promoted: &[Uuid]) -> Vec<Token> {
    let mut tokens: Vec<Token> = promoted
        .iter()
        .filter_map(|id| changes.token(*id))
        .cloned()
        .collect();
    tokens.sort_by_key(|token| token.queue_position);
    tokens
}
