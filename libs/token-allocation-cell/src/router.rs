use std::sync::Arc;
use axum::{
    Router,
    routing::{get, patch, post},
    middleware,
};

use shared_utils::rate_limit::rate_limit_middleware;
use crate::handlers::{
    available_slots,
    call_next_token,
    cancel_token,
    complete_token,
    create_emergency_token,
    create_slot,
    create_token,
    delete_slot,
    delete_token,
    get_slot,
    get_token,
    list_slots,
    no_show_token,
    reallocate_slot,
    search_tokens,
    slot_statistics,
    slots_by_doctor,
    start_token,
    tokens_by_doctor_and_date,
    update_slot,
    waiting_tokens_by_patient,
};
use crate::TokenAllocationState;

pub fn create_token_allocation_router(state: Arc<TokenAllocationState>) -> Router {
    let token_routes = Router::new()
        .route("/tokens", get(search_tokens).post(create_token))
        .route("/tokens/emergency", post(create_emergency_token))
        .route("/tokens/call", patch(call_next_token))
        .route("/tokens/doctor/{doctor_id}/date/{date}", get(tokens_by_doctor_and_date))
        .route("/tokens/patient/{patient_id}", get(waiting_tokens_by_patient))
        .route("/tokens/{id}", get(get_token).delete(delete_token))
        .route("/tokens/{id}/start", patch(start_token))
        .route("/tokens/{id}/complete", patch(complete_token))
        .route("/tokens/{id}/cancel", patch(cancel_token))
        .route("/tokens/{id}/no-show", patch(no_show_token));

    let slot_routes = Router::new()
        .route("/slots", get(list_slots).post(create_slot))
        .route("/slots/available", get(available_slots))
        .route("/slots/doctor/{doctor_id}", get(slots_by_doctor))
        .route("/slots/{id}", get(get_slot).patch(update_slot).delete(delete_slot))
        .route("/slots/{id}/statistics", get(slot_statistics))
        .route("/slots/{id}/reallocate", post(reallocate_slot));

    Router::new()
        .merge(token_routes)
        .merge(slot_routes)
        .layer(middleware::from_fn_with_state(
            state.rate_limiter.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}
