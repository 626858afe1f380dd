use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde_json::{json, Value};
use tracing::{debug, info};

use shared_models::error::AppError;
use shared_models::response::{listing, success};

use crate::validation::{
    self, CallNextPayload, DateParams, SlotListParams, SlotPayload, SlotUpdatePayload, TokenPayload,
    TokenSearchParams,
};
use crate::TokenAllocationState;

type Shared = State<Arc<TokenAllocationState>>;

fn path_id(id: &str) -> Result<uuid::Uuid, AppError> {
    validation::parse_id(id, "ID")
}

// =====================================================================================
// TOKENS
// =====================================================================================

pub async fn search_tokens(
    State(state): Shared,
    Query(params): Query<TokenSearchParams>,
) -> Result<Json<Value>, AppError> {
    let query = validation::validate_token_search(params)?;
    debug!("Token search: {:?}", query);

    let tokens = state.allocation.search_tokens(&query).await?;
    Ok(Json(listing(&tokens)))
}

/// Allocate a token, or waitlist it when the slot is full.
pub async fn create_token(
    State(state): Shared,
    Json(payload): Json<TokenPayload>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request = validation::validate_allocation(payload)?;
    let result = state.allocation.allocate(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(success(
            Some(result.message),
            json!({
                "token": result.token,
                "slot": result.slot,
                "isOnWaitingList": result.is_on_waiting_list,
            }),
        )),
    ))
}

pub async fn create_emergency_token(
    State(state): Shared,
    Json(payload): Json<TokenPayload>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request = validation::validate_emergency(payload)?;
    let result = state.allocation.add_emergency_token(request).await?;
    info!("Emergency token {} issued", result.token.token_number);

    Ok((
        StatusCode::CREATED,
        Json(success(
            Some("Emergency token created successfully".to_string()),
            json!({
                "token": result.token,
                "slot": result.slot,
            }),
        )),
    ))
}

pub async fn get_token(State(state): Shared, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let token = state.allocation.get_token(path_id(&id)?).await?;
    Ok(Json(success(None, token)))
}

pub async fn delete_token(State(state): Shared, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let token = state.allocation.delete_token(path_id(&id)?).await?;
    Ok(Json(success(
        Some(format!("Token {} deleted", token.token_number)),
        token,
    )))
}

pub async fn tokens_by_doctor_and_date(
    State(state): Shared,
    Path((doctor_id, date)): Path<(String, String)>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = validation::parse_id(&doctor_id, "doctorId")?;
    let date = validation::parse_date(&date, "date")?;

    let tokens = state.allocation.tokens_by_doctor_and_date(doctor_id, date).await?;
    Ok(Json(listing(&tokens)))
}

pub async fn waiting_tokens_by_patient(
    State(state): Shared,
    Path(patient_id): Path<String>,
) -> Result<Json<Value>, AppError> {
    let patient_id = validation::parse_id(&patient_id, "patientId")?;
    let tokens = state.allocation.waiting_tokens_by_patient(patient_id).await?;
    Ok(Json(listing(&tokens)))
}

pub async fn call_next_token(
    State(state): Shared,
    Json(payload): Json<CallNextPayload>,
) -> Result<Json<Value>, AppError> {
    let slot_id = validation::validate_call_next(payload)?;
    let token = state.allocation.call_next_token(slot_id).await?;

    Ok(Json(success(
        Some(format!("Token {} called", token.token_number)),
        token,
    )))
}

pub async fn start_token(State(state): Shared, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let token = state.allocation.start_consultation(path_id(&id)?).await?;
    Ok(Json(success(
        Some(format!("Consultation started for token {}", token.token_number)),
        token,
    )))
}

pub async fn complete_token(State(state): Shared, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let result = state.allocation.complete_token(path_id(&id)?).await?;
    Ok(Json(success(
        Some(format!("Token {} completed", result.token.token_number)),
        result,
    )))
}

pub async fn cancel_token(State(state): Shared, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let result = state.allocation.cancel_token(path_id(&id)?).await?;
    Ok(Json(success(
        Some(format!("Token {} cancelled", result.token.token_number)),
        result,
    )))
}

pub async fn no_show_token(State(state): Shared, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let result = state.allocation.no_show_token(path_id(&id)?).await?;
    Ok(Json(success(
        Some(format!("Token {} marked as no-show", result.token.token_number)),
        result,
    )))
}

// =====================================================================================
// SLOTS
// =====================================================================================

pub async fn list_slots(
    State(state): Shared,
    Query(params): Query<SlotListParams>,
) -> Result<Json<Value>, AppError> {
    let query = validation::validate_slot_list(params)?;
    let slots = state.registry.list_slots(&query).await?;
    Ok(Json(listing(&slots)))
}

pub async fn create_slot(
    State(state): Shared,
    Json(payload): Json<SlotPayload>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let request = validation::validate_slot_creation(payload)?;
    let slot = state.registry.create_slot(request).await?;

    Ok((
        StatusCode::CREATED,
        Json(success(Some("OPD slot created successfully".to_string()), slot)),
    ))
}

/// Open slots with free seats, optionally for one doctor or day.
pub async fn available_slots(
    State(state): Shared,
    Query(params): Query<SlotListParams>,
) -> Result<Json<Value>, AppError> {
    let query = validation::validate_slot_list(params)?;
    let slots = state.registry.available_slots(query.doctor_id, query.date).await?;
    let summaries: Vec<_> = slots.iter().map(|slot| slot.summary()).collect();
    Ok(Json(listing(&summaries)))
}

pub async fn slots_by_doctor(
    State(state): Shared,
    Path(doctor_id): Path<String>,
    Query(params): Query<DateParams>,
) -> Result<Json<Value>, AppError> {
    let doctor_id = validation::parse_id(&doctor_id, "doctorId")?;
    let date = validation::validate_optional_date(&params)?;

    let slots = state.registry.slots_by_doctor(doctor_id, date).await?;
    Ok(Json(listing(&slots)))
}

pub async fn get_slot(State(state): Shared, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let details = state.registry.slot_details(path_id(&id)?).await?;
    Ok(Json(success(None, details)))
}

pub async fn update_slot(
    State(state): Shared,
    Path(id): Path<String>,
    Json(payload): Json<SlotUpdatePayload>,
) -> Result<Json<Value>, AppError> {
    let slot_id = path_id(&id)?;
    let request = validation::validate_slot_update(payload)?;
    let slot = state.registry.update_slot(slot_id, request).await?;

    Ok(Json(success(Some("OPD slot updated successfully".to_string()), slot)))
}

pub async fn delete_slot(State(state): Shared, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let slot = state.registry.delete_slot(path_id(&id)?).await?;
    Ok(Json(success(Some("OPD slot deleted successfully".to_string()), slot)))
}

pub async fn slot_statistics(State(state): Shared, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let statistics = state.registry.statistics(path_id(&id)?).await?;
    Ok(Json(success(None, statistics)))
}

pub async fn reallocate_slot(State(state): Shared, Path(id): Path<String>) -> Result<Json<Value>, AppError> {
    let reallocated = state.allocation.reallocate_from_waitlist(path_id(&id)?).await?;

    Ok(Json(json!({
        "success": true,
        "message": format!("{} tokens reallocated from waitlist", reallocated.len()),
        "count": reallocated.len(),
        "data": reallocated,
    })))
}
