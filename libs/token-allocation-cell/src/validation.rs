// =====================================================================================
// REQUEST VALIDATION
// =====================================================================================
//
// Raw payloads arrive with every field optional and as strings, so missing and
// malformed input can be reported with the field name before anything reaches
// the allocation engine.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use shared_models::error::AppError;

use crate::models::{
    AllocateTokenRequest, CreateSlotRequest, EmergencyTokenRequest, SlotQuery, TokenQuery, TokenStatus, TokenType,
    UpdateSlotRequest,
};

pub const MIN_SLOT_CAPACITY: i64 = 1;
pub const MAX_SLOT_CAPACITY: i64 = 100;

static UUID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}$").unwrap()
});

static DATE_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}(T\d{2}:\d{2}(:\d{2}(\.\d+)?)?(Z|[+-]\d{2}:\d{2}))?$").unwrap());

// =====================================================================================
// PAYLOADS
// =====================================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPayload {
    pub patient_id: Option<String>,
    pub patient_name: Option<String>,
    pub patient_email: Option<String>,
    pub doctor_id: Option<String>,
    pub doctor_name: Option<String>,
    pub appointment_date: Option<String>,
    pub appointment_time: Option<String>,
    #[serde(rename = "type")]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotPayload {
    pub doctor_id: Option<String>,
    pub doctor_name: Option<String>,
    pub date: Option<String>,
    pub slot_name: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub max_capacity: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotUpdatePayload {
    pub max_capacity: Option<i64>,
    pub is_open: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallNextPayload {
    pub slot_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenSearchParams {
    pub doctor_id: Option<String>,
    pub patient_id: Option<String>,
    pub date: Option<String>,
    pub status: Option<String>,
    #[serde(rename = "type")]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotListParams {
    pub doctor_id: Option<String>,
    pub date: Option<String>,
    pub is_open: Option<bool>,
    pub is_full: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DateParams {
    pub date: Option<String>,
}

// =====================================================================================
// FIELD RULES
// =====================================================================================

fn invalid(message: impl Into<String>) -> AppError {
    AppError::ValidationError(message.into())
}

/// A present, non-blank field.
pub fn require<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, AppError> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(invalid(format!("{} is required", field))),
    }
}

pub fn parse_id(value: &str, field: &str) -> Result<Uuid, AppError> {
    if !UUID_PATTERN.is_match(value) {
        return Err(invalid(format!("Invalid {} format", field)));
    }
    Uuid::parse_str(value).map_err(|_| invalid(format!("Invalid {} format", field)))
}

/// `YYYY-MM-DD`, or an RFC 3339 timestamp truncated to its calendar day.
pub fn parse_date(value: &str, field: &str) -> Result<NaiveDate, AppError> {
    let error = || invalid(format!("Invalid {} format", field));

    if !DATE_PATTERN.is_match(value) {
        return Err(error());
    }

    if value.len() == 10 {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| error())
    } else {
        DateTime::parse_from_rfc3339(value)
            .map(|timestamp| timestamp.date_naive())
            .map_err(|_| error())
    }
}

fn optional<T>(
    value: &Option<String>,
    field: &str,
    parse: impl Fn(&str, &str) -> Result<T, AppError>,
) -> Result<Option<T>, AppError> {
    match value.as_deref().map(str::trim) {
        Some(value) if !value.is_empty() => parse(value, field).map(Some),
        _ => Ok(None),
    }
}

fn type_names() -> String {
    TokenType::ALL.map(TokenType::as_str).join(", ")
}

fn status_names() -> String {
    TokenStatus::ALL.map(|status| status.as_str()).join(", ")
}

/// Missing type means `online_booking`.
pub fn parse_token_type(value: Option<&str>) -> Result<TokenType, AppError> {
    match value.map(str::trim).filter(|value| !value.is_empty()) {
        None => Ok(TokenType::default()),
        Some(value) => value
            .parse()
            .map_err(|_| invalid(format!("Invalid token type. Must be one of: {}", type_names()))),
    }
}

pub fn parse_status(value: &str) -> Result<TokenStatus, AppError> {
    value
        .parse()
        .map_err(|_| invalid(format!("Invalid status. Must be one of: {}", status_names())))
}

fn parse_capacity(value: i64) -> Result<u32, AppError> {
    if !(MIN_SLOT_CAPACITY..=MAX_SLOT_CAPACITY).contains(&value) {
        return Err(invalid(format!(
            "maxCapacity must be between {} and {}",
            MIN_SLOT_CAPACITY, MAX_SLOT_CAPACITY
        )));
    }
    Ok(value as u32)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

// =====================================================================================
// REQUEST RULES
// =====================================================================================

pub fn validate_allocation(payload: TokenPayload) -> Result<AllocateTokenRequest, AppError> {
    let patient_id = parse_id(require(&payload.patient_id, "patientId")?, "patientId")?;
    let doctor_id = parse_id(require(&payload.doctor_id, "doctorId")?, "doctorId")?;
    let appointment_date = parse_date(require(&payload.appointment_date, "appointmentDate")?, "appointmentDate")?;
    let appointment_time = require(&payload.appointment_time, "appointmentTime")?.to_string();
    let token_type = parse_token_type(payload.token_type.as_deref())?;

    Ok(AllocateTokenRequest {
        patient_id,
        patient_name: non_blank(payload.patient_name),
        patient_email: non_blank(payload.patient_email),
        doctor_id,
        doctor_name: non_blank(payload.doctor_name),
        appointment_date,
        appointment_time,
        token_type,
    })
}

/// Same fields as an allocation; time may be left out and the type is ignored.
pub fn validate_emergency(payload: TokenPayload) -> Result<EmergencyTokenRequest, AppError> {
    let patient_id = parse_id(require(&payload.patient_id, "patientId")?, "patientId")?;
    let doctor_id = parse_id(require(&payload.doctor_id, "doctorId")?, "doctorId")?;
    let appointment_date = parse_date(require(&payload.appointment_date, "appointmentDate")?, "appointmentDate")?;

    Ok(EmergencyTokenRequest {
        patient_id,
        patient_name: non_blank(payload.patient_name),
        patient_email: non_blank(payload.patient_email),
        doctor_id,
        doctor_name: non_blank(payload.doctor_name),
        appointment_date,
        appointment_time: non_blank(payload.appointment_time).map(|time| time.trim().to_string()),
    })
}

pub fn validate_slot_creation(payload: SlotPayload) -> Result<CreateSlotRequest, AppError> {
    let doctor_id = parse_id(require(&payload.doctor_id, "doctorId")?, "doctorId")?;
    let date = parse_date(require(&payload.date, "date")?, "date")?;
    let slot_name = require(&payload.slot_name, "slotName")?.to_string();
    let max_capacity = payload.max_capacity.map(parse_capacity).transpose()?;

    Ok(CreateSlotRequest {
        doctor_id,
        doctor_name: non_blank(payload.doctor_name),
        date,
        slot_name,
        start_time: non_blank(payload.start_time),
        end_time: non_blank(payload.end_time),
        max_capacity,
    })
}

pub fn validate_slot_update(payload: SlotUpdatePayload) -> Result<UpdateSlotRequest, AppError> {
    Ok(UpdateSlotRequest {
        max_capacity: payload.max_capacity.map(parse_capacity).transpose()?,
        is_open: payload.is_open,
        notes: payload.notes,
    })
}

pub fn validate_call_next(payload: CallNextPayload) -> Result<Uuid, AppError> {
    parse_id(require(&payload.slot_id, "slotId")?, "slotId")
}

pub fn validate_token_search(params: TokenSearchParams) -> Result<TokenQuery, AppError> {
    Ok(TokenQuery {
        doctor_id: optional(&params.doctor_id, "doctorId", parse_id)?,
        patient_id: optional(&params.patient_id, "patientId", parse_id)?,
        date: optional(&params.date, "date", parse_date)?,
        status: optional(&params.status, "status", |value, _| parse_status(value))?,
        token_type: match params.token_type.as_deref() {
            Some(value) if !value.trim().is_empty() => Some(parse_token_type(Some(value))?),
            _ => None,
        },
    })
}

pub fn validate_slot_list(params: SlotListParams) -> Result<SlotQuery, AppError> {
    Ok(SlotQuery {
        doctor_id: optional(&params.doctor_id, "doctorId", parse_id)?,
        date: optional(&params.date, "date", parse_date)?,
        is_open: params.is_open,
        is_full: params.is_full,
    })
}

pub fn validate_optional_date(params: &DateParams) -> Result<Option<NaiveDate>, AppError> {
    optional(&params.date, "date", parse_date)
}
