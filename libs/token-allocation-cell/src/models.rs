use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TokenAllocationError;

pub const DEFAULT_MAX_CAPACITY: u32 = 10;
pub const EMERGENCY_SLOT_NAME: &str = "ASAP";

// =====================================================================================
// TOKEN TYPE & PRIORITY
// =====================================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Emergency,
    PaidPriority,
    FollowUp,
    #[default]
    OnlineBooking,
    WalkIn,
}

impl TokenType {
    pub const ALL: [TokenType; 5] = [
        TokenType::Emergency,
        TokenType::PaidPriority,
        TokenType::FollowUp,
        TokenType::OnlineBooking,
        TokenType::WalkIn,
    ];

    /// Priority table shared by allocation and reallocation ordering.
    /// Higher serves first.
    pub fn priority_level(self) -> u8 {
        match self {
            TokenType::Emergency => 5,
            TokenType::PaidPriority => 4,
            TokenType::FollowUp => 3,
            TokenType::OnlineBooking => 2,
            TokenType::WalkIn => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TokenType::Emergency => "emergency",
            TokenType::PaidPriority => "paid_priority",
            TokenType::FollowUp => "follow_up",
            TokenType::OnlineBooking => "online_booking",
            TokenType::WalkIn => "walk_in",
        }
    }

    /// Emergency tokens are seated even when the slot is already full.
    pub fn bypasses_capacity(self) -> bool {
        matches!(self, TokenType::Emergency)
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenType {
    type Err = TokenAllocationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TokenType::ALL
            .into_iter()
            .find(|token_type| token_type.as_str() == value)
            .ok_or_else(|| TokenAllocationError::InvalidTokenType(value.to_string()))
    }
}

// =====================================================================================
// TOKEN STATUS
// =====================================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum TokenStatus {
    #[default]
    Waiting,
    Called,
    InProgress,
    Completed,
    NoShow,
    Cancelled,
}

impl TokenStatus {
    pub const ALL: [TokenStatus; 6] = [
        TokenStatus::Waiting,
        TokenStatus::Called,
        TokenStatus::InProgress,
        TokenStatus::Completed,
        TokenStatus::NoShow,
        TokenStatus::Cancelled,
    ];

    pub fn is_terminal(&self) -> bool {
        matches!(self, TokenStatus::Completed | TokenStatus::NoShow | TokenStatus::Cancelled)
    }

    /// A token is mid-call once called and until it leaves the slot.
    pub fn is_being_served(&self) -> bool {
        matches!(self, TokenStatus::Called | TokenStatus::InProgress)
    }

    pub fn can_transition_to(&self, target: &TokenStatus) -> bool {
        use TokenStatus::*;
        match (self, target) {
            (Waiting, Called) => true,
            (Called, InProgress) => true,
            (_, Completed | NoShow | Cancelled) => !self.is_terminal(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenStatus::Waiting => "waiting",
            TokenStatus::Called => "called",
            TokenStatus::InProgress => "in_progress",
            TokenStatus::Completed => "completed",
            TokenStatus::NoShow => "no_show",
            TokenStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TokenStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TokenStatus {
    type Err = TokenAllocationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        TokenStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| TokenAllocationError::InvalidTokenStatus(value.to_string()))
    }
}

// =====================================================================================
// SLOT
// =====================================================================================

/// Lookup key of a slot. Tokens carry this instead of a slot reference.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub struct SlotKey {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub slot_name: String,
}

impl SlotKey {
    pub fn new(doctor_id: Uuid, date: NaiveDate, slot_name: impl Into<String>) -> Self {
        Self {
            doctor_id,
            date,
            slot_name: slot_name.into(),
        }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.doctor_id, self.date, self.slot_name)
    }
}

/// Which of a slot's two lists holds a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMembership {
    Allocated,
    Waitlisted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Slot {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_name: Option<String>,
    pub date: NaiveDate,
    pub slot_name: String,
    pub start_time: String,
    pub end_time: String,
    pub max_capacity: u32,
    pub current_load: u32,
    pub allocated_tokens: Vec<Uuid>,
    pub waiting_list_tokens: Vec<Uuid>,
    pub is_open: bool,
    pub is_full: bool,
    pub completed_count: u32,
    pub no_show_count: u32,
    pub cancelled_count: u32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Slot {
    pub fn new(key: SlotKey, max_capacity: u32, doctor_name: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            doctor_id: key.doctor_id,
            doctor_name,
            date: key.date,
            start_time: key.slot_name.clone(),
            end_time: key.slot_name.clone(),
            slot_name: key.slot_name,
            max_capacity,
            current_load: 0,
            allocated_tokens: Vec::new(),
            waiting_list_tokens: Vec::new(),
            is_open: true,
            is_full: max_capacity == 0,
            completed_count: 0,
            no_show_count: 0,
            cancelled_count: 0,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> SlotKey {
        SlotKey::new(self.doctor_id, self.date, self.slot_name.clone())
    }

    pub fn available_spots(&self) -> u32 {
        self.max_capacity.saturating_sub(self.current_load)
    }

    /// Seats held beyond `max_capacity` by emergency overflow.
    pub fn overflow(&self) -> u32 {
        self.current_load.saturating_sub(self.max_capacity)
    }

    pub fn has_capacity(&self) -> bool {
        self.current_load < self.max_capacity
    }

    pub fn refresh_is_full(&mut self) {
        self.is_full = self.current_load >= self.max_capacity;
    }

    pub fn membership_of(&self, token_id: Uuid) -> Option<QueueMembership> {
        if self.allocated_tokens.contains(&token_id) {
            Some(QueueMembership::Allocated)
        } else if self.waiting_list_tokens.contains(&token_id) {
            Some(QueueMembership::Waitlisted)
        } else {
            None
        }
    }

    pub fn summary(&self) -> SlotSummary {
        SlotSummary {
            id: self.id,
            doctor_id: self.doctor_id,
            doctor_name: self.doctor_name.clone(),
            date: self.date,
            slot_name: self.slot_name.clone(),
            max_capacity: self.max_capacity,
            current_load: self.current_load,
            available_spots: self.available_spots(),
            is_full: self.is_full,
            is_open: self.is_open,
        }
    }
}

// =====================================================================================
// TOKEN
// =====================================================================================

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    pub id: Uuid,
    pub token_number: String,
    /// Per-(doctor, date) issue sequence embedded in `token_number`.
    pub sequence: u32,
    pub patient_id: Uuid,
    pub patient_name: Option<String>,
    pub patient_email: Option<String>,
    pub doctor_id: Uuid,
    pub doctor_name: Option<String>,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    #[serde(rename = "type")]
    pub token_type: TokenType,
    pub priority_level: u8,
    pub status: TokenStatus,
    /// 1-based rank among the slot's allocated tokens, 0 when unset.
    pub queue_position: u32,
    pub is_on_waiting_list: bool,
    pub is_reallocated: bool,
    pub notes: Option<String>,
    pub allocated_at: DateTime<Utc>,
    pub called_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Token {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(self.doctor_id, self.appointment_date, self.appointment_time.clone())
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

// =====================================================================================
// REQUESTS
// =====================================================================================

/// A validated allocation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocateTokenRequest {
    pub patient_id: Uuid,
    pub patient_name: Option<String>,
    pub patient_email: Option<String>,
    pub doctor_id: Uuid,
    pub doctor_name: Option<String>,
    pub appointment_date: NaiveDate,
    pub appointment_time: String,
    #[serde(rename = "type", default)]
    pub token_type: TokenType,
}

impl AllocateTokenRequest {
    pub fn slot_key(&self) -> SlotKey {
        SlotKey::new(self.doctor_id, self.appointment_date, self.appointment_time.clone())
    }
}

/// Same as an allocation request; the type is always `emergency`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyTokenRequest {
    pub patient_id: Uuid,
    pub patient_name: Option<String>,
    pub patient_email: Option<String>,
    pub doctor_id: Uuid,
    pub doctor_name: Option<String>,
    pub appointment_date: NaiveDate,
    pub appointment_time: Option<String>,
}

impl From<EmergencyTokenRequest> for AllocateTokenRequest {
    fn from(request: EmergencyTokenRequest) -> Self {
        Self {
            patient_id: request.patient_id,
            patient_name: request.patient_name,
            patient_email: request.patient_email,
            doctor_id: request.doctor_id,
            doctor_name: request.doctor_name,
            appointment_date: request.appointment_date,
            appointment_time: request
                .appointment_time
                .filter(|time| !time.trim().is_empty())
                .unwrap_or_else(|| EMERGENCY_SLOT_NAME.to_string()),
            token_type: TokenType::Emergency,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSlotRequest {
    pub doctor_id: Uuid,
    pub doctor_name: Option<String>,
    pub date: NaiveDate,
    pub slot_name: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub max_capacity: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSlotRequest {
    pub max_capacity: Option<u32>,
    pub is_open: Option<bool>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TokenQuery {
    pub doctor_id: Option<Uuid>,
    pub patient_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub status: Option<TokenStatus>,
    pub token_type: Option<TokenType>,
}

impl TokenQuery {
    pub fn matches(&self, token: &Token) -> bool {
        self.doctor_id.map_or(true, |id| token.doctor_id == id)
            && self.patient_id.map_or(true, |id| token.patient_id == id)
            && self.date.map_or(true, |date| token.appointment_date == date)
            && self.status.map_or(true, |status| token.status == status)
            && self.token_type.map_or(true, |kind| token.token_type == kind)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SlotQuery {
    pub doctor_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    pub is_open: Option<bool>,
    pub is_full: Option<bool>,
}

impl SlotQuery {
    /// Open slots with at least one free seat.
    pub fn available(doctor_id: Option<Uuid>, date: Option<NaiveDate>) -> Self {
        Self {
            doctor_id,
            date,
            is_open: Some(true),
            is_full: Some(false),
        }
    }

    pub fn matches(&self, slot: &Slot) -> bool {
        self.doctor_id.map_or(true, |id| slot.doctor_id == id)
            && self.date.map_or(true, |date| slot.date == date)
            && self.is_open.map_or(true, |open| slot.is_open == open)
            && self.is_full.map_or(true, |full| slot.is_full == full)
    }
}

// =====================================================================================
// RESULTS
// =====================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenAllocation {
    pub token: Token,
    pub slot: Slot,
    pub is_on_waiting_list: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotSummary {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub doctor_name: Option<String>,
    pub date: NaiveDate,
    pub slot_name: String,
    pub max_capacity: u32,
    pub current_load: u32,
    pub available_spots: u32,
    pub is_full: bool,
    pub is_open: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotStatistics {
    pub slot: SlotSummary,
    pub allocated_count: u32,
    pub allocated_by_type: BTreeMap<TokenType, u32>,
    pub waitlist_count: u32,
    pub waitlist_by_type: BTreeMap<TokenType, u32>,
    pub completed_count: u32,
    pub no_show_count: u32,
    pub cancelled_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotDetails {
    pub slot: Slot,
    pub statistics: SlotStatistics,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_table() {
        assert_eq!(TokenType::Emergency.priority_level(), 5);
        assert_eq!(TokenType::PaidPriority.priority_level(), 4);
        assert_eq!(TokenType::FollowUp.priority_level(), 3);
        assert_eq!(TokenType::OnlineBooking.priority_level(), 2);
        assert_eq!(TokenType::WalkIn.priority_level(), 1);
    }

    #[test]
    fn test_token_type_parsing() {
        assert_eq!("paid_priority".parse::<TokenType>().unwrap(), TokenType::PaidPriority);
        assert!(matches!(
            "vip".parse::<TokenType>(),
            Err(TokenAllocationError::InvalidTokenType(value)) if value == "vip"
        ));
        assert_eq!(TokenType::default(), TokenType::OnlineBooking);
    }

    #[test]
    fn test_token_type_serializes_snake_case() {
        let json = serde_json::to_string(&TokenType::WalkIn).unwrap();
        assert_eq!(json, "\"walk_in\"");
    }

    #[test]
    fn test_status_transitions() {
        assert!(TokenStatus::Waiting.can_transition_to(&TokenStatus::Called));
        assert!(TokenStatus::Called.can_transition_to(&TokenStatus::InProgress));
        assert!(TokenStatus::Waiting.can_transition_to(&TokenStatus::Completed));
        assert!(TokenStatus::InProgress.can_transition_to(&TokenStatus::NoShow));
        assert!(!TokenStatus::Waiting.can_transition_to(&TokenStatus::InProgress));
        assert!(!TokenStatus::Completed.can_transition_to(&TokenStatus::Cancelled));
        assert!(!TokenStatus::Cancelled.can_transition_to(&TokenStatus::Completed));
        assert!(!TokenStatus::NoShow.can_transition_to(&TokenStatus::Cancelled));
    }

    #[test]
    fn test_slot_derived_values() {
        let key = SlotKey::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2024, 12, 28).unwrap(), "09:00 AM");
        let mut slot = Slot::new(key.clone(), 2, None);
        assert_eq!(slot.key(), key);
        assert_eq!(slot.start_time, "09:00 AM");
        assert_eq!(slot.available_spots(), 2);
        assert!(!slot.is_full);

        slot.current_load = 3;
        slot.refresh_is_full();
        assert!(slot.is_full);
        assert_eq!(slot.available_spots(), 0);
        assert_eq!(slot.overflow(), 1);
    }

    #[test]
    fn test_emergency_request_defaults_to_asap() {
        let request = EmergencyTokenRequest {
            patient_id: Uuid::new_v4(),
            patient_name: None,
            patient_email: None,
            doctor_id: Uuid::new_v4(),
            doctor_name: None,
            appointment_date: NaiveDate::from_ymd_opt(2024, 12, 28).unwrap(),
            appointment_time: None,
        };
        let request: AllocateTokenRequest = request.into();
        assert_eq!(request.appointment_time, EMERGENCY_SLOT_NAME);
        assert_eq!(request.token_type, TokenType::Emergency);
    }
}
