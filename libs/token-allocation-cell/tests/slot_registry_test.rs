// libs/token-allocation-cell/tests/slot_registry_test.rs

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::NaiveDate;
use uuid::Uuid;

use token_allocation_cell::*;

fn registry(default_capacity: u32) -> SlotRegistry {
    let store: Arc<dyn TokenStore> = Arc::new(InMemoryTokenStore::new());
    SlotRegistry::new(store, Arc::new(SlotLocks::new()), default_capacity)
}

fn day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 12, 28).unwrap()
}

fn create_request(doctor_id: Uuid, slot_name: &str) -> CreateSlotRequest {
    CreateSlotRequest {
        doctor_id,
        doctor_name: Some("Dr. Rajesh Sharma".to_string()),
        date: day(),
        slot_name: slot_name.to_string(),
        start_time: None,
        end_time: None,
        max_capacity: None,
    }
}

#[tokio::test]
async fn test_get_or_create_is_idempotent_per_key() {
    let registry = registry(10);
    let key = SlotKey::new(Uuid::new_v4(), day(), "09:00 AM");

    let first = registry.get_or_create_slot(&key, None).await.unwrap();
    let again = registry.get_or_create_slot(&key, None).await.unwrap();
    assert_eq!(first.id, again.id);
    assert_eq!(first.max_capacity, 10);
    assert_eq!(first.current_load, 0);
    assert!(first.is_open);

    let other_name = SlotKey::new(key.doctor_id, day(), "09:00-10:00");
    let other = registry.get_or_create_slot(&other_name, None).await.unwrap();
    assert_ne!(other.id, first.id);
}

#[tokio::test]
async fn test_default_capacity_comes_from_config() {
    let registry = registry(4);
    let key = SlotKey::new(Uuid::new_v4(), day(), "09:00 AM");

    let slot = registry.get_or_create_slot(&key, None).await.unwrap();
    assert_eq!(slot.max_capacity, 4);
    assert_eq!(registry.default_capacity(), 4);
}

#[tokio::test]
async fn test_create_slot_defaults_and_conflict() {
    let registry = registry(10);
    let doctor = Uuid::new_v4();

    let slot = registry.create_slot(create_request(doctor, "09:00 AM")).await.unwrap();
    assert_eq!(slot.start_time, "09:00 AM");
    assert_eq!(slot.end_time, "09:00 AM");
    assert_eq!(slot.max_capacity, 10);
    assert_eq!(slot.doctor_name.as_deref(), Some("Dr. Rajesh Sharma"));

    let mut windowed = create_request(doctor, "Afternoon");
    windowed.start_time = Some("14:00".to_string());
    windowed.end_time = Some("16:00".to_string());
    windowed.max_capacity = Some(6);
    let windowed = registry.create_slot(windowed).await.unwrap();
    assert_eq!(windowed.start_time, "14:00");
    assert_eq!(windowed.max_capacity, 6);

    assert_matches!(
        registry.create_slot(create_request(doctor, "09:00 AM")).await,
        Err(TokenAllocationError::SlotAlreadyExists(_))
    );
}

#[tokio::test]
async fn test_update_recomputes_full_flag() {
    let registry = registry(10);
    let key = SlotKey::new(Uuid::new_v4(), day(), "09:00 AM");
    let slot = registry.get_or_create_slot(&key, None).await.unwrap();

    let closed = registry
        .update_slot(
            slot.id,
            UpdateSlotRequest {
                max_capacity: Some(0),
                is_open: Some(false),
                notes: Some("Doctor on leave".to_string()),
            },
        )
        .await
        .unwrap();
    assert!(closed.is_full);
    assert!(!closed.is_open);
    assert_eq!(closed.notes.as_deref(), Some("Doctor on leave"));

    let stored = registry.get_slot(slot.id).await.unwrap();
    assert_eq!(stored, closed);

    assert_matches!(
        registry.update_slot(Uuid::new_v4(), UpdateSlotRequest::default()).await,
        Err(TokenAllocationError::SlotNotFound(_))
    );
}

#[tokio::test]
async fn test_listing_order_and_filters() {
    let registry = registry(10);
    let doctor = Uuid::new_v4();
    let next_day = day().succ_opt().unwrap();

    registry
        .get_or_create_slot(&SlotKey::new(doctor, next_day, "09:00 AM"), None)
        .await
        .unwrap();
    registry
        .get_or_create_slot(&SlotKey::new(doctor, day(), "11:00 AM"), None)
        .await
        .unwrap();
    let early = registry
        .get_or_create_slot(&SlotKey::new(doctor, day(), "09:00 AM"), None)
        .await
        .unwrap();
    registry
        .get_or_create_slot(&SlotKey::new(Uuid::new_v4(), day(), "09:00 AM"), None)
        .await
        .unwrap();

    let slots = registry.slots_by_doctor(doctor, None).await.unwrap();
    let order: Vec<(NaiveDate, &str)> = slots.iter().map(|s| (s.date, s.slot_name.as_str())).collect();
    assert_eq!(
        order,
        vec![(day(), "09:00 AM"), (day(), "11:00 AM"), (next_day, "09:00 AM")]
    );

    let on_day = registry.slots_by_doctor(doctor, Some(day())).await.unwrap();
    assert_eq!(on_day.len(), 2);

    registry
        .update_slot(
            early.id,
            UpdateSlotRequest {
                is_open: Some(false),
                ..UpdateSlotRequest::default()
            },
        )
        .await
        .unwrap();
    let available = registry.available_slots(Some(doctor), Some(day())).await.unwrap();
    assert_eq!(available.len(), 1);
    assert_eq!(available[0].slot_name, "11:00 AM");

    let everyone = registry.list_slots(&SlotQuery::default()).await.unwrap();
    assert_eq!(everyone.len(), 4);
}

#[tokio::test]
async fn test_statistics_of_empty_slot() {
    let registry = registry(3);
    let slot = registry
        .get_or_create_slot(&SlotKey::new(Uuid::new_v4(), day(), "09:00 AM"), None)
        .await
        .unwrap();

    let stats = registry.statistics(slot.id).await.unwrap();
    assert_eq!(stats.allocated_count, 0);
    assert_eq!(stats.waitlist_count, 0);
    assert!(stats.allocated_by_type.is_empty());
    assert_eq!(stats.slot.available_spots, 3);

    let details = registry.slot_details(slot.id).await.unwrap();
    assert_eq!(details.slot.id, slot.id);
    assert_eq!(details.statistics, stats);
}

#[tokio::test]
async fn test_delete_slot() {
    let registry = registry(10);
    let key = SlotKey::new(Uuid::new_v4(), day(), "09:00 AM");
    let slot = registry.get_or_create_slot(&key, None).await.unwrap();

    let deleted = registry.delete_slot(slot.id).await.unwrap();
    assert_eq!(deleted.id, slot.id);
    assert_matches!(
        registry.get_slot(slot.id).await,
        Err(TokenAllocationError::SlotNotFound(_))
    );

    let recreated = registry.get_or_create_slot(&key, None).await.unwrap();
    assert_ne!(recreated.id, slot.id);
}
