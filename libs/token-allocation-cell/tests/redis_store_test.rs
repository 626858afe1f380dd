// libs/token-allocation-cell/tests/redis_store_test.rs
//
// Runs against a live Redis. Set REDIS_TEST_URL and pass `--ignored`.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use futures::future::join_all;
use uuid::Uuid;

use shared_utils::test_utils::{TestClinic, TestConfig};
use token_allocation_cell::*;

async fn redis_state(capacity: u32) -> Option<Arc<TokenAllocationState>> {
    let config = TestConfig::default()
        .with_slot_capacity(capacity)
        .with_redis_from_env()
        .to_arc();
    if !config.is_redis_configured() {
        eprintln!("REDIS_TEST_URL not set, skipping");
        return None;
    }

    let store: Arc<dyn TokenStore> = Arc::new(RedisTokenStore::new(&config).await.unwrap());
    Some(Arc::new(TokenAllocationState::new(config, store)))
}

fn request(clinic: &TestClinic, slot_name: &str, token_type: TokenType) -> AllocateTokenRequest {
    AllocateTokenRequest {
        patient_id: clinic.patient(),
        patient_name: Some("Test Patient".to_string()),
        patient_email: None,
        doctor_id: clinic.doctor_id,
        doctor_name: Some(clinic.doctor_name.clone()),
        appointment_date: clinic.date,
        appointment_time: slot_name.to_string(),
        token_type,
    }
}

#[tokio::test]
#[ignore]
async fn test_redis_slot_insert_is_idempotent() {
    let Some(state) = redis_state(10).await else { return };
    let key = SlotKey::new(Uuid::new_v4(), NaiveDate::from_ymd_opt(2024, 12, 28).unwrap(), "09:00 AM");

    let first = state.registry.get_or_create_slot(&key, None).await.unwrap();
    let again = state.registry.get_or_create_slot(&key, None).await.unwrap();
    assert_eq!(first.id, again.id);

    state.registry.delete_slot(first.id).await.unwrap();
    let recreated = state.registry.get_or_create_slot(&key, None).await.unwrap();
    assert_ne!(recreated.id, first.id);
}

#[tokio::test]
#[ignore]
async fn test_redis_allocation_and_promotion() {
    let Some(state) = redis_state(1).await else { return };
    let clinic = TestClinic::on(NaiveDate::from_ymd_opt(2024, 12, 28).unwrap());

    let seated = state
        .allocation
        .allocate(request(&clinic, "09:00 AM", TokenType::WalkIn))
        .await
        .unwrap();
    let waiting = state
        .allocation
        .allocate(request(&clinic, "09:00 AM", TokenType::FollowUp))
        .await
        .unwrap();
    assert!(!seated.is_on_waiting_list);
    assert!(waiting.is_on_waiting_list);

    let cancelled = state.allocation.cancel_token(seated.token.id).await.unwrap();
    assert_eq!(cancelled.token.status, TokenStatus::Cancelled);
    assert_eq!(cancelled.reallocated.len(), 1);
    assert_eq!(cancelled.reallocated[0].id, waiting.token.id);

    let slot = state.registry.get_slot(seated.slot.id).await.unwrap();
    assert_eq!(slot.allocated_tokens, vec![waiting.token.id]);
    assert!(slot.waiting_list_tokens.is_empty());
    assert_eq!(slot.cancelled_count, 1);

    let by_doctor = state
        .allocation
        .tokens_by_doctor_and_date(clinic.doctor_id, clinic.date)
        .await
        .unwrap();
    assert_eq!(by_doctor.len(), 2);

    state.allocation.delete_token(waiting.token.id).await.unwrap();
    let by_doctor = state
        .allocation
        .tokens_by_doctor_and_date(clinic.doctor_id, clinic.date)
        .await
        .unwrap();
    assert_eq!(by_doctor.len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore]
async fn test_redis_sequence_is_unique_under_load() {
    let Some(state) = redis_state(100).await else { return };
    let clinic = TestClinic::on(NaiveDate::from_ymd_opt(2024, 12, 28).unwrap());

    let tasks = (0..30).map(|i| {
        let state = state.clone();
        let slot_name = if i % 2 == 0 { "10:00 AM" } else { "11:00 AM" };
        let request = request(&clinic, slot_name, TokenType::OnlineBooking);
        tokio::spawn(async move { state.allocation.allocate(request).await })
    });

    let numbers: HashSet<String> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap().token.token_number)
        .collect();
    assert_eq!(numbers.len(), 30);
}
