use chrono::NaiveDate;
use uuid::Uuid;

use crate::error::TokenAllocationError;
use crate::services::store::TokenStore;

const DOCTOR_SUFFIX_LEN: usize = 6;

/// `TOKEN-{YYYY-MM-DD}-{last 6 chars of doctor id}-{sequence, 3+ digits}`.
pub fn format_token_number(doctor_id: Uuid, date: NaiveDate, sequence: u32) -> String {
    let doctor = doctor_id.to_string();
    let suffix = &doctor[doctor.len() - DOCTOR_SUFFIX_LEN..];
    format!("TOKEN-{}-{}-{:03}", date.format("%Y-%m-%d"), suffix, sequence)
}

/// Reserve the next unique number for a doctor's day.
pub async fn issue_token_number(
    store: &dyn TokenStore,
    doctor_id: Uuid,
    date: NaiveDate,
) -> Result<(u32, String), TokenAllocationError> {
    let sequence = store.next_token_sequence(doctor_id, date).await?;
    Ok((sequence, format_token_number(doctor_id, date, sequence)))
}

/// Numbering from `count + 1` of existing tokens.
///
/// Not safe under concurrency: two callers that read the same count produce
/// the same number. Allocation uses [`issue_token_number`].
pub async fn count_based_token_number(
    store: &dyn TokenStore,
    doctor_id: Uuid,
    date: NaiveDate,
) -> Result<String, TokenAllocationError> {
    let count = store.count_tokens(doctor_id, date).await?;
    Ok(format_token_number(doctor_id, date, count + 1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory_store::InMemoryTokenStore;

    fn doctor() -> Uuid {
        Uuid::parse_str("6f1c2a9e-0b7d-4c1e-9a55-3d2f11abc123").unwrap()
    }

    #[test]
    fn test_format() {
        let date = NaiveDate::from_ymd_opt(2024, 12, 28).unwrap();
        assert_eq!(format_token_number(doctor(), date, 7), "TOKEN-2024-12-28-abc123-007");
        assert_eq!(format_token_number(doctor(), date, 1234), "TOKEN-2024-12-28-abc123-1234");
    }

    #[tokio::test]
    async fn test_issued_numbers_increase() {
        let store = InMemoryTokenStore::new();
        let date = NaiveDate::from_ymd_opt(2024, 12, 28).unwrap();

        let (first_seq, first) = issue_token_number(&store, doctor(), date).await.unwrap();
        let (second_seq, second) = issue_token_number(&store, doctor(), date).await.unwrap();

        assert_eq!((first_seq, second_seq), (1, 2));
        assert!(first.ends_with("-001"));
        assert!(second.ends_with("-002"));
    }

    #[tokio::test]
    async fn test_count_based_number_on_empty_day() {
        let store = InMemoryTokenStore::new();
        let date = NaiveDate::from_ymd_opt(2024, 12, 28).unwrap();
        let number = count_based_token_number(&store, doctor(), date).await.unwrap();
        assert_eq!(number, "TOKEN-2024-12-28-abc123-001");
    }
}
