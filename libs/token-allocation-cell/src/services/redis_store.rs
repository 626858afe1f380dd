use async_trait::async_trait;
use chrono::NaiveDate;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::error::TokenAllocationError;
use crate::models::{Slot, SlotKey, SlotQuery, Token, TokenQuery};
use crate::services::store::{SlotChanges, TokenStore};

const SLOT_SET: &str = "opd_slots";
const TOKEN_SET: &str = "opd_tokens";

fn slot_key(slot_id: Uuid) -> String {
    format!("opd_slot:{}", slot_id)
}

fn slot_index_key(key: &SlotKey) -> String {
    format!("opd_slot_key:{}:{}:{}", key.doctor_id, key.date, key.slot_name)
}

fn token_key(token_id: Uuid) -> String {
    format!("opd_token:{}", token_id)
}

fn doctor_day_set(doctor_id: Uuid, date: NaiveDate) -> String {
    format!("opd_tokens:doctor:{}:{}", doctor_id, date)
}

fn patient_set(patient_id: Uuid) -> String {
    format!("opd_tokens:patient:{}", patient_id)
}

fn sequence_key(doctor_id: Uuid, date: NaiveDate) -> String {
    format!("opd_token_seq:{}:{}", doctor_id, date)
}

/// Shared store backed by Redis.
///
/// Records are JSON in the `data` field of a hash per slot or token. Multi-key
/// writes go through `MULTI`/`EXEC` pipelines.
pub struct RedisTokenStore {
    pool: Pool,
}

impl RedisTokenStore {
    pub async fn new(config: &AppConfig) -> Result<Self, TokenAllocationError> {
        let redis_url = config
            .redis_url
            .clone()
            .unwrap_or_else(|| "redis://localhost:6379".to_string());

        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            TokenAllocationError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Failed to create Redis pool",
                format!("Pool creation error: {}", e),
            )))
        })?;

        let store = Self { pool };
        let mut conn = store.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis token store initialized successfully");

        Ok(store)
    }

    async fn get_connection(&self) -> Result<Connection, TokenAllocationError> {
        self.pool.get().await.map_err(|e| {
            TokenAllocationError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Failed to get Redis connection",
                e.to_string(),
            )))
        })
    }

    async fn load_records<T: DeserializeOwned>(
        conn: &mut Connection,
        keys: &[String],
    ) -> Result<Vec<T>, TokenAllocationError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut pipe = redis::pipe();
        for key in keys {
            pipe.hget(key, "data");
        }
        let values: Vec<Option<String>> = pipe.query_async(conn).await?;

        let mut records = Vec::with_capacity(values.len());
        for (key, value) in keys.iter().zip(values) {
            match value {
                Some(data) => records.push(serde_json::from_str(&data)?),
                None => debug!("Record {} vanished before it was read", key),
            }
        }
        Ok(records)
    }

    async fn load_slot(conn: &mut Connection, slot_id: Uuid) -> Result<Option<Slot>, TokenAllocationError> {
        let data: Option<String> = conn.hget(slot_key(slot_id), "data").await?;
        data.map(|data| serde_json::from_str(&data))
            .transpose()
            .map_err(TokenAllocationError::from)
    }

    fn token_index(query: &TokenQuery) -> String {
        match (query.doctor_id, query.date, query.patient_id) {
            (Some(doctor_id), Some(date), _) => doctor_day_set(doctor_id, date),
            (_, _, Some(patient_id)) => patient_set(patient_id),
            _ => TOKEN_SET.to_string(),
        }
    }
}

#[async_trait]
impl TokenStore for RedisTokenStore {
    async fn get_slot(&self, slot_id: Uuid) -> Result<Option<Slot>, TokenAllocationError> {
        let mut conn = self.get_connection().await?;
        Self::load_slot(&mut conn, slot_id).await
    }

    async fn find_slot_by_key(&self, key: &SlotKey) -> Result<Option<Slot>, TokenAllocationError> {
        let mut conn = self.get_connection().await?;
        let slot_id: Option<String> = conn.get(slot_index_key(key)).await?;

        match slot_id.and_then(|id| Uuid::parse_str(&id).ok()) {
            Some(slot_id) => Self::load_slot(&mut conn, slot_id).await,
            None => Ok(None),
        }
    }

    async fn insert_slot_if_absent(&self, slot: Slot) -> Result<(Slot, bool), TokenAllocationError> {
        let mut conn = self.get_connection().await?;
        let index_key = slot_index_key(&slot.key());

        // The record is written before the index entry, so a reader that
        // finds the index always finds the record.
        let data = serde_json::to_string(&slot)?;
        let _: () = conn.hset(slot_key(slot.id), "data", data).await?;

        let claimed: Option<String> = redis::cmd("SET")
            .arg(&index_key)
            .arg(slot.id.to_string())
            .arg("NX")
            .query_async(&mut conn)
            .await?;

        if claimed.is_some() {
            let _: () = conn.sadd(SLOT_SET, slot.id.to_string()).await?;
            debug!("Slot {} created for {}", slot.id, index_key);
            return Ok((slot, true));
        }

        let _: () = conn.del(slot_key(slot.id)).await?;

        let existing_id: Option<String> = conn.get(&index_key).await?;
        let existing = match existing_id.and_then(|id| Uuid::parse_str(&id).ok()) {
            Some(existing_id) => Self::load_slot(&mut conn, existing_id).await?,
            None => None,
        };

        existing
            .map(|existing| (existing, false))
            .ok_or_else(|| TokenAllocationError::Store(format!("Slot index {} points at no slot", index_key)))
    }

    async fn list_slots(&self, query: &SlotQuery) -> Result<Vec<Slot>, TokenAllocationError> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn.smembers(SLOT_SET).await?;
        let keys: Vec<String> = ids
            .iter()
            .filter_map(|id| Uuid::parse_str(id).ok())
            .map(slot_key)
            .collect();

        let slots: Vec<Slot> = Self::load_records(&mut conn, &keys).await?;
        Ok(slots.into_iter().filter(|slot| query.matches(slot)).collect())
    }

    async fn delete_slot(&self, slot_id: Uuid) -> Result<bool, TokenAllocationError> {
        let mut conn = self.get_connection().await?;
        let Some(slot) = Self::load_slot(&mut conn, slot_id).await? else {
            return Ok(false);
        };

        let _: () = redis::pipe()
            .atomic()
            .del(slot_key(slot_id))
            .ignore()
            .del(slot_index_key(&slot.key()))
            .ignore()
            .srem(SLOT_SET, slot_id.to_string())
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(true)
    }

    async fn get_token(&self, token_id: Uuid) -> Result<Option<Token>, TokenAllocationError> {
        let mut conn = self.get_connection().await?;
        let data: Option<String> = conn.hget(token_key(token_id), "data").await?;
        data.map(|data| serde_json::from_str(&data))
            .transpose()
            .map_err(TokenAllocationError::from)
    }

    async fn get_tokens(&self, token_ids: &[Uuid]) -> Result<Vec<Token>, TokenAllocationError> {
        let mut conn = self.get_connection().await?;
        let keys: Vec<String> = token_ids.iter().copied().map(token_key).collect();
        Self::load_records(&mut conn, &keys).await
    }

    async fn search_tokens(&self, query: &TokenQuery) -> Result<Vec<Token>, TokenAllocationError> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn.smembers(Self::token_index(query)).await?;
        let keys: Vec<String> = ids
            .iter()
            .filter_map(|id| Uuid::parse_str(id).ok())
            .map(token_key)
            .collect();

        let tokens: Vec<Token> = Self::load_records(&mut conn, &keys).await?;
        Ok(tokens.into_iter().filter(|token| query.matches(token)).collect())
    }

    async fn count_tokens(&self, doctor_id: Uuid, date: NaiveDate) -> Result<u32, TokenAllocationError> {
        let mut conn = self.get_connection().await?;
        let count: u32 = conn.scard(doctor_day_set(doctor_id, date)).await?;
        Ok(count)
    }

    async fn next_token_sequence(&self, doctor_id: Uuid, date: NaiveDate) -> Result<u32, TokenAllocationError> {
        let mut conn = self.get_connection().await?;
        let sequence: u32 = conn.incr(sequence_key(doctor_id, date), 1).await?;
        Ok(sequence)
    }

    async fn commit(&self, changes: SlotChanges) -> Result<(), TokenAllocationError> {
        if changes.is_empty() {
            return Ok(());
        }

        let mut conn = self.get_connection().await?;

        let deleted: Vec<Token> = if changes.deleted_tokens.is_empty() {
            Vec::new()
        } else {
            let keys: Vec<String> = changes.deleted_tokens.iter().copied().map(token_key).collect();
            Self::load_records(&mut conn, &keys).await?
        };
        if deleted.len() < changes.deleted_tokens.len() {
            warn!(
                "{} of {} deleted tokens were already gone",
                changes.deleted_tokens.len() - deleted.len(),
                changes.deleted_tokens.len()
            );
        }

        let mut pipe = redis::pipe();
        pipe.atomic();

        if let Some(slot) = &changes.slot {
            let data = serde_json::to_string(slot)?;
            pipe.hset(slot_key(slot.id), "data", data)
                .ignore()
                .set(slot_index_key(&slot.key()), slot.id.to_string())
                .ignore()
                .sadd(SLOT_SET, slot.id.to_string())
                .ignore();
        }

        for token in &changes.tokens {
            let data = serde_json::to_string(token)?;
            let updated_at = token.updated_at.to_rfc3339();
            let id = token.id.to_string();
            pipe.hset_multiple(
                token_key(token.id),
                &[
                    ("data", data.as_str()),
                    ("status", token.status.as_str()),
                    ("updated_at", updated_at.as_str()),
                ],
            )
            .ignore()
            .sadd(TOKEN_SET, &id)
            .ignore()
            .sadd(doctor_day_set(token.doctor_id, token.appointment_date), &id)
            .ignore()
            .sadd(patient_set(token.patient_id), &id)
            .ignore();
        }

        for token in &deleted {
            let id = token.id.to_string();
            pipe.del(token_key(token.id))
                .ignore()
                .srem(TOKEN_SET, &id)
                .ignore()
                .srem(doctor_day_set(token.doctor_id, token.appointment_date), &id)
                .ignore()
                .srem(patient_set(token.patient_id), &id)
                .ignore();
        }

        let _: () = pipe.query_async(&mut conn).await?;
        debug!(
            "Committed slot change with {} tokens written and {} deleted",
            changes.tokens.len(),
            deleted.len()
        );
        Ok(())
    }
}
