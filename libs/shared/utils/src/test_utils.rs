use std::sync::Arc;
use chrono::{NaiveDate, Utc};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;

pub struct TestConfig {
    pub default_slot_capacity: u32,
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u64,
    pub redis_url: Option<String>,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            default_slot_capacity: 10,
            rate_limit_requests: 1_000,
            rate_limit_window_seconds: 60,
            redis_url: None,
        }
    }
}

impl TestConfig {
    pub fn with_slot_capacity(mut self, capacity: u32) -> Self {
        self.default_slot_capacity = capacity;
        self
    }

    pub fn with_rate_limit(mut self, requests: u32, window_seconds: u64) -> Self {
        self.rate_limit_requests = requests;
        self.rate_limit_window_seconds = window_seconds;
        self
    }

    /// Redis settings for tests that opt in through `REDIS_TEST_URL`.
    pub fn with_redis_from_env(mut self) -> Self {
        self.redis_url = std::env::var("REDIS_TEST_URL").ok();
        self
    }

    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            redis_url: self.redis_url.clone(),
            default_slot_capacity: self.default_slot_capacity,
            rate_limit_requests: self.rate_limit_requests,
            rate_limit_window_seconds: self.rate_limit_window_seconds,
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

/// A doctor/patient pair plus a fixed OPD day.
pub struct TestClinic {
    pub doctor_id: Uuid,
    pub doctor_name: String,
    pub date: NaiveDate,
}

impl Default for TestClinic {
    fn default() -> Self {
        Self {
            doctor_id: Uuid::new_v4(),
            doctor_name: "Dr. Rajesh Sharma".to_string(),
            date: Utc::now().date_naive(),
        }
    }
}

impl TestClinic {
    pub fn on(date: NaiveDate) -> Self {
        Self {
            date,
            ..Self::default()
        }
    }

    pub fn patient(&self) -> Uuid {
        Uuid::new_v4()
    }

    /// JSON body for `POST /tokens`.
    pub fn token_payload(&self, patient_id: Uuid, slot_name: &str, token_type: &str) -> Value {
        json!({
            "patientId": patient_id.to_string(),
            "patientName": "Test Patient",
            "patientEmail": "patient@example.com",
            "doctorId": self.doctor_id.to_string(),
            "doctorName": self.doctor_name,
            "appointmentDate": self.date.format("%Y-%m-%d").to_string(),
            "appointmentTime": slot_name,
            "type": token_type,
        })
    }

    /// JSON body for `POST /slots`.
    pub fn slot_payload(&self, slot_name: &str, max_capacity: u32) -> Value {
        json!({
            "doctorId": self.doctor_id.to_string(),
            "doctorName": self.doctor_name,
            "date": self.date.format("%Y-%m-%d").to_string(),
            "slotName": slot_name,
            "maxCapacity": max_capacity,
        })
    }
}
