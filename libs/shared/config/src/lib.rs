use std::env;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_SLOT_CAPACITY: u32 = 10;
pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 30;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECONDS: u64 = 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub redis_url: Option<String>,
    pub default_slot_capacity: u32,
    pub rate_limit_requests: u32,
    pub rate_limit_window_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            redis_url: None,
            default_slot_capacity: DEFAULT_SLOT_CAPACITY,
            rate_limit_requests: DEFAULT_RATE_LIMIT_REQUESTS,
            rate_limit_window_seconds: DEFAULT_RATE_LIMIT_WINDOW_SECONDS,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            host: env::var("HOST").unwrap_or_else(|_| {
                warn!("HOST not set, using default");
                defaults.host.clone()
            }),
            port: parse_or("PORT", defaults.port),
            redis_url: env::var("REDIS_URL").ok().filter(|url| !url.is_empty()),
            default_slot_capacity: parse_or("OPD_DEFAULT_SLOT_CAPACITY", defaults.default_slot_capacity),
            rate_limit_requests: parse_or("OPD_RATE_LIMIT_REQUESTS", defaults.rate_limit_requests),
            rate_limit_window_seconds: parse_or(
                "OPD_RATE_LIMIT_WINDOW_SECONDS",
                defaults.rate_limit_window_seconds,
            ),
        };

        if !config.is_redis_configured() {
            warn!("REDIS_URL not set - token store will be kept in memory");
        }

        if config.default_slot_capacity == 0 {
            warn!("OPD_DEFAULT_SLOT_CAPACITY must be positive, using default");
            return Self {
                default_slot_capacity: DEFAULT_SLOT_CAPACITY,
                ..config
            };
        }

        config
    }

    pub fn is_redis_configured(&self) -> bool {
        self.redis_url.as_deref().is_some_and(|url| !url.is_empty())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + Copy + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => {
            warn!("{} not set, using default {}", key, default);
            default
        }
    }
}
