use std::env;
use std::fmt;
use std::str::FromStr;

use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

/// Database schema generation a deployment runs against. Resolved once at
/// startup; nothing inspects the schema per request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    /// Flat `available_slots` / `available_days` columns only.
    V1,
    /// Adds the `day_specific_availability` column.
    V2,
}

impl SchemaVersion {
    pub fn supports_day_specific_availability(&self) -> bool {
        matches!(self, SchemaVersion::V2)
    }
}

impl FromStr for SchemaVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "v1" | "legacy" => Ok(SchemaVersion::V1),
            "2" | "v2" => Ok(SchemaVersion::V2),
            other => Err(format!("unknown schema version: {}", other)),
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaVersion::V1 => write!(f, "v1"),
            SchemaVersion::V2 => write!(f, "v2"),
        }
    }
}

/// Where appointments, doctors and patients are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Supabase,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "supabase" | "postgres" => Ok(StoreBackend::Supabase),
            "memory" | "in-memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_service_role_key: String,
    pub supabase_jwt_secret: String,
    pub redis_url: Option<String>,
    /// JSON array of doctor rows loaded by the memory backend.
    pub doctor_seed_file: Option<String>,
    pub schema_version: SchemaVersion,
    pub store_backend: StoreBackend,
    pub clinic_utc_offset_minutes: i32,
    pub booking_rate_limit: u32,
    pub booking_rate_window_seconds: u64,
    pub server_port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            supabase_url: String::new(),
            supabase_anon_key: String::new(),
            supabase_service_role_key: String::new(),
            supabase_jwt_secret: String::new(),
            redis_url: None,
            doctor_seed_file: None,
            schema_version: SchemaVersion::V2,
            store_backend: StoreBackend::Memory,
            clinic_utc_offset_minutes: 0,
            booking_rate_limit: 20,
            booking_rate_window_seconds: 60,
            server_port: 3000,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let supabase_url = env::var("SUPABASE_URL")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_URL not set, using empty value");
                String::new()
            });
        let supabase_anon_key = env::var("SUPABASE_ANON_PUBLIC_KEY")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                String::new()
            });
        let supabase_service_role_key = env::var("SUPABASE_SERVICE_ROLE_KEY")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_SERVICE_ROLE_KEY not set, store calls will use the anon key");
                String::new()
            });
        let supabase_jwt_secret = env::var("SUPABASE_JWT_SECRET")
            .unwrap_or_else(|_| {
                warn!("SUPABASE_JWT_SECRET not set, using empty value");
                String::new()
            });
        let redis_url = env::var("REDIS_URL").ok().filter(|url| !url.is_empty());
        let doctor_seed_file = env::var("DOCTOR_SEED_FILE").ok().filter(|path| !path.trim().is_empty());

        let schema_version = match env::var("SCHEMA_VERSION") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: String| {
                warn!("{}, falling back to {}", e, defaults.schema_version);
                defaults.schema_version
            }),
            Err(_) => defaults.schema_version,
        };

        let supabase_ready = !supabase_url.is_empty() && !supabase_anon_key.is_empty();
        let store_backend = match env::var("APPOINTMENT_STORE") {
            Ok(raw) => raw.parse().unwrap_or_else(|e: String| {
                warn!("{}, falling back to in-memory store", e);
                StoreBackend::Memory
            }),
            Err(_) if supabase_ready => StoreBackend::Supabase,
            Err(_) => {
                warn!("Supabase not configured, using the in-memory appointment store");
                StoreBackend::Memory
            }
        };

        let config = Self {
            supabase_url,
            supabase_anon_key,
            supabase_service_role_key,
            supabase_jwt_secret,
            redis_url,
            doctor_seed_file,
            schema_version,
            store_backend,
            clinic_utc_offset_minutes: parse_or("CLINIC_UTC_OFFSET_MINUTES", defaults.clinic_utc_offset_minutes),
            booking_rate_limit: parse_or("BOOKING_RATE_LIMIT", defaults.booking_rate_limit),
            booking_rate_window_seconds: parse_or("BOOKING_RATE_WINDOW_SECONDS", defaults.booking_rate_window_seconds),
            server_port: parse_or("PORT", defaults.server_port),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Key used for store-level calls: the service role when present.
    pub fn store_api_key(&self) -> &str {
        if self.supabase_service_role_key.is_empty() {
            &self.supabase_anon_key
        } else {
            &self.supabase_service_role_key
        }
    }

    /// Fixed offset of the clinic wall clock. Out-of-range offsets fall back to UTC.
    pub fn clinic_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.clinic_utc_offset_minutes * 60)
            .unwrap_or_else(|| {
                warn!("CLINIC_UTC_OFFSET_MINUTES out of range ({}), using UTC", self.clinic_utc_offset_minutes);
                Utc.fix()
            })
    }
}

fn parse_or<T>(key: &str, default: T) -> T
where
    T: FromStr + fmt::Display + Copy,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has an invalid value ({}), using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
