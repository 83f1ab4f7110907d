use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Prefix the identity provider puts in front of admin subjects (`admin_7`).
pub const ADMIN_SUBJECT_PREFIX: &str = "admin_";

#[derive(Debug, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
}

/// `sub` may be a JSON string or a bare number depending on the issuer.
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtClaims {
    #[serde(deserialize_with = "subject_from_string_or_number")]
    pub sub: String,
    pub exp: Option<u64>,
    pub email: Option<String>,
    pub role: Option<String>,
    pub user_metadata: Option<serde_json::Value>,
    pub iat: Option<u64>,
}

fn subject_from_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid subject: {}", other))),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub role: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
}

impl User {
    /// Numeric account id or admin subject carried by the token.
    pub fn identity(&self) -> Result<CallerIdentity, AppError> {
        self.id.parse()
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.role.as_deref() == Some(role)
    }
}

/// Who is calling. Users and doctors live in separate tables but both
/// authenticate with their integer id; which record a caller acts on is decided
/// by matching that id against the appointment, not by a token role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallerIdentity {
    Account(i64),
    Admin(String),
}

impl CallerIdentity {
    pub fn account_id(&self) -> Option<i64> {
        match self {
            CallerIdentity::Account(id) => Some(*id),
            CallerIdentity::Admin(_) => None,
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, CallerIdentity::Admin(_))
    }
}

impl std::str::FromStr for CallerIdentity {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let subject = s.trim();
        if subject.starts_with(ADMIN_SUBJECT_PREFIX) && subject.len() > ADMIN_SUBJECT_PREFIX.len() {
            return Ok(CallerIdentity::Admin(subject.to_string()));
        }

        subject
            .parse::<i64>()
            .ok()
            .filter(|id| *id > 0)
            .map(CallerIdentity::Account)
            .ok_or_else(|| AppError::Auth(format!("Unrecognised token subject: {}", subject)))
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallerIdentity::Account(id) => write!(f, "{}", id),
            CallerIdentity::Admin(subject) => write!(f, "{}", subject),
        }
    }
}
