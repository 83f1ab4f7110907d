use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde_json::json;
use sha2::Sha256;

use shared_config::{AppConfig, StoreBackend};
use shared_models::auth::User;

pub struct TestConfig {
    pub jwt_secret: String,
    pub supabase_url: String,
    pub supabase_anon_key: String,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            jwt_secret: "test-secret-key-for-jwt-validation-must-be-long-enough".to_string(),
            supabase_url: "http://localhost:54321".to_string(),
            supabase_anon_key: "test-anon-key".to_string(),
        }
    }
}

impl TestConfig {
    pub fn to_app_config(&self) -> AppConfig {
        AppConfig {
            supabase_url: self.supabase_url.clone(),
            supabase_anon_key: self.supabase_anon_key.clone(),
            supabase_jwt_secret: self.jwt_secret.clone(),
            store_backend: StoreBackend::Memory,
            ..AppConfig::default()
        }
    }

    /// Config pointing the Supabase-backed stores at a mock server.
    pub fn with_supabase_url(&self, url: &str) -> AppConfig {
        AppConfig {
            supabase_url: url.to_string(),
            store_backend: StoreBackend::Supabase,
            ..self.to_app_config()
        }
    }

    pub fn to_arc(&self) -> Arc<AppConfig> {
        Arc::new(self.to_app_config())
    }
}

pub struct TestUser {
    pub id: i64,
    pub email: String,
    pub role: String,
}

impl TestUser {
    pub fn new(id: i64, role: &str) -> Self {
        Self {
            id,
            email: format!("{}{}@example.com", role, id),
            role: role.to_string(),
        }
    }

    pub fn doctor(id: i64) -> Self {
        Self::new(id, "doctor")
    }

    pub fn patient(id: i64) -> Self {
        Self::new(id, "user")
    }

    pub fn subject(&self) -> String {
        self.id.to_string()
    }

    pub fn to_user(&self) -> User {
        User {
            id: self.subject(),
            email: Some(self.email.clone()),
            role: Some(self.role.clone()),
            metadata: None,
            created_at: Some(Utc::now()),
        }
    }

    /// Same identity without a role claim, as issued by the plain login flow.
    pub fn to_user_without_role(&self) -> User {
        User {
            role: None,
            ..self.to_user()
        }
    }
}

pub fn admin_user(admin_id: i64) -> User {
    User {
        id: format!("admin_{}", admin_id),
        email: Some(format!("admin{}@example.com", admin_id)),
        role: Some("admin".to_string()),
        metadata: None,
        created_at: Some(Utc::now()),
    }
}

pub struct JwtTestUtils;

impl JwtTestUtils {
    pub fn create_test_token(user: &TestUser, secret: &str, exp_hours: Option<i64>) -> String {
        Self::create_token_for_subject(&user.subject(), Some(&user.role), secret, exp_hours)
    }

    pub fn create_token_for_subject(subject: &str, role: Option<&str>, secret: &str, exp_hours: Option<i64>) -> String {
        let now = Utc::now();
        let exp = now + Duration::hours(exp_hours.unwrap_or(24));

        let header = json!({
            "alg": "HS256",
            "typ": "JWT"
        });

        let payload = json!({
            "sub": subject,
            "role": role,
            "iat": now.timestamp(),
            "exp": exp.timestamp()
        });

        let header_encoded = general_purpose::URL_SAFE_NO_PAD.encode(header.to_string());
        let payload_encoded = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string());

        let signing_input = format!("{}.{}", header_encoded, payload_encoded);

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
            .expect("HMAC can take key of any size");
        mac.update(signing_input.as_bytes());
        let signature = mac.finalize().into_bytes();
        let signature_encoded = general_purpose::URL_SAFE_NO_PAD.encode(signature);

        format!("{}.{}", signing_input, signature_encoded)
    }

    pub fn create_expired_token(user: &TestUser, secret: &str) -> String {
        Self::create_test_token(user, secret, Some(-1))
    }

    pub fn create_invalid_signature_token(user: &TestUser) -> String {
        Self::create_test_token(user, "wrong-secret", Some(24))
    }

    pub fn create_malformed_token() -> String {
        "not-a-jwt".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_creation() {
        let config = TestConfig::default();
        let app_config = config.to_app_config();

        assert_eq!(app_config.supabase_url, "http://localhost:54321");
        assert_eq!(app_config.store_backend, StoreBackend::Memory);
        assert!(!app_config.supabase_jwt_secret.is_empty());

        let mocked = config.with_supabase_url("http://127.0.0.1:9999");
        assert_eq!(mocked.store_backend, StoreBackend::Supabase);
        assert_eq!(mocked.supabase_jwt_secret, app_config.supabase_jwt_secret);
    }

    #[test]
    fn test_user_creation() {
        let user = TestUser::doctor(4);
        assert_eq!(user.role, "doctor");

        let user_model = user.to_user();
        assert_eq!(user_model.id, "4");
        assert!(user_model.has_role("doctor"));
        assert!(user.to_user_without_role().role.is_none());
        assert!(admin_user(1).identity().unwrap().is_admin());
    }

    #[test]
    fn test_jwt_token_creation() {
        let token = JwtTestUtils::create_test_token(&TestUser::patient(1), "test-secret", Some(1));
        assert_eq!(token.split('.').count(), 3);
    }
}
