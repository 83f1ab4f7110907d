use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;

/// Existence lookup for patient accounts.
#[async_trait]
pub trait PatientDirectory: Send + Sync {
    async fn patient_exists(&self, user_id: i64) -> Result<bool, AppointmentError>;
}

pub struct SupabasePatientDirectory {
    supabase: SupabaseClient,
}

impl SupabasePatientDirectory {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }
}

#[async_trait]
impl PatientDirectory for SupabasePatientDirectory {
    async fn patient_exists(&self, user_id: i64) -> Result<bool, AppointmentError> {
        debug!("Looking up patient {}", user_id);

        let path = format!("/rest/v1/users?id=eq.{}&select=id", user_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await
            .map_err(|e| {
                error!("Patient lookup failed for {}: {}", user_id, e);
                AppointmentError::DatabaseError(e.to_string())
            })?;

        Ok(!rows.is_empty())
    }
}

#[derive(Default)]
pub struct InMemoryPatientDirectory {
    patients: RwLock<HashSet<i64>>,
    accept_any: bool,
}

impl InMemoryPatientDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_patients(patients: impl IntoIterator<Item = i64>) -> Self {
        Self {
            patients: RwLock::new(patients.into_iter().collect()),
            accept_any: false,
        }
    }

    /// Treats every account id as a registered patient. For local runs
    /// without a user table.
    pub fn accept_any() -> Self {
        Self {
            accept_any: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl PatientDirectory for InMemoryPatientDirectory {
    async fn patient_exists(&self, user_id: i64) -> Result<bool, AppointmentError> {
        Ok(self.accept_any || self.patients.read().await.contains(&user_id))
    }
}
