use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Map, Value};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use shared_config::{AppConfig, SchemaVersion};
use shared_database::supabase::SupabaseClient;

use crate::models::{AvailabilityUpdate, Doctor, DoctorError, DoctorSearch};

/// Read and write access to doctor profiles.
#[async_trait]
pub trait DoctorRepository: Send + Sync {
    async fn find_doctor(&self, doctor_id: i64) -> Result<Option<Doctor>, DoctorError>;

    /// Doctors matching every given filter, ordered by name.
    async fn search(&self, filters: &DoctorSearch) -> Result<Vec<Doctor>, DoctorError>;

    async fn update_availability(
        &self,
        doctor_id: i64,
        update: &AvailabilityUpdate,
    ) -> Result<Doctor, DoctorError>;
}

// ==============================================================================
// SUPABASE
// ==============================================================================

pub struct SupabaseDoctorRepository {
    supabase: SupabaseClient,
    schema_version: SchemaVersion,
}

impl SupabaseDoctorRepository {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            schema_version: config.schema_version,
        }
    }

    fn decode(&self, row: Value) -> Result<Doctor, DoctorError> {
        let mut doctor: Doctor = serde_json::from_value(row)
            .map_err(|e| DoctorError::DatabaseError(format!("Failed to parse doctor: {}", e)))?;

        if !self.schema_version.supports_day_specific_availability() {
            doctor.day_specific_availability = None;
        }

        Ok(doctor)
    }

    fn update_body(&self, update: &AvailabilityUpdate) -> Result<Value, DoctorError> {
        let mut body = Map::new();

        if let Some(slots) = &update.available_slots {
            body.insert("available_slots".to_string(), json!(slots));
        }
        if let Some(days) = &update.available_days {
            body.insert("available_days".to_string(), json!(days));
        }
        if let Some(day_specific) = &update.day_specific_availability {
            if !self.schema_version.supports_day_specific_availability() {
                return Err(DoctorError::validation(
                    format!("day_specific_availability is not supported by schema {}", self.schema_version),
                    "day_specific_availability",
                ));
            }
            body.insert("day_specific_availability".to_string(), json!(day_specific));
        }
        if let Some(is_available) = update.is_available {
            body.insert("is_available".to_string(), json!(is_available));
        }

        Ok(Value::Object(body))
    }
}

#[async_trait]
impl DoctorRepository for SupabaseDoctorRepository {
    async fn find_doctor(&self, doctor_id: i64) -> Result<Option<Doctor>, DoctorError> {
        debug!("Fetching doctor profile: {}", doctor_id);

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await
            .map_err(|e| {
                error!("Failed to fetch doctor {}: {}", doctor_id, e);
                DoctorError::DatabaseError(e.to_string())
            })?;

        rows.into_iter().next().map(|row| self.decode(row)).transpose()
    }

    async fn search(&self, filters: &DoctorSearch) -> Result<Vec<Doctor>, DoctorError> {
        debug!("Searching doctors with filters: {:?}", filters);

        let mut query_parts = vec!["select=*".to_string()];

        if let Some(name) = filters.name() {
            query_parts.push(format!("name=ilike.{}", urlencoding::encode(&format!("*{}*", name))));
        }
        if let Some(specialty) = filters.specialty() {
            query_parts.push(format!("specialty=eq.{}", urlencoding::encode(specialty)));
        }
        if let Some(min_fee) = filters.min_fee {
            query_parts.push(format!("consultation_fee=gte.{}", min_fee));
        }
        if let Some(max_fee) = filters.max_fee {
            query_parts.push(format!("consultation_fee=lte.{}", max_fee));
        }
        query_parts.push("order=name.asc,id.asc".to_string());

        let path = format!("/rest/v1/doctors?{}", query_parts.join("&"));
        let rows: Vec<Value> = self.supabase.request(Method::GET, &path, None, None).await
            .map_err(|e| {
                error!("Failed to search doctors: {}", e);
                DoctorError::DatabaseError(e.to_string())
            })?;

        rows.into_iter().map(|row| self.decode(row)).collect()
    }

    async fn update_availability(
        &self,
        doctor_id: i64,
        update: &AvailabilityUpdate,
    ) -> Result<Doctor, DoctorError> {
        let body = self.update_body(update)?;

        let path = format!("/rest/v1/doctors?id=eq.{}", doctor_id);
        let rows: Vec<Value> = self.supabase.request_returning(Method::PATCH, &path, Some(body)).await
            .map_err(|e| {
                error!("Failed to update availability for doctor {}: {}", doctor_id, e);
                DoctorError::DatabaseError(e.to_string())
            })?;

        let row = rows.into_iter().next().ok_or(DoctorError::NotFound)?;
        info!("Availability updated for doctor {}", doctor_id);
        self.decode(row)
    }
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

/// Process-local doctor table for the memory backend and tests.
#[derive(Default)]
pub struct InMemoryDoctorRepository {
    doctors: RwLock<HashMap<i64, Doctor>>,
}

impl InMemoryDoctorRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_doctors(doctors: impl IntoIterator<Item = Doctor>) -> Self {
        let doctors = doctors.into_iter().map(|doctor| (doctor.id, doctor)).collect();
        Self { doctors: RwLock::new(doctors) }
    }

    /// Parses a JSON array of doctor rows, in the same shape the doctors
    /// table returns them.
    pub fn from_json(raw: &str) -> Result<Self, DoctorError> {
        let doctors: Vec<Doctor> = serde_json::from_str(raw)
            .map_err(|e| DoctorError::DatabaseError(format!("Invalid doctor seed data: {}", e)))?;
        Ok(Self::with_doctors(doctors))
    }

    pub async fn from_seed_file(path: impl AsRef<Path>) -> Result<Self, DoctorError> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await.map_err(|e| {
            DoctorError::DatabaseError(format!("Cannot read doctor seed file {}: {}", path.display(), e))
        })?;

        let repository = Self::from_json(&raw)?;
        info!("Seeded {} doctors from {}", repository.doctors.read().await.len(), path.display());
        Ok(repository)
    }
}

#[async_trait]
impl DoctorRepository for InMemoryDoctorRepository {
    async fn find_doctor(&self, doctor_id: i64) -> Result<Option<Doctor>, DoctorError> {
        Ok(self.doctors.read().await.get(&doctor_id).cloned())
    }

    async fn search(&self, filters: &DoctorSearch) -> Result<Vec<Doctor>, DoctorError> {
        let mut doctors: Vec<Doctor> = self
            .doctors
            .read()
            .await
            .values()
            .filter(|doctor| filters.matches(doctor))
            .cloned()
            .collect();

        doctors.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(doctors)
    }

    async fn update_availability(
        &self,
        doctor_id: i64,
        update: &AvailabilityUpdate,
    ) -> Result<Doctor, DoctorError> {
        let mut doctors = self.doctors.write().await;
        let doctor = doctors.get_mut(&doctor_id).ok_or(DoctorError::NotFound)?;

        if let Some(slots) = &update.available_slots {
            doctor.available_slots = slots.clone();
        }
        if let Some(days) = &update.available_days {
            doctor.available_days = days.clone();
        }
        if let Some(day_specific) = &update.day_specific_availability {
            doctor.day_specific_availability = Some(day_specific.clone());
        }
        if let Some(is_available) = update.is_available {
            doctor.is_available = is_available;
        }

        info!("Availability updated for doctor {}", doctor_id);
        Ok(doctor.clone())
    }
}
