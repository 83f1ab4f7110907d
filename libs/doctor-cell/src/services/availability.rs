use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use tracing::{debug, instrument, warn};

use shared_config::SchemaVersion;

use crate::models::{
    canonical_weekday, weekday_name, AvailabilityUpdate, DaySpecificAvailability, Doctor,
    DoctorError, DoctorListing, DoctorSearch, DoctorSlotsResponse, SlotLabel, UpdateAvailabilityRequest,
};
use crate::services::doctor::DoctorRepository;

pub struct AvailabilityService {
    doctors: Arc<dyn DoctorRepository>,
    schema_version: SchemaVersion,
}

impl AvailabilityService {
    pub fn new(doctors: Arc<dyn DoctorRepository>, schema_version: SchemaVersion) -> Self {
        Self { doctors, schema_version }
    }

    pub async fn get_doctor(&self, doctor_id: i64) -> Result<Doctor, DoctorError> {
        self.doctors
            .find_doctor(doctor_id)
            .await?
            .ok_or(DoctorError::NotFound)
    }

    pub async fn search(&self, filters: &DoctorSearch) -> Result<Vec<DoctorListing>, DoctorError> {
        filters.validate()?;

        let doctors = self.doctors.search(filters).await?;
        debug!("Doctor search matched {}", doctors.len());

        Ok(doctors.into_iter().map(DoctorListing::from).collect())
    }

    /// Labels the doctor offers on `date`.
    pub async fn slots_for_date(
        &self,
        doctor_id: i64,
        date: NaiveDate,
    ) -> Result<DoctorSlotsResponse, DoctorError> {
        let doctor = self.get_doctor(doctor_id).await?;
        let slots = doctor.slots_for_date(date);

        debug!("Doctor {} offers {} slots on {}", doctor_id, slots.len(), date);

        Ok(DoctorSlotsResponse {
            doctor_id,
            date,
            weekday: weekday_name(date.weekday()).to_string(),
            slots,
        })
    }

    #[instrument(skip(self, request))]
    pub async fn update_availability(
        &self,
        doctor_id: i64,
        request: UpdateAvailabilityRequest,
    ) -> Result<Doctor, DoctorError> {
        let update = validate_update(request, self.schema_version)?;
        self.doctors.update_availability(doctor_id, &update).await
    }
}

/// Trim labels, canonicalise weekday names and reject anything that cannot
/// be stored for this schema.
pub fn validate_update(
    request: UpdateAvailabilityRequest,
    schema_version: SchemaVersion,
) -> Result<AvailabilityUpdate, DoctorError> {
    if request.is_empty() {
        return Err(DoctorError::validation("No fields to update", "body"));
    }

    if request.day_specific_availability.is_some() && !schema_version.supports_day_specific_availability() {
        warn!("Rejected day-specific availability on schema {}", schema_version);
        return Err(DoctorError::validation(
            format!("day_specific_availability is not supported by schema {}", schema_version),
            "day_specific_availability",
        ));
    }

    let available_slots = request
        .available_slots
        .map(|labels| clean_labels(labels, "available_slots"))
        .transpose()?;

    let available_days = request
        .available_days
        .map(|days| {
            days.iter()
                .map(|day| {
                    canonical_weekday(day)
                        .map(str::to_string)
                        .ok_or_else(|| DoctorError::validation(format!("Unknown weekday: {}", day), "available_days"))
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .transpose()?;

    let day_specific_availability = request
        .day_specific_availability
        .map(clean_day_specific)
        .transpose()?;

    Ok(AvailabilityUpdate {
        available_slots,
        available_days,
        day_specific_availability,
        is_available: request.is_available,
    })
}

fn clean_labels(labels: Vec<String>, field: &str) -> Result<Vec<SlotLabel>, DoctorError> {
    labels
        .into_iter()
        .map(|label| {
            let trimmed = label.trim();
            if trimmed.is_empty() {
                Err(DoctorError::validation("Slot labels must not be empty", field))
            } else {
                Ok(SlotLabel::new(trimmed))
            }
        })
        .collect()
}

fn clean_day_specific(days: BTreeMap<String, Vec<String>>) -> Result<DaySpecificAvailability, DoctorError> {
    let mut cleaned = DaySpecificAvailability::new();

    for (day, labels) in days {
        let weekday = canonical_weekday(&day).ok_or_else(|| {
            DoctorError::validation(format!("Unknown weekday: {}", day), "day_specific_availability")
        })?;
        let labels = clean_labels(labels, "day_specific_availability")?;
        cleaned.entry(weekday.to_string()).or_default().extend(labels);
    }

    Ok(cleaned)
}
