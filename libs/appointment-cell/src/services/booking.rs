use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use doctor_cell::models::{Doctor, SlotLabel};
use doctor_cell::services::DoctorRepository;
use shared_models::auth::CallerIdentity;

use crate::models::{
    Admission, AdmissionOutcome, Appointment, AppointmentError, AppointmentStatus,
    AvailabilitySnapshot, CheckAvailabilityRequest, ConfirmOutcome, CreateAppointmentRequest,
    DoctorSlotsOccupancy, DoctorStats, NewAppointment, SlotKey, SlotOccupancy,
};
use crate::services::capacity::slot_capacity;
use crate::services::directory::PatientDirectory;
use crate::services::lifecycle::{AppointmentAction, AppointmentLifecycleService, Transition};
use crate::services::normalization::normalize_time;
use crate::services::store::AppointmentStore;

/// Source of "now". Swappable so date rules can be exercised at a fixed instant.
pub type Clock = fn() -> DateTime<Utc>;

/// Re-reads allowed when a status write loses a compare-and-set race.
const MAX_TRANSITION_ATTEMPTS: u32 = 3;

/// A slot request that passed field validation.
#[derive(Debug, Clone)]
struct RequestedSlot {
    doctor_id: i64,
    appointment_date: NaiveDate,
    appointment_time: NaiveTime,
    label: SlotLabel,
}

impl RequestedSlot {
    fn key(&self) -> SlotKey {
        SlotKey {
            doctor_id: self.doctor_id,
            appointment_date: self.appointment_date,
            appointment_time: self.appointment_time,
        }
    }

    fn starts_at(&self) -> NaiveDateTime {
        self.appointment_date.and_time(self.appointment_time)
    }
}

enum Applied {
    Updated(Appointment),
    Unchanged(Appointment),
    Removed(Appointment),
}

pub struct AppointmentBookingService {
    store: Arc<dyn AppointmentStore>,
    doctors: Arc<dyn DoctorRepository>,
    patients: Arc<dyn PatientDirectory>,
    lifecycle: AppointmentLifecycleService,
    clinic_offset: FixedOffset,
    clock: Clock,
}

impl AppointmentBookingService {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        doctors: Arc<dyn DoctorRepository>,
        patients: Arc<dyn PatientDirectory>,
        clinic_offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            doctors,
            patients,
            lifecycle: AppointmentLifecycleService::new(),
            clinic_offset,
            clock: Utc::now,
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    fn clinic_now(&self) -> NaiveDateTime {
        (self.clock)().with_timezone(&self.clinic_offset).naive_local()
    }

    // ==========================================================================
    // BOOKING
    // ==========================================================================

    /// Book a slot for the calling patient. Emergencies enter `pending` and
    /// skip the capacity check; everything else is auto-confirmed if the slot
    /// has room and refused otherwise. `caller_is_doctor` reflects the
    /// token's role claim.
    #[instrument(skip(self, request))]
    pub async fn create_appointment(
        &self,
        caller: &CallerIdentity,
        caller_is_doctor: bool,
        request: CreateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let slot = validate_slot(
            request.doctor_id.as_ref(),
            request.appointment_date.as_deref(),
            request.appointment_time.as_deref(),
        )?;

        let user_id = match caller {
            CallerIdentity::Account(id) => *id,
            CallerIdentity::Admin(_) => {
                return Err(AppointmentError::Unauthorized("Admins cannot book appointments".to_string()));
            }
        };
        if caller_is_doctor {
            warn!("Doctor token {} used on the patient booking path", user_id);
            return Err(AppointmentError::Unauthorized(
                "Doctors cannot book appointments as patients".to_string(),
            ));
        }

        if slot.starts_at() < self.clinic_now() {
            return Err(AppointmentError::InPast);
        }

        self.find_doctor(slot.doctor_id).await?;

        if !self.patients.patient_exists(user_id).await? {
            warn!("Booking attempted by unknown patient {}", user_id);
            return Err(AppointmentError::NotAPatient);
        }

        let is_emergency = request.is_emergency.unwrap_or(false);
        let capacity = slot_capacity(&slot.label);
        let (status, admission) = if is_emergency {
            (AppointmentStatus::Pending, Admission::Bypass)
        } else {
            (AppointmentStatus::Confirmed, Admission::Capacity(capacity.max_appointments))
        };

        let new = NewAppointment {
            user_id,
            doctor_id: slot.doctor_id,
            appointment_date: slot.appointment_date,
            appointment_time: slot.appointment_time,
            status,
            symptoms: request
                .symptoms
                .map(|symptoms| symptoms.trim().to_string())
                .filter(|symptoms| !symptoms.is_empty()),
            is_emergency,
        };

        match self.store.insert_with_admission(new, admission).await? {
            AdmissionOutcome::Admitted { appointment, current_count } => {
                info!(
                    "Appointment {} booked for patient {} ({}, {} already booked, emergency: {})",
                    appointment.id, user_id, slot.key(), current_count, is_emergency
                );
                Ok(appointment)
            }
            AdmissionOutcome::SlotFull { current_count } => {
                warn!(
                    "Slot full for {}: {}/{}",
                    slot.key(), current_count, capacity.max_appointments
                );
                Err(AppointmentError::SlotFull {
                    max_appointments: capacity.max_appointments,
                    current_count,
                })
            }
        }
    }

    /// Occupancy snapshot for a requested slot, computed the same way the
    /// booking path computes it. Nothing is written.
    pub async fn check_availability(
        &self,
        request: CheckAvailabilityRequest,
    ) -> Result<AvailabilitySnapshot, AppointmentError> {
        let slot = validate_slot(
            request.doctor_id.as_ref(),
            request.appointment_date.as_deref(),
            request.appointment_time.as_deref(),
        )?;

        self.find_doctor(slot.doctor_id).await?;

        let capacity = slot_capacity(&slot.label);
        let current_count = self.store.count_active(slot.key()).await?;

        debug!("Availability for {}: {}/{}", slot.key(), current_count, capacity.max_appointments);

        Ok(AvailabilitySnapshot::new(
            capacity.max_appointments,
            current_count,
            capacity.duration_hours,
        ))
    }

    /// Every label the doctor offers on `date`, with its occupancy.
    pub async fn doctor_slots(
        &self,
        doctor_id: i64,
        date: NaiveDate,
    ) -> Result<DoctorSlotsOccupancy, AppointmentError> {
        let doctor = self.find_doctor(doctor_id).await?;

        let mut slots = Vec::new();
        for label in doctor.slots_for_date(date) {
            let appointment_time = match normalize_time(&label) {
                Ok(time) => time,
                Err(_) => {
                    warn!("Skipping unreadable slot label '{}' of doctor {}", label, doctor_id);
                    continue;
                }
            };

            let capacity = slot_capacity(&label);
            let key = SlotKey {
                doctor_id,
                appointment_date: date,
                appointment_time,
            };
            let current_count = self.store.count_active(key).await?;

            slots.push(SlotOccupancy {
                slot: label,
                appointment_time,
                availability: AvailabilitySnapshot::new(
                    capacity.max_appointments,
                    current_count,
                    capacity.duration_hours,
                ),
            });
        }

        Ok(DoctorSlotsOccupancy { doctor_id, date, slots })
    }

    // ==========================================================================
    // LIFECYCLE
    // ==========================================================================

    #[instrument(skip(self))]
    pub async fn confirm_appointment(
        &self,
        caller: &CallerIdentity,
        appointment_id: i64,
    ) -> Result<ConfirmOutcome, AppointmentError> {
        match self.apply(caller, appointment_id, AppointmentAction::Confirm).await? {
            Applied::Updated(appointment) => {
                info!("Appointment {} confirmed", appointment_id);
                Ok(ConfirmOutcome { appointment, changed: true })
            }
            Applied::Unchanged(appointment) => {
                debug!("Appointment {} was already confirmed", appointment_id);
                Ok(ConfirmOutcome { appointment, changed: false })
            }
            Applied::Removed(_) => Err(AppointmentError::DatabaseError(
                "Confirm unexpectedly removed the appointment".to_string(),
            )),
        }
    }

    #[instrument(skip(self))]
    pub async fn cancel_appointment(
        &self,
        caller: &CallerIdentity,
        appointment_id: i64,
    ) -> Result<Appointment, AppointmentError> {
        match self.apply(caller, appointment_id, AppointmentAction::Cancel).await? {
            Applied::Updated(appointment) => {
                info!("Appointment {} cancelled", appointment_id);
                Ok(appointment)
            }
            Applied::Unchanged(_) | Applied::Removed(_) => Err(AppointmentError::DatabaseError(
                "Cancel did not update the appointment".to_string(),
            )),
        }
    }

    #[instrument(skip(self))]
    pub async fn delete_appointment(
        &self,
        caller: &CallerIdentity,
        appointment_id: i64,
    ) -> Result<(), AppointmentError> {
        match self.apply(caller, appointment_id, AppointmentAction::Delete).await? {
            Applied::Removed(_) => {
                info!("Appointment {} deleted", appointment_id);
                Ok(())
            }
            Applied::Updated(_) | Applied::Unchanged(_) => Err(AppointmentError::DatabaseError(
                "Delete did not remove the appointment".to_string(),
            )),
        }
    }

    /// Load, authorize, plan and write. A lost compare-and-set means the row
    /// moved underneath us, so it is re-read and re-planned.
    async fn apply(
        &self,
        caller: &CallerIdentity,
        appointment_id: i64,
        action: AppointmentAction,
    ) -> Result<Applied, AppointmentError> {
        let caller_id = account_id(caller, action.as_str())?;

        for attempt in 1..=MAX_TRANSITION_ATTEMPTS {
            let appointment = self
                .store
                .find_by_id(appointment_id)
                .await?
                .ok_or(AppointmentError::NotFound)?;

            self.lifecycle.authorize(caller_id, &appointment, action)?;

            match self.lifecycle.plan(action, appointment.status)? {
                Transition::Unchanged => return Ok(Applied::Unchanged(appointment)),
                Transition::Update { from, to } => {
                    if let Some(updated) = self.store.update_status(appointment_id, from, to).await? {
                        return Ok(Applied::Updated(updated));
                    }
                }
                Transition::Remove => {
                    if self.store.delete_cancelled(appointment_id).await? {
                        return Ok(Applied::Removed(appointment));
                    }
                }
            }

            debug!(
                "Appointment {} changed during {} (attempt {}/{})",
                appointment_id,
                action.as_str(),
                attempt,
                MAX_TRANSITION_ATTEMPTS
            );
        }

        Err(AppointmentError::DatabaseError(format!(
            "Appointment {} kept changing during {}",
            appointment_id,
            action.as_str()
        )))
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    pub async fn get_appointment(
        &self,
        caller: &CallerIdentity,
        appointment_id: i64,
    ) -> Result<Appointment, AppointmentError> {
        let caller_id = account_id(caller, "view")?;
        let appointment = self
            .store
            .find_by_id(appointment_id)
            .await?
            .ok_or(AppointmentError::NotFound)?;

        if caller_id != appointment.user_id && caller_id != appointment.doctor_id {
            return Err(AppointmentError::Unauthorized(
                "You are not allowed to view this appointment".to_string(),
            ));
        }

        Ok(appointment)
    }

    pub async fn patient_appointments(
        &self,
        caller: &CallerIdentity,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let user_id = account_id(caller, "list")?;
        self.store.list_for_patient(user_id, date).await
    }

    pub async fn doctor_appointments(
        &self,
        caller: &CallerIdentity,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let doctor_id = self.calling_doctor(caller).await?;
        self.store.list_for_doctor(doctor_id, date).await
    }

    pub async fn doctor_stats(&self, caller: &CallerIdentity) -> Result<DoctorStats, AppointmentError> {
        let doctor_id = self.calling_doctor(caller).await?;
        let appointments = self.store.list_for_doctor(doctor_id, None).await?;
        let today = self.clinic_now().date();

        Ok(summarize(&appointments, today))
    }

    async fn find_doctor(&self, doctor_id: i64) -> Result<Doctor, AppointmentError> {
        self.doctors
            .find_doctor(doctor_id)
            .await?
            .ok_or(AppointmentError::DoctorNotFound)
    }

    async fn calling_doctor(&self, caller: &CallerIdentity) -> Result<i64, AppointmentError> {
        let doctor_id = account_id(caller, "list")?;
        match self.doctors.find_doctor(doctor_id).await? {
            Some(_) => Ok(doctor_id),
            None => Err(AppointmentError::Unauthorized(
                "Only doctors can view their schedule".to_string(),
            )),
        }
    }
}

fn account_id(caller: &CallerIdentity, action: &str) -> Result<i64, AppointmentError> {
    caller.account_id().ok_or_else(|| {
        AppointmentError::Unauthorized(format!("Admin accounts cannot {} appointments", action))
    })
}

pub fn summarize(appointments: &[Appointment], today: NaiveDate) -> DoctorStats {
    let with_status = |status: AppointmentStatus| {
        appointments.iter().filter(|a| a.status == status).count() as u32
    };

    DoctorStats {
        total_appointments: appointments.len() as u32,
        completed_appointments: with_status(AppointmentStatus::Completed),
        pending_appointments: with_status(AppointmentStatus::Pending),
        total_patients: appointments.iter().map(|a| a.user_id).collect::<HashSet<_>>().len() as u32,
        today_appointments: appointments
            .iter()
            .filter(|a| a.appointment_date == today && a.status != AppointmentStatus::Cancelled)
            .count() as u32,
    }
}

// ==============================================================================
// FIELD VALIDATION
// ==============================================================================

fn validate_slot(
    doctor_id: Option<&Value>,
    appointment_date: Option<&str>,
    appointment_time: Option<&str>,
) -> Result<RequestedSlot, AppointmentError> {
    let mut missing = Vec::new();
    if doctor_id.map_or(true, is_blank) {
        missing.push("doctor_id".to_string());
    }
    if appointment_date.map_or(true, |date| date.trim().is_empty()) {
        missing.push("appointment_date".to_string());
    }
    if appointment_time.map_or(true, |time| time.trim().is_empty()) {
        missing.push("appointment_time".to_string());
    }

    let (Some(doctor_id), Some(appointment_date), Some(raw_time)) = (doctor_id, appointment_date, appointment_time)
    else {
        return Err(AppointmentError::MissingFields(missing));
    };
    if !missing.is_empty() {
        return Err(AppointmentError::MissingFields(missing));
    }

    let doctor_id = parse_doctor_id(doctor_id)?;
    let appointment_date = NaiveDate::parse_from_str(appointment_date.trim(), "%Y-%m-%d").map_err(|_| {
        AppointmentError::invalid_field("appointment_date", "Invalid date format. Use YYYY-MM-DD")
    })?;
    let label = SlotLabel::new(raw_time);
    let appointment_time = normalize_time(&label)?;

    Ok(RequestedSlot {
        doctor_id,
        appointment_date,
        appointment_time,
        label,
    })
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.trim().is_empty(),
        _ => false,
    }
}

/// Accepts `7` or `"7"`.
fn parse_doctor_id(value: &Value) -> Result<i64, AppointmentError> {
    let parsed = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed
        .filter(|id| *id > 0)
        .ok_or_else(|| AppointmentError::invalid_field("doctor_id", "doctor_id must be a positive integer"))
}
