use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use crate::models::{
    Admission, AdmissionOutcome, Appointment, AppointmentError, AppointmentStatus, NewAppointment,
    SlotKey,
};
use crate::services::slot_lock::SlotLockRegistry;

/// Persistence for appointments. `insert_with_admission` is the only write
/// that creates rows and must count and insert as one unit per slot.
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn insert_with_admission(
        &self,
        appointment: NewAppointment,
        admission: Admission,
    ) -> Result<AdmissionOutcome, AppointmentError>;

    /// Pending plus confirmed appointments holding the slot.
    async fn count_active(&self, key: SlotKey) -> Result<u32, AppointmentError>;

    async fn find_by_id(&self, appointment_id: i64) -> Result<Option<Appointment>, AppointmentError>;

    /// Compare-and-set on status. `None` when the row is gone or no longer in
    /// `expected`.
    async fn update_status(
        &self,
        appointment_id: i64,
        expected: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError>;

    /// Removes the row only while it is cancelled. Returns whether a row went.
    async fn delete_cancelled(&self, appointment_id: i64) -> Result<bool, AppointmentError>;

    async fn list_for_patient(
        &self,
        user_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn list_for_doctor(
        &self,
        doctor_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, AppointmentError>;
}

/// Newest date first, earliest time first within a day.
pub fn sort_for_listing(appointments: &mut [Appointment]) {
    appointments.sort_by(|a, b| {
        b.appointment_date
            .cmp(&a.appointment_date)
            .then(a.appointment_time.cmp(&b.appointment_time))
            .then(a.id.cmp(&b.id))
    });
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

#[derive(Default)]
struct Rows {
    next_id: i64,
    by_id: BTreeMap<i64, Appointment>,
}

/// Process-local store. Admission holds the slot's lock from the count until
/// the row is visible, so concurrent bookings of one slot cannot overshoot.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    rows: RwLock<Rows>,
    slot_locks: SlotLockRegistry,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes a row as-is, bypassing admission. Used to seed fixtures.
    pub async fn seed(&self, appointment: Appointment) {
        let mut rows = self.rows.write().await;
        rows.next_id = rows.next_id.max(appointment.id);
        rows.by_id.insert(appointment.id, appointment);
    }

    async fn count_locked(&self, key: SlotKey) -> u32 {
        let rows = self.rows.read().await;
        rows.by_id
            .values()
            .filter(|appointment| appointment.status.is_active() && appointment.slot_key() == key)
            .count() as u32
    }

    async fn list_where(
        &self,
        date: Option<NaiveDate>,
        belongs: impl Fn(&Appointment) -> bool,
    ) -> Vec<Appointment> {
        let rows = self.rows.read().await;
        let mut appointments: Vec<Appointment> = rows
            .by_id
            .values()
            .filter(|appointment| belongs(appointment))
            .filter(|appointment| date.map_or(true, |date| appointment.appointment_date == date))
            .cloned()
            .collect();
        sort_for_listing(&mut appointments);
        appointments
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn insert_with_admission(
        &self,
        new: NewAppointment,
        admission: Admission,
    ) -> Result<AdmissionOutcome, AppointmentError> {
        let key = new.slot_key();
        let _slot = self.slot_locks.acquire(key).await;

        let current_count = self.count_locked(key).await;
        if let Admission::Capacity(max_appointments) = admission {
            if current_count >= max_appointments {
                debug!("Slot {} full: {}/{}", key, current_count, max_appointments);
                return Ok(AdmissionOutcome::SlotFull { current_count });
            }
        }

        let mut rows = self.rows.write().await;
        rows.next_id += 1;
        let appointment = Appointment {
            id: rows.next_id,
            user_id: new.user_id,
            doctor_id: new.doctor_id,
            appointment_date: new.appointment_date,
            appointment_time: new.appointment_time,
            status: new.status,
            symptoms: new.symptoms,
            is_emergency: new.is_emergency,
            created_at: Utc::now(),
            updated_at: None,
        };
        rows.by_id.insert(appointment.id, appointment.clone());

        Ok(AdmissionOutcome::Admitted { appointment, current_count })
    }

    async fn count_active(&self, key: SlotKey) -> Result<u32, AppointmentError> {
        Ok(self.count_locked(key).await)
    }

    async fn find_by_id(&self, appointment_id: i64) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.rows.read().await.by_id.get(&appointment_id).cloned())
    }

    async fn update_status(
        &self,
        appointment_id: i64,
        expected: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<Option<Appointment>, AppointmentError> {
        let mut rows = self.rows.write().await;
        match rows.by_id.get_mut(&appointment_id) {
            Some(appointment) if appointment.status == expected => {
                appointment.status = new_status;
                appointment.updated_at = Some(Utc::now());
                Ok(Some(appointment.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn delete_cancelled(&self, appointment_id: i64) -> Result<bool, AppointmentError> {
        let mut rows = self.rows.write().await;
        let cancelled = rows
            .by_id
            .get(&appointment_id)
            .map_or(false, |appointment| appointment.status == AppointmentStatus::Cancelled);

        if cancelled {
            rows.by_id.remove(&appointment_id);
        }
        Ok(cancelled)
    }

    async fn list_for_patient(
        &self,
        user_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self.list_where(date, |appointment| appointment.user_id == user_id).await)
    }

    async fn list_for_doctor(
        &self,
        doctor_id: i64,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        Ok(self.list_where(date, |appointment| appointment.doctor_id == doctor_id).await)
    }
}
