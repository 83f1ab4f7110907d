pub mod booking;
pub mod capacity;
pub mod directory;
pub mod lifecycle;
pub mod normalization;
pub mod slot_lock;
pub mod store;
pub mod supabase_store;

pub use booking::AppointmentBookingService;
pub use capacity::{slot_capacity, SlotCapacity};
pub use directory::{InMemoryPatientDirectory, PatientDirectory, SupabasePatientDirectory};
pub use lifecycle::AppointmentLifecycleService;
pub use normalization::normalize_time;
pub use slot_lock::SlotLockRegistry;
pub use store::{AppointmentStore, InMemoryAppointmentStore};
pub use supabase_store::SupabaseAppointmentStore;
