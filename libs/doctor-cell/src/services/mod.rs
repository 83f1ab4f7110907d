pub mod doctor;
pub mod availability;

pub use doctor::{DoctorRepository, InMemoryDoctorRepository, SupabaseDoctorRepository};
pub use availability::AvailabilityService;
