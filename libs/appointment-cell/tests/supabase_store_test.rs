use assert_matches::assert_matches;
use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Value};
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::*;
use appointment_cell::services::{
    AppointmentStore, PatientDirectory, SupabaseAppointmentStore, SupabasePatientDirectory,
};
use shared_utils::test_utils::TestConfig;

fn store(server: &MockServer) -> SupabaseAppointmentStore {
    SupabaseAppointmentStore::new(&TestConfig::default().with_supabase_url(&server.uri()))
}

fn appointment_row(id: i64, status: &str) -> Value {
    json!({
        "id": id,
        "user_id": 100,
        "doctor_id": 7,
        "appointment_date": "2025-01-10",
        "appointment_time": "09:00:00",
        "status": status,
        "symptoms": null,
        "is_emergency": false,
        "created_at": "2025-01-09T08:00:00+00:00",
        "updated_at": null
    })
}

fn new_appointment(status: AppointmentStatus, is_emergency: bool) -> NewAppointment {
    NewAppointment {
        user_id: 100,
        doctor_id: 7,
        appointment_date: NaiveDate::from_ymd_opt(2025, 1, 10).unwrap(),
        appointment_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        status,
        symptoms: None,
        is_emergency,
    }
}

#[tokio::test]
async fn booking_goes_through_the_locking_function() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment_slot"))
        .and(header("apikey", "test-anon-key"))
        .and(body_json(json!({
            "p_user_id": 100,
            "p_doctor_id": 7,
            "p_appointment_date": "2025-01-10",
            "p_appointment_time": "09:00:00",
            "p_status": "confirmed",
            "p_symptoms": null,
            "p_is_emergency": false,
            "p_max_appointments": 5
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "admitted": true,
            "current_count": 2,
            "appointment": appointment_row(11, "confirmed")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = store(&server)
        .insert_with_admission(new_appointment(AppointmentStatus::Confirmed, false), Admission::Capacity(5))
        .await
        .unwrap();

    assert_matches!(outcome, AdmissionOutcome::Admitted { ref appointment, current_count: 2 } if appointment.id == 11);
}

#[tokio::test]
async fn admitted_row_from_legacy_timestamp_columns_decodes() {
    let server = MockServer::start().await;
    let mut row = appointment_row(13, "confirmed");
    row["created_at"] = json!("2025-01-09T08:00:00");
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment_slot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "admitted": true,
            "current_count": 0,
            "appointment": row
        })))
        .mount(&server)
        .await;

    let outcome = store(&server)
        .insert_with_admission(new_appointment(AppointmentStatus::Confirmed, false), Admission::Capacity(5))
        .await
        .unwrap();

    assert_matches!(
        outcome,
        AdmissionOutcome::Admitted { ref appointment, .. } if appointment.created_at.to_rfc3339() == "2025-01-09T08:00:00+00:00"
    );
}

#[tokio::test]
async fn full_slot_comes_back_without_a_row() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment_slot"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "admitted": false,
            "current_count": 5,
            "appointment": null
        })))
        .mount(&server)
        .await;

    let outcome = store(&server)
        .insert_with_admission(new_appointment(AppointmentStatus::Confirmed, false), Admission::Capacity(5))
        .await
        .unwrap();

    assert_eq!(outcome, AdmissionOutcome::SlotFull { current_count: 5 });
}

#[tokio::test]
async fn emergency_booking_sends_no_capacity() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/rpc/book_appointment_slot"))
        .and(body_json(json!({
            "p_user_id": 100,
            "p_doctor_id": 7,
            "p_appointment_date": "2025-01-10",
            "p_appointment_time": "09:00:00",
            "p_status": "pending",
            "p_symptoms": null,
            "p_is_emergency": true,
            "p_max_appointments": null
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "admitted": true,
            "current_count": 5,
            "appointment": appointment_row(12, "pending")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = store(&server)
        .insert_with_admission(new_appointment(AppointmentStatus::Pending, true), Admission::Bypass)
        .await
        .unwrap();

    assert_matches!(outcome, AdmissionOutcome::Admitted { .. });
}

#[tokio::test]
async fn occupancy_counts_only_active_rows() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", "eq.7"))
        .and(query_param("appointment_date", "eq.2025-01-10"))
        .and(query_param("appointment_time", "eq.09:00:00"))
        .and(query_param("status", "in.(pending,confirmed)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 1 }, { "id": 2 }, { "id": 3 }])))
        .mount(&server)
        .await;

    let count = store(&server)
        .count_active(new_appointment(AppointmentStatus::Confirmed, false).slot_key())
        .await
        .unwrap();

    assert_eq!(count, 3);
}

#[tokio::test]
async fn status_update_is_conditional_on_expected_status() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", "eq.11"))
        .and(query_param("status", "eq.pending"))
        .and(header("Prefer", "return=representation"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(11, "confirmed")])))
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", "eq.11"))
        .and(query_param("status", "eq.confirmed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let store = store(&server);

    let updated = store
        .update_status(11, AppointmentStatus::Pending, AppointmentStatus::Confirmed)
        .await
        .unwrap();
    assert_eq!(updated.map(|a| a.status), Some(AppointmentStatus::Confirmed));

    let lost_race = store
        .update_status(11, AppointmentStatus::Confirmed, AppointmentStatus::Cancelled)
        .await
        .unwrap();
    assert!(lost_race.is_none());
}

#[tokio::test]
async fn delete_is_restricted_to_cancelled_rows() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", "eq.11"))
        .and(query_param("status", "eq.cancelled"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([appointment_row(11, "cancelled")])))
        .expect(1)
        .mount(&server)
        .await;

    assert!(store(&server).delete_cancelled(11).await.unwrap());
}

#[tokio::test]
async fn listings_are_filtered_and_ordered() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("doctor_id", "eq.7"))
        .and(query_param("appointment_date", "eq.2025-01-10"))
        .and(query_param("order", "appointment_date.desc,appointment_time.asc,id.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            appointment_row(11, "confirmed"),
            appointment_row(12, "pending")
        ])))
        .mount(&server)
        .await;

    let appointments = store(&server)
        .list_for_doctor(7, NaiveDate::from_ymd_opt(2025, 1, 10))
        .await
        .unwrap();

    assert_eq!(appointments.iter().map(|a| a.id).collect::<Vec<_>>(), vec![11, 12]);
}

#[tokio::test]
async fn store_errors_surface_as_database_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let result = store(&server).find_by_id(1).await;

    assert_matches!(result, Err(AppointmentError::DatabaseError(_)));
}

#[tokio::test]
async fn patient_lookup_checks_user_table() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", "eq.100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "id": 100 }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/users"))
        .and(query_param("id", "eq.101"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let directory = SupabasePatientDirectory::new(&TestConfig::default().with_supabase_url(&server.uri()));

    assert!(directory.patient_exists(100).await.unwrap());
    assert!(!directory.patient_exists(101).await.unwrap());
}
