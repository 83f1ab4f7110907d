use assert_matches::assert_matches;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use doctor_cell::models::{AvailabilityUpdate, DoctorError, DoctorSearch, SlotLabel};
use doctor_cell::services::{DoctorRepository, InMemoryDoctorRepository, SupabaseDoctorRepository};
use shared_config::SchemaVersion;
use shared_utils::test_utils::TestConfig;

fn repository(server: &MockServer, schema_version: SchemaVersion) -> SupabaseDoctorRepository {
    let mut config = TestConfig::default().with_supabase_url(&server.uri());
    config.schema_version = schema_version;
    SupabaseDoctorRepository::new(&config)
}

fn doctor_row() -> serde_json::Value {
    json!({
        "id": 4,
        "name": "Dr. Rao",
        "specialty": "Dermatology",
        "is_available": true,
        "available_slots": "[\"09:00-11:00\"]",
        "available_days": "[\"Monday\"]",
        "day_specific_availability": { "Tuesday": ["15:00-16:00"] }
    })
}

#[tokio::test]
async fn find_doctor_reads_text_encoded_columns() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", "eq.4"))
        .and(header("apikey", "test-anon-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doctor_row()])))
        .mount(&server)
        .await;

    let doctor = repository(&server, SchemaVersion::V2).find_doctor(4).await.unwrap().unwrap();

    assert_eq!(doctor.available_slots, vec![SlotLabel::new("09:00-11:00")]);
    assert!(doctor.has_day_specific_availability());
}

#[tokio::test]
async fn legacy_schema_ignores_day_specific_column() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doctor_row()])))
        .mount(&server)
        .await;

    let doctor = repository(&server, SchemaVersion::V1).find_doctor(4).await.unwrap().unwrap();

    assert!(doctor.day_specific_availability.is_none());
}

#[tokio::test]
async fn missing_doctor_is_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let doctor = repository(&server, SchemaVersion::V2).find_doctor(5).await.unwrap();

    assert!(doctor.is_none());
}

#[tokio::test]
async fn update_patches_only_supplied_columns() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("id", "eq.4"))
        .and(header("Prefer", "return=representation"))
        .and(body_json(json!({ "is_available": false })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doctor_row()])))
        .expect(1)
        .mount(&server)
        .await;

    let update = AvailabilityUpdate {
        is_available: Some(false),
        ..Default::default()
    };
    let doctor = repository(&server, SchemaVersion::V2).update_availability(4, &update).await.unwrap();

    assert_eq!(doctor.id, 4);
}

#[tokio::test]
async fn store_failure_is_database_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let result = repository(&server, SchemaVersion::V2).find_doctor(4).await;

    assert_matches!(result, Err(DoctorError::DatabaseError(_)));
}

#[tokio::test]
async fn search_translates_filters_to_query_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("name", "ilike.*rao*"))
        .and(query_param("specialty", "eq.Dermatology"))
        .and(query_param("consultation_fee", "gte.300"))
        .and(query_param("consultation_fee", "lte.800"))
        .and(query_param("order", "name.asc,id.asc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doctor_row()])))
        .expect(1)
        .mount(&server)
        .await;

    let filters = DoctorSearch {
        name: Some(" Rao ".to_string()),
        specialty: Some("Dermatology".to_string()),
        min_fee: Some(300.0),
        max_fee: Some(800.0),
    };
    let doctors = repository(&server, SchemaVersion::V2).search(&filters).await.unwrap();

    assert_eq!(doctors.len(), 1);
    assert_eq!(doctors[0].name, "Dr. Rao");
}

#[tokio::test]
async fn search_without_filters_lists_everyone() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/doctors"))
        .and(query_param("select", "*"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([doctor_row(), doctor_row()])))
        .mount(&server)
        .await;

    let doctors = repository(&server, SchemaVersion::V2).search(&DoctorSearch::default()).await.unwrap();

    assert_eq!(doctors.len(), 2);
}

#[tokio::test]
async fn seed_file_populates_memory_repository() {
    let path = std::env::temp_dir().join(format!("doctor-seed-{}.json", std::process::id()));
    tokio::fs::write(&path, json!([doctor_row()]).to_string()).await.unwrap();

    let repository = InMemoryDoctorRepository::from_seed_file(&path).await.unwrap();
    tokio::fs::remove_file(&path).await.unwrap();

    let doctor = repository.find_doctor(4).await.unwrap().unwrap();
    assert_eq!(doctor.available_slots, vec![SlotLabel::new("09:00-11:00")]);
}

#[tokio::test]
async fn unreadable_seed_data_is_an_error() {
    assert_matches!(InMemoryDoctorRepository::from_json("{\"id\": 1}").err(), Some(DoctorError::DatabaseError(_)));
    assert_matches!(
        InMemoryDoctorRepository::from_seed_file("/nonexistent/doctors.json").await.err(),
        Some(DoctorError::DatabaseError(_))
    );
}
