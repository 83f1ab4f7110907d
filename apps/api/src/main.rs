use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::{self, TraceLayer};
use tracing::{info, warn, Level};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod router;

use appointment_cell::services::{
    AppointmentBookingService, AppointmentStore, InMemoryAppointmentStore, InMemoryPatientDirectory,
    PatientDirectory, SupabaseAppointmentStore, SupabasePatientDirectory,
};
use appointment_cell::AppointmentState;
use doctor_cell::services::{DoctorRepository, InMemoryDoctorRepository, SupabaseDoctorRepository};
use doctor_cell::DoctorState;
use security_cell::{spawn_sweeper, InMemoryRateLimitStore, RateLimitState, RateLimitStore, RedisRateLimitStore};
use shared_config::{AppConfig, StoreBackend};

const RATE_LIMIT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Loading Env Vars
    dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting PocketCare API server");

    let config = Arc::new(AppConfig::from_env());
    info!(
        "Store backend: {:?}, schema {}, clinic offset {} min",
        config.store_backend, config.schema_version, config.clinic_utc_offset_minutes
    );

    let (doctors, appointments, patients) = build_stores(&config).await?;
    let rate_limit_store = build_rate_limit_store(&config).await;
    let _sweeper = spawn_sweeper(rate_limit_store.clone(), RATE_LIMIT_SWEEP_INTERVAL);

    let booking = AppointmentBookingService::new(appointments, doctors.clone(), patients, config.clinic_offset());
    let doctor_state = DoctorState::new(config.clone(), doctors);
    let appointment_state = AppointmentState::new(
        config.clone(),
        Arc::new(booking),
        RateLimitState::from_config(rate_limit_store, &config),
    );

    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router::create_router(doctor_state, appointment_state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(trace::DefaultMakeSpan::new()
                    .level(Level::INFO))
                .on_response(trace::DefaultOnResponse::new()
                    .level(Level::INFO)),
        )
        .layer(cors);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_stores(
    config: &AppConfig,
) -> anyhow::Result<(Arc<dyn DoctorRepository>, Arc<dyn AppointmentStore>, Arc<dyn PatientDirectory>)> {
    let stores = match config.store_backend {
        StoreBackend::Supabase => {
            let doctors: Arc<dyn DoctorRepository> = Arc::new(SupabaseDoctorRepository::new(config));
            let appointments: Arc<dyn AppointmentStore> = Arc::new(SupabaseAppointmentStore::new(config));
            let patients: Arc<dyn PatientDirectory> = Arc::new(SupabasePatientDirectory::new(config));
            (doctors, appointments, patients)
        }
        StoreBackend::Memory => {
            warn!("Using in-memory stores; data is lost on restart and every account id counts as a patient");
            let seed_file = config
                .doctor_seed_file
                .as_deref()
                .context("The in-memory backend needs DOCTOR_SEED_FILE pointing at a JSON array of doctors")?;
            let seeded = InMemoryDoctorRepository::from_seed_file(seed_file)
                .await
                .with_context(|| format!("Loading doctors from {}", seed_file))?;

            let doctors: Arc<dyn DoctorRepository> = Arc::new(seeded);
            let appointments: Arc<dyn AppointmentStore> = Arc::new(InMemoryAppointmentStore::new());
            let patients: Arc<dyn PatientDirectory> = Arc::new(InMemoryPatientDirectory::accept_any());
            (doctors, appointments, patients)
        }
    };

    Ok(stores)
}

async fn build_rate_limit_store(config: &AppConfig) -> Arc<dyn RateLimitStore> {
    if let Some(redis_url) = &config.redis_url {
        match RedisRateLimitStore::new(redis_url).await {
            Ok(store) => return Arc::new(store),
            Err(e) => warn!("Redis unavailable ({}), rate limiting per process", e),
        }
    }

    Arc::new(InMemoryRateLimitStore::new())
}
