//! Gamefleet Control - Fleet Controller Service
//!
//! This is the main entry point for the fleet controller. It rebuilds the
//! registry from instances already running at the provisioner, starts the
//! control loop as a background task, and serves the allocator API.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gamefleet_control::{
    FleetConfig, FleetController, FleetRegistry, HealthReporter, HttpHealthReporter, Instance,
};
use gamefleet_provision::{K8sProvisioner, Provisioner, ProvisionerConfig};

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    registry: Arc<FleetRegistry>,
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    active_instances: usize,
    standby_instances: usize,
    aggregate_capacity: u32,
}

#[derive(Serialize)]
struct AllocateResponse {
    instance_id: String,
    address: String,
    available_capacity: u32,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "gamefleet-control",
        active_instances: state.registry.active_len(),
        standby_instances: state.registry.standby_len(),
        aggregate_capacity: state.registry.aggregate_capacity(),
    })
}

async fn allocate_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.registry.allocate() {
        Ok(instance) => (
            StatusCode::OK,
            Json(AllocateResponse {
                instance_id: instance.id.to_string(),
                address: instance.address,
                available_capacity: instance.available_capacity,
            }),
        )
            .into_response(),
        Err(e) => {
            let status = StatusCode::from_u16(e.http_status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn instances_handler(State(state): State<AppState>) -> Json<Vec<Instance>> {
    Json(state.registry.list_active())
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/v1/allocate", post(allocate_handler))
        .route("/v1/instances", get(instances_handler))
        .with_state(state)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,gamefleet=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Gamefleet Control");

    // Load configuration from environment
    let listen_addr = std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let fleet_config = FleetConfig::from_env();
    fleet_config.validate()?;
    let provisioner_config = ProvisionerConfig::from_env();

    tracing::info!(
        namespace = %provisioner_config.namespace,
        instance_class = %provisioner_config.instance_class,
        upscale_margin = fleet_config.upscale_margin,
        downscale_margin = fleet_config.downscale_margin,
        "Loaded configuration"
    );

    // Initialize provisioner and health reporter
    let provisioner: Arc<dyn Provisioner> =
        Arc::new(K8sProvisioner::new(provisioner_config).await?);
    tracing::info!("Connected to Kubernetes cluster");

    let reporter: Arc<dyn HealthReporter> =
        Arc::new(HttpHealthReporter::new(fleet_config.health_timeout));

    // Rebuild the registry from any instances that survived a restart
    let registry = Arc::new(FleetRegistry::new());
    let controller = Arc::new(FleetController::new(
        Arc::clone(&registry),
        provisioner,
        reporter,
        fleet_config,
    ));
    controller.bootstrap().await;
    tracing::info!(
        active = registry.active_len(),
        "Registry rebuilt from provisioner"
    );

    // Start the control loop as a background task
    let loop_controller = Arc::clone(&controller);
    tokio::spawn(async move {
        loop_controller.run().await;
    });
    tracing::info!("Started fleet control loop");

    // Create app state
    let state = AppState { registry };

    // Create router
    let app = create_router(state);

    // Start server
    tracing::info!(listen_addr = %listen_addr, "Starting HTTP server");
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
