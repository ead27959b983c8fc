use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use intake_core::config::{flag_from_env_value, timeout_from_env_value};
use intake_core::constants::DEFAULT_REST_ADDR;
use intake_core::pipeline::CreatedRecords;
use intake_core::{
    Backend, FamilyPlanningIntake, HttpBackend, IntakeConfig, IntakeError, IntakeOrchestrator,
    IntakeRecords, KnownRecords, RecordUpdate, SubmissionKey, SubmitOptions, UpdateOutcome,
    apply_updates,
};

/// Application state shared across REST API handlers
#[derive(Clone)]
struct AppState {
    orchestrator: IntakeOrchestrator,
}

#[derive(Serialize)]
struct HealthRes {
    ok: bool,
    message: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitIntakeReq {
    intake: FamilyPlanningIntake,
    #[serde(default)]
    submission_key: Option<SubmissionKey>,
    #[serde(default)]
    known: Option<KnownRecords>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitIntakeRes {
    submission_key: SubmissionKey,
    records: IntakeRecords,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitErrorRes {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    step: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created: Option<CreatedRecords>,
    #[serde(skip_serializing_if = "Option::is_none")]
    submission_key: Option<SubmissionKey>,
}

impl SubmitErrorRes {
    fn invalid(error: &IntakeError) -> Self {
        Self {
            error: error.to_string(),
            step: None,
            response_body: None,
            created: None,
            submission_key: None,
        }
    }
}

#[derive(Serialize)]
struct UpdateRecordsRes {
    outcomes: Vec<UpdateOutcome>,
}

/// Main entry point for the intake REST service
///
/// Starts the REST server on the configured address (default: 0.0.0.0:3000).
///
/// # Environment Variables
/// - `INTAKE_API_BASE_URL`: Records backend base URL (required)
/// - `INTAKE_API_TOKEN`: Bearer token for the records backend (optional)
/// - `INTAKE_HTTP_TIMEOUT_SECS`: Per-request timeout in seconds (optional, default: none)
/// - `INTAKE_IDEMPOTENCY_KEYS`: Send `Idempotency-Key` headers (default: "true")
/// - `INTAKE_REST_ADDR`: Server address (default: "0.0.0.0:3000")
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the backend configuration is missing or invalid,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("intake_run=info".parse()?)
                .add_directive("intake_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let base_url = std::env::var("INTAKE_API_BASE_URL")
        .map_err(|_| anyhow::anyhow!("INTAKE_API_BASE_URL must be set"))?;
    let request_timeout = timeout_from_env_value(std::env::var("INTAKE_HTTP_TIMEOUT_SECS").ok())?;
    let idempotency_keys =
        flag_from_env_value(std::env::var("INTAKE_IDEMPOTENCY_KEYS").ok(), true)?;
    let cfg = IntakeConfig::new(
        &base_url,
        std::env::var("INTAKE_API_TOKEN").ok(),
        request_timeout,
        idempotency_keys,
    )?;

    let rest_addr = std::env::var("INTAKE_REST_ADDR").unwrap_or_else(|_| DEFAULT_REST_ADDR.into());

    tracing::info!("++ Starting intake REST on {}", rest_addr);
    tracing::info!("++ Records backend at {}", cfg.base_url());

    let backend: Arc<dyn Backend> = Arc::new(HttpBackend::new(&cfg)?);
    let state = AppState {
        orchestrator: IntakeOrchestrator::new(backend)
            .with_idempotency_keys(cfg.idempotency_keys()),
    };

    let listener = tokio::net::TcpListener::bind(&rest_addr).await?;
    axum::serve(listener, app(state)).await?;

    Ok(())
}

fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/family-planning/intakes", post(submit_intake))
        .route("/family-planning/records", patch(update_records))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Health check endpoint for the REST API
#[axum::debug_handler]
async fn health(State(_state): State<AppState>) -> Json<HealthRes> {
    Json(HealthRes {
        ok: true,
        message: "Intake REST API is alive".into(),
    })
}

/// Submit a complete family planning intake
///
/// Validates the intake, then creates every backend record in dependency order.
///
/// # Returns
/// * `201` with the created identifiers and the submission key
/// * `400` if the intake fails validation
/// * `502` if a backend call fails; the body names the failing step and lists the records
///   already created, which are not rolled back
#[axum::debug_handler]
async fn submit_intake(
    State(state): State<AppState>,
    Json(req): Json<SubmitIntakeReq>,
) -> Result<(StatusCode, Json<SubmitIntakeRes>), (StatusCode, Json<SubmitErrorRes>)> {
    let plan = req.intake.into_plan().map_err(|e| {
        tracing::warn!("Rejected intake: {}", e);
        (StatusCode::BAD_REQUEST, Json(SubmitErrorRes::invalid(&e)))
    })?;

    let submission_key = req.submission_key.unwrap_or_default();
    let options = SubmitOptions {
        known: req.known,
        submission_key: Some(submission_key),
    };

    match state.orchestrator.submit(&plan, options).await {
        Ok(records) => Ok((
            StatusCode::CREATED,
            Json(SubmitIntakeRes {
                submission_key,
                records,
            }),
        )),
        Err(e) => {
            tracing::error!("Submit intake error: {:?}", e);
            Err((
                StatusCode::BAD_GATEWAY,
                Json(SubmitErrorRes {
                    error: e.source.to_string(),
                    step: Some(e.step.name()),
                    response_body: e.source.response_body().map(str::to_owned),
                    created: Some(e.created),
                    submission_key: Some(submission_key),
                }),
            ))
        }
    }
}

/// Apply a batch of in-place record updates
///
/// Updates are dispatched concurrently. The response carries one outcome per update, in
/// request order; a failed update does not fail the request.
#[axum::debug_handler]
async fn update_records(
    State(state): State<AppState>,
    Json(updates): Json<Vec<RecordUpdate>>,
) -> Json<UpdateRecordsRes> {
    let backend = Arc::clone(state.orchestrator.backend());
    let outcomes = apply_updates(backend, updates).await;
    Json(UpdateRecordsRes { outcomes })
}
