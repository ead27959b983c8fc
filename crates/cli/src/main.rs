use clap::{Parser, Subcommand};
use intake_core::bmi::body_mass_index;
use intake_core::config::{flag_from_env_value, timeout_from_env_value};
use intake_core::{
    apply_updates, FamilyPlanningIntake, HttpBackend, IntakeConfig, IntakeOrchestrator,
    KnownRecords, RecordUpdate, SubmissionKey, SubmitOptions,
};
use intake_types::{FpRecordId, PatientRecordId, RawId};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "intake")]
#[command(about = "Family planning intake submission CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a family planning intake from a JSON file
    Submit {
        /// Path to the intake JSON
        file: PathBuf,
        /// Reuse the key of an earlier attempt so the backend can deduplicate
        #[arg(long)]
        submission_key: Option<String>,
        /// Existing patient record identifier (edit mode)
        #[arg(long, requires = "fprecord_id")]
        patrec_id: Option<RawId>,
        /// Existing family planning record identifier (edit mode)
        #[arg(long, requires = "patrec_id")]
        fprecord_id: Option<RawId>,
    },
    /// Apply a JSON array of record updates
    Update {
        /// Path to the updates JSON
        file: PathBuf,
    },
    /// Compute BMI and its category
    Bmi {
        /// Weight in kilograms
        weight_kg: f64,
        /// Height in centimetres
        height_cm: f64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("intake=info".parse()?)
                .add_directive("intake_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            file,
            submission_key,
            patrec_id,
            fprecord_id,
        } => {
            let intake: FamilyPlanningIntake = read_json(&file)?;
            let plan = intake.into_plan()?;

            let submission_key = submission_key
                .as_deref()
                .map(SubmissionKey::parse)
                .transpose()?
                .unwrap_or_default();
            let known = match (patrec_id, fprecord_id) {
                (Some(patrec_id), Some(fprecord_id)) => Some(KnownRecords {
                    patrec_id: PatientRecordId::new(patrec_id),
                    fprecord_id: FpRecordId::new(fprecord_id),
                }),
                _ => None,
            };

            let cfg = config_from_env()?;
            let orchestrator = IntakeOrchestrator::new(Arc::new(HttpBackend::new(&cfg)?))
                .with_idempotency_keys(cfg.idempotency_keys());

            tracing::info!(
                file = %file.display(),
                submission = %submission_key,
                "submitting intake"
            );
            let options = SubmitOptions {
                known,
                submission_key: Some(submission_key),
            };
            match orchestrator.submit(&plan, options).await {
                Ok(records) => println!("{}", serde_json::to_string_pretty(&records)?),
                Err(e) => {
                    eprintln!("Error submitting intake: {}", e);
                    if let Some(body) = e.source.response_body() {
                        eprintln!("Backend response: {}", body);
                    }
                    eprintln!(
                        "Records already created: {}",
                        serde_json::to_string_pretty(&e.created)?
                    );
                    eprintln!("Retry with --submission-key {}", submission_key);
                    std::process::exit(1);
                }
            }
        }
        Commands::Update { file } => {
            let updates: Vec<RecordUpdate> = read_json(&file)?;
            if updates.is_empty() {
                println!("No updates to apply.");
                return Ok(());
            }

            let cfg = config_from_env()?;
            let outcomes = apply_updates(Arc::new(HttpBackend::new(&cfg)?), updates).await;
            println!("{}", serde_json::to_string_pretty(&outcomes)?);
            if outcomes.iter().any(|o| !o.is_ok()) {
                std::process::exit(1);
            }
        }
        Commands::Bmi {
            weight_kg,
            height_cm,
        } => {
            let derived = body_mass_index(Some(weight_kg), Some(height_cm));
            println!("BMI: {} ({})", derived.bmi, derived.bmi_category);
        }
    }

    Ok(())
}

fn config_from_env() -> anyhow::Result<IntakeConfig> {
    let base_url = std::env::var("INTAKE_API_BASE_URL")
        .map_err(|_| anyhow::anyhow!("INTAKE_API_BASE_URL must be set"))?;
    let request_timeout = timeout_from_env_value(std::env::var("INTAKE_HTTP_TIMEOUT_SECS").ok())?;
    let idempotency_keys =
        flag_from_env_value(std::env::var("INTAKE_IDEMPOTENCY_KEYS").ok(), true)?;

    Ok(IntakeConfig::new(
        &base_url,
        std::env::var("INTAKE_API_TOKEN").ok(),
        request_timeout,
        idempotency_keys,
    )?)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))
}
