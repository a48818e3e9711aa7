use std::sync::Arc;

use anyhow::Context;
use chrono::Local;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

use planher::api::{
    ApiClient, ForecastBoard, ForecastState, PredictionClient, SessionListener, SubmissionClient,
    SubmissionOutcome,
};
use planher::config::{ClientConfig, FieldKind, FieldSpec, OnboardingConfig};
use planher::error::Error;
use planher::onboarding::{OnboardingManager, OnboardingStep, StepInput};
use planher::store::{DraftBackend, DraftStore, LibSqlBackend};

/// Prints a notice; the terminal has no login screen to return to.
struct TerminalSession;

impl SessionListener for TerminalSession {
    fn session_expired(&self, endpoint: &str) {
        eprintln!("   Session expired ({endpoint}). Set PLANHER_API_TOKEN and try again.");
    }
}

enum Command {
    Answers(StepInput),
    Back,
    Quit,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .init();

    let config = ClientConfig::from_env().context("invalid PLANHER_* configuration")?;

    eprintln!("PlanHer v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {}", config.base_url);
    eprintln!("   Draft: {}", config.db_path.display());
    eprintln!("   Type 'back' to revisit a step, 'quit' to stop (answers are kept).\n");

    // ── Storage ─────────────────────────────────────────────────────────
    let backend: Arc<dyn DraftBackend> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("failed to open draft database {}", config.db_path.display()))?,
    );
    let draft = Arc::new(DraftStore::open(backend).await.context("failed to load draft")?);

    // ── Backend ─────────────────────────────────────────────────────────
    let api = Arc::new(
        ApiClient::new(&config)
            .context("failed to build HTTP client")?
            .with_session_listener(Arc::new(TerminalSession)),
    );
    let submission = Arc::new(SubmissionClient::new(
        api.clone(),
        draft.clone(),
        config.profile_path.clone(),
    ));

    let manager = OnboardingManager::resume(OnboardingConfig::default(), draft, submission).await;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        let step = manager.current_step().await;
        if step.is_terminal() {
            break;
        }

        if let Some(message) = manager.status().await.last_error {
            eprintln!("   Last attempt failed: {message}");
        }

        let fields = manager.config().fields_for(step).to_vec();
        eprintln!("── {step} ──");
        let input = match read_step(&mut lines, &fields).await? {
            Command::Answers(input) => input,
            Command::Back => {
                if let Err(e) = manager.go_back().await {
                    eprintln!("   {e}");
                }
                continue;
            }
            Command::Quit => {
                eprintln!("Answers saved. Run again to continue.");
                return Ok(());
            }
        };

        let today = Local::now().date_naive();
        match manager.answer(step, &input, today).await {
            Ok(_) => {}
            Err(Error::Validation(failure)) => {
                eprintln!("   {}: {}", failure.field, failure.reason);
                continue;
            }
            Err(e) => return Err(e).context("failed to record answers"),
        }

        if step != OnboardingStep::Step4 {
            continue;
        }

        match manager.finish(today).await {
            Ok(SubmissionOutcome::Submitted { .. }) => eprintln!("Profile saved."),
            Ok(SubmissionOutcome::Rejected { reason }) => eprintln!("   Rejected: {reason}"),
            Ok(SubmissionOutcome::TransportFailure { reason }) => {
                eprintln!("   Could not reach the backend: {reason}")
            }
            Ok(SubmissionOutcome::Unauthorized) => eprintln!("   Not signed in."),
            Ok(SubmissionOutcome::AlreadyInFlight) => {}
            Err(Error::Assembly(e)) => eprintln!("   {e}"),
            Err(e) => return Err(e).context("submission failed"),
        }
    }

    // ── Forecast ────────────────────────────────────────────────────────
    let predictions = PredictionClient::new(api, config.prediction_mode);
    let board = ForecastBoard::new();
    board.refresh(&predictions, Some(Local::now().date_naive())).await;

    match board.current().await {
        ForecastState::Ready(result) => {
            println!("Day {} of your cycle ({})", result.day_of_cycle, result.cycle_phase);
            println!(
                "Mood: {} ({}% energy)",
                result.mood.label, result.mood.energy_percent
            );
            if let Some(days) = result.next_period_in_days {
                println!("Next period in {days} days");
            }
        }
        ForecastState::Unavailable { reason } => println!("Forecast unavailable: {reason}"),
        ForecastState::Loading => {}
    }

    Ok(())
}

/// Ask every field of one step. Blank answers are passed through and left to
/// the validator.
async fn read_step(
    lines: &mut Lines<BufReader<Stdin>>,
    fields: &[FieldSpec],
) -> anyhow::Result<Command> {
    let mut input = StepInput::new();
    let mut stdout = tokio::io::stdout();

    for field in fields {
        let prompt = format!("{}{}: ", field.name, hint(field));
        stdout.write_all(prompt.as_bytes()).await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await.context("failed to read stdin")? else {
            return Ok(Command::Quit);
        };
        match line.trim() {
            "back" => return Ok(Command::Back),
            "quit" => return Ok(Command::Quit),
            answer => {
                input.insert(field.name.clone(), answer.to_string());
            }
        }
    }
    Ok(Command::Answers(input))
}

fn hint(field: &FieldSpec) -> String {
    let optional = if field.required { "" } else { ", optional" };
    match &field.kind {
        FieldKind::Choice { truthy, falsy } => format!(" [{truthy}/{falsy}{optional}]"),
        FieldKind::Integer { min, max } => format!(" [{min}-{max}{optional}]"),
        FieldKind::Decimal { min, max } => format!(" [{min}-{max}{optional}]"),
        FieldKind::Date => format!(" [YYYY-MM-DD{optional}]"),
        FieldKind::Text => format!(" [text{optional}]"),
    }
}
