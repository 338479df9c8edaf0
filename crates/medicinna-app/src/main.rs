use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kanal::AsyncReceiver;
use medicinna_client::{BackendClient, Registration};
use medicinna_config::Config;
use medicinna_types::{AcquisitionMode, AppEvent, Role, VerificationOutcome};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use medicinna_app::controller::AppController;
use medicinna_app::state::AppState;

#[derive(Parser)]
#[command(name = "medicinna", version, about = "Verify medicine batch codes")]
struct Cli {
    /// JSON config profile; environment variables otherwise
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the backend URL
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Log in before running the command
    #[arg(long, global = true, requires = "password")]
    username: Option<String>,

    #[arg(long, global = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Verify a typed batch code
    Verify { code: String },
    /// Read a batch code from a photo of the label
    Ocr { image: PathBuf },
    /// Locate and read a barcode with the object detector
    Ai { image: PathBuf },
    /// Scan a barcode or 2D code with the camera
    Scan {
        /// Replay image files from this directory instead of a live camera
        #[arg(long)]
        frames: Option<PathBuf>,
    },
    /// Check credentials against the backend
    Login { username: String, password: String },
    /// Create an account
    Register {
        username: String,
        password: String,
        #[arg(long)]
        hospital: String,
        /// hospital, admin or manufacturer
        #[arg(long, default_value = "hospital")]
        role: String,
    },
    /// Scan totals
    Stats,
    /// Recent scans
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Check that the backend is reachable
    Ping,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!("{:#}", e);
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    if atty::is(atty::Stream::Stderr) {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load_or_env(cli.config.as_deref())?;
    if let Some(url) = cli.api_url {
        config.network.api_url = url;
    }
    let state = Arc::new(AppState::new(config));
    let credentials = cli.username.zip(cli.password);

    match cli.command {
        Command::Verify { code } => {
            acquire(state, credentials, None, AcquisitionMode::Manual, AppEvent::SubmitManual(code)).await
        }
        Command::Ocr { image } => {
            let bytes = read_image(&image)?;
            acquire(state, credentials, None, AcquisitionMode::OcrUpload, AppEvent::UploadImage(bytes)).await
        }
        Command::Ai { image } => {
            let bytes = read_image(&image)?;
            acquire(state, credentials, None, AcquisitionMode::AiSmartScan, AppEvent::AiScan(bytes)).await
        }
        Command::Scan { frames } => {
            acquire(state, credentials, frames.as_deref(), AcquisitionMode::BarcodeScan, AppEvent::StartCamera).await
        }
        Command::Login { username, password } => {
            let backend = backend(&state, None).await?;
            let session = backend.login(&username, &password).await?;
            println!("Logged in as {} ({:?})", session.username, session.role);
            Ok(())
        }
        Command::Register {
            username,
            password,
            hospital,
            role,
        } => {
            let role: Role = serde_json::from_value(serde_json::Value::String(role.to_lowercase()))
                .context("Role must be hospital, admin or manufacturer")?;
            let backend = backend(&state, None).await?;
            let message = backend
                .register(&Registration {
                    username,
                    password,
                    hospital_name: hospital,
                    role,
                })
                .await?;
            println!("{message}");
            Ok(())
        }
        Command::Stats => {
            let stats = backend(&state, credentials).await?.stats().await?;
            println!("Total scans: {}", stats.total);
            println!("Fake detected: {}", stats.fake);
            Ok(())
        }
        Command::History { limit } => {
            let history = backend(&state, credentials).await?.history().await?;
            for log in history.iter().take(limit) {
                println!(
                    "{}  {:<20} {:<12} {}",
                    log.timestamp,
                    log.batch_id,
                    log.status.to_string(),
                    log.scanned_by
                );
            }
            Ok(())
        }
        Command::Ping => {
            let backend = backend(&state, credentials).await?;
            backend
                .ping()
                .await
                .with_context(|| format!("Backend at {} is not reachable", backend.base_url()))?;
            println!("Backend at {} is up", backend.base_url());
            Ok(())
        }
    }
}

fn read_image(path: &Path) -> anyhow::Result<Vec<u8>> {
    std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))
}

async fn backend(
    state: &AppState,
    credentials: Option<(String, String)>,
) -> anyhow::Result<BackendClient> {
    let config = state.config.read().await.network.clone();
    let backend = BackendClient::new(&config, state.session.clone())?;
    if let Some((username, password)) = credentials {
        backend.login(&username, &password).await.context("Login failed")?;
    }
    Ok(backend)
}

/// Push one request through the event loop and print what comes back
async fn acquire(
    state: Arc<AppState>,
    credentials: Option<(String, String)>,
    frames: Option<&Path>,
    mode: AcquisitionMode,
    request: AppEvent,
) -> anyhow::Result<()> {
    let capacity = state.config.read().await.event_capacity;
    let controller = AppController::new(state, capacity);
    let mut tasks = controller.spawn_tasks(frames).await?;

    let requests = controller.sender();
    if let Some((username, password)) = credentials {
        requests.send(AppEvent::Login { username, password }).await?;
    }
    requests.send(AppEvent::SwitchMode(mode)).await?;
    requests.send(request).await?;

    let result = tokio::select! {
        result = wait_for_outcome(controller.receiver()) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Shutdown requested");
            Err(anyhow::anyhow!("Interrupted"))
        }
    };

    controller.shutdown();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Task exited with error: {:#}", e),
            Err(e) => tracing::error!("Task panicked: {}", e),
        }
    }

    let outcome = result?;
    print_outcome(&outcome);
    Ok(())
}

async fn wait_for_outcome(events: AsyncReceiver<AppEvent>) -> anyhow::Result<VerificationOutcome> {
    loop {
        match events.recv().await? {
            AppEvent::ShowVerification { code, outcome } => {
                println!("Batch: {code}");
                return Ok(outcome);
            }
            AppEvent::ShowError(message) => anyhow::bail!(message),
            AppEvent::CodeDetected { code, .. } => tracing::info!("Detected {}", code),
            AppEvent::OcrProgress { progress, .. } => tracing::info!("OCR {}%", progress),
            AppEvent::StatusUpdate { status, busy } if !status.is_empty() => {
                tracing::info!("{} (busy: {})", status, busy)
            }
            AppEvent::SessionChanged {
                username: Some(username),
                role,
            } => tracing::info!("Logged in as {} ({:?})", username, role),
            _ => {}
        }
    }
}

fn print_outcome(outcome: &VerificationOutcome) {
    println!("Status: {}", outcome.status);
    println!("Details: {}", outcome.details);
    if let Some(record) = &outcome.data {
        println!("Medicine: {}", record.medicine_name);
        println!("Manufacturer: {}", record.manufacturer);
        println!("Expiry: {}", record.expiry_date);
        println!("Purity: {}%", record.purity);
    }
}
