//! CLI binary for avatar-service.
//!
//! A thin shim over the library crate: reads `ServiceConfig` from the
//! environment, applies flag overrides, and runs one of the entry points.

use anyhow::{Context, Result};
use avatar_service::schema::JobEvent;
use avatar_service::server::{self, DEFAULT_HOST, DEFAULT_PORT};
use avatar_service::service::DownloadProgress;
use avatar_service::{handle_event, AvatarService, Driver, JobOutput, ServiceConfig};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

const AFTER_HELP: &str = r#"EXAMPLES:
  # HTTP server on 0.0.0.0:8000
  avatar serve

  # One job from a file
  avatar job --input event.json

  # Warm worker: newline-delimited events on stdin, one result per line
  cat events.ndjson | avatar job

  # Pre-warm a container image (assets, CLI probe, legacy checkpoint)
  avatar prepare

ENVIRONMENT VARIABLES:
  SADTALKER_ROOT                   Toolkit checkout (default /opt/SadTalker)
  SADTALKER_PYTHON                 Interpreter (default /usr/bin/python3)
  SADTALKER_STILL                  0/false/no/off drops --still
  SADTALKER_PREPROCESS             full | crop | resize (default crop)
  SADTALKER_SIZE, SADTALKER_FPS    Optional numeric flags
  SADTALKER_ENHANCER               e.g. gfpgan; none disables
  SADTALKER_LEGACY_CHECKPOINT_URL  Empty disables the epoch_20.pth fetch
  UPLOAD_PROVIDER                  none | gcs
  MEDIA_BUCKET, MEDIA_PREFIX       GCS target (prefix default avatar-outputs/)
  GCS_PUBLIC                       1/true/yes → public URLs instead of signed
  GCS_SIGNED_URL_TTL               Signed URL lifetime, seconds (default 86400)
  GCP_SA_JSON                      Service-account JSON (raw or base64)
  GOOGLE_APPLICATION_CREDENTIALS   Path to service-account JSON
  APP_VERSION                      Reported by job pings
  AVATAR_FETCH_TIMEOUT_SECS        Input download timeout (default 30)
  RUST_LOG                         Overrides --verbose / --quiet
"#;

/// Talking-head video generation over HTTP or serverless jobs.
#[derive(Parser, Debug)]
#[command(
    name = "avatar",
    version,
    about = "Talking-head video generation over HTTP or serverless jobs",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Override SADTALKER_ROOT.
    #[arg(long, global = true)]
    toolkit_root: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "AVATAR_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "AVATAR_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve {
        /// Bind address.
        #[arg(long, env = "AVATAR_HOST", default_value = DEFAULT_HOST)]
        host: IpAddr,

        /// Bind port.
        #[arg(long, env = "AVATAR_PORT", default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Handle job events, writing one JSON result per line to stdout.
    Job {
        /// Read a single event from this file instead of NDJSON from stdin.
        #[arg(long)]
        input: Option<PathBuf>,
    },

    /// Ready a driver ahead of time.
    Prepare {
        /// Driver to prepare.
        #[arg(long, default_value = "sadtalker")]
        driver: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // stderr only: `avatar job` owns stdout.
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build service ────────────────────────────────────────────────────
    let mut config = ServiceConfig::from_env();
    if let Some(ref root) = cli.toolkit_root {
        config.toolkit.root = root.clone();
    }
    let service = Arc::new(AvatarService::new(config).context("Failed to initialise service")?);

    match cli.command {
        Command::Serve { host, port } => {
            server::serve(service, SocketAddr::new(host, port))
                .await
                .context("HTTP server failed")?;
        }
        Command::Job { ref input } => run_jobs(&service, input.as_ref()).await?,
        Command::Prepare { ref driver } => prepare(&service, driver, cli.quiet).await?,
    }

    Ok(())
}

/// One event from `path`, or NDJSON events from stdin until EOF.
async fn run_jobs(service: &AvatarService, path: Option<&PathBuf>) -> Result<()> {
    if let Some(path) = path {
        let text = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read job event from {:?}", path))?;
        let output = handle_line(service, &text).await;
        return emit(&output);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        let output = handle_line(service, &line).await;
        emit(&output)?;
    }
    Ok(())
}

async fn handle_line(service: &AvatarService, text: &str) -> JobOutput {
    match serde_json::from_str::<JobEvent>(text) {
        Ok(event) => handle_event(service, &event).await,
        Err(e) => JobOutput::Error {
            message: format!("Invalid job event: {e}"),
            trace: None,
        },
    }
}

fn emit(output: &JobOutput) -> Result<()> {
    let json = serde_json::to_string(output).context("Failed to serialise job result")?;
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    writeln!(handle, "{json}").context("Failed to write to stdout")?;
    handle.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// Readiness plus, for SadTalker, the legacy checkpoint download.
async fn prepare(service: &AvatarService, driver: &str, quiet: bool) -> Result<()> {
    let start = Instant::now();
    let driver: Driver = driver.parse().context("Invalid --driver")?;

    let spinner = ProgressBar::new_spinner();
    if quiet {
        spinner.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
    );
    spinner.set_prefix(driver.to_string());
    spinner.set_message("Checking toolkit and assets…");
    spinner.enable_steady_tick(Duration::from_millis(80));

    let ready = service.registry().ready(driver).await;
    spinner.finish_and_clear();
    ready.with_context(|| format!("{driver} is not ready"))?;

    if driver == Driver::SadTalker {
        let bar = download_bar(quiet);
        let progress_bar = bar.clone();
        let progress: DownloadProgress = Box::new(move |downloaded, total| {
            if let Some(t) = total {
                if progress_bar.length().unwrap_or(0) != t {
                    progress_bar.set_length(t);
                }
            }
            progress_bar.set_position(downloaded);
        });

        match service
            .fetch_legacy_checkpoint(Some(progress))
            .await
            .context("Failed to download legacy checkpoint")?
        {
            Some(path) => {
                bar.finish_and_clear();
                if !quiet {
                    eprintln!("  {} legacy checkpoint {}", green("✓"), dim(&path.display().to_string()));
                }
            }
            None => bar.finish_and_clear(),
        }
    }

    if !quiet {
        eprintln!(
            "{} {} ready in {}",
            green("✔"),
            bold(driver.as_str()),
            dim(&format!("{:.1}s", start.elapsed().as_secs_f64()))
        );
    }
    Ok(())
}

fn download_bar(quiet: bool) -> ProgressBar {
    let bar = ProgressBar::new(0);
    if quiet {
        bar.set_draw_target(indicatif::ProgressDrawTarget::hidden());
    }
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    bar.set_prefix("Checkpoint");
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}
