//! Hoist - entry point
//!
//! Runs as the custom runtime of a serverless function: it loads the
//! project configuration, then relays every invocation to the application
//! process or the static files.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info, Instrument};

use hoist_config::{Config, ConfigLoader, CONFIG_FILE};
use hoist_relay::{COMMIT_ENV, STAGE_ENV};
use hoist_runtime::logging::{init_logging, LogConfig};
use hoist_runtime::runtime_api::{self, RuntimeApiClient, RUNTIME_API_ENV};
use hoist_runtime::Runtime;

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
    /// Event file processed once instead of polling the runtime API.
    event: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;
        let mut event = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--event" | "-e" => {
                    event = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("hoist {}", hoist_runtime::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config, event }
    }
}

fn print_help() {
    println!(
        r"Hoist - serverless runtime that relays invocations to a web application

USAGE:
    hoist [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (default: hoist.json if present)
    -e, --event <PATH>     Handle one invocation event from a file and print the result
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    AWS_LAMBDA_RUNTIME_API    Runtime API host:port (set by the platform)
    HOIST_PROJECT_TYPE        server or static
    HOIST_COMMAND             Command that starts the application
    HOIST_STATIC_ROOT         Document root for static projects
    HOIST_STAGE               Deployment stage passed to the application
    HOIST_COMMIT              Deployed commit passed to the application
    LOG_LEVEL                 Log filter (default: info)

EXAMPLES:
    # Smoke-test an event locally
    hoist --config hoist.json --event event.json
"
    );
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let loader = match path {
        Some(path) => ConfigLoader::new()
            .with_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => ConfigLoader::new().with_optional_file(CONFIG_FILE)?,
    };
    Ok(loader.with_env().load()?)
}

fn build_runtime(config: Config) -> Result<Runtime> {
    let mut builder = Runtime::builder(config);
    if let Ok(stage) = std::env::var(STAGE_ENV) {
        builder = builder.stage(stage);
    }
    if let Ok(commit) = std::env::var(COMMIT_ENV) {
        builder = builder.commit(commit);
    }
    Ok(builder.build()?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}

async fn report_init_error(error: &anyhow::Error) {
    let Ok(client) = RuntimeApiClient::from_env() else {
        return;
    };
    if let Err(e) = client
        .send_init_error("Runtime.InitError", &format!("{error:#}"))
        .await
    {
        error!(error = %e, "failed to report init error");
    }
}

async fn run_event_file(runtime: &Runtime, path: &Path) -> Result<()> {
    let event = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read event {}", path.display()))?;
    let result = runtime.handle(&event).await;
    println!("{}", String::from_utf8_lossy(&result));
    Ok(())
}

async fn run(args: Args, config: Config) -> Result<()> {
    let runtime = match build_runtime(config) {
        Ok(runtime) => runtime,
        Err(e) => {
            error!(error = %e, "failed to initialize runtime");
            if args.event.is_none() {
                report_init_error(&e).await;
            }
            return Err(e);
        }
    };

    let outcome = match &args.event {
        Some(path) => run_event_file(&runtime, path).await,
        None => {
            let client = RuntimeApiClient::from_env()
                .with_context(|| format!("{RUNTIME_API_ENV} is required without --event"))?;
            info!(version = hoist_runtime::VERSION, "waiting for invocations");
            runtime_api::run(&client, &runtime, shutdown_signal())
                .await
                .map_err(anyhow::Error::from)
        }
    };

    runtime.shutdown().await;
    outcome
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("hoist: {e:#}");
            if args.event.is_none() {
                report_init_error(&e).await;
            }
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&LogConfig::from_env(&config.logging)) {
        eprintln!("hoist: {e}");
        std::process::exit(1);
    }

    let span = tracing::info_span!(
        "hoist",
        name = %config.name,
        stage = %std::env::var(STAGE_ENV).unwrap_or_default(),
        commit = %std::env::var(COMMIT_ENV).unwrap_or_default(),
    );

    if let Err(e) = run(args, config).instrument(span).await {
        error!(error = %format!("{e:#}"), "hoist exited with an error");
        std::process::exit(1);
    }
}
