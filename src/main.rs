//! `rubber` binary: loads configuration, wires the real collaborators,
//! and runs the controller loop until a shutdown signal arrives.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use rubber_broker::{RabbitMqBrokerStats, RabbitMqConfig};
use rubber_cloud::{OpenStackConfig, OpenStackDriver};
use rubber_core::{BudgetAllocator, Config, Controller, VmRegistry};
use rubber_workers::HttpWorkerRegistry;

#[derive(Debug, Parser)]
#[command(name = "rubber", version, about = "Elasticity controller for AMQP-backed task worker fleets")]
struct Args {
    #[arg(long, default_value = "rubber.json")]
    config: PathBuf,

    #[arg(long, default_value = "rubber-state/vm_object_store.dat")]
    registry: PathBuf,

    /// Directory to write daily-rolling JSON log files to. Absent logs
    /// JSON to stdout instead — there is no `logging.ini`/`fileConfig`
    /// analogue in `tracing`, so a directory is the closest equivalent
    /// knob.
    #[arg(long)]
    log_conf: Option<PathBuf>,
}

/// Returns a guard that must be held for the process lifetime when
/// logging to a file — dropping it stops the non-blocking writer thread.
fn init_logging(log_dir: Option<&PathBuf>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(dir, "rubber.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(non_blocking)
                        .log_internal_errors(true)
                        .with_target(false)
                        .flatten_event(true)
                        .with_span_list(false),
                )
                .init();
            Some(guard)
        }
        None => {
            registry
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .log_internal_errors(true)
                        .with_target(false)
                        .flatten_event(true)
                        .with_span_list(false),
                )
                .init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    let _log_guard = init_logging(args.log_conf.as_ref());

    match run(args).await {
        Ok(()) => ExitCode::from(0),
        Err(Failure::Startup(msg)) => {
            error!(error = %msg, "startup failed");
            ExitCode::from(1)
        }
        Err(Failure::Runtime(msg)) => {
            error!(error = %msg, "controller loop failed unrecoverably");
            ExitCode::from(2)
        }
    }
}

enum Failure {
    Startup(String),
    Runtime(String),
}

impl From<rubber_core::StartupError> for Failure {
    fn from(err: rubber_core::StartupError) -> Self {
        Failure::Startup(err.to_string())
    }
}

async fn run(args: Args) -> Result<(), Failure> {
    let config = Config::load(&args.config)?;
    config.validate_broker_scheme()?;

    let ordered_ids = config.ordered_profile_ids();
    let profiles = BudgetAllocator::allocate(&ordered_ids, &config.worker_services, config.max_vm_qty)?;
    info!(profile_count = profiles.len(), max_vm_qty = config.max_vm_qty, "profile budget allocated");

    let registry = VmRegistry::open(&args.registry)
        .await
        .map_err(|e| Failure::Startup(e.to_string()))?;

    let cloud = OpenStackDriver::new(
        serde_json::from_value(config.cloud_config.clone())
            .map_err(|e| Failure::Startup(format!("invalid cloud_config: {e}")))?,
    )
    .map_err(|e| Failure::Startup(e.to_string()))?;

    let broker = RabbitMqBrokerStats::new(RabbitMqConfig {
        host: config.broker_admin_host.clone(),
        port: config.broker_admin_port,
        user: config.broker_admin_user.clone(),
        pass: config.broker_admin_pass.clone(),
        vhost: config.broker_vhost(),
        timeout_secs: 5,
    })
    .map_err(|e| Failure::Startup(e.to_string()))?;

    let workers = HttpWorkerRegistry::new(config.worker_registry_url.clone(), 5)
        .map_err(|e| Failure::Startup(e.to_string()))?;

    let controller = Arc::new(Controller::new(profiles, registry, cloud, broker, workers, &config));

    info!(eval_interval_secs = config.eval_interval_secs, "controller starting");

    // Run the loop on its own task so a panic inside a tick surfaces as a
    // `JoinError` here rather than taking the whole process down silently
    // — that's the unrecoverable-runtime-failure exit path, distinct from
    // the per-tick errors the controller already tolerates on its own.
    let handle = tokio::spawn({
        let controller = controller.clone();
        async move { controller.run().await }
    });

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| Failure::Runtime(format!("could not install SIGTERM handler: {e}")))?;

    tokio::select! {
        result = handle => {
            match result {
                Ok(()) => Err(Failure::Runtime("controller loop exited unexpectedly".into())),
                Err(join_err) => Err(Failure::Runtime(join_err.to_string())),
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("SIGINT received, finishing current tick");
            Ok(())
        }
        _ = sigterm.recv() => {
            info!("SIGTERM received, finishing current tick");
            Ok(())
        }
    }
}
