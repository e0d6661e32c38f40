//! Counter - Minimal flux-dispatch example
//!
//! Dispatches a few actions against a counter and prints the outcomes:
//! - State: What the app knows
//! - Actions: What can happen
//! - Reducer plugin: How state changes
//! - Handler task: Completes each action on the result bus
//!
//! Run with `RUST_LOG=debug` to see the lifecycle logs.

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use flux_dispatch::prelude::*;
use flux_dispatch::{ActionLogConfig, ActionLogger, ActionLoggerConfig, ActionStatus};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Counter demo for flux-dispatch
#[derive(Parser, Debug)]
#[command(name = "counter")]
#[command(about = "Dispatch counter actions and print their outcomes")]
struct Args {
    /// Number of increments to dispatch
    #[arg(long, short, default_value = "3")]
    count: u32,

    /// Also dispatch an action that fails
    #[arg(long)]
    fail: bool,

    /// Run as the server platform (always inside the tracked domain)
    #[arg(long)]
    server: bool,

    /// Run dispatches inside the tracked domain on the client
    #[arg(long)]
    inside_zone: bool,

    /// JSON dispatcher configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Comma-separated action name patterns to log (e.g. "Count*")
    #[arg(long)]
    log_include: Option<String>,
}

// ============================================================================
// State and actions
// ============================================================================

#[derive(Debug, Default)]
struct AppState {
    count: i32,
}

#[derive(Debug, Action)]
enum AppAction {
    CountIncrement,
    CountReset,
    Explode,
}

fn reducer(
    state: Arc<AppState>,
    action: Arc<AppAction>,
    next: Next<AppState, AppAction>,
) -> PluginFuture<AppState> {
    let next_state = match *action {
        AppAction::CountIncrement => Arc::new(AppState {
            count: state.count + 1,
        }),
        AppAction::CountReset => Arc::new(AppState::default()),
        AppAction::Explode => state,
    };
    next.run(next_state, action)
}

/// Zone that only reports which domain a dispatch runs in.
struct ReportingZone;

impl Zone for ReportingZone {
    fn run(&self, f: &mut dyn FnMut()) {
        tracing::trace!("entering tracked domain");
        f();
    }

    fn run_outside(&self, f: &mut dyn FnMut()) {
        tracing::trace!("leaving tracked domain");
        f();
    }
}

/// Complete every dispatched action; `Explode` fails.
///
/// Stops when `cancel` fires or the dispatcher is dropped.
fn spawn_handler(
    dispatcher: &Dispatcher<AppState, AppAction>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut events = dispatcher.actions().subscribe();
    let results = dispatcher.results().clone();

    tokio::spawn(async move {
        loop {
            let context = tokio::select! {
                _ = cancel.cancelled() => break,
                event = events.recv() => match event {
                    Some(context) => context,
                    None => break,
                },
            };
            if context.status() != ActionStatus::Dispatched {
                continue;
            }

            let action = context.action().clone();
            match *action {
                AppAction::Explode => {
                    results.publish(ActionContext::errored(action, "counter exploded"))
                }
                _ => results.publish(ActionContext::successful(action)),
            }
        }
    })
}

fn build_dispatcher(
    platform: Platform,
    config: DispatchConfig,
) -> Dispatcher<AppState, AppAction> {
    Dispatcher::builder(AppState::default())
        .plugin(LoggingPlugin::new())
        .plugin_fn("reducer", reducer)
        .zone(ReportingZone)
        .platform(platform)
        .config(config)
        .build()
}

fn load_config(args: &Args) -> Result<DispatchConfig, Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => DispatchConfig::from_json(&fs::read_to_string(path)?)?,
        None => DispatchConfig::default(),
    };
    if args.inside_zone {
        return Ok(config.with_outside_zone(Some(false)));
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let platform = if args.server {
        Platform::Server
    } else {
        Platform::Client
    };

    let dispatcher = build_dispatcher(platform, load_config(&args)?);

    let cancel = CancellationToken::new();
    let logger = ActionLogger::new(ActionLogConfig::new(
        64,
        ActionLoggerConfig::new(args.log_include.as_deref(), None),
    ));
    let logger_task = logger.spawn(dispatcher.actions(), cancel.clone());
    let handler_task = spawn_handler(&dispatcher, cancel.clone());

    println!("domain: {:?}", dispatcher.domain());

    let increments = (0..args.count).map(|_| AppAction::CountIncrement);
    match dispatcher.dispatch_many(increments).await {
        Ok(Some(states)) => println!(
            "{} increments, count = {}",
            states.len(),
            dispatcher.state().get().count
        ),
        Ok(None) => println!("increments completed without a state"),
        Err(e) => println!("increments failed: {e}"),
    }

    if args.fail {
        if let Err(e) = dispatcher.dispatch(AppAction::Explode).await {
            println!("explode failed as expected: {e}");
        }
    }

    if let Ok(Some(state)) = dispatcher.dispatch(AppAction::CountReset).await {
        println!("reset, count = {}", state.count);
    }

    cancel.cancel();
    handler_task.await?;
    logger_task.await?;

    println!("\nlifecycle log:");
    for entry in logger.log().entries() {
        println!(
            "  #{:<3} {:<16} {:<10} {}",
            entry.sequence,
            entry.name,
            entry.status.as_str(),
            entry.error.as_deref().unwrap_or("")
        );
    }

    Ok(())
}
