//! `raid-roster`: roster service and offline tools
//!
//! ```text
//! raid-roster [--config roster.toml] [--log-json] serve [--port 3000]
//! raid-roster render <panel-or-message-id>
//! raid-roster replay actions.ndjson [--write]
//! ```

mod app;
mod routes;

use anyhow::{bail, Context};
use app::{AppState, Runtime};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use roster_core::{ActionEnvelope, NewPanel, RosterConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_PORT: u16 = 3000;

fn cli() -> Command {
    Command::new("raid-roster")
        .version(roster_core::VERSION)
        .about("Raid signup roster service")
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("log-json")
                .long("log-json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("serve")
                .about("Run the scheduler and the HTTP endpoint (default)")
                .arg(port_arg()),
        )
        .subcommand(
            Command::new("render")
                .about("Print a stored panel")
                .arg(
                    Arg::new("panel")
                        .required(true)
                        .help("Panel id or message id"),
                ),
        )
        .subcommand(
            Command::new("replay")
                .about("Apply newline-delimited JSON actions and print each outcome")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("One action envelope or {\"create\": {...}} per line"),
                )
                .arg(
                    Arg::new("write")
                        .long("write")
                        .action(ArgAction::SetTrue)
                        .help("Save the resulting panels to the configured storage"),
                ),
        )
}

fn port_arg() -> Arg {
    Arg::new("port")
        .long("port")
        .env("PORT")
        .default_value("3000")
        .value_parser(value_parser!(u16))
        .help("Liveness/action HTTP port")
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(matches: &ArgMatches) -> anyhow::Result<RosterConfig> {
    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => RosterConfig::from_file(path)?,
        None => RosterConfig::default(),
    };
    let config = config.with_env_overrides()?;
    config.validate().context("invalid configuration")?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("log-json"));
    let config = load_config(&matches)?;

    match matches.subcommand() {
        Some(("render", args)) => {
            let reference = args.get_one::<String>("panel").context("panel argument")?;
            render(config, reference).await
        }
        Some(("replay", args)) => {
            let file = args.get_one::<PathBuf>("file").context("file argument")?;
            replay(config, file, args.get_flag("write")).await
        }
        Some(("serve", args)) => {
            let port = args.get_one::<u16>("port").copied().unwrap_or(DEFAULT_PORT);
            serve(config, port).await
        }
        _ => {
            let port = std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT);
            serve(config, port).await
        }
    }
}

async fn serve(config: RosterConfig, port: u16) -> anyhow::Result<()> {
    let runtime = Runtime::build(config, true);
    let state = AppState::new(runtime.service.clone(), runtime.store.clone());

    let (stop_server, server_stopped) = tokio::sync::oneshot::channel::<()>();
    let (addr, server) = warp::serve(routes::routes(state.clone()))
        .try_bind_with_graceful_shutdown(([0, 0, 0, 0], port), async {
            let _ = server_stopped.await;
        })
        .with_context(|| format!("binding port {port}"))?;
    let server = tokio::spawn(server);
    tracing::info!(%addr, "HTTP endpoint listening");

    let report = runtime.restore().await;
    state.mark_ready();
    tracing::info!(
        loaded = report.loaded,
        skipped = report.skipped,
        repaired = report.repaired_entries,
        corrupt = report.corrupt,
        storage = %runtime.config.storage_path.display(),
        "Roster ready"
    );

    let scheduler = runtime.scheduler().spawn();

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    tracing::info!("Shutting down");

    scheduler.shutdown().await;
    if let Err(e) = runtime.persister.shutdown().await {
        tracing::error!(error = %e, "Final save failed");
    }
    let _ = stop_server.send(());
    server.await.context("HTTP endpoint task")?;
    Ok(())
}

async fn render(config: RosterConfig, reference: &str) -> anyhow::Result<()> {
    let runtime = Runtime::build(config, false);
    runtime.restore().await;

    let Some(panel_id) = runtime.store.resolve(reference) else {
        bail!("panel not found: {reference}");
    };
    let rendered = runtime
        .service
        .engine()
        .render(&panel_id)
        .with_context(|| format!("panel {panel_id} vanished"))?;
    println!("{}", rendered.body);
    Ok(())
}

/// One replay line: a panel to create or an action to apply
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ReplayLine {
    Create { create: NewPanel },
    Action(ActionEnvelope),
}

async fn replay(config: RosterConfig, file: &Path, write: bool) -> anyhow::Result<()> {
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let runtime = Runtime::build(config, write);
    runtime.restore().await;

    let mut failed = 0usize;
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parsed: ReplayLine =
            serde_json::from_str(line).with_context(|| format!("line {}: not a replay entry", number + 1))?;

        let output = match parsed {
            ReplayLine::Create { create } => runtime
                .service
                .create_panel(create)
                .await
                .map(serde_json::to_value),
            ReplayLine::Action(envelope) => runtime
                .service
                .dispatch(envelope)
                .await
                .map(serde_json::to_value),
        };
        match output {
            Ok(value) => println!("{}", value?),
            Err(e) => {
                failed += 1;
                println!("{}", serde_json::json!({ "line": number + 1, "error": e.kind(), "message": e.to_string() }));
            }
        }
    }

    if write {
        runtime.persister.shutdown().await.context("saving replayed panels")?;
    }
    tracing::info!(failed, panels = runtime.store.len(), "Replay finished");
    Ok(())
}
