//! bluewatch - Unit and node event monitor
//!
//! Entry point for the bluewatch application.

use bluewatch::bus::{BusTransport, DbusTransport};
use bluewatch::cli::{Cli, Commands, ConfigCommands, MonitorUnitsArgs};
use bluewatch::config::{Config, LogFormat, LogOutput, LoggingConfig};
use bluewatch::error::exit_code;
use bluewatch::monitor::{
    LifecycleEvent, MonitorSession, NodeStatusWatcher, SubscriptionId, SystemStatusWatcher,
};
use bluewatch::output::Renderer;
use bluewatch::BluewatchError;
use clap::Parser;
use std::fs::OpenOptions;
use std::io;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logging is configured from the config file, so load it first and
    // report a broken file once logging is up.
    let loaded = Config::load(cli.config.as_deref());
    let logging = match &loaded {
        Ok(config) => config.logging.clone(),
        Err(_) => LoggingConfig::default(),
    };

    if let Err(e) = init_logging(&cli, &logging) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(exit_code::GENERAL_ERROR as u8);
    }

    // Execute the command
    match run(&cli, loaded) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = %e.code(), "{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Initialize the tracing subscriber from CLI flags and the logging config.
fn init_logging(
    cli: &Cli,
    logging: &LoggingConfig,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let level = cli.log_level().unwrap_or(logging.level.as_filter());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let writer = match logging.output {
        LogOutput::Stderr => BoxMakeWriter::new(io::stderr),
        LogOutput::Stdout => BoxMakeWriter::new(io::stdout),
        LogOutput::File => {
            let path = logging
                .file_path
                .as_deref()
                .ok_or("logging.file_path is required when output is file")?;
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            BoxMakeWriter::new(Mutex::new(file))
        }
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_target(true);

    match logging.format {
        LogFormat::Text => builder.try_init()?,
        LogFormat::Json => builder.json().try_init()?,
    }

    Ok(())
}

/// Main application logic.
fn run(cli: &Cli, loaded: bluewatch::Result<Config>) -> bluewatch::Result<()> {
    if let Commands::Config(subcmd) = &cli.command {
        return cmd_config(subcmd, loaded);
    }

    let config = loaded?;
    let runtime = tokio::runtime::Runtime::new().map_err(|e| {
        BluewatchError::transport_with_source("Failed to create async runtime", e)
    })?;

    match &cli.command {
        Commands::MonitorUnits(args) => runtime.block_on(cmd_monitor_units(cli, &config, args)),
        Commands::MonitorNodes => runtime.block_on(cmd_monitor_nodes(cli, &config)),
        Commands::MonitorSystem => runtime.block_on(cmd_monitor_system(cli, &config)),
        Commands::ListNodes => runtime.block_on(cmd_list_nodes(cli, &config)),
        Commands::Config(_) => Ok(()),
    }
}

/// Connects to the bus named in the configuration.
async fn connect(config: &Config) -> bluewatch::Result<Arc<DbusTransport>> {
    tracing::info!(
        bus = %config.bus.kind,
        service = %config.bus.service_name,
        "Connecting to controller"
    );
    Ok(Arc::new(DbusTransport::connect(&config.bus).await?))
}

/// Completes on Ctrl-C. If the handler cannot be installed, never completes.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Prints one event to stdout, logging write failures.
fn print_event(renderer: &Renderer, event: LifecycleEvent, subscriptions: &[SubscriptionId]) {
    let mut stdout = io::stdout().lock();
    if let Err(e) = renderer.write_event(&mut stdout, &event, subscriptions) {
        tracing::warn!(error = %e, event = event.kind(), "Failed to write event");
    }
}

/// Handle the `monitor-units` command.
async fn cmd_monitor_units(
    cli: &Cli,
    config: &Config,
    args: &MonitorUnitsArgs,
) -> bluewatch::Result<()> {
    let node = args.node.clone().unwrap_or_else(|| config.monitor.node.clone());
    let unit = args.unit.clone().unwrap_or_else(|| config.monitor.unit.clone());

    let transport = connect(config).await?;
    let mut signals = transport.signals().await?;

    let mut session = MonitorSession::new(transport.clone(), config.bus.clone());
    session.setup(&node, &unit).await?;
    tracing::info!(node = %node, unit = %unit, "Monitoring units");

    let renderer = Renderer::new(cli.format, cli.timestamps);
    let stats = session
        .run(&mut signals, ctrl_c(), |event, ids| {
            print_event(&renderer, event, &ids)
        })
        .await;

    session.close_after(&stats).await
}

/// Handle the `monitor-nodes` command.
async fn cmd_monitor_nodes(cli: &Cli, config: &Config) -> bluewatch::Result<()> {
    let transport = connect(config).await?;
    let mut signals = transport.signals().await?;

    let mut watcher = NodeStatusWatcher::new(transport.clone(), config.bus.clone());
    let nodes = watcher.start().await?;
    for node in &nodes {
        tracing::info!(node = %node.name, status = %node.status, "Current node status");
    }

    let renderer = Renderer::new(cli.format, cli.timestamps);
    watcher
        .run(&mut signals, ctrl_c(), |event| print_event(&renderer, event, &[]))
        .await;

    Ok(())
}

/// Handle the `monitor-system` command.
async fn cmd_monitor_system(cli: &Cli, config: &Config) -> bluewatch::Result<()> {
    let transport = connect(config).await?;
    let mut signals = transport.signals().await?;

    let mut watcher = SystemStatusWatcher::new(transport.clone(), config.bus.clone());
    watcher.start().await?;

    let renderer = Renderer::new(cli.format, cli.timestamps);
    watcher
        .run(&mut signals, ctrl_c(), |event| print_event(&renderer, event, &[]))
        .await;

    Ok(())
}

/// Handle the `list-nodes` command.
async fn cmd_list_nodes(cli: &Cli, config: &Config) -> bluewatch::Result<()> {
    let transport = connect(config).await?;
    let nodes = transport.list_nodes().await?;

    let renderer = Renderer::new(cli.format, cli.timestamps);
    renderer.write_nodes(&mut io::stdout().lock(), &nodes)
}

/// Handle the `config` subcommand.
fn cmd_config(subcmd: &ConfigCommands, loaded: bluewatch::Result<Config>) -> bluewatch::Result<()> {
    match subcmd {
        ConfigCommands::Validate => match loaded {
            Ok(config) => {
                println!("✓ Configuration is valid");
                tracing::debug!(?config, "Validated configuration");
                Ok(())
            }
            Err(e) => {
                println!("✗ Configuration is invalid: {}", e);
                Err(e)
            }
        },
        ConfigCommands::Show => {
            let config = loaded?;
            let yaml = serde_yaml::to_string(&config).map_err(|e| {
                BluewatchError::config_with_source("Failed to serialize configuration", e)
            })?;
            println!("{}", yaml);
            Ok(())
        }
    }
}
