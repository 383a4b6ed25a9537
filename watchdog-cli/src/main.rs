//! CLI entry point for watchdog

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use watchdog_core::config::validate::validate_config;
use watchdog_core::config::{Config, ConfigLoader, SourceRestriction};
use watchdog_core::logging::init_logging;
use watchdog_core::record::parse_timeout;
use watchdog_core::{send_heartbeat, ActionHandler, WatchdogServer};

const LONG_ABOUT: &str = "\
A list of timers controlled by UDP clients.

Any datagram starts (or feeds) the default timer. A datagram of the form
\"[key]|[text]|[action]|[timeout]\" starts or updates the timer for that key.
Every field is optional, so \"DWN||action\" is valid and either starts a new
timer or updates the action of an existing one. \"typeA|this is a message\"
followed by \"typeA||newaction\" updates the action but keeps the message.

An action is the name of a command configured under defaults.actions; names
that match nothing run the --action fallback instead. Heartbeat actions only
run as raw shell commands with --allow-wire-commands.

The timeout is either a number of seconds or a duration such as 900ms or 2m.
After alerting once (--alertonce) or --limit times, the timer is removed;
the next heartbeat for that key starts over from the server defaults.";

#[derive(Parser)]
#[command(name = "watchdog")]
#[command(about = "Dead-man's switch driven by UDP heartbeats")]
#[command(long_about = LONG_ABOUT)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration directory
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Listen for heartbeats and alert on silence
    Serve(ServeArgs),
    /// Send a single heartbeat
    Send {
        /// Payload to send, e.g. 'backup|Backup missed|notify.sh|1h'
        #[arg(short, long, default_value = "bar")]
        message: String,
        /// Listener address
        #[arg(long = "ep", default_value = "127.0.0.1:3212")]
        endpoint: String,
    },
    /// Show the effective configuration
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },
}

/// Flags that override the loaded configuration for one run
#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Message to display when alerting
    #[arg(short = 'm', long = "msg")]
    message: Option<String>,
    /// Wait this long for a heartbeat (e.g. 30, 30s, 900ms)
    #[arg(short = 't', long, value_parser = parse_duration_arg)]
    timeout: Option<Duration>,
    /// Only accept messages from the same IP
    #[arg(long)]
    from: bool,
    /// Only accept messages from the same IP and port
    #[arg(long = "fs")]
    from_strict: bool,
    /// A command to spawn on alert when the heartbeat names none
    #[arg(long)]
    action: Option<String>,
    /// Run unknown heartbeat actions as shell commands
    #[arg(long)]
    allow_wire_commands: bool,
    /// Only alert once
    #[arg(long)]
    alertonce: bool,
    /// Number of times to alert before giving up (negative never gives up)
    #[arg(long, allow_negative_numbers = true)]
    limit: Option<i64>,
    /// Network interface and port on which to listen
    #[arg(long = "ep")]
    endpoint: Option<String>,
}

impl ServeArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(message) = &self.message {
            config.defaults.alert_text.clone_from(message);
        }
        if let Some(timeout) = self.timeout {
            config.defaults.timeout = timeout;
        }
        if self.from_strict {
            config.server.restrict_source = SourceRestriction::IpPort;
        } else if self.from {
            config.server.restrict_source = SourceRestriction::Ip;
        }
        if let Some(action) = &self.action {
            config.defaults.action.clone_from(action);
        }
        if self.allow_wire_commands {
            config.defaults.allow_wire_commands = true;
        }
        if self.alertonce {
            config.defaults.alert_once = true;
        }
        if let Some(limit) = self.limit {
            config.defaults.alert_limit = limit;
        }
        if let Some(endpoint) = &self.endpoint {
            config.server.listen_addr.clone_from(endpoint);
        }
    }
}

fn parse_duration_arg(raw: &str) -> std::result::Result<Duration, String> {
    parse_timeout(raw).ok_or_else(|| format!("invalid duration '{}'", raw))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_loader = if let Some(dir) = cli.config_dir {
        ConfigLoader::with_dir(dir)
    } else {
        ConfigLoader::new()
    };

    match cli.command {
        Commands::Serve(args) => run_serve(&config_loader, args).await?,
        Commands::Send { message, endpoint } => run_send(&endpoint, &message).await?,
        Commands::Status { json } => run_status(&config_loader, json)?,
        Commands::Init { force } => {
            let path = run_init(&config_loader, force)?;
            println!("Wrote {}", path.display());
        }
    }

    Ok(())
}

/// Run the listener until Ctrl+C
async fn run_serve(loader: &ConfigLoader, args: ServeArgs) -> Result<()> {
    let mut config = loader.load()?;
    args.apply(&mut config);
    validate_config(&config)?;

    let _guard = init_logging(&config.logging);

    println!("{}", style("Starting watchdog...").bold().cyan());
    println!("Listen address: {}", config.server.listen_addr);
    println!(
        "Default timeout: {}",
        humantime::format_duration(config.defaults.timeout)
    );

    let handler = Arc::new(ActionHandler::from_defaults(&config.defaults));
    let server = WatchdogServer::bind(&config, handler)
        .await
        .with_context(|| format!("Failed to listen on {}", config.server.listen_addr))?;

    let shutdown = CancellationToken::new();
    let mut server_task = tokio::spawn(server.run(shutdown.clone()));

    println!("{}", style("Watchdog is running. Press Ctrl+C to stop.").green());

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            println!("\n{}", style("Shutting down...").yellow());
            shutdown.cancel();
        }
        result = &mut server_task => {
            if let Err(e) = result? {
                error!("Listener stopped: {}", e);
                return Err(e.into());
            }
            anyhow::bail!("Listener stopped unexpectedly");
        }
    }

    server_task.await??;
    info!("Watchdog stopped");
    println!("{}", style("Watchdog stopped.").green());
    Ok(())
}

/// Send one heartbeat
async fn run_send(endpoint: &str, message: &str) -> Result<()> {
    let sent = send_heartbeat(endpoint, message)
        .await
        .with_context(|| format!("Failed to send heartbeat to {}", endpoint))?;
    println!("wrote {} bytes", sent);
    Ok(())
}

/// Show the effective configuration
fn run_status(loader: &ConfigLoader, json: bool) -> Result<()> {
    let config = loader.load()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("{}", style("Watchdog Status").bold().cyan());
    println!("Version: {}\n", env!("CARGO_PKG_VERSION"));

    println!("{}", style("Configuration:").bold());
    println!("  Config directory: {}", loader.config_dir().display());
    let config_file = loader.config_path();
    let file_status = if config_file.exists() {
        style("present").green()
    } else {
        style("missing, using defaults").dim()
    };
    println!("  Config file: {}", file_status);
    println!();

    println!("{}", style("Server:").bold());
    println!("  Listen address: {}", config.server.listen_addr);
    println!("  Source restriction: {:?}", config.server.restrict_source);
    println!("  Max datagram size: {}", config.server.max_datagram_size);
    println!();

    let defaults = &config.defaults;
    println!("{}", style("Timer defaults:").bold());
    println!("  Timeout: {}", humantime::format_duration(defaults.timeout));
    println!("  Alert text: {}", defaults.alert_text);
    let limit = if defaults.alert_limit < 0 {
        "unlimited".to_string()
    } else {
        defaults.alert_limit.to_string()
    };
    println!("  Alert limit: {}", limit);
    println!("  Alert once: {}", defaults.alert_once);
    let action = if defaults.action.is_empty() {
        style("none".to_string()).dim()
    } else {
        style(defaults.action.clone()).green()
    };
    println!("  Action: {}", action);
    let mut names: Vec<&String> = defaults.actions.keys().collect();
    names.sort();
    for name in names {
        println!("    {} => {}", style(name).cyan(), defaults.actions[name]);
    }
    println!("  Wire commands: {}", defaults.allow_wire_commands);
    println!(
        "  Action timeout: {}",
        humantime::format_duration(defaults.action_timeout)
    );

    Ok(())
}

/// Write the default configuration, refusing to clobber unless forced
fn run_init(loader: &ConfigLoader, force: bool) -> Result<PathBuf> {
    let config_path = loader.config_path();
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    loader.save(&Config::default())?;
    Ok(config_path)
}
