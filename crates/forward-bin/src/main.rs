//! Forward - store-and-forward HTTP delivery from the command line.

mod commands;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand, ValueEnum};
use forward_config_and_utils::{init_logging_with, Config, LogConfig, Paths};
use forward_retriable_worker::{EngineConfig, StoreAndForward};
use forward_store::MessageStore;
use http_dispatcher::ReqwestTransport;
use send_policy::{ConnectivityState, NetworkKind, PowerSource, StaticEnvironment, SystemClock};
use tracing::debug;

/// Forward command-line interface.
#[derive(Parser)]
#[command(name = "forward")]
#[command(about = "Queue HTTP messages and deliver them when conditions allow")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Defaults to the configured level
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for the queue, config, and logs. Defaults to ~/.forward
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,

    #[command(flatten)]
    sensors: SensorArgs,
}

/// Host sensor readings. The CLI has no sensors of its own, so the caller
/// reports them.
#[derive(Args, Debug, Clone)]
struct SensorArgs {
    /// Active network
    #[arg(long, value_enum, default_value = "wifi", global = true)]
    connectivity: NetworkArg,

    /// The network is roaming
    #[arg(long, global = true)]
    roaming: bool,

    /// Power source
    #[arg(long, value_enum, default_value = "ac", global = true)]
    power: PowerArg,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum NetworkArg {
    Wifi,
    Cellular,
    Other,
    None,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum PowerArg {
    Ac,
    Usb,
    Wireless,
    Unknown,
    Unplugged,
}

impl SensorArgs {
    fn environment(&self) -> StaticEnvironment {
        let kind = match self.connectivity {
            NetworkArg::Wifi => NetworkKind::Wifi,
            NetworkArg::Cellular => NetworkKind::Cellular,
            NetworkArg::Other => NetworkKind::Other,
            NetworkArg::None => NetworkKind::None,
        };
        let source = match self.power {
            PowerArg::Ac => PowerSource::Ac,
            PowerArg::Usb => PowerSource::Usb,
            PowerArg::Wireless => PowerSource::Wireless,
            PowerArg::Unknown => PowerSource::Unknown,
            PowerArg::Unplugged => PowerSource::Unplugged,
        };
        StaticEnvironment::new(
            ConnectivityState {
                kind,
                connected_or_connecting: kind != NetworkKind::None,
                roaming: self.roaming,
            },
            source.into(),
        )
    }
}

/// A message given on the command line.
#[derive(Args, Debug, Clone)]
struct MessageArgs {
    /// Destination URL
    #[arg(long)]
    url: String,

    /// Request body
    #[arg(long)]
    body: String,

    /// Header as KEY:VALUE, repeatable
    #[arg(long = "header", value_name = "KEY:VALUE")]
    headers: Vec<String>,

    /// Basic-auth user name
    #[arg(long)]
    username: Option<String>,

    /// Basic-auth password
    #[arg(long, env = "FORWARD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Retry budget (defaults to the configured value)
    #[arg(long)]
    retries: Option<i64>,

    /// Drain the queue once the message is handled
    #[arg(long)]
    drain: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Store a message for later delivery
    Enqueue(MessageArgs),
    /// Send a message now, or store it if that is not possible
    Send(MessageArgs),
    /// Deliver queued messages until blocked or empty
    Drain,
    /// Evict oldest messages to get under a size limit
    Shrink {
        /// Size limit in bytes
        #[arg(long)]
        limit: i64,
    },
    /// Print the number of queued messages
    Count,
    /// Inspect or change delivery preferences
    #[command(subcommand)]
    Prefs(commands::PrefsCommand),
}

/// `--log-level` wins over `log_level` from the config file or `FORWARD_LOG_LEVEL`.
fn log_config(cli_level: Option<String>, config: &Config, paths: &Paths) -> LogConfig {
    LogConfig {
        service_name: "forward".to_string(),
        default_level: cli_level.unwrap_or_else(|| config.log_level.clone()),
        log_path: Some(paths.log_file()),
        also_stderr: true,
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let config = Config::load(&paths)?;
    init_logging_with(log_config(cli.log_level.clone(), &config, &paths));
    debug!(base_dir = %paths.base_dir().display(), "Configuration loaded");

    let store = Arc::new(MessageStore::open(&paths.database_file())?);
    let engine = StoreAndForward::new(
        store,
        Arc::new(ReqwestTransport::new()?),
        Arc::new(cli.sensors.environment()),
        Arc::new(SystemClock),
        EngineConfig::from_config(&config)?,
    );

    match cli.command {
        Commands::Enqueue(args) => commands::enqueue(&engine, &config, args).await?,
        Commands::Send(args) => commands::send(&engine, &config, args).await?,
        Commands::Drain => commands::drain(&engine).await,
        Commands::Shrink { limit } => commands::shrink(&engine, limit)?,
        Commands::Count => println!("{}", engine.pending_count()?),
        Commands::Prefs(command) => commands::prefs(&engine, command)?,
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn configured_level_is_used_without_flag() {
        let dir = tempdir().unwrap();
        let paths = Paths::with_base_dir(dir.path().to_path_buf());
        std::fs::write(paths.config_file(), r#"{ "log_level": "debug" }"#).unwrap();
        let config = Config::load_from_file(&paths.config_file()).unwrap();

        let log = log_config(None, &config, &paths);
        assert_eq!(log.default_level, "debug");
        assert_eq!(log.log_path, Some(paths.log_file()));

        let log = log_config(Some("warn".to_string()), &config, &paths);
        assert_eq!(log.default_level, "warn");
    }

    #[test]
    fn log_level_flag_is_optional() {
        let cli = Cli::try_parse_from(["forward", "count"]).unwrap();
        assert!(cli.log_level.is_none());

        let cli = Cli::try_parse_from(["forward", "count", "--log-level", "trace"]).unwrap();
        assert_eq!(cli.log_level.as_deref(), Some("trace"));
    }

    #[test]
    fn enqueue_and_send_accept_drain() {
        let cli = Cli::try_parse_from([
            "forward", "enqueue", "--url", "https://api.example.com/e", "--body", "{}", "--drain",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Enqueue(MessageArgs { drain: true, .. })));

        let cli = Cli::try_parse_from([
            "forward", "send", "--url", "https://api.example.com/e", "--body", "{}",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Send(MessageArgs { drain: false, .. })));
    }
}
