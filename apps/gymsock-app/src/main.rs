//! gymsock command-line interface.
//!
//! - `serve`: run the TCP environment server
//! - `list`: print the registered environments
//! - `info`: print versions and protocol constants

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use gymsock_core::config::ServerConfig;
use gymsock_core::error::ConfigError;
use gymsock_core::traits::Hooks;
use gymsock_envs::wrappers::WRAPPERS;
use gymsock_envs::{Registry, WrapperExtension};
use gymsock_record::{DirectoryPublisher, FileMonitor};
use gymsock_server::{GymServer, MAX_FIELD_SIZE, PacketType};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

/// Serve environments to remote clients over TCP.
#[derive(Parser)]
#[command(name = "gymsock", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the environment server.
    Serve(ServeArgs),

    /// List registered environments.
    List,

    /// Print versions and protocol constants.
    Info,
}

#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Address to bind (e.g. 127.0.0.1:5001). Overrides the config file.
    #[arg(short, long)]
    address: Option<String>,

    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Root seed for reproducible sampling.
    #[arg(short, long)]
    seed: Option<u64>,

    /// Serve `configure` and `wrap`.
    #[arg(long)]
    enable_extensions: bool,

    /// Publish uploads under this directory.
    #[arg(long)]
    publish_dir: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Load the config file (or defaults) and apply command-line overrides.
fn resolve_config(args: &ServeArgs) -> Result<ServerConfig, ConfigError> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::from_file(path)?,
        None => ServerConfig::default(),
    };
    if let Some(address) = &args.address {
        config.address.clone_from(address);
    }
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.enable_extensions {
        config.extensions_enabled = true;
    }
    if let Some(dir) = &args.publish_dir {
        config.publish_dir = Some(dir.clone());
    }
    config.validate()?;
    Ok(config)
}

fn build_hooks(config: &ServerConfig) -> Hooks {
    let mut hooks = Hooks::new(FileMonitor);
    if let Some(root) = &config.publish_dir {
        hooks = hooks.with_uploader(DirectoryPublisher::new(root));
    }
    if config.extensions_enabled {
        hooks = hooks.with_extension(WrapperExtension);
    }
    hooks
}

/// Console logging; `RUST_LOG` wins over the configured filter.
fn init_logging(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_level(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .init();
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn run_serve(args: &ServeArgs) -> Result<(), String> {
    let config = resolve_config(args).map_err(|e| format!("configuration: {e}"))?;
    init_logging(&config.log_filter);

    let registry = Registry::builtin().with_seed(config.seed);
    let server = GymServer::bind_with_config(&config, Arc::new(registry), build_hooks(&config))
        .map_err(|e| format!("cannot bind {}: {e}", config.address))?;
    info!(
        extensions = config.extensions_enabled,
        uploads = config.publish_dir.is_some(),
        seeded = config.seed.is_some(),
        "gymsock server ready"
    );
    server.serve().map_err(|e| format!("server stopped: {e}"))
}

fn run_list() {
    let registry = Registry::builtin();
    for spec in registry.specs() {
        let limit = spec
            .max_episode_steps
            .map_or_else(|| "-".to_owned(), |n| n.to_string());
        println!("{:<16} {:>6}  {}", spec.id, limit, spec.description);
    }
}

fn run_info() {
    println!("gymsock v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("protocol:");
    println!("  flags byte       0");
    println!("  max field size   {MAX_FIELD_SIZE} bytes");
    println!("  default address  {}", ServerConfig::default().address);
    println!();
    println!("packets:");
    for packet in PacketType::ALL {
        println!("  {:>2}  {packet}", packet as u8);
    }
    println!();
    println!("wrappers: {}", WRAPPERS.join(", "));
}

// ---------------------------------------------------------------------------
// main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => match run_serve(&args) {
            Ok(()) => ExitCode::SUCCESS,
            Err(message) => {
                eprintln!("gymsock: {message}");
                ExitCode::FAILURE
            }
        },
        Commands::List => {
            run_list();
            ExitCode::SUCCESS
        }
        Commands::Info => {
            run_info();
            ExitCode::SUCCESS
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn serve_flags_parse() {
        let cli = Cli::parse_from([
            "gymsock",
            "serve",
            "--address",
            "0.0.0.0:6000",
            "--seed",
            "7",
            "--enable-extensions",
        ]);
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.address.as_deref(), Some("0.0.0.0:6000"));
        assert_eq!(args.seed, Some(7));
        assert!(args.enable_extensions);
    }

    #[test]
    fn defaults_without_file_or_flags() {
        let config = resolve_config(&ServeArgs::default()).unwrap();
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gymsock.toml");
        std::fs::write(
            &path,
            "address = \"127.0.0.1:7000\"\nseed = 1\nlog_filter = \"debug\"\n",
        )
        .unwrap();

        let args = ServeArgs {
            config: Some(path),
            seed: Some(2),
            publish_dir: Some(dir.path().join("published")),
            ..ServeArgs::default()
        };
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.address, "127.0.0.1:7000");
        assert_eq!(config.seed, Some(2));
        assert_eq!(config.log_filter, "debug");
        assert!(config.publish_dir.is_some());
        assert!(!config.extensions_enabled);
    }

    #[test]
    fn missing_config_file_is_an_error() {
        let args = ServeArgs {
            config: Some(PathBuf::from("/definitely/not/here.toml")),
            ..ServeArgs::default()
        };
        assert!(matches!(resolve_config(&args), Err(ConfigError::Io(_))));
    }

    #[test]
    fn hooks_follow_config() {
        use gymsock_core::traits::UploadRequest;

        let dir = tempfile::tempdir().unwrap();
        let disabled = build_hooks(&ServerConfig::default());
        let err = disabled
            .uploader
            .upload(&UploadRequest {
                directory: dir.path().to_path_buf(),
                api_key: "k".into(),
                algorithm_id: None,
            })
            .unwrap_err();
        assert_eq!(err.to_string(), "uploads are not configured on this server");

        let enabled = build_hooks(&ServerConfig {
            publish_dir: Some(dir.path().join("out")),
            ..ServerConfig::default()
        });
        let err = enabled
            .uploader
            .upload(&UploadRequest {
                directory: dir.path().to_path_buf(),
                api_key: "k".into(),
                algorithm_id: None,
            })
            .unwrap_err();
        // the publisher looked for monitor results
        assert!(err.to_string().contains("no monitor results"));
    }
}
