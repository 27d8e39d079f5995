//! `capmux`: spawns the plugins named in a host config file and either
//! relays an engine's capability requests to them over stdio, or prints
//! the capability set the configured plugins collectively advertise.

mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use manifest::Manifest;
use plugin_host::{HostError, PluginHost};
use snafu::Snafu;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Spawn configured plugins and relay engine requests from stdin/stdout.
    Serve {
        /// Path to a host config.toml (defaults to the platform config dir).
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Spawn configured plugins, print their advertised capabilities, and exit.
    Inspect {
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[derive(Debug, Snafu)]
enum CliError {
    #[snafu(display("failed to encode host manifest: {source}"))]
    EncodeManifest { source: manifest::ManifestError },

    #[snafu(display("relay loop exited with an error: {source}"))]
    Relay { source: HostError },
}

fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::fmt().with_env_filter(env_filter).with_target(true).init();
}

fn our_manifest() -> Manifest {
    Manifest {
        name: "capmux".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        description: "capability-addressed plugin host".to_string(),
        author: None,
        caps: Vec::new(),
    }
}

fn build_host(config_path: Option<&std::path::Path>) -> Result<PluginHost, CliError> {
    let host_config = config::load_with_override(config_path);
    let limits = host_config.limits();
    let manifest_bytes = our_manifest()
        .to_cbor_bytes()
        .map_err(|source| CliError::EncodeManifest { source })?;

    let mut host = PluginHost::new();
    for plugin_cfg in &host_config.plugins {
        if !plugin_cfg.known_caps.is_empty() {
            host.register_plugin(&plugin_cfg.path, &plugin_cfg.known_caps);
        }
        tracing::info!(path = %plugin_cfg.path.display(), "spawning plugin");
        if let Err(e) = host.attach_plugin(&plugin_cfg.path, limits, &manifest_bytes) {
            tracing::error!(path = %plugin_cfg.path.display(), error = %e, "failed to spawn plugin");
        }
    }
    Ok(host)
}

fn main() -> Result<(), CliError> {
    init_tracing();
    let args = Args::parse();

    match args.command {
        Command::Serve { config } => {
            let host = build_host(config.as_deref())?;
            let stdin = std::io::stdin();
            let stdout = std::io::stdout();
            let mut reader = stdin.lock();
            let writer = stdout.lock();
            host.run(&mut reader, writer).map_err(|source| CliError::Relay { source })?;
        }
        Command::Inspect { config } => {
            let host = build_host(config.as_deref())?;
            let caps = host.capabilities();
            match serde_json::to_string_pretty(&caps) {
                Ok(json) => println!("{json}"),
                Err(e) => eprintln!("failed to serialize capabilities: {e}"),
            }
        }
    }

    Ok(())
}
