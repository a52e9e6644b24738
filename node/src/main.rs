#![forbid(unsafe_code)]

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use node::{node::Node, observability};
use node_config::{Config, CoordinatorConfig};
use std::path::PathBuf;
use tracing::error;

/// A threshold-cryptography signing node.
#[derive(Parser)]
#[command(name = "tchsm-node", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print a fresh CURVE keypair in Z85.
    GenerateCurve,
    /// Write a fresh node configuration file.
    GenerateConfig {
        /// Bind address of the node as host:port.
        #[arg(short, long, default_value = "0.0.0.0:2030")]
        node: String,
        /// Hostname or IP the coordinator connects from.
        #[arg(short, long)]
        coordinator: String,
        /// The coordinator's public CURVE key (Z85).
        #[arg(short, long)]
        key: String,
        /// Where to write the configuration.
        #[arg(short, long, default_value = "./config.yaml")]
        output: PathBuf,
    },
    /// Run the node.
    Serve {
        /// Configuration file; defaults to the standard search paths.
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::GenerateCurve => generate_curve(),
        Command::GenerateConfig { node, coordinator, key, output } => {
            generate_config(&node, &coordinator, &key, output)
        }
        Command::Serve { config } => serve(config),
    }
}

fn generate_curve() -> anyhow::Result<()> {
    let pair = zmq::CurveKeyPair::new().context("cannot generate curve keypair")?;
    let public_key = zmq::z85_encode(&pair.public_key).context("cannot encode public key")?;
    let secret_key = zmq::z85_encode(&pair.secret_key).context("cannot encode secret key")?;
    println!("PUBLIC KEY: {public_key}");
    println!("SECRET KEY: {secret_key}");
    Ok(())
}

fn generate_config(node: &str, coordinator: &str, key: &str, output: PathBuf) -> anyhow::Result<()> {
    let (host, port) = split_host_port(node)?;
    let pair = zmq::CurveKeyPair::new().context("cannot generate curve keypair")?;
    let public_key = zmq::z85_encode(&pair.public_key).context("cannot encode public key")?;
    let private_key = zmq::z85_encode(&pair.secret_key).context("cannot encode secret key")?;
    let config = Config {
        public_key: public_key.clone(),
        private_key,
        host,
        port,
        coordinator: CoordinatorConfig {
            public_key: key.to_string(),
            host: coordinator.to_string(),
            rsa_keys: vec![],
            ecdsa_keys: vec![],
        },
    };
    config.save(&output).with_context(|| format!("cannot write config to {}", output.display()))?;
    eprintln!("config written to {}", output.display());
    println!("PUBLIC KEY: {public_key}");
    Ok(())
}

fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    observability::tracing::init();
    let path = match config_path {
        Some(path) => path,
        None => Config::locate()
            .context("pass --config or create a configuration with generate-config")?,
    };
    let config = Config::load(&path).with_context(|| format!("cannot load config from {}", path.display()))?;
    let mut node = Node::start(config, path).context("cannot initialize node")?;
    if let Err(e) = node.run() {
        error!("listen loop ended: {e}");
        bail!("listen loop ended: {e}");
    }
    Ok(())
}

fn split_host_port(address: &str) -> anyhow::Result<(String, u16)> {
    let Some((host, port)) = address.rsplit_once(':') else {
        bail!("bind address must be host:port, got {address}");
    };
    let port: u16 = port.parse().with_context(|| format!("invalid port in bind address {address}"))?;
    Ok((host.to_string(), port))
}
