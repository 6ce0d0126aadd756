//! EpiShard daemon
//!
//! Hosts one or more integration endpoints for distributed ensemble runs and
//! prints the matching `EPISHARD_ENDPOINTS` value for the orchestrator side.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use epishard_core::metrics::METRICS;
use epishard_core::telemetry::init_tracing;
use epishard_core::{ModelKind, VERSION};
use epishard_remote::{
    endpoint_name, BoundServer, EndpointRegistry, IntegrationServer, RemoteConfig,
    DEFAULT_ENDPOINT_PREFIX, ENDPOINTS_ENV,
};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "epishardd")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "EpiShard integration daemon", long_about = None)]
struct Cli {
    /// Address of the first endpoint; port 0 picks free ports
    #[arg(long, env = "EPISHARD_BIND", default_value = "127.0.0.1:1099")]
    bind: SocketAddr,

    /// Model served by every endpoint (sir or sis)
    #[arg(long, env = "EPISHARD_MODEL", default_value = "sir")]
    model: ModelKind,

    /// Endpoint name prefix; endpoint i is named <name><i>
    #[arg(long, default_value = DEFAULT_ENDPOINT_PREFIX)]
    name: String,

    /// Number of endpoints hosted by this process
    #[arg(long, default_value_t = 1)]
    replicas: usize,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

/// Address of replica `index`: consecutive ports from the base, or all
/// ephemeral when the base port is 0.
fn replica_addr(base: SocketAddr, index: usize) -> Result<SocketAddr> {
    if base.port() == 0 {
        return Ok(base);
    }
    let port = u16::try_from(base.port() as usize + index)
        .with_context(|| format!("replica {index} runs past the last TCP port"))?;
    Ok(SocketAddr::new(base.ip(), port))
}

async fn start_replicas(
    cli: &Cli,
    config: &RemoteConfig,
) -> Result<(EndpointRegistry, Vec<BoundServer>)> {
    anyhow::ensure!(cli.replicas >= 1, "--replicas must be >= 1");

    let registry = EndpointRegistry::new();
    let mut servers = Vec::with_capacity(cli.replicas);
    for index in 0..cli.replicas {
        let addr = replica_addr(cli.bind, index)?;
        let server = IntegrationServer::new(cli.model, config)
            .bind(addr)
            .await
            .with_context(|| format!("failed to bind endpoint {index} on {addr}"))?;
        registry.bind(endpoint_name(&cli.name, index), server.local_addr());
        servers.push(server);
    }
    Ok((registry, servers))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    init_tracing(cli.json, level);

    let config = RemoteConfig::from_env().context("invalid remote configuration")?;
    let (registry, servers) = start_replicas(&cli, &config).await?;

    info!(
        version = VERSION,
        model = %cli.model,
        replicas = servers.len(),
        "epishardd started"
    );
    info!("{ENDPOINTS_ENV}={}", registry.to_spec_string());

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    info!("shutting down");
    for server in servers {
        server.shutdown().await;
    }
    METRICS.flush();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replica_ports_are_consecutive() {
        let base: SocketAddr = "127.0.0.1:1099".parse().unwrap();
        assert_eq!(replica_addr(base, 0).unwrap().port(), 1099);
        assert_eq!(replica_addr(base, 3).unwrap().port(), 1102);
    }

    #[test]
    fn test_ephemeral_base_stays_ephemeral() {
        let base: SocketAddr = "127.0.0.1:0".parse().unwrap();
        assert_eq!(replica_addr(base, 5).unwrap().port(), 0);
    }

    #[test]
    fn test_port_overflow_is_an_error() {
        let base: SocketAddr = "127.0.0.1:65535".parse().unwrap();
        assert!(replica_addr(base, 1).is_err());
    }

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "epishardd",
            "--bind",
            "127.0.0.1:0",
            "--model",
            "sis",
            "--replicas",
            "3",
            "--name",
            "node",
        ])
        .unwrap();
        assert_eq!(cli.model, ModelKind::Sis);
        assert_eq!(cli.replicas, 3);
        assert_eq!(cli.name, "node");
    }

    #[tokio::test]
    async fn test_replicas_register_under_prefixed_names() {
        let cli = Cli::try_parse_from(["epishardd", "--bind", "127.0.0.1:0", "--replicas", "2"])
            .unwrap();
        let (registry, servers) = start_replicas(&cli, &RemoteConfig::default())
            .await
            .unwrap();
        assert_eq!(registry.names(), vec!["epishard_host0", "epishard_host1"]);
        assert_ne!(servers[0].local_addr(), servers[1].local_addr());
    }
}
