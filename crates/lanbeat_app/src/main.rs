//! lanbeat: heartbeat-based LAN peer with an interactive console.
//!
//! Announces itself on a discovery group, keeps a directory of the peers it
//! hears, alerts when one goes silent, and exchanges direct messages.

mod console;
mod local_ip;
mod logging;

use std::net::IpAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use lanbeat_network::{Node, NodeConfig, NodeIdentity, PeerId};

#[derive(Parser, Debug)]
#[command(name = "lanbeat")]
#[command(about = "Heartbeat-based peer discovery and messaging on the local network")]
struct Args {
    /// Unique id of this peer
    id: PeerId,

    /// UDP port for direct messages (0 picks a free port)
    unicast_port: u16,

    /// Discovery group: multicast group, broadcast address, or a unicast address
    group: IpAddr,

    /// Discovery port [default: from config, else 5000]
    discovery_port: Option<u16>,

    /// IP announced to other peers (detected if not provided)
    #[arg(long)]
    advertise_ip: Option<IpAddr>,

    /// JSON file with timing overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also write daily-rotated logs to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

/// Config file (or defaults) with the command-line values applied on top.
fn build_config(args: &Args) -> NodeConfig {
    let mut config = match &args.config {
        Some(path) => NodeConfig::load_or_default(path),
        None => NodeConfig::default(),
    };
    config.group = args.group;
    config.unicast_port = args.unicast_port;
    if let Some(port) = args.discovery_port {
        config.discovery_port = port;
    }
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let _log_guard = logging::init_logging(args.verbose, args.log_dir.as_deref())?;

    let config = build_config(&args);
    let advertise_ip = args.advertise_ip.unwrap_or_else(local_ip::local_ip);
    info!(
        "Starting peer {} (advertising {advertise_ip}, group {}:{})",
        args.id, config.group, config.discovery_port
    );

    let mut node = Node::new(NodeIdentity::new(args.id, advertise_ip.to_string()), config);
    let events = node
        .start()
        .await
        .with_context(|| format!("Failed to start peer {}", args.id))?;

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    console::run(&mut node, events, stdin, &mut std::io::stdout()).await
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_args_positional() {
        let args = Args::try_parse_from(["lanbeat", "1", "6001", "230.0.0.1", "5001"]).unwrap();
        assert_eq!(args.id, PeerId(1));
        assert_eq!(args.unicast_port, 6001);
        assert_eq!(args.group, "230.0.0.1".parse::<IpAddr>().unwrap());
        assert_eq!(args.discovery_port, Some(5001));
        assert!(!args.verbose);
    }

    #[test]
    fn test_args_options() {
        let args = Args::try_parse_from([
            "lanbeat",
            "2",
            "6002",
            "255.255.255.255",
            "--advertise-ip",
            "10.0.0.2",
            "--log-dir",
            "/tmp/lanbeat",
            "-v",
        ])
        .unwrap();
        assert_eq!(args.discovery_port, None);
        assert_eq!(args.advertise_ip, Some("10.0.0.2".parse::<IpAddr>().unwrap()));
        assert_eq!(args.log_dir, Some(PathBuf::from("/tmp/lanbeat")));
        assert!(args.verbose);
    }

    #[test]
    fn test_args_rejects_bad_values() {
        assert!(Args::try_parse_from(["lanbeat", "abc", "6001", "230.0.0.1"]).is_err());
        assert!(Args::try_parse_from(["lanbeat", "1", "99999", "230.0.0.1"]).is_err());
        assert!(Args::try_parse_from(["lanbeat", "1", "6001", "not-an-ip"]).is_err());
        assert!(Args::try_parse_from(["lanbeat", "1", "6001"]).is_err());
    }

    #[test]
    fn test_args_rejects_malformed_advertise_ip() {
        for ip in ["10.0.0.1;7000", "10.0.0.1 ", "host;name", ""] {
            let result =
                Args::try_parse_from(["lanbeat", "1", "6001", "230.0.0.1", "--advertise-ip", ip]);
            assert!(result.is_err(), "{ip:?}");
        }
    }

    #[test]
    fn test_build_config_defaults() {
        let args = Args::try_parse_from(["lanbeat", "1", "6001", "230.0.0.2"]).unwrap();
        let config = build_config(&args);
        assert_eq!(config.group, "230.0.0.2".parse::<IpAddr>().unwrap());
        assert_eq!(config.unicast_port, 6001);
        assert_eq!(config.discovery_port, 5000);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(1000));
    }

    #[test]
    fn test_build_config_file_then_cli() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("lanbeat.json");
        std::fs::write(
            &path,
            r#"{"discovery_port": 7000, "failure_timeout": 5000, "unicast_port": 1}"#,
        )
        .unwrap();

        let path_arg = path.to_string_lossy().to_string();
        let args =
            Args::try_parse_from(["lanbeat", "1", "6001", "230.0.0.1", "--config", &path_arg])
                .unwrap();
        let config = build_config(&args);
        assert_eq!(config.discovery_port, 7000);
        assert_eq!(config.failure_timeout, Duration::from_millis(5000));
        assert_eq!(config.unicast_port, 6001);

        let args = Args::try_parse_from([
            "lanbeat", "1", "6001", "230.0.0.1", "5005", "--config", &path_arg,
        ])
        .unwrap();
        assert_eq!(build_config(&args).discovery_port, 5005);
    }
}
