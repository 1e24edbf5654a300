use std::env;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::Parser;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 10_000;

#[derive(Parser, Debug, Default)]
#[command(name = "beach-pier")]
#[command(about = "Two-party WebRTC signaling relay")]
pub struct Cli {
    /// Port to listen on (overrides PORT)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Interface to bind (overrides HOST)
    #[arg(long)]
    pub host: Option<IpAddr>,

    /// Liveness probe period in milliseconds (overrides HEARTBEAT_INTERVAL_MS)
    #[arg(long)]
    pub heartbeat_interval_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub heartbeat_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Environment first, then any flags given on the command line.
    pub fn load(cli: &Cli) -> Self {
        Self::from_env().with_overrides(cli)
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = lookup("PORT")
            .and_then(|p| p.trim().parse::<u16>().ok())
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_PORT);
        let host = lookup("HOST")
            .and_then(|h| h.trim().parse().ok())
            .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED));
        let heartbeat_ms = lookup("HEARTBEAT_INTERVAL_MS")
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS);

        Self {
            host,
            port,
            heartbeat_interval: Duration::from_millis(heartbeat_ms),
        }
    }

    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(port) = cli.port.filter(|p| *p != 0) {
            self.port = port;
        }
        if let Some(host) = cli.host {
            self.host = host;
        }
        if let Some(ms) = cli.heartbeat_interval_ms.filter(|ms| *ms > 0) {
            self.heartbeat_interval = Duration::from_millis(ms);
        }
        self
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
