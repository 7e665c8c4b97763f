//! Configuration module for friscy-test-server.
//!
//! The only input is an optional positional port. Everything else is a
//! fixed default; the diagnostic log filter can be overridden with
//! `RUST_LOG`.

use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Port used when none is given on the command line
pub const DEFAULT_PORT: u16 = 8080;

/// Command-line arguments for the test server
#[derive(Parser, Debug)]
#[command(name = "friscy-test-server")]
#[command(author = "friscy authors")]
#[command(version = "1.0.0")]
#[command(about = "HTTP fixture server that echoes request metadata as JSON", long_about = None)]
pub struct CliArgs {
    /// TCP port to listen on
    pub port: Option<u16>,
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: IpAddr,
    pub port: u16,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from the process arguments.
    pub fn load() -> Self {
        Self::from_args(CliArgs::parse())
    }

    /// Resolve parsed CLI arguments against the defaults.
    pub fn from_args(cli: CliArgs) -> Self {
        let defaults = Config::default();
        Config {
            port: cli.port.unwrap_or(defaults.port),
            ..defaults
        }
    }

    /// Address the listener binds to.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
