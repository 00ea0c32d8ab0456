//! Configuration module for the ackline server and client.
//!
//! Supports both command-line arguments and a TOML configuration file.
//! CLI arguments take precedence over config file values, which take
//! precedence over the built-in defaults.

use clap::Parser;
use serde::Deserialize;
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Acknowledgment written back for every received line.
pub const DEFAULT_ACK_MESSAGE: &str = "Servidor: Mensaje recibido";

/// Command-line arguments for the server
#[derive(Parser, Debug)]
#[command(name = "ackline-server")]
#[command(author = "ackline authors")]
#[command(version = "0.1.0")]
#[command(about = "A line-oriented TCP acknowledgment server", long_about = None)]
pub struct ServerCliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Address to bind to (e.g., 127.0.0.1)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Maximum number of connections handled concurrently
    #[arg(short = 'n', long)]
    pub pool_size: Option<usize>,

    /// Accepted connections allowed to wait for a free worker
    #[arg(long)]
    pub queue_depth: Option<usize>,

    /// Line written back for every message
    #[arg(long)]
    pub ack_message: Option<String>,

    /// Number of runtime threads (defaults to number of CPU cores)
    #[arg(short = 't', long)]
    pub threads: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Command-line arguments for the interactive client
#[derive(Parser, Debug)]
#[command(name = "ackline-client")]
#[command(author = "ackline authors")]
#[command(version = "0.1.0")]
#[command(about = "Interactive client for the ackline server", long_about = None)]
pub struct ClientCliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server host to connect to
    #[arg(long)]
    pub host: Option<String>,

    /// Server port to connect to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Input that ends the session (repeatable, case-insensitive)
    #[arg(long = "sentinel")]
    pub sentinels: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub client: ClientSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

/// Server-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Number of worker slots
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Bounded queue in front of the worker slots
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
    /// Listen backlog handed to the kernel
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    #[serde(default = "default_ack_message")]
    pub ack_message: String,
    /// Grace period for in-flight connections on shutdown, in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
    /// Runtime threads (0 = number of CPUs)
    #[serde(default)]
    pub threads: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            pool_size: default_pool_size(),
            queue_depth: default_queue_depth(),
            backlog: default_backlog(),
            ack_message: default_ack_message(),
            shutdown_timeout: default_shutdown_timeout(),
            threads: 0,
        }
    }
}

/// Client-related configuration
#[derive(Debug, Deserialize)]
pub struct ClientSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_sentinels")]
    pub sentinels: Vec<String>,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            sentinels: default_sentinels(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Default)]
pub struct LoggingSection {
    /// Log level; each binary falls back to its own default
    pub level: Option<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_pool_size() -> usize {
    10
}

fn default_queue_depth() -> usize {
    64
}

fn default_backlog() -> i32 {
    1024
}

fn default_ack_message() -> String {
    DEFAULT_ACK_MESSAGE.to_string()
}

fn default_shutdown_timeout() -> u64 {
    5
}

fn default_sentinels() -> Vec<String> {
    vec!["exit".to_string(), "salir".to_string()]
}

/// Final resolved server configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub pool_size: usize,
    pub queue_depth: usize,
    pub backlog: i32,
    pub ack_message: String,
    pub shutdown_timeout: Duration,
    pub threads: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(ServerCliArgs::default_args(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from process CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(ServerCliArgs::parse())
    }

    /// Resolve configuration from already-parsed CLI args.
    pub fn from_args(cli: ServerCliArgs) -> Result<Self, ConfigError> {
        let toml_config = read_toml(cli.config.as_deref())?;
        Ok(Self::merge(cli, toml_config))
    }

    fn merge(cli: ServerCliArgs, toml_config: TomlConfig) -> Self {
        let server = toml_config.server;
        Config {
            host: cli.host.unwrap_or(server.host),
            port: cli.port.unwrap_or(server.port),
            pool_size: cli.pool_size.unwrap_or(server.pool_size).max(1),
            queue_depth: cli.queue_depth.unwrap_or(server.queue_depth).max(1),
            backlog: server.backlog,
            ack_message: cli.ack_message.unwrap_or(server.ack_message),
            shutdown_timeout: Duration::from_secs(server.shutdown_timeout),
            threads: cli.threads.unwrap_or(server.threads),
            log_level: cli
                .log_level
                .or(toml_config.logging.level)
                .unwrap_or_else(|| "info".to_string()),
        }
    }

    /// Resolve `host:port` into a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        resolve(&self.host, self.port)
    }

    /// Runtime thread count, falling back to the number of CPUs.
    pub fn runtime_threads(&self) -> usize {
        if self.threads == 0 {
            num_cpus()
        } else {
            self.threads
        }
    }
}

impl ServerCliArgs {
    fn default_args() -> Self {
        Self {
            config: None,
            host: None,
            port: None,
            pool_size: None,
            queue_depth: None,
            ack_message: None,
            threads: None,
            log_level: None,
        }
    }
}

/// Final resolved client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub sentinels: Vec<String>,
    pub log_level: String,
}

impl ClientConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(ClientCliArgs::parse())
    }

    pub fn from_args(cli: ClientCliArgs) -> Result<Self, ConfigError> {
        let toml_config = read_toml(cli.config.as_deref())?;
        let client = toml_config.client;

        Ok(ClientConfig {
            host: cli.host.unwrap_or(client.host),
            port: cli.port.unwrap_or(client.port),
            sentinels: if cli.sentinels.is_empty() {
                client.sentinels
            } else {
                cli.sentinels
            },
            log_level: cli
                .log_level
                .or(toml_config.logging.level)
                .unwrap_or_else(|| "warn".to_string()),
        })
    }

    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        resolve(&self.host, self.port)
    }
}

fn read_toml(path: Option<&Path>) -> Result<TomlConfig, ConfigError> {
    let Some(path) = path else {
        return Ok(TomlConfig::default());
    };

    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::FileRead(path.to_path_buf(), e))?;
    toml::from_str(&contents).map_err(|e| ConfigError::TomlParse(path.to_path_buf(), e))
}

fn resolve(host: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::InvalidAddress(format!("{host}:{port}")))
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
    #[error("Cannot resolve address '{0}'")]
    InvalidAddress(String),
}
