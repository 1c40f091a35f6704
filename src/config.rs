use std::path::PathBuf;

use clap::Parser;

use crate::protocol::{DEFAULT_MAX_CLIENTS, DEFAULT_PORT};

#[derive(Parser, Debug)]
#[command(name = "tcpchat")]
#[command(about = "A multi-user TCP chat server")]
pub struct Args {
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Connections beyond this many are turned away
    #[arg(long, default_value_t = DEFAULT_MAX_CLIENTS)]
    pub max_clients: usize,

    /// Append join/leave events to this file
    #[arg(long, default_value = "logs.txt")]
    pub log_file: PathBuf,

    #[arg(long)]
    pub no_log_file: bool,

    /// Keep only the newest N lines for replay (unbounded when unset)
    #[arg(long)]
    pub history_limit: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_clients: usize,
    pub log_file: Option<PathBuf>,
    pub history_limit: Option<usize>,
}

impl ServerConfig {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            max_clients: DEFAULT_MAX_CLIENTS,
            log_file: Some(PathBuf::from("logs.txt")),
            history_limit: None,
        }
    }
}

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        Self {
            host: args.host,
            port: args.port,
            max_clients: args.max_clients,
            log_file: (!args.no_log_file).then_some(args.log_file),
            history_limit: args.history_limit,
        }
    }
}
