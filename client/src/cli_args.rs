use clap::Parser;
use tcpchat::protocol::DEFAULT_PORT;

#[derive(Parser)]
#[command(name = "tcpchat-client")]
#[command(about = "A TUI client for the tcpchat server")]
pub struct Args {
    /// Username to try first; prompted for when missing or refused
    #[arg(short, long)]
    pub username: Option<String>,

    #[arg(short, long, default_value = "127.0.0.1")]
    pub ip: String,

    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

impl Args {
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}
