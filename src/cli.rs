//! Command-line arguments for both binaries

use clap::Parser;

/// Default address for both server bind and client connect
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default chat port
pub const DEFAULT_PORT: u16 = 5000;

/// Line chat server
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct ServerArgs {
    /// Address to bind
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}

/// Line chat client
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct ClientArgs {
    /// Server address
    #[arg(long, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    pub port: u16,
}
