//! Line Chat Client - Entry Point
//!
//! Connects to the server, then hands stdin and stdout to the client loops.

use clap::Parser;
use tracing_subscriber::EnvFilter;

use line_chat::cli::ClientArgs;
use line_chat::client::spawn_stdin_reader;
use line_chat::ChatClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never mix with chat lines on stdout
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("line_chat=warn")),
        )
        .init();

    let args = ClientArgs::parse();

    let client = ChatClient::connect(&args.host, args.port).await?;
    client.start(spawn_stdin_reader(), tokio::io::stdout()).await?;

    Ok(())
}
