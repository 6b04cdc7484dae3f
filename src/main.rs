use anyhow::Result;
use clap::{Parser, Subcommand};
use pyramid::config::Config;
use pyramid::{client, gateway};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "pyramid", version, about = "Authenticated heap-sort service")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway.
    Serve {
        /// Bind host (overrides config).
        #[arg(long)]
        host: Option<String>,
        /// Bind port (overrides config).
        #[arg(long)]
        port: Option<u16>,
    },
    /// Connect to a gateway with the interactive console client.
    Client {
        /// Gateway base URL.
        #[arg(long, default_value = "http://127.0.0.1:8080")]
        server: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pyramid=info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Command::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.gateway.host.clone());
            let port = port.unwrap_or(config.gateway.port);
            gateway::run_gateway(&host, port, &config).await
        }
        Command::Client { server } => client::run_client(&server, &config.data_dir).await,
    }
}
