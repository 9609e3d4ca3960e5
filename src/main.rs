use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use ctv_vast::config::ServerConfig;
use ctv_vast::exchange::HttpExchange;
use ctv_vast::formatter::{create_formatter, FormatterConfig, ReceiverProfile};
use ctv_vast::metrics::StatsMetrics;
use ctv_vast::{parser, CtvEndpoint, VastError};

/// CTV VAST server and tools
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the CTV VAST HTTP endpoint
    Serve {
        /// Path to the JSON server config
        #[arg(short, long)]
        config: PathBuf,

        /// Port to listen on, overriding the config's listen address
        #[arg(short, long)]
        port: Option<u16>,

        /// OpenRTB auction URL, overriding the config
        #[arg(short, long)]
        exchange_url: Option<String>,
    },

    /// Parse a VAST file or URL and print the model
    Parse {
        /// Path to the VAST file or URL
        #[arg(short, long)]
        input: String,

        /// Pretty print the output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Re-emit a VAST file or URL for a receiver profile
    Format {
        /// Path to the VAST file or URL
        #[arg(short, long)]
        input: String,

        /// Receiver profile (GENERIC or GAM_SSU)
        #[arg(long, default_value = "GENERIC")]
        profile: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            port,
            exchange_url,
        } => {
            let mut config = ServerConfig::load(&config).await?;
            if let Some(url) = exchange_url {
                config.exchange_url = url;
            }
            if let Some(port) = port {
                let host = config
                    .listen
                    .rsplit_once(':')
                    .map(|(host, _)| host.to_string())
                    .unwrap_or_else(|| "0.0.0.0".to_string());
                config.listen = format!("{}:{}", host, port);
            }
            config.validate()?;

            let exchange = HttpExchange::new(&config.exchange_url)?;
            let listen = config.listen.clone();
            let app = CtvEndpoint::new(Arc::new(exchange), config, Arc::new(StatsMetrics)).router();

            let listener = tokio::net::TcpListener::bind(&listen).await?;
            info!("CTV VAST: Listening on {}", listen);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Commands::Parse { input, pretty } => {
            let content = fetch_vast_content(&input).await?;
            let vast = parser::parse_vast(&content)?;

            if pretty {
                println!("{}", serde_json::to_string_pretty(&vast)?);
            } else {
                println!("{}", serde_json::to_string(&vast)?);
            }
        }
        Commands::Format { input, profile } => {
            let content = fetch_vast_content(&input).await?;
            let vast = parser::parse_vast(&content)?;

            let config = FormatterConfig {
                profile: ReceiverProfile::from(profile.as_str()),
                default_version: String::new(),
            };
            let xml = create_formatter(&config).format(vast)?;
            println!("{}", String::from_utf8_lossy(&xml));
        }
    }

    Ok(())
}

/// Reads VAST from a local path, or fetches it when given an http(s) URL
async fn fetch_vast_content(input: &str) -> Result<String, VastError> {
    let is_remote = url::Url::parse(input)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false);
    if !is_remote {
        return Ok(tokio::fs::read_to_string(input).await?);
    }

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(3))
        .build()
        .map_err(|e| VastError::Config(format!("Failed to build HTTP client: {}", e)))?;
    let response = client
        .get(input)
        .send()
        .await
        .map_err(|e| VastError::Http(format!("Failed to fetch {}: {}", input, e)))?;
    if !response.status().is_success() {
        return Err(VastError::Http(format!(
            "Fetching {} returned HTTP status {}",
            input,
            response.status()
        )));
    }
    response
        .text()
        .await
        .map_err(|e| VastError::Http(format!("Failed to read body of {}: {}", input, e)))
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("CTV VAST: Shutting down");
    }
}
