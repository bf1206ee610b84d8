use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use atrium_domain::config::{Config, ConfigSeverity};
use atrium_gateway::boot;

#[derive(Parser)]
#[command(name = "atrium", about = "Atrium CRM assistant orchestration core")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway server (default).
    Serve,
    /// Inspect or validate the environment-derived configuration.
    Config {
        #[command(subcommand)]
        action: ConfigCommand,
    },
    /// Print the version.
    Version,
}

#[derive(Subcommand)]
enum ConfigCommand {
    Show,
    Validate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let config = Arc::new(Config::from_env());
            boot::run_server(config).await
        }
        Some(Command::Config { action }) => {
            let config = Config::from_env();
            match action {
                ConfigCommand::Show => {
                    // Secrets never reach stdout.
                    let mut v = serde_json::to_value(&config)?;
                    if !config.auth.internal_jwt_secret.is_empty() {
                        v["auth"]["internal_jwt_secret"] = serde_json::json!("<redacted>");
                    }
                    if !config.llm.api_key.is_empty() {
                        v["llm"]["api_key"] = serde_json::json!("<redacted>");
                    }
                    println!("{}", serde_json::to_string_pretty(&v)?);
                    Ok(())
                }
                ConfigCommand::Validate => {
                    let issues = config.validate();
                    for issue in &issues {
                        println!("{issue}");
                    }
                    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
                        std::process::exit(1);
                    }
                    println!("configuration ok");
                    Ok(())
                }
            }
        }
        Some(Command::Version) => {
            println!("atrium {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing for the serve path.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,atrium_gateway=debug")),
        )
        .json()
        .init();
}
