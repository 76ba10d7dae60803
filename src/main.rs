use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::info;

use nsfwd::config::{parse_port, Config};
use nsfwd::model::provider::ModelProvider;
use nsfwd::web::{run_server, AppState};

/// nsfwd: local NSFW image check service.
///
/// Loads a NudeNet model once and answers `POST /check` requests on
/// 127.0.0.1 so callers don't pay the model load per image.
#[derive(Parser)]
#[command(
    name = "nsfwd",
    version,
    about,
    args_conflicts_with_subcommands = true,
    disable_help_subcommand = true
)]
struct Cli {
    /// Port to listen on (default: 5000; invalid values fall back to the
    /// default, anything after the port is ignored)
    #[arg(value_name = "PORT", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
enum Commands {
    /// Download the NudeNet ONNX models (~90 MB total)
    DownloadModel,

    /// Check a single image and print the verdict as JSON
    Check {
        /// Path to the image file
        path: String,
    },
}

impl Cli {
    /// The port slot: the first positional argument, if any.
    fn port_arg(&self) -> Option<&str> {
        self.args.first().map(String::as_str)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if missing)
    let _ = dotenvy::dotenv();

    // Set up structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("nsfwd=info,tower_http=info")
            }),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    match cli.command {
        Some(Commands::DownloadModel) => {
            println!(
                "Downloading NudeNet models to {}",
                config.model_dir.display()
            );
            nsfwd::model::download::download_model(&config.model_dir).await?;
            println!("\n{}", "Models ready.".green().bold());
        }

        Some(Commands::Check { path }) => {
            let provider = load_provider(&config)?;
            let policy = config.policy();
            let verdict = nsfwd::check::check_file(&provider, &policy, &path)
                .await
                .with_context(|| format!("Check failed for {path}"))?;

            println!("{}", serde_json::to_string_pretty(&verdict)?);
            let summary = format!("probability {:.3}", verdict.probability);
            if verdict.is_nsfw {
                eprintln!("{} ({summary})", "NSFW".red().bold());
            } else {
                eprintln!("{} ({summary})", "safe".green().bold());
            }
        }

        None => {
            let port = parse_port(cli.port_arg());
            let provider = load_provider(&config)?;
            let state = AppState::new(Some(provider), config.policy());
            run_server(state, port).await?;
        }
    }

    Ok(())
}

/// Load the model before anything else happens. Failure here is fatal.
fn load_provider(config: &Config) -> Result<ModelProvider> {
    info!(
        model_dir = %config.model_dir.display(),
        preference = ?config.model_preference,
        "Loading NSFW model"
    );
    let provider = ModelProvider::load(&config.model_dir, config.model_preference)
        .context("Failed to load an NSFW model (run `nsfwd download-model` if none is installed)")?;
    Ok(provider)
}
