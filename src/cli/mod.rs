use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod chat;
pub mod extract;
pub mod persona;

use crate::ai::chat::ModelId;
use crate::core::AppConfig;

#[derive(Subcommand)]
enum Command {
    /// Start an interactive assessment session (the default)
    Chat {
        /// Persona JSON file to use instead of the built-in persona
        #[arg(long)]
        persona: Option<PathBuf>,

        /// Model to start the session with
        #[arg(long, value_enum)]
        model: Option<ModelId>,

        /// Directory exported conversations are written to
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
    /// Print the text extracted from a PDF or DOCX document
    Extract { path: PathBuf },
    /// Validate a persona file, or show the built-in persona
    Persona { path: Option<PathBuf> },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

fn init_tracing() {
    // Logs go to stderr so they don't interleave with the chat on
    // stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{}=warn", env!("CARGO_CRATE_NAME")).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub async fn run() -> Result<()> {
    let args = Cli::parse();
    init_tracing();

    let mut config = AppConfig::default();

    // Handle each sub command
    match args.command {
        Some(Command::Chat {
            persona,
            model,
            export_dir,
        }) => {
            if persona.is_some() {
                config.persona_path = persona;
            }
            if let Some(model) = model {
                config.openai_model = model;
            }
            if let Some(dir) = export_dir {
                config.export_path = dir;
            }
            chat::run(config).await?;
        }
        Some(Command::Extract { path }) => {
            extract::run(&path).await?;
        }
        Some(Command::Persona { path }) => {
            persona::run(path.as_deref())?;
        }
        None => {
            chat::run(config).await?;
        }
    }

    Ok(())
}
