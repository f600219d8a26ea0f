use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{ConfigCommand, MovieCommand};
use moviestore::config::Config;
use moviestore::remote::{init_db, SqliteCollection};
use moviestore::StoreContext;

#[derive(Parser)]
#[command(name = "movies")]
#[command(version)]
#[command(about = "Manage a movie collection", long_about = None)]
struct Cli {
    /// Path to config file
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage movies
    Movie(MovieCommand),

    /// Manage configuration
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "moviestore=warn,movies=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let cli_config_path = cli.config.clone();
    let config = Config::load(cli.config)?;

    match cli.command {
        Some(Commands::Movie(cmd)) => {
            let pool = init_db(&config.database_path.value).await?;
            tracing::debug!(
                "Opened {} (collection '{}')",
                config.database_path.value.display(),
                config.collection.value
            );
            let collection = SqliteCollection::new(pool, config.collection.value.clone());

            let context = StoreContext::new();
            let store = context.get_instance(Arc::new(collection));
            cmd.run(&store).await?;
        }
        Some(Commands::Config(cmd)) => {
            cmd.run(&config, cli_config_path)?;
        }
        None => {
            println!("Use --help to see available commands");
        }
    }

    Ok(())
}
