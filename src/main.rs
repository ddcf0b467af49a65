use clap::Parser;
use tracing_subscriber::EnvFilter;

use kawan::commands;
use kawan::config::{Cli, Config};
use kawan::db;

fn main() -> anyhow::Result<()> {
    // Parse CLI args and load config
    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    // Initialize logging; stdout is reserved for command output
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log.filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let db_path = config.db_path();
    tracing::info!("Database: {}", db_path.display());

    let pool = db::create_pool(&db_path, config.database.pool_size)?;
    db::run_migrations(&pool)?;

    if let Some(output) = commands::execute(&pool, &config, cli.command, std::io::stdin())? {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    Ok(())
}
