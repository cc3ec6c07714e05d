//! Applies or rolls back the storefront schema.
//!
//! Usage: `migration [up|down|status]` (default `up`). The database URL comes
//! from `DATABASE_URL`, falling back to the layered application config.

use sea_orm_migration::MigratorTrait;
use tracing::{error, info};

use storefront_api::{config, db, migrator::Migrator};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let database_url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => config::load_config()?.database_url,
    };
    let command = std::env::args().nth(1).unwrap_or_else(|| "up".to_string());

    info!("Connecting to database for migration '{}'", command);
    let db = db::establish_connection(&database_url).await?;

    match command.as_str() {
        "up" => Migrator::up(&db, None).await?,
        "down" => Migrator::down(&db, Some(1)).await?,
        "status" => Migrator::status(&db).await?,
        other => {
            error!("Unknown migration command '{}'; expected up, down or status", other);
            anyhow::bail!("unknown migration command: {}", other);
        }
    }

    info!("Migration '{}' completed successfully", command);
    Ok(())
}
