use {clap::Subcommand, ferry_config::FerryConfig, ferry_store::SqliteConfigStore};

#[derive(Subcommand)]
pub enum DbAction {
    /// Create the database if needed and run all pending migrations.
    Migrate,
}

pub async fn handle_db(action: DbAction, config: &FerryConfig) -> anyhow::Result<()> {
    match action {
        DbAction::Migrate => {
            SqliteConfigStore::connect(&config.database).await?;
            println!("Migrations applied to {}", config.database.url);
            Ok(())
        },
    }
}
