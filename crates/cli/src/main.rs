mod admin_commands;
mod config_commands;
mod db_commands;
mod runtime;
mod vault_commands;

use std::{io::BufRead, path::PathBuf};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    ferry_config::FerryConfig,
    ferry_store::SqliteConfigStore,
    ferry_vault::Vault,
    secrecy::Secret,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "ferry", about = "Ferry: Telegram connection orchestrator and message router")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file to load instead of the standard locations.
    #[arg(long, global = true, env = "FERRY_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start every active connection and route messages (default).
    Run,
    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Database management.
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
    /// Encryption key and secret helpers.
    Vault {
        #[command(subcommand)]
        action: vault_commands::VaultAction,
    },
    /// Tenant records.
    Tenants {
        #[command(subcommand)]
        action: admin_commands::TenantAction,
    },
    /// Connection resources (bot tokens and user sessions).
    Resources {
        #[command(subcommand)]
        action: admin_commands::ResourceAction,
    },
    /// Routing tasks.
    Tasks {
        #[command(subcommand)]
        action: admin_commands::TaskAction,
    },
    /// Routing rules.
    Rules {
        #[command(subcommand)]
        action: admin_commands::RuleAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<FerryConfig> {
    match cli.config.as_deref() {
        Some(path) => {
            let mut config = ferry_config::load_config(path)?;
            ferry_config::apply_env_overrides(&mut config);
            Ok(config)
        },
        None => Ok(ferry_config::discover_and_load()),
    }
}

/// Prompt on stderr and read one line from stdin.
///
/// Keeps secrets out of argv and shell history.
pub(crate) fn read_secret(prompt: &str) -> anyhow::Result<Secret<String>> {
    eprint!("{prompt}: ");
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read from stdin")?;
    let value = line.trim();
    if value.is_empty() {
        anyhow::bail!("{} must not be empty", prompt.to_lowercase());
    }
    Ok(Secret::new(value.to_string()))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    let config = load_config(&cli)?;
    info!(version = env!("CARGO_PKG_VERSION"), "ferry starting");

    match cli.command {
        None | Some(Commands::Run) => runtime::run(&config).await,
        Some(Commands::Config { action }) => config_commands::handle_config(action, &config),
        Some(Commands::Db { action }) => db_commands::handle_db(action, &config).await,
        Some(Commands::Vault { action }) => vault_commands::handle_vault(action, &config),
        Some(Commands::Tenants { action }) => {
            let store = SqliteConfigStore::connect(&config.database).await?;
            admin_commands::handle_tenants(action, &store).await
        },
        Some(Commands::Resources { action }) => {
            let store = SqliteConfigStore::connect(&config.database).await?;
            admin_commands::handle_resources(action, &store, &config.userbot, || {
                Vault::from_config(&config.vault).context("vault key is required to store secrets")
            })
            .await
        },
        Some(Commands::Tasks { action }) => {
            let store = SqliteConfigStore::connect(&config.database).await?;
            admin_commands::handle_tasks(action, &store).await
        },
        Some(Commands::Rules { action }) => {
            let store = SqliteConfigStore::connect(&config.database).await?;
            admin_commands::handle_rules(action, &store).await
        },
    }
}
