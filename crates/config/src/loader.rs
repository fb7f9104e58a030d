use std::path::{Path, PathBuf};

use {
    secrecy::Secret,
    tracing::{debug, warn},
};

use crate::{env_subst::substitute_env, schema::FerryConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &["ferry.toml", "ferry.yaml", "ferry.yml", "ferry.json"];

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<FerryConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    let raw = substitute_env(&raw);
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./ferry.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/ferry/ferry.{toml,yaml,yml,json}` (user-global)
///
/// Returns `FerryConfig::default()` if no config file is found. Environment
/// overrides are applied in every case.
pub fn discover_and_load() -> FerryConfig {
    let mut config = match find_config_file() {
        Some(path) => {
            debug!(path = %path.display(), "loading config");
            load_config(&path).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
                FerryConfig::default()
            })
        },
        None => {
            debug!("no config file found, using defaults");
            FerryConfig::default()
        },
    };
    apply_env_overrides(&mut config);
    config
}

/// Apply `FERRY_*` environment variables on top of a loaded config.
///
/// | variable | field |
/// |---|---|
/// | `FERRY_ENCRYPTION_KEY` | `vault.key` |
/// | `FERRY_DATABASE_URL` | `database.url` |
/// | `FERRY_USERBOT_API_ID` | `userbot.api_id` |
/// | `FERRY_USERBOT_API_HASH` | `userbot.api_hash` |
pub fn apply_env_overrides(config: &mut FerryConfig) {
    apply_env_overrides_with(config, |name| std::env::var(name).ok());
}

fn apply_env_overrides_with(config: &mut FerryConfig, lookup: impl Fn(&str) -> Option<String>) {
    let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

    if let Some(key) = var("FERRY_ENCRYPTION_KEY") {
        config.vault.key = Some(Secret::new(key));
    }
    if let Some(url) = var("FERRY_DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(raw) = var("FERRY_USERBOT_API_ID") {
        match raw.trim().parse() {
            Ok(id) => config.userbot.api_id = Some(id),
            Err(_) => warn!(value = %raw, "ignoring non-numeric FERRY_USERBOT_API_ID"),
        }
    }
    if let Some(hash) = var("FERRY_USERBOT_API_HASH") {
        config.userbot.api_hash = Some(Secret::new(hash));
    }
}

/// Find the first config file in standard locations.
fn find_config_file() -> Option<PathBuf> {
    for name in CONFIG_FILENAMES {
        let p = PathBuf::from(name);
        if p.exists() {
            return Some(p);
        }
    }

    let dir = config_dir()?;
    CONFIG_FILENAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/ferry/`).
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ferry").map(|d| d.config_dir().to_path_buf())
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<FerryConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}
