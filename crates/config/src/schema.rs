//! Config schema types (vault, database, connectors, routing, metrics).

use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FerryConfig {
    pub vault: VaultConfig,
    pub database: DatabaseConfig,
    pub telegram: TelegramConfig,
    pub userbot: UserbotConfig,
    pub routing: RoutingConfig,
    pub metrics: MetricsConfig,
}

/// Credential vault configuration.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    /// Base64-encoded 32-byte symmetric key used for every stored secret.
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub key: Option<Secret<String>>,
}

impl std::fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultConfig")
            .field("key", &self.key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Configuration store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// sqlx connection URL, e.g. `sqlite://ferry.db?mode=rwc`.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://ferry.db?mode=rwc".into(),
            max_connections: 5,
        }
    }
}

/// Gateway-bot (Bot API) connector settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Long-polling timeout passed to `getUpdates` (seconds).
    pub poll_timeout_secs: u32,
    /// HTTP client timeout; must exceed the polling timeout.
    pub client_timeout_secs: u64,
    /// Delay before retrying after a failed `getUpdates` call (seconds).
    pub retry_delay_secs: u64,
    /// Consecutive polling failures tolerated before the run ends.
    pub max_poll_failures: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            poll_timeout_secs: 30,
            client_timeout_secs: 45,
            retry_delay_secs: 5,
            max_poll_failures: 5,
        }
    }
}

/// User-session connector settings (application credentials).
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct UserbotConfig {
    pub api_id: Option<i32>,
    #[serde(
        serialize_with = "serialize_option_secret",
        skip_serializing_if = "Option::is_none"
    )]
    pub api_hash: Option<Secret<String>>,
}

impl UserbotConfig {
    /// Both application credentials are present and non-empty.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.api_id.is_some()
            && self
                .api_hash
                .as_ref()
                .is_some_and(|h| !h.expose_secret().trim().is_empty())
    }
}

impl std::fmt::Debug for UserbotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserbotConfig")
            .field("api_id", &self.api_id)
            .field("api_hash", &self.api_hash.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Routing engine settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// How long task/rule lookups are cached per connection (ms). 0 disables caching.
    pub cache_ttl_ms: u64,
}

/// Metrics export settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Address for the Prometheus scrape listener, e.g. `127.0.0.1:9464`.
    pub listen: Option<String>,
}

fn serialize_option_secret<S: serde::Serializer>(
    secret: &Option<Secret<String>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match secret {
        Some(s) => serializer.serialize_some(s.expose_secret()),
        None => serializer.serialize_none(),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = FerryConfig::default();
        assert!(cfg.vault.key.is_none());
        assert_eq!(cfg.telegram.poll_timeout_secs, 30);
        assert_eq!(cfg.telegram.client_timeout_secs, 45);
        assert_eq!(cfg.routing.cache_ttl_ms, 0);
        assert!(!cfg.userbot.is_configured());
    }

    #[test]
    fn deserialize_partial_toml() {
        let raw = r#"
            [vault]
            key = "c2VjcmV0"

            [userbot]
            api_id = 12345
            api_hash = "abcdef"

            [telegram]
            max_poll_failures = 2
        "#;
        let cfg: FerryConfig = toml::from_str(raw).unwrap();
        assert_eq!(cfg.vault.key.unwrap().expose_secret(), "c2VjcmV0");
        assert!(cfg.userbot.is_configured());
        assert_eq!(cfg.telegram.max_poll_failures, 2);
        // untouched fields keep their defaults
        assert_eq!(cfg.telegram.retry_delay_secs, 5);
        assert_eq!(cfg.database.max_connections, 5);
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = VaultConfig {
            key: Some(Secret::new("super-secret".into())),
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("super-secret"));
        assert!(dbg.contains("REDACTED"));
    }

    #[test]
    fn blank_api_hash_is_not_configured() {
        let cfg = UserbotConfig {
            api_id: Some(1),
            api_hash: Some(Secret::new("  ".into())),
        };
        assert!(!cfg.is_configured());
    }
}
