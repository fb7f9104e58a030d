//! Semantic validation of a loaded configuration.
//!
//! Parsing already rejects malformed files; this pass reports settings that
//! parse fine but would make connectors fail at runtime.

use {secrecy::ExposeSecret, std::net::SocketAddr};

use crate::schema::FerryConfig;

/// Severity level for a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
            Self::Info => write!(f, "info"),
        }
    }
}

/// A single validation diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path, e.g. "telegram.client_timeout_secs"
    pub path: &'static str,
    pub message: String,
}

/// Result of validating a configuration.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub diagnostics: Vec<Diagnostic>,
}

impl ValidationResult {
    /// Returns `true` if any diagnostic is an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    /// Number of diagnostics at `severity`.
    #[must_use]
    pub fn count(&self, severity: Severity) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }

    fn push(&mut self, severity: Severity, path: &'static str, message: impl Into<String>) {
        self.diagnostics.push(Diagnostic {
            severity,
            path,
            message: message.into(),
        });
    }
}

/// Validate a configuration.
#[must_use]
pub fn validate(config: &FerryConfig) -> ValidationResult {
    let mut result = ValidationResult::default();

    match config.vault.key.as_ref() {
        None => result.push(
            Severity::Error,
            "vault.key",
            "no encryption key configured (set FERRY_ENCRYPTION_KEY)",
        ),
        Some(key) if key.expose_secret().contains("${") => result.push(
            Severity::Error,
            "vault.key",
            "encryption key references an unset environment variable",
        ),
        Some(_) => {},
    }

    if config.database.url.trim().is_empty() {
        result.push(Severity::Error, "database.url", "database url is empty");
    }

    let tg = &config.telegram;
    if tg.client_timeout_secs <= u64::from(tg.poll_timeout_secs) {
        result.push(
            Severity::Error,
            "telegram.client_timeout_secs",
            format!(
                "client timeout ({}s) must exceed the polling timeout ({}s)",
                tg.client_timeout_secs, tg.poll_timeout_secs
            ),
        );
    }
    if tg.max_poll_failures == 0 {
        result.push(
            Severity::Warning,
            "telegram.max_poll_failures",
            "0 ends a bot connection on its first polling error",
        );
    }

    if !config.userbot.is_configured() {
        result.push(
            Severity::Info,
            "userbot",
            "api_id/api_hash not set; user-session connections will not start",
        );
    }

    if config.metrics.enabled {
        match config.metrics.listen.as_deref() {
            None => result.push(
                Severity::Warning,
                "metrics.listen",
                "metrics enabled without a listen address; nothing will be exported",
            ),
            Some(addr) if addr.parse::<SocketAddr>().is_err() => result.push(
                Severity::Error,
                "metrics.listen",
                format!("invalid socket address: {addr}"),
            ),
            Some(_) => {},
        }
    }

    result
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, secrecy::Secret};

    fn configured() -> FerryConfig {
        let mut cfg = FerryConfig::default();
        cfg.vault.key = Some(Secret::new("a2V5".into()));
        cfg.userbot.api_id = Some(1);
        cfg.userbot.api_hash = Some(Secret::new("hash".into()));
        cfg
    }

    fn paths(result: &ValidationResult) -> Vec<&'static str> {
        result.diagnostics.iter().map(|d| d.path).collect()
    }

    #[test]
    fn fully_configured_is_clean() {
        let result = validate(&configured());
        assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    }

    #[test]
    fn missing_key_is_an_error() {
        let result = validate(&FerryConfig::default());
        assert!(result.has_errors());
        assert!(paths(&result).contains(&"vault.key"));
        assert!(paths(&result).contains(&"userbot"));
    }

    #[test]
    fn unresolved_placeholder_key_is_an_error() {
        let mut cfg = configured();
        cfg.vault.key = Some(Secret::new("${FERRY_ENCRYPTION_KEY}".into()));
        assert!(validate(&cfg).has_errors());
    }

    #[test]
    fn client_timeout_must_exceed_poll_timeout() {
        let mut cfg = configured();
        cfg.telegram.client_timeout_secs = 30;
        let result = validate(&cfg);
        assert!(result.has_errors());
        assert_eq!(paths(&result), vec!["telegram.client_timeout_secs"]);
    }

    #[test]
    fn metrics_listen_address_is_checked() {
        let mut cfg = configured();
        cfg.metrics.enabled = true;
        cfg.metrics.listen = Some("not an address".into());
        assert!(validate(&cfg).has_errors());

        cfg.metrics.listen = Some("127.0.0.1:9464".into());
        assert!(!validate(&cfg).has_errors());
    }
}
