//! Metrics recorder initialization.

use tracing::info;

use crate::Result;

/// Configuration for the metrics system.
#[derive(Debug, Clone, Default)]
pub struct MetricsRecorderConfig {
    /// Whether metrics collection is enabled
    pub enabled: bool,
    /// Socket address for the scrape endpoint, e.g. `127.0.0.1:9464`
    pub listen: Option<String>,
    /// Global labels to add to all metrics
    pub global_labels: Vec<(String, String)>,
}

/// Initialize the metrics system.
///
/// Call once at startup from within a tokio runtime. With the `prometheus`
/// feature and a listen address, installs the global recorder and an HTTP
/// scrape listener; in every other case recording stays a no-op.
pub fn init_metrics(config: MetricsRecorderConfig) -> Result<()> {
    if !config.enabled {
        info!("metrics collection is disabled");
        return Ok(());
    }

    let Some(listen) = config.listen.as_deref() else {
        info!("metrics enabled without a listen address, not exporting");
        return Ok(());
    };
    let addr: std::net::SocketAddr =
        listen
            .parse()
            .map_err(|source| crate::Error::ListenAddr {
                addr: listen.to_string(),
                source,
            })?;

    #[cfg(feature = "prometheus")]
    {
        use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};

        let mut builder = PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets_for_metric(
                Matcher::Suffix("_duration_seconds".to_string()),
                &[0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 35.0],
            )?;
        for (key, value) in config.global_labels {
            builder = builder.add_global_label(key, value);
        }
        builder.install()?;
        info!(%addr, "prometheus metrics exporter listening");
    }

    #[cfg(not(feature = "prometheus"))]
    info!(%addr, "metrics feature not enabled at compile time");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_is_a_noop() {
        assert!(init_metrics(MetricsRecorderConfig::default()).is_ok());
    }

    #[test]
    fn enabled_without_listener_is_a_noop() {
        let config = MetricsRecorderConfig {
            enabled: true,
            ..Default::default()
        };
        assert!(init_metrics(config).is_ok());
    }

    #[test]
    fn bad_listen_address_is_rejected() {
        let config = MetricsRecorderConfig {
            enabled: true,
            listen: Some("nowhere".into()),
            ..Default::default()
        };
        assert!(matches!(
            init_metrics(config),
            Err(crate::Error::ListenAddr { .. })
        ));
    }
}
