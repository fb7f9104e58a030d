//! Metrics collection and export for ferry.
//!
//! Crates record through the `metrics` facade using the names in this crate.
//! With the `prometheus` feature, [`init_metrics`] installs a Prometheus
//! recorder that serves a scrape endpoint; otherwise recording is a no-op.
//!
//! ```rust,ignore
//! use ferry_metrics::{counter, routing};
//!
//! counter!(routing::FORWARDS_DELIVERED_TOTAL, "mode" => "copy").increment(1);
//! ```

mod definitions;
mod error;
mod recorder;

pub use {
    definitions::*,
    error::{Error, Result},
    recorder::{MetricsRecorderConfig, init_metrics},
};

// Re-export metrics macros for convenience
pub use metrics::{counter, gauge, histogram};
