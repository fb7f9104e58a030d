//! Connection supervisor: one worker task per live connection.
//!
//! The [`Supervisor`] owns the registry of running connection workers keyed
//! by [`ConnectionKey`](ferry_common::ConnectionKey). Starting is idempotent,
//! stopping is fire-and-forget, and nothing restarts automatically: a worker
//! that ends reports a terminal lifecycle event and leaves the registry.

pub mod factory;
pub mod supervisor;
mod worker;

pub use {factory::ConnectorFactory, supervisor::Supervisor};
