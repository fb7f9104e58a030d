use {
    ferry_channels::{Connector, Result},
    ferry_common::ConnectionKey,
};

/// Builds the connector variant for a connection key.
///
/// Called on the worker task before any network activity. Returning an error
/// (typically a configuration error, e.g. missing application credentials)
/// fails the worker without connecting.
pub trait ConnectorFactory: Send + Sync {
    fn create(&self, key: ConnectionKey) -> Result<Box<dyn Connector>>;
}
