//! Body of one connection worker task.

use std::sync::Arc;

use {
    ferry_channels::{
        Connector, ConnectorEvent, ConnectorEventSink, ConnectorState, Error, Result,
    },
    ferry_common::ConnectionKey,
    secrecy::Secret,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

#[cfg(feature = "metrics")]
use ferry_metrics::{
    connector as connector_metrics, counter, gauge, labels, supervisor as sup_metrics,
};

use crate::supervisor::Shared;

/// Tracks one connector's state and reports every change.
struct Lifecycle {
    key: ConnectionKey,
    state: ConnectorState,
    sink: Option<Arc<dyn ConnectorEventSink>>,
}

impl Lifecycle {
    fn new(key: ConnectionKey, sink: Option<Arc<dyn ConnectorEventSink>>) -> Self {
        Self {
            key,
            state: ConnectorState::Created,
            sink,
        }
    }

    async fn advance(&mut self, next: ConnectorState) {
        let from = self.state;
        match from.transition(next) {
            Ok(to) => {
                self.state = to;
                debug!(connection = %self.key, %from, %to, "connector state changed");
                if let Some(sink) = &self.sink {
                    sink.emit(ConnectorEvent::StateChanged {
                        key: self.key,
                        from,
                        to,
                    })
                    .await;
                }
            },
            Err(e) => warn!(connection = %self.key, error = %e, "ignoring illegal transition"),
        }
    }

    async fn terminate(self, reason: Option<String>) {
        if let Some(sink) = &self.sink {
            sink.emit(ConnectorEvent::Terminated {
                key: self.key,
                state: self.state,
                reason,
            })
            .await;
        }
    }
}

/// Run a connection from secret lookup to a terminal state.
pub(crate) async fn run(
    shared: Arc<Shared>,
    key: ConnectionKey,
    id: u64,
    cancel: CancellationToken,
) {
    #[cfg(feature = "metrics")]
    gauge!(sup_metrics::ACTIVE_WORKERS).increment(1.0);

    let mut life = Lifecycle::new(key, shared.events.clone());
    let mut connector: Option<Box<dyn Connector>> = None;

    let reason = match drive(&shared, key, &cancel, &mut life, &mut connector).await {
        Ok(()) => {
            life.advance(ConnectorState::Stopping).await;
            if let Some(c) = connector.as_mut()
                && let Err(e) = c.disconnect().await
            {
                warn!(connection = %key, error = %e, "error while disconnecting");
            }
            life.advance(ConnectorState::Stopped).await;
            info!(connection = %key, "connection stopped");
            None
        },
        Err(e) => {
            #[cfg(feature = "metrics")]
            counter!(
                connector_metrics::FAILURES_TOTAL,
                labels::KIND => key.kind.as_str(),
                labels::ERROR_TYPE => e.kind().as_str()
            )
            .increment(1);
            error!(
                connection = %key,
                error_kind = %e.kind(),
                error = %e,
                "connection failed"
            );
            life.advance(ConnectorState::Failed).await;
            if let Some(c) = connector.as_mut()
                && let Err(e) = c.disconnect().await
            {
                debug!(connection = %key, error = %e, "disconnect after failure");
            }
            Some(e.to_string())
        },
    };

    #[cfg(feature = "metrics")]
    {
        gauge!(sup_metrics::ACTIVE_WORKERS).decrement(1.0);
        counter!(
            sup_metrics::WORKERS_TERMINATED_TOTAL,
            labels::KIND => key.kind.as_str(),
            labels::STATE => life.state.as_str()
        )
        .increment(1);
    }

    shared.forget(key, id);
    life.terminate(reason).await;
}

/// `Ok(())` means the worker was cancelled; every error ends in `Failed`.
async fn drive(
    shared: &Shared,
    key: ConnectionKey,
    cancel: &CancellationToken,
    life: &mut Lifecycle,
    slot: &mut Option<Box<dyn Connector>>,
) -> Result<()> {
    let blob = shared
        .store
        .get_resource_secret(key)
        .await
        .map_err(Error::store)?
        .ok_or_else(|| Error::configuration(format!("no credential stored for {key}")))?;

    let connector = slot.insert(shared.factory.create(key)?);
    if cancel.is_cancelled() {
        return Ok(());
    }

    // A missing secret fails from `Created`; a bad one fails while connecting.
    life.advance(ConnectorState::Connecting).await;
    let secret = shared.vault.decrypt(&blob).map_err(|e| {
        if e.is_configuration() {
            Error::configuration(e)
        } else {
            Error::crypto(e)
        }
    })?;

    tokio::select! {
        biased;
        () = cancel.cancelled() => return Ok(()),
        res = connector.connect(Secret::new(secret)) => res?,
    }
    life.advance(ConnectorState::Running).await;
    info!(connection = %key, "connection running");

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Ok(()),
            next = connector.next_event() => match next? {
                // Branch futures are dropped before this body runs, so a stop
                // never interrupts an in-flight forward.
                Some(event) => shared.handler.handle(&event, &**connector).await,
                None => return Err(Error::transport("connection closed by remote")),
            },
        }
    }
}
