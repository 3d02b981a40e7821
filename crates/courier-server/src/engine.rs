//! Broker engine task.
//!
//! One task owns the [`Broker`]. Bridge sessions submit transport events
//! over an mpsc channel, so events from every session are handled one at a
//! time, in arrival order. Commands are routed back to the session that
//! opened their connection. The registry is only written here, so claims and
//! releases of a connection id apply in the same order as its events.

use crate::metrics;
use courier_core::{Broker, BrokerStats};
use courier_protocol::{frames::error_codes, Command, ConnectionId, Event, Frame};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outbound frame queue of one bridge session.
pub type SessionSender = mpsc::UnboundedSender<Frame>;

/// Outbound frame queues of bridge sessions, by AMQP connection.
pub type SessionRegistry = Arc<DashMap<ConnectionId, SessionSender>>;

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine task has stopped.
    #[error("Broker engine is not running")]
    Stopped,
}

enum Request {
    Event {
        event: Event,
        origin: Option<SessionSender>,
    },
    Stats(oneshot::Sender<BrokerStats>),
}

/// Handle for submitting work to the engine.
#[derive(Clone)]
pub struct EngineHandle {
    requests: mpsc::UnboundedSender<Request>,
}

impl EngineHandle {
    /// Submit a transport event without session ownership checks.
    #[cfg(test)]
    pub fn submit(&self, event: Event) -> Result<(), EngineError> {
        self.send(event, None)
    }

    /// Submit a transport event on behalf of a bridge session.
    ///
    /// `ConnectionOpening` claims the connection for `origin`. Any other
    /// event is dropped unless `origin` holds its connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine has stopped.
    pub fn submit_from(&self, event: Event, origin: &SessionSender) -> Result<(), EngineError> {
        self.send(event, Some(origin.clone()))
    }

    fn send(&self, event: Event, origin: Option<SessionSender>) -> Result<(), EngineError> {
        self.requests
            .send(Request::Event { event, origin })
            .map_err(|_| EngineError::Stopped)
    }

    /// Get a snapshot of broker statistics.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine has stopped.
    pub async fn stats(&self) -> Result<BrokerStats, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.requests
            .send(Request::Stats(tx))
            .map_err(|_| EngineError::Stopped)?;
        rx.await.map_err(|_| EngineError::Stopped)
    }
}

/// Spawn the engine task.
///
/// The task runs until every [`EngineHandle`] is dropped.
pub fn spawn(broker: Broker, sessions: SessionRegistry) -> (EngineHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = Engine { broker, sessions };
    let task = tokio::spawn(engine.run(rx));
    (EngineHandle { requests: tx }, task)
}

struct Engine {
    broker: Broker,
    sessions: SessionRegistry,
}

impl Engine {
    async fn run(mut self, mut requests: mpsc::UnboundedReceiver<Request>) {
        info!("Broker engine started");
        while let Some(request) = requests.recv().await {
            match request {
                Request::Event { event, origin } => {
                    if self.admit(&event, origin.as_ref()) {
                        self.on_event(event, origin.as_ref());
                    }
                }
                Request::Stats(reply) => {
                    let _ = reply.send(self.broker.stats());
                }
            }
        }
        info!("Broker engine stopped");
    }

    /// Check and record connection ownership for a session event.
    fn admit(&self, event: &Event, origin: Option<&SessionSender>) -> bool {
        let Some(origin) = origin else {
            return true;
        };
        let connection = event.connection();
        let owner = self
            .sessions
            .get(connection)
            .map(|entry| entry.same_channel(origin));

        match (event, owner) {
            (Event::ConnectionOpening { .. }, None) => {
                self.sessions.insert(connection.clone(), origin.clone());
                debug!(connection = %connection, "Connection registered");
                true
            }
            (_, Some(true)) => true,
            (Event::ConnectionOpening { .. }, Some(false)) => {
                warn!(connection = %connection, "Connection claimed by another session");
                metrics::record_error("connection_claimed");
                let _ = origin.send(Frame::error(
                    error_codes::UNEXPECTED_FRAME,
                    format!("Connection {connection} belongs to another session"),
                ));
                false
            }
            (_, _) => {
                warn!(connection = %connection, event = event.kind(), "Dropping event for unowned connection");
                metrics::record_error("unowned_connection");
                false
            }
        }
    }

    fn on_event(&mut self, event: Event, origin: Option<&SessionSender>) {
        let kind = event.kind();
        let closed = match &event {
            Event::ConnectionClosing { connection }
            | Event::ConnectionDisconnected { connection } => Some(connection.clone()),
            _ => None,
        };

        let start = Instant::now();
        let commands = self.broker.handle(event);
        metrics::record_event(kind, start.elapsed().as_secs_f64());

        for command in commands {
            self.route(command);
        }

        if let Some(connection) = closed {
            let removed = self.sessions.remove_if(&connection, |_, session| {
                origin.map_or(true, |origin| session.same_channel(origin))
            });
            if removed.is_some() {
                debug!(connection = %connection, "Connection unregistered");
            }
        }
        metrics::set_broker_stats(&self.broker.stats());
    }

    fn route(&self, command: Command) {
        let kind = command.kind();
        let connection = command.connection().clone();
        metrics::record_command(kind);

        let delivered = self
            .sessions
            .get(&connection)
            .is_some_and(|session| session.send(Frame::command(command)).is_ok());
        if !delivered {
            warn!(connection = %connection, command = kind, "Dropping unroutable command");
            metrics::record_error("unroutable_command");
        }
    }
}
