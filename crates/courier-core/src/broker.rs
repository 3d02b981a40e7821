//! The broker event handler.
//!
//! [`Broker`] owns every registry and turns one transport [`Event`] into the
//! [`Command`]s that answer it. Each event is handled to completion before
//! the next one.

use crate::link::{LinkKind, LinkTable};
use crate::outbox::{LinkSink, Outbox};
use crate::router::{Router, RouterConfig, RouterStats};
use crate::transactions::TransactionTable;
use courier_protocol::{
    capabilities, conditions, Command, Condition, ConnectionId, DeliveryState, DeliveryTag, Event,
    LinkId, Message, Symbol,
};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

/// Broker configuration.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Router configuration.
    pub router: RouterConfig,
    /// Capabilities offered on every connection.
    pub offered_capabilities: Vec<Symbol>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            router: RouterConfig::default(),
            offered_capabilities: vec![Symbol::from(capabilities::ANONYMOUS_RELAY)],
        }
    }
}

/// In-memory message broker.
#[derive(Debug)]
pub struct Broker {
    pub(crate) router: Router,
    pub(crate) links: LinkTable,
    pub(crate) transactions: TransactionTable,
    offered_capabilities: Vec<Symbol>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    /// Create a broker with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(BrokerConfig::default())
    }

    /// Create a broker with custom configuration.
    #[must_use]
    pub fn with_config(config: BrokerConfig) -> Self {
        info!(
            capabilities = ?config.offered_capabilities,
            "Creating broker"
        );
        Self {
            router: Router::with_config(config.router),
            links: LinkTable::new(),
            transactions: TransactionTable::new(),
            offered_capabilities: config.offered_capabilities,
        }
    }

    /// Handle one event and return the commands it produced, in order.
    pub fn handle(&mut self, event: Event) -> Vec<Command> {
        let mut outbox = Outbox::new();
        self.handle_into(event, &mut outbox);
        outbox.into_commands()
    }

    /// Handle one event, appending the commands it produced to `outbox`.
    pub fn handle_into(&mut self, event: Event, outbox: &mut Outbox) {
        trace!(event = event.kind(), connection = %event.connection(), "Handling event");

        match event {
            Event::ConnectionOpening { connection } => {
                self.on_connection_opening(connection, outbox);
            }
            Event::ConnectionClosing { connection } | Event::ConnectionDisconnected { connection } => {
                self.on_connection_teardown(&connection);
            }
            Event::LinkOpening {
                link,
                role,
                source,
                target,
                credit,
            } => self.on_link_opening(link, role, source, target, credit, outbox),
            Event::LinkClosing { link } => self.on_link_closing(&link),
            Event::LinkSendable { link, credit } => self.on_link_sendable(link, credit, outbox),
            Event::MessageArrived {
                link,
                delivery,
                message,
                state,
            } => self.on_message(link, delivery, message, state, outbox),
            Event::DeliveryUpdated {
                link,
                delivery,
                state,
            } => self.on_delivery_updated(link, delivery, &state, outbox),
            Event::DeliveryOutcome {
                link,
                delivery,
                outcome,
            } => {
                debug!(link = %link, delivery = %delivery, outcome = %outcome, "Delivery settled by peer");
            }
        }
    }

    fn on_connection_opening(&mut self, connection: ConnectionId, outbox: &mut Outbox) {
        debug!(connection = %connection, "Connection opening");
        if !self.offered_capabilities.is_empty() {
            outbox.offer_capabilities(connection, self.offered_capabilities.clone());
        }
    }

    fn on_message(
        &mut self,
        link: LinkId,
        delivery: DeliveryTag,
        message: Message,
        state: Option<DeliveryState>,
        outbox: &mut Outbox,
    ) {
        let link_ref = self.links.get(&link);
        if link_ref.is_some_and(|l| l.kind == LinkKind::Coordinator) {
            self.on_control_message(link, delivery, &message, outbox);
            return;
        }

        if let Some(txn_id) = state.as_ref().and_then(DeliveryState::transaction) {
            if !self.admit_transactional(&link, delivery, txn_id, outbox) {
                return;
            }
        }

        let address = link_ref
            .and_then(|l| l.target_address.clone())
            .or_else(|| message.address.clone());
        let Some(address) = address else {
            warn!(link = %link, delivery = %delivery, "Message has no address");
            let condition =
                Condition::new(conditions::NOT_FOUND).with_description("message has no address");
            outbox.reject(link, delivery, condition);
            return;
        };

        let queue = self.router.resolve_or_create(&address);
        let sent = queue.publish(
            message,
            &mut LinkSink {
                links: &mut self.links,
                outbox: &mut *outbox,
            },
        );
        trace!(link = %link, queue = %address, sent, "Published message");

        outbox.update(link.clone(), delivery, DeliveryState::Accepted, None);
        outbox.settle(link, delivery);
    }

    /// The address router.
    #[must_use]
    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Tracked links.
    #[must_use]
    pub fn links(&self) -> &LinkTable {
        &self.links
    }

    /// Active transactions.
    #[must_use]
    pub fn transactions(&self) -> &TransactionTable {
        &self.transactions
    }

    /// Get broker statistics.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            router: self.router.stats(),
            link_count: self.links.len(),
            connection_count: self.links.connection_count(),
            active_transactions: self.transactions.len(),
        }
    }
}

/// Broker statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BrokerStats {
    /// Queue statistics.
    #[serde(flatten)]
    pub router: RouterStats,
    /// Number of tracked links.
    pub link_count: usize,
    /// Number of connections with tracked links.
    pub connection_count: usize,
    /// Number of active transactions.
    pub active_transactions: usize,
}
