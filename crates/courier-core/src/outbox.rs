//! Commands collected while handling one event.

use crate::link::LinkTable;
use crate::queue::DeliverySink;
use courier_protocol::{
    Command, Condition, ConnectionId, DeliveryState, DeliveryTag, LinkId, Message, Symbol,
    Terminus,
};

/// Ordered buffer of commands for the transport.
#[derive(Debug, Default)]
pub struct Outbox {
    commands: Vec<Command>,
}

impl Outbox {
    /// Create an empty outbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a command.
    pub fn push(&mut self, command: Command) {
        self.commands.push(command);
    }

    /// Set a connection's offered capabilities.
    pub fn offer_capabilities(&mut self, connection: ConnectionId, capabilities: Vec<Symbol>) {
        self.push(Command::OfferCapabilities {
            connection,
            capabilities,
        });
    }

    /// Set a link's local source.
    pub fn set_source(&mut self, link: LinkId, source: Terminus) {
        self.push(Command::SetSource { link, source });
    }

    /// Set a link's local target.
    pub fn set_target(&mut self, link: LinkId, target: Terminus) {
        self.push(Command::SetTarget { link, target });
    }

    /// Send a message on a link.
    pub fn send(&mut self, link: LinkId, message: Message) {
        self.push(Command::Send { link, message });
    }

    /// Update a delivery's local state.
    pub fn update(
        &mut self,
        link: LinkId,
        delivery: DeliveryTag,
        state: DeliveryState,
        condition: Option<Condition>,
    ) {
        self.push(Command::Update {
            link,
            delivery,
            state,
            condition,
        });
    }

    /// Settle a delivery.
    pub fn settle(&mut self, link: LinkId, delivery: DeliveryTag) {
        self.push(Command::Settle { link, delivery });
    }

    /// Reject a delivery with a condition and settle it.
    pub fn reject(&mut self, link: LinkId, delivery: DeliveryTag, condition: Condition) {
        self.update(link.clone(), delivery, DeliveryState::Rejected, Some(condition));
        self.settle(link, delivery);
    }

    /// Commands queued so far.
    #[must_use]
    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Take the queued commands.
    #[must_use]
    pub fn into_commands(self) -> Vec<Command> {
        self.commands
    }
}

/// Dispatch sink over the broker's link table: reads cached credit and
/// turns each dispatched message into a `Send` command.
pub(crate) struct LinkSink<'a> {
    pub links: &'a mut LinkTable,
    pub outbox: &'a mut Outbox,
}

impl DeliverySink for LinkSink<'_> {
    fn credit(&self, link: &LinkId) -> u32 {
        self.links.get(link).map_or(0, |l| l.credit)
    }

    fn send(&mut self, link: &LinkId, message: Message) {
        if let Some(l) = self.links.get_mut(link) {
            l.credit = l.credit.saturating_sub(1);
        }
        self.outbox.send(link.clone(), message);
    }
}
