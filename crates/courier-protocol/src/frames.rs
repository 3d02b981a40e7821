//! Bridge frames.
//!
//! An external AMQP transport adapter talks to the broker over a bridge:
//! it streams transport notifications as [`Event`]s and receives the
//! broker's [`Command`]s back. Each frame is serialized using MessagePack.

use crate::delivery::{Condition, DeliveryState, Outcome};
use crate::endpoint::{ConnectionId, DeliveryTag, LinkId, Role};
use crate::message::Message;
use crate::terminus::Terminus;
use crate::value::Symbol;
use crate::version::{Version, PROTOCOL_VERSION};
use serde::{Deserialize, Serialize};

/// Bridge error codes carried by [`Frame::Error`].
pub mod error_codes {
    /// The peer's protocol version is not compatible.
    pub const INCOMPATIBLE_VERSION: u16 = 1001;
    /// A frame could not be decoded.
    pub const MALFORMED_FRAME: u16 = 1002;
    /// A frame was valid but not expected from this side.
    pub const UNEXPECTED_FRAME: u16 = 1003;
}

/// A notification raised by the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A peer is opening a connection.
    ConnectionOpening { connection: ConnectionId },

    /// A peer is closing a connection.
    ConnectionClosing { connection: ConnectionId },

    /// The connection vanished without a close handshake.
    ConnectionDisconnected { connection: ConnectionId },

    /// A peer requested a link attach.
    LinkOpening {
        link: LinkId,
        /// Role of the link on the broker side.
        role: Role,
        /// Source requested by the peer.
        #[serde(default)]
        source: Terminus,
        /// Target requested by the peer.
        #[serde(default)]
        target: Terminus,
        /// Credit already granted by the peer.
        #[serde(default)]
        credit: u32,
    },

    /// A peer is detaching or closing a link.
    LinkClosing { link: LinkId },

    /// The link has credit to send.
    LinkSendable { link: LinkId, credit: u32 },

    /// A message arrived on a receiving link.
    MessageArrived {
        link: LinkId,
        delivery: DeliveryTag,
        message: Message,
        /// Remote delivery state attached to the transfer.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        state: Option<DeliveryState>,
    },

    /// The peer updated the state of a delivery.
    DeliveryUpdated {
        link: LinkId,
        delivery: DeliveryTag,
        state: DeliveryState,
    },

    /// The peer settled a delivery with a terminal outcome.
    DeliveryOutcome {
        link: LinkId,
        delivery: DeliveryTag,
        outcome: Outcome,
    },
}

impl Event {
    /// Short name of the event, for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Event::ConnectionOpening { .. } => "connection_opening",
            Event::ConnectionClosing { .. } => "connection_closing",
            Event::ConnectionDisconnected { .. } => "connection_disconnected",
            Event::LinkOpening { .. } => "link_opening",
            Event::LinkClosing { .. } => "link_closing",
            Event::LinkSendable { .. } => "link_sendable",
            Event::MessageArrived { .. } => "message_arrived",
            Event::DeliveryUpdated { .. } => "delivery_updated",
            Event::DeliveryOutcome { .. } => "delivery_outcome",
        }
    }

    /// Connection the event belongs to.
    #[must_use]
    pub fn connection(&self) -> &ConnectionId {
        match self {
            Event::ConnectionOpening { connection }
            | Event::ConnectionClosing { connection }
            | Event::ConnectionDisconnected { connection } => connection,
            Event::LinkOpening { link, .. }
            | Event::LinkClosing { link }
            | Event::LinkSendable { link, .. }
            | Event::MessageArrived { link, .. }
            | Event::DeliveryUpdated { link, .. }
            | Event::DeliveryOutcome { link, .. } => &link.connection,
        }
    }
}

/// An instruction from the broker to the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Set the connection's offered capabilities.
    OfferCapabilities {
        connection: ConnectionId,
        capabilities: Vec<Symbol>,
    },

    /// Set the local source of a link.
    SetSource { link: LinkId, source: Terminus },

    /// Set the local target of a link.
    SetTarget { link: LinkId, target: Terminus },

    /// Send a message on a link.
    Send { link: LinkId, message: Message },

    /// Update the local state of a delivery.
    Update {
        link: LinkId,
        delivery: DeliveryTag,
        state: DeliveryState,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        condition: Option<Condition>,
    },

    /// Settle a delivery.
    Settle { link: LinkId, delivery: DeliveryTag },
}

impl Command {
    /// Short name of the command, for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Command::OfferCapabilities { .. } => "offer_capabilities",
            Command::SetSource { .. } => "set_source",
            Command::SetTarget { .. } => "set_target",
            Command::Send { .. } => "send",
            Command::Update { .. } => "update",
            Command::Settle { .. } => "settle",
        }
    }

    /// Connection the command must be delivered to.
    #[must_use]
    pub fn connection(&self) -> &ConnectionId {
        match self {
            Command::OfferCapabilities { connection, .. } => connection,
            Command::SetSource { link, .. }
            | Command::SetTarget { link, .. }
            | Command::Send { link, .. }
            | Command::Update { link, .. }
            | Command::Settle { link, .. } => &link.connection,
        }
    }
}

/// A bridge frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// Adapter handshake.
    Hello { version: Version },

    /// Server handshake response.
    Ready { session: String, version: Version },

    /// Transport notification, adapter to server.
    Event { event: Event },

    /// Broker instruction, server to adapter.
    Command { command: Command },

    /// Error report.
    Error { code: u16, message: String },

    /// Keepalive ping.
    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },

    /// Keepalive pong.
    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timestamp: Option<u64>,
    },
}

impl Frame {
    /// Short name of the frame, for logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Hello { .. } => "hello",
            Frame::Ready { .. } => "ready",
            Frame::Event { .. } => "event",
            Frame::Command { .. } => "command",
            Frame::Error { .. } => "error",
            Frame::Ping { .. } => "ping",
            Frame::Pong { .. } => "pong",
        }
    }

    /// Create a Hello frame for the current protocol version.
    #[must_use]
    pub fn hello() -> Self {
        Frame::Hello {
            version: PROTOCOL_VERSION,
        }
    }

    /// Create a Ready frame.
    #[must_use]
    pub fn ready(session: impl Into<String>, version: Version) -> Self {
        Frame::Ready {
            session: session.into(),
            version,
        }
    }

    /// Wrap an event.
    #[must_use]
    pub fn event(event: Event) -> Self {
        Frame::Event { event }
    }

    /// Wrap a command.
    #[must_use]
    pub fn command(command: Command) -> Self {
        Frame::Command { command }
    }

    /// Create an Error frame.
    #[must_use]
    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Frame::Error {
            code,
            message: message.into(),
        }
    }

    /// Create a Pong frame.
    #[must_use]
    pub fn pong(timestamp: Option<u64>) -> Self {
        Frame::Pong { timestamp }
    }
}
