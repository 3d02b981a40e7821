//! # courier-core
//!
//! Broker state and event handling for Courier.
//!
//! This crate provides the broker itself, independent of any transport:
//!
//! - **Queue** - FIFO backlog plus consumers, credit-based dispatch
//! - **Router** - address to queue registry, dynamic addresses
//! - **Links** - broker-side view of transport links
//! - **Transactions** - declare/discharge and transactional deliveries
//! - **Broker** - turns transport events into transport commands
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐ Event ┌─────────────┐     ┌─────────────┐
//! │  Transport  │──────▶│   Broker    │────▶│   Router    │──▶ Queue
//! └─────────────┘       └─────────────┘     └─────────────┘
//!        ▲                 │       │
//!        │     Command     │       ▼
//!        └─────────────────┘ ┌─────────────┐
//!                            │ Transactions│
//!                            └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use courier_core::Broker;
//! use courier_protocol::{Command, ConnectionId, Event};
//!
//! let mut broker = Broker::new();
//! let commands = broker.handle(Event::ConnectionOpening {
//!     connection: ConnectionId::new("conn-1"),
//! });
//! assert!(matches!(commands[0], Command::OfferCapabilities { .. }));
//! ```

pub mod broker;
mod coordinator;
mod lifecycle;
pub mod link;
pub mod outbox;
pub mod queue;
pub mod router;
pub mod transactions;

#[cfg(test)]
mod testing;

pub use broker::{Broker, BrokerConfig, BrokerStats};
pub use link::{LinkKind, LinkRef, LinkTable};
pub use outbox::Outbox;
pub use queue::{DeliverySink, DispatchPolicy, Queue};
pub use router::{Router, RouterConfig, RouterStats};
pub use transactions::{Transaction, TransactionError, TransactionTable};
