//! Broker-side view of transport links.
//!
//! Links are owned by the transport. The broker keeps a [`LinkRef`] for
//! every remote-active link: the handle plus what it needs to route, and
//! drops it when the link or its connection goes away.

use courier_protocol::{ConnectionId, LinkId};
use serde::Serialize;
use std::collections::HashMap;

/// What a link is used for, decided once when it opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    /// Broker sends: the link consumes from a queue.
    PlainSender,
    /// Broker receives: messages are routed by address.
    PlainReceiver,
    /// Broker receives transaction control messages.
    Coordinator,
}

/// Cached state of a transport link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRef {
    /// Transport handle.
    pub id: LinkId,
    /// Link kind.
    pub kind: LinkKind,
    /// Local source address (queue the link consumes from).
    pub source_address: Option<String>,
    /// Local target address (where arriving messages go).
    pub target_address: Option<String>,
    /// Last credit reported by the transport, minus messages sent since.
    pub credit: u32,
}

impl LinkRef {
    /// Create a link reference without addresses or credit.
    #[must_use]
    pub fn new(id: LinkId, kind: LinkKind) -> Self {
        Self {
            id,
            kind,
            source_address: None,
            target_address: None,
            credit: 0,
        }
    }

    /// Queue address this link consumes from, if it is a subscribed sender.
    #[must_use]
    pub fn subscription(&self) -> Option<&str> {
        match self.kind {
            LinkKind::PlainSender => self.source_address.as_deref(),
            _ => None,
        }
    }
}

/// Remote-active links, indexed by connection.
#[derive(Debug, Default)]
pub struct LinkTable {
    links: HashMap<LinkId, LinkRef>,
    by_connection: HashMap<ConnectionId, Vec<LinkId>>,
}

impl LinkTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a link, replacing any previous entry with the same ID.
    pub fn insert(&mut self, link: LinkRef) -> Option<LinkRef> {
        let previous = self.links.insert(link.id.clone(), link.clone());
        if previous.is_none() {
            self.by_connection
                .entry(link.id.connection.clone())
                .or_default()
                .push(link.id);
        }
        previous
    }

    /// Stop tracking a link.
    pub fn remove(&mut self, id: &LinkId) -> Option<LinkRef> {
        let link = self.links.remove(id)?;
        if let Some(ids) = self.by_connection.get_mut(&id.connection) {
            ids.retain(|l| l != id);
            if ids.is_empty() {
                self.by_connection.remove(&id.connection);
            }
        }
        Some(link)
    }

    /// Get a link.
    #[must_use]
    pub fn get(&self, id: &LinkId) -> Option<&LinkRef> {
        self.links.get(id)
    }

    /// Get a link mutably.
    pub fn get_mut(&mut self, id: &LinkId) -> Option<&mut LinkRef> {
        self.links.get_mut(id)
    }

    /// Links of a connection, in the order they were opened.
    #[must_use]
    pub fn on_connection(&self, connection: &ConnectionId) -> Vec<LinkId> {
        self.by_connection
            .get(connection)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of tracked links.
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if no links are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    /// Number of connections with at least one tracked link.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.by_connection.len()
    }
}
