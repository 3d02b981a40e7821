//! Address router for Courier.
//!
//! The router maps addresses to queues. Queues spring into existence on
//! first reference and are removed once they become garbage.

use crate::queue::{DispatchPolicy, Queue};
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Router configuration.
#[derive(Debug, Clone, Default)]
pub struct RouterConfig {
    /// Dispatch policy of every queue the router creates.
    pub dispatch_policy: DispatchPolicy,
    /// Prefix prepended to dynamically allocated addresses.
    pub dynamic_address_prefix: String,
}

/// Address to queue registry.
#[derive(Debug, Default)]
pub struct Router {
    queues: HashMap<String, Queue>,
    config: RouterConfig,
}

impl Router {
    /// Create a new router with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Create a new router with custom configuration.
    #[must_use]
    pub fn with_config(config: RouterConfig) -> Self {
        info!("Creating router with config: {:?}", config);
        Self {
            queues: HashMap::new(),
            config,
        }
    }

    /// Router configuration.
    #[must_use]
    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    /// Get the queue at an address, creating a static one if absent.
    pub fn resolve_or_create(&mut self, address: &str) -> &mut Queue {
        match self.queues.entry(address.to_string()) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                debug!(queue = %address, "Created queue");
                entry.insert(Queue::with_policy(false, self.config.dispatch_policy))
            }
        }
    }

    /// Create a dynamic queue at a fresh, unique address.
    pub fn allocate_dynamic_address(&mut self) -> String {
        let address = loop {
            let candidate = format!("{}{}", self.config.dynamic_address_prefix, Uuid::new_v4());
            if !self.queues.contains_key(&candidate) {
                break candidate;
            }
        };

        self.queues.insert(
            address.clone(),
            Queue::with_policy(true, self.config.dispatch_policy),
        );
        debug!(queue = %address, "Created dynamic queue");
        address
    }

    /// Remove the queue at an address if it is garbage.
    ///
    /// Returns `true` if the queue was removed.
    pub fn remove_if_empty(&mut self, address: &str) -> bool {
        let deletable = self.queues.get(address).is_some_and(Queue::is_deletable);
        if deletable {
            self.queues.remove(address);
            debug!(queue = %address, "Removed queue");
        }
        deletable
    }

    /// Get the queue at an address.
    #[must_use]
    pub fn get(&self, address: &str) -> Option<&Queue> {
        self.queues.get(address)
    }

    /// Get the queue at an address mutably.
    pub fn get_mut(&mut self, address: &str) -> Option<&mut Queue> {
        self.queues.get_mut(address)
    }

    /// Check if a queue exists at an address.
    #[must_use]
    pub fn contains(&self, address: &str) -> bool {
        self.queues.contains_key(address)
    }

    /// Number of live queues.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queues.len()
    }

    /// Check if there are no live queues.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queues.is_empty()
    }

    /// Addresses of all live queues.
    pub fn addresses(&self) -> impl Iterator<Item = &str> {
        self.queues.keys().map(String::as_str)
    }

    /// Get router statistics.
    #[must_use]
    pub fn stats(&self) -> RouterStats {
        RouterStats {
            queue_count: self.queues.len(),
            dynamic_queue_count: self.queues.values().filter(|q| q.is_dynamic()).count(),
            buffered_messages: self.queues.values().map(Queue::len).sum(),
            consumer_count: self.queues.values().map(|q| q.consumers().len()).sum(),
        }
    }
}

/// Router statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    /// Number of live queues.
    pub queue_count: usize,
    /// Number of live dynamic queues.
    pub dynamic_queue_count: usize,
    /// Messages buffered across all queues.
    pub buffered_messages: usize,
    /// Subscriptions across all queues.
    pub consumer_count: usize,
}
