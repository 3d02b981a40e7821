//! Active transaction registry.

use courier_protocol::{conditions, Condition, DeliveryTag, LinkId, TransactionId};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

/// Transaction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    /// The ID does not name an active transaction.
    #[error("Unknown transaction: {0}")]
    UnknownId(TransactionId),
}

impl TransactionError {
    /// Condition reported to the peer.
    #[must_use]
    pub fn condition(&self) -> Condition {
        match self {
            TransactionError::UnknownId(_) => Condition::new(conditions::TRANSACTION_UNKNOWN_ID),
        }
    }
}

/// An active transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    /// Broker-generated ID.
    pub id: TransactionId,
    /// Coordinator link the declare arrived on.
    pub coordinator: LinkId,
    /// Delivery that carried the declare.
    pub declared_by: DeliveryTag,
}

/// Active transactions by ID.
///
/// Commit and rollback both just remove the entry.
#[derive(Debug, Default)]
pub struct TransactionTable {
    active: HashMap<TransactionId, Transaction>,
}

impl TransactionTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a transaction and return its fresh ID.
    pub fn declare(&mut self, coordinator: LinkId, declared_by: DeliveryTag) -> TransactionId {
        let id = loop {
            let candidate = TransactionId::new(Uuid::new_v4().to_string());
            if !self.active.contains_key(&candidate) {
                break candidate;
            }
        };

        self.active.insert(
            id.clone(),
            Transaction {
                id: id.clone(),
                coordinator,
                declared_by,
            },
        );
        id
    }

    /// End a transaction.
    ///
    /// # Errors
    ///
    /// Returns `UnknownId` if the transaction is not active.
    pub fn discharge(&mut self, id: &TransactionId) -> Result<Transaction, TransactionError> {
        self.active
            .remove(id)
            .ok_or_else(|| TransactionError::UnknownId(id.clone()))
    }

    /// Check that a transaction is active.
    ///
    /// # Errors
    ///
    /// Returns `UnknownId` if it is not.
    pub fn check(&self, id: &TransactionId) -> Result<&Transaction, TransactionError> {
        self.active
            .get(id)
            .ok_or_else(|| TransactionError::UnknownId(id.clone()))
    }

    /// Check if a transaction is active.
    #[must_use]
    pub fn contains(&self, id: &TransactionId) -> bool {
        self.active.contains_key(id)
    }

    /// Number of active transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.active.len()
    }

    /// Check if no transaction is active.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }
}
