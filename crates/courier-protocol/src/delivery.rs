//! Delivery states, outcomes and error conditions.

use crate::value::Symbol;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error condition names used by the broker.
pub mod conditions {
    /// A delivery or discharge referenced a transaction that is not live.
    pub const TRANSACTION_UNKNOWN_ID: &str = "amqp:transaction:unknown-id";
    /// A coordinator message body could not be decoded.
    pub const DECODE_ERROR: &str = "amqp:decode-error";
    /// A message had no address to route to.
    pub const NOT_FOUND: &str = "amqp:not-found";
}

/// AMQP descriptor codes of the delivery states.
pub mod codes {
    pub const ACCEPTED: u64 = 0x24;
    pub const REJECTED: u64 = 0x25;
    pub const RELEASED: u64 = 0x26;
    pub const MODIFIED: u64 = 0x27;
    pub const DECLARED: u64 = 0x33;
    pub const TRANSACTIONAL_STATE: u64 = 0x34;
}

/// Broker-generated transaction identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(#[serde(with = "serde_bytes")] Vec<u8>);

impl TransactionId {
    /// Create a transaction ID from raw bytes.
    #[must_use]
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Get the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

impl From<&[u8]> for TransactionId {
    fn from(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }
}

impl From<&str> for TransactionId {
    fn from(s: &str) -> Self {
        Self(s.as_bytes().to_vec())
    }
}

/// Terminal outcome of a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Accepted,
    Rejected,
    Released,
    Modified,
}

impl Outcome {
    /// AMQP descriptor code of the outcome.
    #[must_use]
    pub fn code(self) -> u64 {
        match self {
            Outcome::Accepted => codes::ACCEPTED,
            Outcome::Rejected => codes::REJECTED,
            Outcome::Released => codes::RELEASED,
            Outcome::Modified => codes::MODIFIED,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Outcome::Accepted => "accepted",
            Outcome::Rejected => "rejected",
            Outcome::Released => "released",
            Outcome::Modified => "modified",
        };
        f.write_str(name)
    }
}

/// State of a delivery, local or remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum DeliveryState {
    Accepted,
    Rejected,
    Released,
    Modified,
    /// Reply to a coordinator declare: carries the new transaction ID.
    Declared { txn_id: TransactionId },
    /// A delivery performed inside a transaction.
    Transactional {
        txn_id: TransactionId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<Outcome>,
    },
}

impl DeliveryState {
    /// AMQP descriptor code of the state.
    #[must_use]
    pub fn code(&self) -> u64 {
        match self {
            DeliveryState::Accepted => codes::ACCEPTED,
            DeliveryState::Rejected => codes::REJECTED,
            DeliveryState::Released => codes::RELEASED,
            DeliveryState::Modified => codes::MODIFIED,
            DeliveryState::Declared { .. } => codes::DECLARED,
            DeliveryState::Transactional { .. } => codes::TRANSACTIONAL_STATE,
        }
    }

    /// Transaction ID carried by a transactional state.
    #[must_use]
    pub fn transaction(&self) -> Option<&TransactionId> {
        match self {
            DeliveryState::Transactional { txn_id, .. } => Some(txn_id),
            _ => None,
        }
    }

    /// Terminal outcome, if this state is one.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome> {
        match self {
            DeliveryState::Accepted => Some(Outcome::Accepted),
            DeliveryState::Rejected => Some(Outcome::Rejected),
            DeliveryState::Released => Some(Outcome::Released),
            DeliveryState::Modified => Some(Outcome::Modified),
            _ => None,
        }
    }
}

impl From<Outcome> for DeliveryState {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Accepted => DeliveryState::Accepted,
            Outcome::Rejected => DeliveryState::Rejected,
            Outcome::Released => DeliveryState::Released,
            Outcome::Modified => DeliveryState::Modified,
        }
    }
}

/// An error condition attached to a delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Condition name, e.g. `amqp:transaction:unknown-id`.
    pub name: Symbol,
    /// Optional human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Condition {
    /// Create a condition without description.
    #[must_use]
    pub fn new(name: impl Into<Symbol>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    /// Attach a description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.description {
            Some(description) => write!(f, "{}: {}", self.name, description),
            None => write!(f, "{}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_state_codes() {
        assert_eq!(DeliveryState::Accepted.code(), 0x24);
        assert_eq!(DeliveryState::Rejected.code(), 0x25);
        let declared = DeliveryState::Declared {
            txn_id: "tx-1".into(),
        };
        assert_eq!(declared.code(), 0x33);
        let transactional = DeliveryState::Transactional {
            txn_id: "tx-1".into(),
            outcome: Some(Outcome::Accepted),
        };
        assert_eq!(transactional.code(), 0x34);
        assert_eq!(transactional.transaction(), Some(&TransactionId::from("tx-1")));
        assert!(transactional.outcome().is_none());
    }

    #[test]
    fn test_condition_display() {
        let condition = Condition::new(conditions::DECODE_ERROR).with_description("not a list");
        assert_eq!(condition.to_string(), "amqp:decode-error: not a list");
    }
}
