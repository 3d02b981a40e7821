//! Messages routed by the broker.

use crate::value::Value;
use serde::{Deserialize, Serialize};

/// An AMQP message as far as routing is concerned: an optional address and
/// an opaque body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Message {
    /// Address from the message properties, used when the link has no target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Message body.
    #[serde(default)]
    pub body: Value,
}

impl Message {
    /// Create a message with a body and no address.
    #[must_use]
    pub fn new(body: impl Into<Value>) -> Self {
        Self {
            address: None,
            body: body.into(),
        }
    }

    /// Set the message address.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::new("hello").with_address("orders");
        assert_eq!(msg.address.as_deref(), Some("orders"));
        assert_eq!(msg.body.as_str(), Some("hello"));
    }
}
