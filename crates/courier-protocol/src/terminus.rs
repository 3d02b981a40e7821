//! Link termini (sources and targets).

use crate::value::Symbol;
use serde::{Deserialize, Serialize};

/// Well-known capability symbols.
pub mod capabilities {
    /// Connection capability: messages may be sent on a link without a target address.
    pub const ANONYMOUS_RELAY: &str = "ANONYMOUS-RELAY";
    /// Coordinator capability: local transactions are supported.
    pub const LOCAL_TRANSACTIONS: &str = "amqp:local-transactions";
}

/// Kind of a terminus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminusKind {
    #[default]
    Unspecified,
    Source,
    Target,
    /// Transaction coordinator target.
    Coordinator,
}

/// One end of a link.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Terminus {
    /// Terminus kind.
    #[serde(default)]
    pub kind: TerminusKind,
    /// Node address, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Whether the peer asks the broker to create a node on its behalf.
    #[serde(default)]
    pub dynamic: bool,
    /// Capabilities of the terminus.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<Symbol>,
}

impl Terminus {
    /// A terminus naming an address.
    #[must_use]
    pub fn address(kind: TerminusKind, address: impl Into<String>) -> Self {
        Self {
            kind,
            address: Some(address.into()),
            ..Self::default()
        }
    }

    /// A source asking the broker for a dynamically named node.
    #[must_use]
    pub fn dynamic_source() -> Self {
        Self {
            kind: TerminusKind::Source,
            dynamic: true,
            ..Self::default()
        }
    }

    /// A transaction coordinator target.
    #[must_use]
    pub fn coordinator(capabilities: Vec<Symbol>) -> Self {
        Self {
            kind: TerminusKind::Coordinator,
            capabilities,
            ..Self::default()
        }
    }

    /// Check if this is a coordinator terminus.
    #[must_use]
    pub fn is_coordinator(&self) -> bool {
        self.kind == TerminusKind::Coordinator
    }
}
