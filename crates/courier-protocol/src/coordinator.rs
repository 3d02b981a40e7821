//! Transaction coordinator control messages.
//!
//! Bodies sent on a coordinator link are described lists. They are decoded
//! once into [`CoordinatorRequest`]; anything else is a
//! [`CoordinatorDecodeError`].

use crate::delivery::TransactionId;
use crate::value::{Descriptor, Symbol, Value};
use thiserror::Error;

/// Symbolic descriptor of a declare request.
pub const DECLARE: &str = "amqp:declare:list";
/// Numeric descriptor of a declare request.
pub const DECLARE_CODE: u64 = 0x31;
/// Symbolic descriptor of a discharge request.
pub const DISCHARGE: &str = "amqp:discharge:list";
/// Numeric descriptor of a discharge request.
pub const DISCHARGE_CODE: u64 = 0x32;

/// Errors decoding a coordinator message body.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinatorDecodeError {
    /// Body is not a described value.
    #[error("coordinator body is not a described value")]
    NotDescribed,

    /// Descriptor is neither declare nor discharge.
    #[error("unsupported coordinator descriptor: {0}")]
    UnknownDescriptor(String),

    /// Described value is not a list.
    #[error("{0} body is not a list")]
    NotAList(&'static str),

    /// A mandatory field is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// A field has the wrong type.
    #[error("invalid field {field}: expected {expected}")]
    InvalidField {
        field: &'static str,
        expected: &'static str,
    },
}

/// A decoded coordinator request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorRequest {
    /// Start a new transaction.
    Declare,
    /// End a transaction; `failed` means roll back.
    Discharge { txn_id: TransactionId, failed: bool },
}

impl CoordinatorRequest {
    /// Decode a coordinator message body.
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not a declare or discharge list.
    pub fn decode(body: &Value) -> Result<Self, CoordinatorDecodeError> {
        let described = body
            .as_described()
            .ok_or(CoordinatorDecodeError::NotDescribed)?;

        if described.descriptor.matches(DECLARE, DECLARE_CODE) {
            // The optional global-id field is not used by a local coordinator.
            return Ok(CoordinatorRequest::Declare);
        }

        if described.descriptor.matches(DISCHARGE, DISCHARGE_CODE) {
            return decode_discharge(&described.value);
        }

        Err(CoordinatorDecodeError::UnknownDescriptor(
            described.descriptor.to_string(),
        ))
    }

    /// Encode the request as a message body.
    #[must_use]
    pub fn to_body(&self) -> Value {
        match self {
            CoordinatorRequest::Declare => {
                Value::described(Descriptor::Symbol(Symbol::from(DECLARE)), Value::List(vec![]))
            }
            CoordinatorRequest::Discharge { txn_id, failed } => Value::described(
                Descriptor::Symbol(Symbol::from(DISCHARGE)),
                Value::List(vec![
                    Value::Binary(txn_id.as_bytes().to_vec()),
                    Value::Bool(*failed),
                ]),
            ),
        }
    }
}

/// Body of a declare request.
#[must_use]
pub fn declare_body() -> Value {
    CoordinatorRequest::Declare.to_body()
}

/// Body of a discharge request for `txn_id`.
#[must_use]
pub fn discharge_body(txn_id: &TransactionId, failed: bool) -> Value {
    CoordinatorRequest::Discharge {
        txn_id: txn_id.clone(),
        failed,
    }
    .to_body()
}

fn decode_discharge(value: &Value) -> Result<CoordinatorRequest, CoordinatorDecodeError> {
    let fields = value
        .as_list()
        .ok_or(CoordinatorDecodeError::NotAList(DISCHARGE))?;

    let txn_id = match fields.first() {
        Some(Value::Binary(bytes)) => TransactionId::new(bytes.clone()),
        None | Some(Value::Null) => return Err(CoordinatorDecodeError::MissingField("txn-id")),
        Some(_) => {
            return Err(CoordinatorDecodeError::InvalidField {
                field: "txn-id",
                expected: "binary",
            })
        }
    };

    // `fail` is optional and defaults to false.
    let failed = match fields.get(1) {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(_) => {
            return Err(CoordinatorDecodeError::InvalidField {
                field: "fail",
                expected: "boolean",
            })
        }
    };

    Ok(CoordinatorRequest::Discharge { txn_id, failed })
}
