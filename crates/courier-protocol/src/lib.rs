//! # courier-protocol
//!
//! Protocol types shared by the Courier broker and its transport bridge.
//!
//! - **Values** - the subset of the AMQP type system the broker inspects
//! - **Termini** - link sources and targets, including coordinator targets
//! - **Delivery states** - outcomes, transactional states, error conditions
//! - **Coordinator** - declare/discharge request decoding
//! - **Frames** - events in, commands out, length-prefixed MessagePack codec
//!
//! ## Example
//!
//! ```rust
//! use courier_protocol::{codec, ConnectionId, Event, Frame};
//!
//! let frame = Frame::event(Event::ConnectionOpening {
//!     connection: ConnectionId::new("conn-1"),
//! });
//!
//! let encoded = codec::encode(&frame).unwrap();
//! let decoded = codec::decode(&encoded).unwrap();
//! assert_eq!(frame, decoded);
//! ```

pub mod codec;
pub mod coordinator;
pub mod delivery;
pub mod endpoint;
pub mod frames;
pub mod message;
pub mod terminus;
pub mod value;
pub mod version;

pub use codec::{decode, encode, CodecError, FrameCodec};
pub use coordinator::{declare_body, discharge_body, CoordinatorDecodeError, CoordinatorRequest};
pub use delivery::{conditions, Condition, DeliveryState, Outcome, TransactionId};
pub use endpoint::{ConnectionId, DeliveryTag, LinkId, Role};
pub use frames::{Command, Event, Frame};
pub use message::Message;
pub use terminus::{capabilities, Terminus, TerminusKind};
pub use value::{Described, Descriptor, Symbol, Value};
pub use version::{Version, PROTOCOL_VERSION};
