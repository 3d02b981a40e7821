//! Codec for encoding and decoding bridge frames.
//!
//! This module provides MessagePack-based serialization with length-prefixed framing.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

use crate::frames::Frame;

/// Default maximum frame size (1 MiB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Length prefix size in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Frame exceeds the configured maximum size.
    #[error("Frame size {size} exceeds maximum {max}")]
    FrameTooLarge { size: usize, max: usize },

    /// Not enough data to decode frame.
    #[error("Incomplete frame: need {0} more bytes")]
    Incomplete(usize),

    /// MessagePack encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),

    /// MessagePack decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Encode a frame with the default size limit.
///
/// # Errors
///
/// Returns an error if the frame is too large or encoding fails.
pub fn encode(frame: &Frame) -> Result<Bytes, CodecError> {
    FrameCodec::default().encode(frame)
}

/// Decode a single frame with the default size limit.
///
/// # Errors
///
/// Returns an error if the data is incomplete, too large, or invalid.
pub fn decode(data: &[u8]) -> Result<Frame, CodecError> {
    FrameCodec::default().decode(data)
}

/// Try to decode a frame from a buffer with the default size limit.
///
/// # Errors
///
/// Returns an error if the frame is too large or invalid.
pub fn decode_from(buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
    FrameCodec::default().decode_from(buf)
}

/// Length-prefixed frame codec.
///
/// The encoded format is:
/// - 4 bytes: Big-endian length prefix
/// - N bytes: MessagePack-encoded frame (named fields)
#[derive(Debug, Clone, Copy)]
pub struct FrameCodec {
    max_frame_size: usize,
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FRAME_SIZE)
    }
}

impl FrameCodec {
    /// Create a codec that rejects frames above `max_frame_size` bytes.
    #[must_use]
    pub fn new(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Get the maximum frame size.
    #[must_use]
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Encode a frame to bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is too large or encoding fails.
    pub fn encode(&self, frame: &Frame) -> Result<Bytes, CodecError> {
        let mut buf = BytesMut::new();
        self.encode_into(frame, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Encode a frame into an existing buffer.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is too large or encoding fails.
    pub fn encode_into(&self, frame: &Frame, buf: &mut BytesMut) -> Result<(), CodecError> {
        let payload = rmp_serde::to_vec_named(frame)?;
        self.check_size(payload.len())?;

        buf.reserve(LENGTH_PREFIX_SIZE + payload.len());
        buf.put_u32(payload.len() as u32);
        buf.extend_from_slice(&payload);

        Ok(())
    }

    /// Decode a single frame from bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the data is incomplete, too large, or invalid.
    pub fn decode(&self, data: &[u8]) -> Result<Frame, CodecError> {
        let Some(length) = read_length(data) else {
            return Err(CodecError::Incomplete(LENGTH_PREFIX_SIZE - data.len()));
        };
        self.check_size(length)?;

        let total_size = LENGTH_PREFIX_SIZE + length;
        if data.len() < total_size {
            return Err(CodecError::Incomplete(total_size - data.len()));
        }

        Ok(rmp_serde::from_slice(&data[LENGTH_PREFIX_SIZE..total_size])?)
    }

    /// Try to decode a frame from a buffer, advancing it if successful.
    ///
    /// Returns `Ok(Some(frame))` if a complete frame was decoded,
    /// `Ok(None)` if more data is needed, or `Err` on protocol error.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is too large or invalid.
    pub fn decode_from(&self, buf: &mut BytesMut) -> Result<Option<Frame>, CodecError> {
        let Some(length) = read_length(buf) else {
            return Ok(None);
        };
        self.check_size(length)?;

        if buf.len() < LENGTH_PREFIX_SIZE + length {
            return Ok(None);
        }

        buf.advance(LENGTH_PREFIX_SIZE);
        let payload = buf.split_to(length);
        Ok(Some(rmp_serde::from_slice(&payload)?))
    }

    fn check_size(&self, size: usize) -> Result<(), CodecError> {
        if size > self.max_frame_size {
            return Err(CodecError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }
        Ok(())
    }
}

fn read_length(data: &[u8]) -> Option<usize> {
    let prefix: [u8; LENGTH_PREFIX_SIZE] = data.get(..LENGTH_PREFIX_SIZE)?.try_into().ok()?;
    Some(u32::from_be_bytes(prefix) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::{DeliveryState, Outcome};
    use crate::endpoint::{DeliveryTag, LinkId, Role};
    use crate::frames::{Command, Event};
    use crate::message::Message;
    use crate::terminus::Terminus;

    #[test]
    fn test_streaming_decode() {
        let link = LinkId::new("conn-1", "producer");
        let opening = Frame::event(Event::LinkOpening {
            link: link.clone(),
            role: Role::Receiver,
            source: Terminus::default(),
            target: Terminus::coordinator(vec![]),
            credit: 0,
        });
        let arrived = Frame::event(Event::MessageArrived {
            link: link.clone(),
            delivery: DeliveryTag(1),
            message: Message::new("payload").with_address("orders"),
            state: Some(DeliveryState::Transactional {
                txn_id: "tx-1".into(),
                outcome: Some(Outcome::Accepted),
            }),
        });
        let settle = Frame::command(Command::Settle {
            link,
            delivery: DeliveryTag(1),
        });

        let codec = FrameCodec::default();
        let mut buf = BytesMut::new();
        codec.encode_into(&opening, &mut buf).unwrap();
        codec.encode_into(&arrived, &mut buf).unwrap();
        codec.encode_into(&settle, &mut buf).unwrap();

        assert_eq!(codec.decode_from(&mut buf).unwrap(), Some(opening));
        assert_eq!(codec.decode_from(&mut buf).unwrap(), Some(arrived));
        assert_eq!(codec.decode_from(&mut buf).unwrap(), Some(settle));
        assert!(codec.decode_from(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_decode_incomplete() {
        let encoded = encode(&Frame::hello()).unwrap();

        match decode(&encoded[..5]) {
            Err(CodecError::Incomplete(_)) => {}
            other => panic!("Expected Incomplete error, got {:?}", other),
        }
        match decode(&encoded[..2]) {
            Err(CodecError::Incomplete(2)) => {}
            other => panic!("Expected Incomplete error, got {:?}", other),
        }

        let mut partial = BytesMut::from(&encoded[..encoded.len() - 1]);
        assert!(decode_from(&mut partial).unwrap().is_none());
    }

    #[test]
    fn test_frame_too_large() {
        let codec = FrameCodec::new(16);
        let frame = Frame::error(1, "a message well beyond sixteen bytes");

        match codec.encode(&frame) {
            Err(CodecError::FrameTooLarge { max: 16, .. }) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }

        // An oversized length prefix is rejected before the payload arrives.
        let mut buf = BytesMut::new();
        buf.put_u32(1024);
        match codec.decode_from(&mut buf) {
            Err(CodecError::FrameTooLarge { size: 1024, .. }) => {}
            other => panic!("Expected FrameTooLarge error, got {:?}", other),
        }
    }
}
