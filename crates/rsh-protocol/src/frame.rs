//! Frame header encoding/decoding
//!
//! Every frame on an rsh connection starts with an 8-byte header:
//! - message_type: 1 byte (u8)
//! - session_id: 4 bytes (u32, big-endian; 0 is the control session)
//! - payload_length: 3 bytes (u24, big-endian)
//!
//! The type byte leads so a corrupt or misaligned stream fails on the first
//! byte read. A header is validated as a unit before any payload is
//! buffered: identity and liveness frames must ride the control session and
//! keep control-sized payloads, shell-session frames must carry a real
//! session id.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::ProtocolError;
use crate::message::MessageType;
use crate::session::SessionId;

/// Size of the frame header in bytes
pub const HEADER_SIZE: usize = 8;

/// Maximum payload of a session frame (16MB - 1, limited by the 24-bit
/// length field). Sized for PTY output bursts and stdin writes.
pub const MAX_PAYLOAD_SIZE: usize = 0x00FF_FFFF;

/// Maximum payload of a control frame. `Hello` carries an agent identity
/// (env override, hostname, or machine-id) and the liveness probes carry a
/// timestamp; anything larger on the control session is a corrupt or
/// hostile peer.
pub const MAX_CONTROL_PAYLOAD: usize = 4096;

/// Frame header containing routing and length information
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Type of message in the payload
    pub message_type: MessageType,
    /// Session this frame belongs to
    pub session_id: SessionId,
    /// Length of the payload in bytes
    pub payload_length: u32,
}

/// Largest payload allowed for a message type.
fn payload_ceiling(message_type: MessageType) -> usize {
    if message_type.is_control() {
        MAX_CONTROL_PAYLOAD
    } else {
        MAX_PAYLOAD_SIZE
    }
}

impl FrameHeader {
    /// Create a new frame header
    pub fn new(message_type: MessageType, session_id: SessionId, payload_length: u32) -> Self {
        Self {
            message_type,
            session_id,
            payload_length,
        }
    }

    /// Check the header as a unit.
    ///
    /// Control messages (`Hello`, `Ping`, `Pong`) must ride session 0 and
    /// fit [`MAX_CONTROL_PAYLOAD`]; session messages (`Input`, `Output`,
    /// `Cancel`, `Error`) must carry a non-zero session id.
    pub fn validate(&self) -> Result<(), ProtocolError> {
        let max = payload_ceiling(self.message_type);
        if self.payload_length as usize > max {
            return Err(ProtocolError::PayloadTooLarge {
                size: self.payload_length as usize,
                max,
            });
        }
        if self.message_type.is_control() != self.session_id.is_control() {
            return Err(ProtocolError::WrongChannel {
                message_type: self.message_type,
                session_id: self.session_id.as_u32(),
            });
        }
        Ok(())
    }

    /// Encode the header into a byte buffer
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        // message_type: 1 byte
        dst.put_u8(self.message_type.as_u8());
        // session_id: 4 bytes big-endian
        dst.put_u32(self.session_id.as_u32());
        // payload_length: 3 bytes big-endian (24-bit)
        dst.put_u8((self.payload_length >> 16) as u8);
        dst.put_u16(self.payload_length as u16);
    }

    /// Decode and validate a header from a byte buffer
    ///
    /// Returns None if there aren't enough bytes in the buffer.
    /// Returns Err if the type byte is unknown or the header violates the
    /// channel and size rules.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, ProtocolError> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let type_byte = src.get_u8();
        let message_type = MessageType::from_u8(type_byte)
            .ok_or(ProtocolError::UnknownMessageType(type_byte))?;
        let session_id = SessionId::new(src.get_u32());
        let len_high = u32::from(src.get_u8());
        let len_low = u32::from(src.get_u16());

        let header = Self {
            message_type,
            session_id,
            payload_length: (len_high << 16) | len_low,
        };
        header.validate()?;
        Ok(Some(header))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip() {
        let header = FrameHeader::new(MessageType::Output, SessionId::new(42), 12345);

        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        header.encode(&mut buf);

        assert_eq!(buf.len(), HEADER_SIZE);

        let decoded = FrameHeader::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_control_roundtrip() {
        let header = FrameHeader::new(MessageType::Ping, SessionId::CONTROL, 12);

        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        header.encode(&mut buf);

        let decoded = FrameHeader::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.message_type, MessageType::Ping);
        assert!(decoded.session_id.is_control());
    }

    #[test]
    fn test_session_frame_accepts_max_payload() {
        let header = FrameHeader::new(
            MessageType::Input,
            SessionId::new(1),
            MAX_PAYLOAD_SIZE as u32,
        );

        let mut buf = BytesMut::with_capacity(HEADER_SIZE);
        header.encode(&mut buf);

        let decoded = FrameHeader::decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded.payload_length, MAX_PAYLOAD_SIZE as u32);
    }

    #[test]
    fn test_control_payload_ceiling() {
        let header = FrameHeader::new(
            MessageType::Hello,
            SessionId::CONTROL,
            (MAX_CONTROL_PAYLOAD + 1) as u32,
        );
        assert!(matches!(
            header.validate(),
            Err(ProtocolError::PayloadTooLarge {
                max: MAX_CONTROL_PAYLOAD,
                ..
            })
        ));
    }

    #[test]
    fn test_control_message_on_session_rejected() {
        let header = FrameHeader::new(MessageType::Ping, SessionId::new(7), 12);
        assert!(matches!(
            header.validate(),
            Err(ProtocolError::WrongChannel {
                message_type: MessageType::Ping,
                session_id: 7,
            })
        ));
    }

    #[test]
    fn test_session_message_on_control_rejected() {
        let mut buf = BytesMut::new();
        FrameHeader::new(MessageType::Input, SessionId::CONTROL, 10).encode(&mut buf);

        assert!(matches!(
            FrameHeader::decode(&mut buf),
            Err(ProtocolError::WrongChannel {
                message_type: MessageType::Input,
                session_id: 0,
            })
        ));
    }

    #[test]
    fn test_insufficient_bytes() {
        let mut buf = BytesMut::from(&[0u8; 4][..]);
        let result = FrameHeader::decode(&mut buf).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_unknown_message_type() {
        // Type byte leads, so a garbage stream fails on its first byte
        let mut buf = BytesMut::from(&[0xFE, 0, 0, 0, 1, 0, 0, 10][..]);
        let result = FrameHeader::decode(&mut buf);
        assert!(matches!(
            result,
            Err(ProtocolError::UnknownMessageType(0xFE))
        ));
    }
}
