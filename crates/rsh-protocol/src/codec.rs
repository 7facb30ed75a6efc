//! Tokio codec for framed protocol messages

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use crate::error::ProtocolError;
use crate::frame::FrameHeader;
use crate::message::Message;
use crate::session::SessionId;

/// A complete frame with header and payload
#[derive(Debug, Clone)]
pub struct Frame {
    /// Session ID this frame belongs to
    pub session_id: SessionId,
    /// The message payload
    pub message: Message,
}

impl Frame {
    /// Create a new frame
    pub fn new(session_id: SessionId, message: Message) -> Self {
        Self {
            session_id,
            message,
        }
    }

    /// Create a control frame (session id 0)
    pub fn control(message: Message) -> Self {
        Self::new(SessionId::CONTROL, message)
    }
}

/// Codec for encoding/decoding protocol frames
#[derive(Debug, Default)]
pub struct FrameCodec {
    /// Current header being decoded (if any)
    pending_header: Option<FrameHeader>,
}

impl FrameCodec {
    /// Create a new codec
    pub fn new() -> Self {
        Self {
            pending_header: None,
        }
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // Try to decode header if we don't have one; decoding validates the
        // channel and payload-size rules before any payload is buffered
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => match FrameHeader::decode(src)? {
                Some(h) => h,
                None => return Ok(None), // Need more data
            },
        };

        // Check if we have enough data for the payload
        let payload_len = header.payload_length as usize;
        if src.len() < payload_len {
            // Save header and wait for more data
            self.pending_header = Some(header);
            return Ok(None);
        }

        // Extract payload
        let payload_bytes = src.split_to(payload_len).freeze();

        // Deserialize message
        let message: Message = bincode::deserialize(&payload_bytes)?;

        Ok(Some(Frame {
            session_id: header.session_id,
            message,
        }))
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = ProtocolError;

    fn encode(&mut self, frame: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        // Serialize the message
        let payload = bincode::serialize(&frame.message)?;

        // Validate before writing so a misrouted or oversized frame never
        // reaches the wire
        let header = FrameHeader::new(
            frame.message.message_type(),
            frame.session_id,
            payload.len() as u32,
        );
        header.validate()?;

        header.encode(dst);
        dst.extend_from_slice(&payload);

        Ok(())
    }
}
