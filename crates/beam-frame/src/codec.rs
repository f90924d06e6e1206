use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::Message;

/// Envelope header: magic (2) + kind (1) + name length (2) + body length (4) = 9 bytes.
pub const HEADER_SIZE: usize = 9;

/// Magic bytes: "BM" (0x42 0x4D).
pub const MAGIC: [u8; 2] = [0x42, 0x4D];

/// Default maximum body size: 16 MiB.
pub const DEFAULT_MAX_BODY: usize = 16 * 1024 * 1024;

const KIND_DATA: u8 = 0;
const KIND_END: u8 = 1;
/// Longest stream name the 2-byte length field can carry.
pub const MAX_NAME_LEN: usize = u16::MAX as usize;
const NO_BODY: &[u8] = &[];

/// What travels over the shared channel for a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    /// A chunk of stream data.
    Data(Message),
    /// The writer closed the stream.
    End { name: String },
}

impl Envelope {
    /// A data envelope for `name`.
    pub fn data(name: impl Into<String>, body: impl Into<Bytes>) -> Result<Self> {
        Message::new(name, body).map(Self::Data)
    }

    /// An end-of-stream envelope for `name`.
    pub fn end(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(FrameError::EmptyName);
        }
        Ok(Self::End { name })
    }

    /// The stream this envelope belongs to.
    pub fn name(&self) -> &str {
        match self {
            Self::Data(msg) => msg.name(),
            Self::End { name } => name,
        }
    }

    /// Encode into a fresh buffer.
    pub fn to_bytes(&self) -> Result<Bytes> {
        let mut buf = BytesMut::new();
        encode_envelope(self, &mut buf)?;
        Ok(buf.freeze())
    }

    /// Decode a payload that must hold exactly one envelope.
    pub fn from_payload(payload: Bytes, config: &FrameConfig) -> Result<Self> {
        let len = payload.len();
        let mut src = BytesMut::from(payload.as_ref());
        match decode_envelope(&mut src, config)? {
            Some(envelope) if src.is_empty() => Ok(envelope),
            Some(_) => Err(FrameError::TrailingBytes(src.len())),
            None => Err(FrameError::Truncated {
                len,
                expected: expected_len(payload.as_ref()),
            }),
        }
    }
}

/// Encode an envelope into the wire format.
///
/// Wire format:
/// ```text
/// ┌────────────┬────────┬────────────┬────────────┬──────────┬──────────┐
/// │ Magic (2B) │ Kind   │ Name len   │ Body len   │ Name     │ Body     │
/// │ 0x42 0x4D  │ (1B)   │ (2B LE)    │ (4B LE)    │ (UTF-8)  │          │
/// └────────────┴────────┴────────────┴────────────┴──────────┴──────────┘
/// ```
pub fn encode_envelope(envelope: &Envelope, dst: &mut BytesMut) -> Result<()> {
    let (kind, name, body) = match envelope {
        Envelope::Data(msg) => (KIND_DATA, msg.name(), msg.body().as_ref()),
        Envelope::End { name } => (KIND_END, name.as_str(), NO_BODY),
    };

    if name.is_empty() {
        return Err(FrameError::EmptyName);
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FrameError::NameTooLong {
            len: name.len(),
            max: MAX_NAME_LEN,
        });
    }
    if body.len() > u32::MAX as usize {
        return Err(FrameError::PayloadTooLarge {
            size: body.len(),
            max: u32::MAX as usize,
        });
    }

    dst.reserve(HEADER_SIZE + name.len() + body.len());
    dst.put_slice(&MAGIC);
    dst.put_u8(kind);
    dst.put_u16_le(name.len() as u16);
    dst.put_u32_le(body.len() as u32);
    dst.put_slice(name.as_bytes());
    dst.put_slice(body);
    Ok(())
}

/// Decode an envelope from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete envelope yet.
/// On success, consumes the envelope bytes from the buffer.
pub fn decode_envelope(src: &mut BytesMut, config: &FrameConfig) -> Result<Option<Envelope>> {
    if src.len() < HEADER_SIZE {
        return Ok(None);
    }

    if src[0..2] != MAGIC {
        return Err(FrameError::InvalidMagic);
    }

    let kind = src[2];
    if kind != KIND_DATA && kind != KIND_END {
        return Err(FrameError::UnknownKind(kind));
    }

    let name_len = u16::from_le_bytes([src[3], src[4]]) as usize;
    let body_len = u32::from_le_bytes([src[5], src[6], src[7], src[8]]) as usize;

    if name_len == 0 {
        return Err(FrameError::EmptyName);
    }
    if body_len > config.max_body_size {
        return Err(FrameError::PayloadTooLarge {
            size: body_len,
            max: config.max_body_size,
        });
    }

    let total = HEADER_SIZE + name_len + body_len;
    if src.len() < total {
        return Ok(None);
    }

    src.advance(HEADER_SIZE);
    let name = src.split_to(name_len);
    let name = String::from_utf8(name.to_vec()).map_err(|_| FrameError::InvalidName)?;
    let body = src.split_to(body_len).freeze();

    if kind == KIND_END {
        return Ok(Some(Envelope::End { name }));
    }
    Message::new(name, body).map(|msg| Some(Envelope::Data(msg)))
}

fn expected_len(src: &[u8]) -> usize {
    if src.len() < HEADER_SIZE {
        return HEADER_SIZE;
    }
    let name_len = u16::from_le_bytes([src[3], src[4]]) as usize;
    let body_len = u32::from_le_bytes([src[5], src[6], src[7], src[8]]) as usize;
    HEADER_SIZE + name_len + body_len
}

/// Configuration for the envelope codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 16 MiB.
    pub max_body_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY,
        }
    }
}
