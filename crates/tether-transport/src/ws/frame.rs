// ============================================
// File: crates/tether-transport/src/ws/frame.rs
// ============================================
//! # Frame Codec
//!
//! ## Creation Reason
//! Minimal RFC 6455 frame header encoding/decoding and the explicit read
//! phase used by the framed layer.
//!
//! ## Wire Format
//! ```text
//!   byte 0: FIN | RSV1-3 | opcode(4)
//!   byte 1: MASK | len7
//!   len7 == 126 → 2-byte big-endian length follows
//!   len7 == 127 → 8-byte big-endian length follows
//!   MASK set    → 4-byte masking key follows
//! ```
//!
//! ## Parsing Strategy
//! 1. Check the fixed two bytes are present
//! 2. Validate RSV bits and opcode
//! 3. Compute the full header length, return `None` if incomplete
//! 4. Validate control-frame constraints
//!
//! ## ⚠️ Important Note for Next Developer
//! - `parse` never consumes; the caller advances by the returned length
//! - Extensions are not negotiated, so any RSV bit is a protocol error
//!
//! ## Last Modified
//! v0.1.0 - Initial frame codec

use bytes::{BufMut, BytesMut};

use crate::error::{Result, TransportError};

/// Largest payload a control frame may carry.
pub const MAX_CONTROL_PAYLOAD: usize = 125;

/// Largest possible frame header (2 + 8 length + 4 mask).
pub const MAX_HEADER_LEN: usize = 14;

/// Close status sent when the client closes normally.
pub const CLOSE_NORMAL: u16 = 1000;

// ============================================
// Opcode
// ============================================

/// Frame opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    /// Continuation of a fragmented message.
    Continuation,
    /// UTF-8 text data.
    Text,
    /// Binary data.
    Binary,
    /// Connection close.
    Close,
    /// Ping.
    Ping,
    /// Pong.
    Pong,
}

impl Opcode {
    /// Decodes the low nibble of the first header byte.
    ///
    /// # Errors
    /// Returns `Protocol` for reserved opcodes.
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0x0 => Ok(Self::Continuation),
            0x1 => Ok(Self::Text),
            0x2 => Ok(Self::Binary),
            0x8 => Ok(Self::Close),
            0x9 => Ok(Self::Ping),
            0xA => Ok(Self::Pong),
            other => Err(TransportError::protocol(format!("reserved opcode 0x{other:x}"))),
        }
    }

    /// Returns the wire value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
        }
    }

    /// Returns `true` for close / ping / pong.
    #[must_use]
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }
}

// ============================================
// FrameHeader
// ============================================

/// Decoded frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: Opcode,
    /// Masking key, if the frame is masked.
    pub mask: Option<[u8; 4]>,
    /// Payload length in bytes.
    pub payload_len: u64,
}

impl FrameHeader {
    /// Returns the encoded header length.
    #[must_use]
    pub const fn encoded_len(&self) -> usize {
        let len_bytes = if self.payload_len < 126 {
            0
        } else if self.payload_len <= u16::MAX as u64 {
            2
        } else {
            8
        };
        let mask_bytes = if self.mask.is_some() { 4 } else { 0 };
        2 + len_bytes + mask_bytes
    }

    /// Appends the encoded header to `dst`.
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(self.encoded_len());

        let fin = if self.fin { 0x80 } else { 0x00 };
        dst.put_u8(fin | self.opcode.as_u8());

        let mask_bit = if self.mask.is_some() { 0x80 } else { 0x00 };
        if self.payload_len < 126 {
            // Guarded above: fits in 7 bits
            #[allow(clippy::cast_possible_truncation)]
            dst.put_u8(mask_bit | self.payload_len as u8);
        } else if let Ok(len) = u16::try_from(self.payload_len) {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(self.payload_len);
        }

        if let Some(key) = self.mask {
            dst.put_slice(&key);
        }
    }

    /// Parses a header from the start of `src`.
    ///
    /// # Returns
    /// - `Ok(Some((header, len)))` - complete header of `len` bytes
    /// - `Ok(None)` - need more bytes
    ///
    /// # Errors
    /// Returns `Protocol` for RSV bits, reserved opcodes, oversized or
    /// fragmented control frames.
    pub fn parse(src: &[u8]) -> Result<Option<(Self, usize)>> {
        if src.len() < 2 {
            return Ok(None);
        }

        let b0 = src[0];
        let b1 = src[1];
        if b0 & 0x70 != 0 {
            return Err(TransportError::protocol("reserved bits set"));
        }
        let fin = b0 & 0x80 != 0;
        let opcode = Opcode::from_u8(b0 & 0x0F)?;
        let masked = b1 & 0x80 != 0;

        let (payload_len, mut pos) = match b1 & 0x7F {
            126 => {
                let Some(bytes) = src.get(2..4) else { return Ok(None) };
                (u64::from(u16::from_be_bytes([bytes[0], bytes[1]])), 4)
            }
            127 => {
                let Some(bytes) = src.get(2..10) else { return Ok(None) };
                let mut raw = [0u8; 8];
                raw.copy_from_slice(bytes);
                (u64::from_be_bytes(raw), 10)
            }
            short => (u64::from(short), 2),
        };

        let mask = if masked {
            let Some(bytes) = src.get(pos..pos + 4) else { return Ok(None) };
            pos += 4;
            Some([bytes[0], bytes[1], bytes[2], bytes[3]])
        } else {
            None
        };

        if opcode.is_control() {
            if !fin {
                return Err(TransportError::protocol("fragmented control frame"));
            }
            if payload_len > MAX_CONTROL_PAYLOAD as u64 {
                return Err(TransportError::protocol(format!(
                    "control frame payload of {payload_len} bytes"
                )));
            }
        }

        Ok(Some((
            Self {
                fin,
                opcode,
                mask,
                payload_len,
            },
            pos,
        )))
    }
}

/// XORs `data` with `key`, where `data` starts `offset` bytes into the payload.
pub fn apply_mask(data: &mut [u8], key: [u8; 4], offset: usize) {
    for (i, byte) in data.iter_mut().enumerate() {
        *byte ^= key[(offset + i) % 4];
    }
}

/// Encodes one complete FIN frame, masking the payload with `mask`.
#[must_use]
pub fn encode_frame(opcode: Opcode, payload: &[u8], mask: Option<[u8; 4]>) -> BytesMut {
    let header = FrameHeader {
        fin: true,
        opcode,
        mask,
        payload_len: payload.len() as u64,
    };

    let mut out = BytesMut::with_capacity(header.encoded_len() + payload.len());
    header.encode(&mut out);
    let start = out.len();
    out.put_slice(payload);
    if let Some(key) = mask {
        apply_mask(&mut out[start..], key, 0);
    }
    out
}

// ============================================
// ReadPhase
// ============================================

/// Payload progress of the frame currently being read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadState {
    /// Opcode of the frame.
    pub opcode: Opcode,
    /// Payload bytes not yet consumed.
    pub remaining: u64,
    /// Masking key, if any.
    pub mask: Option<[u8; 4]>,
    /// Payload bytes consumed so far (mask offset).
    pub offset: usize,
    /// Accumulated payload of a control frame.
    pub control: Vec<u8>,
}

impl PayloadState {
    /// Starts payload tracking for `header`.
    #[must_use]
    pub fn new(header: &FrameHeader) -> Self {
        Self {
            opcode: header.opcode,
            remaining: header.payload_len,
            mask: header.mask,
            offset: 0,
            control: Vec::new(),
        }
    }

    /// Records that `n` payload bytes were consumed.
    pub fn advance(&mut self, n: usize) {
        self.remaining = self.remaining.saturating_sub(n as u64);
        self.offset += n;
    }

    /// Finishes the frame, moving the control payload out.
    pub fn complete(&mut self) -> CompletedFrame {
        CompletedFrame {
            opcode: self.opcode,
            control: std::mem::take(&mut self.control),
        }
    }
}

/// A fully read frame awaiting its post-processing step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedFrame {
    /// Opcode of the frame.
    pub opcode: Opcode,
    /// Payload of a control frame; empty for data frames.
    pub control: Vec<u8>,
}

/// Where the framed layer is inside the incoming frame stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ReadPhase {
    /// Next bytes are a frame header.
    #[default]
    AwaitingHeader,
    /// Inside a frame payload.
    ReadingPayload(PayloadState),
    /// Payload consumed; control handling still pending.
    FrameComplete(CompletedFrame),
}

// ============================================
// Tests
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_short_length() {
        let (header, len) = FrameHeader::parse(&[0x81, 0x05, b'h']).unwrap().unwrap();
        assert_eq!(len, 2);
        assert!(header.fin);
        assert_eq!(header.opcode, Opcode::Text);
        assert_eq!(header.payload_len, 5);
        assert!(header.mask.is_none());
    }

    #[test]
    fn test_header_extended_lengths() {
        let (header, len) = FrameHeader::parse(&[0x82, 126, 0x01, 0x00]).unwrap().unwrap();
        assert_eq!((header.payload_len, len), (256, 4));

        let mut raw = vec![0x82, 127];
        raw.extend_from_slice(&70_000u64.to_be_bytes());
        let (header, len) = FrameHeader::parse(&raw).unwrap().unwrap();
        assert_eq!((header.payload_len, len), (70_000, 10));
    }

    #[test]
    fn test_header_incomplete() {
        assert!(FrameHeader::parse(&[]).unwrap().is_none());
        assert!(FrameHeader::parse(&[0x82]).unwrap().is_none());
        assert!(FrameHeader::parse(&[0x82, 126, 0x01]).unwrap().is_none());
        assert!(FrameHeader::parse(&[0x82, 0x85, 1, 2]).unwrap().is_none());
    }

    #[test]
    fn test_header_protocol_violations() {
        assert!(FrameHeader::parse(&[0xC1, 0x00]).is_err());
        assert!(FrameHeader::parse(&[0x83, 0x00]).is_err());
        assert!(FrameHeader::parse(&[0x09, 0x00]).is_err());
        assert!(FrameHeader::parse(&[0x89, 126, 0x00, 0x80]).is_err());
    }

    #[test]
    fn test_masked_frame_encoding() {
        let key = [0x11, 0x22, 0x33, 0x44];
        let frame = encode_frame(Opcode::Binary, b"abcdef", Some(key));

        assert_eq!(frame[0], 0x82);
        assert_eq!(frame[1], 0x80 | 6);
        assert_eq!(&frame[2..6], &key);

        let mut payload = frame[6..].to_vec();
        apply_mask(&mut payload, key, 0);
        assert_eq!(payload, b"abcdef");

        let (header, len) = FrameHeader::parse(&frame).unwrap().unwrap();
        assert_eq!(len, header.encoded_len());
        assert_eq!(header.mask, Some(key));
    }

    #[test]
    fn test_mask_offset_continuity() {
        let key = [1, 2, 3, 4];
        let mut whole = b"0123456789".to_vec();
        apply_mask(&mut whole, key, 0);

        let mut split = b"0123456789".to_vec();
        let (a, b) = split.split_at_mut(3);
        apply_mask(a, key, 0);
        apply_mask(b, key, 3);
        assert_eq!(whole, split);
    }

    #[test]
    fn test_payload_state_progress() {
        let header = FrameHeader {
            fin: true,
            opcode: Opcode::Ping,
            mask: None,
            payload_len: 4,
        };
        let mut state = PayloadState::new(&header);
        state.control.extend_from_slice(b"ping");
        state.advance(4);
        assert_eq!(state.remaining, 0);

        let done = state.complete();
        assert_eq!(done.opcode, Opcode::Ping);
        assert_eq!(done.control, b"ping");
        assert!(state.control.is_empty());
    }
}
