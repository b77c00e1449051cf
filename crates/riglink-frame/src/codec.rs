use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Sync header marking the start of every frame.
pub const SYNC_HEADER: u32 = 0x1ACF_FC1D;

/// Sync header as it appears on the wire.
pub const SYNC_BYTES: [u8; 4] = SYNC_HEADER.to_be_bytes();

/// Sync (4) + type (1) + length (1).
pub const HEADER_SIZE: usize = 6;

/// Trailing CRC-16.
pub const CRC_SIZE: usize = 2;

/// Smallest complete frame: header plus CRC, empty content.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + CRC_SIZE;

/// Content is bounded by the one-byte length field.
pub const MAX_CONTENT_SIZE: usize = u8::MAX as usize;

/// Largest complete frame.
pub const MAX_FRAME_SIZE: usize = MIN_FRAME_SIZE + MAX_CONTENT_SIZE;

const CRC16_POLY: u16 = 0x1021;
const CRC16_INIT: u16 = 0xFFFF;
const CRC16_TABLE: [u16; 256] = build_crc16_table();

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ CRC16_POLY
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xFFFF, no reflection, no final xor.
pub fn crc16_ccitt_false(data: &[u8]) -> u16 {
    data.iter().fold(CRC16_INIT, |crc, &byte| {
        (crc << 8) ^ CRC16_TABLE[usize::from((crc >> 8) as u8 ^ byte)]
    })
}

/// Total wire length of a frame whose length byte is `content_len`.
pub fn frame_len(content_len: u8) -> usize {
    MIN_FRAME_SIZE + usize::from(content_len)
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Frame type byte.
    pub frame_type: u8,
    /// Opaque content.
    pub content: Bytes,
    /// CRC carried on the wire.
    pub crc: u16,
    /// Whether `crc` matches the computed checksum.
    pub crc_valid: bool,
}

impl Frame {
    /// Create a frame with a freshly computed CRC.
    ///
    /// Fails with `ContentTooLarge` when content exceeds 255 bytes.
    pub fn new(frame_type: u8, content: impl Into<Bytes>) -> Result<Self> {
        let content = content.into();
        check_content_len(content.len())?;
        let crc = checksum(frame_type, &content);
        Ok(Self {
            frame_type,
            content,
            crc,
            crc_valid: true,
        })
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        MIN_FRAME_SIZE + self.content.len()
    }

    /// Re-encode this frame with a freshly computed CRC.
    pub fn to_bytes(&self) -> Bytes {
        let mut dst = BytesMut::with_capacity(self.wire_size());
        put_frame(self.frame_type, &self.content, &mut dst);
        dst.freeze()
    }
}

/// Encode a frame into the wire format.
///
/// Wire format:
/// ```text
/// ┌──────────────┬────────┬────────┬──────────────┬────────────┐
/// │ Sync (4B BE) │ Type   │ Length │ Content      │ CRC16      │
/// │ 1A CF FC 1D  │ (1B)   │ (1B)   │ (Length B)   │ (2B BE)    │
/// └──────────────┴────────┴────────┴──────────────┴────────────┘
///                 └────────── CRC-16/CCITT-FALSE ─┘
/// ```
pub fn encode_frame(frame_type: u8, content: &[u8], dst: &mut BytesMut) -> Result<()> {
    check_content_len(content.len())?;
    put_frame(frame_type, content, dst);
    Ok(())
}

/// Encode a frame into a fresh buffer.
pub fn build_frame(frame_type: u8, content: &[u8]) -> Result<Bytes> {
    let mut dst = BytesMut::with_capacity(MIN_FRAME_SIZE + content.len());
    encode_frame(frame_type, content, &mut dst)?;
    Ok(dst.freeze())
}

/// Decode one frame from the start of `buf`.
///
/// Returns the frame and the number of bytes it occupied. A CRC mismatch is
/// not an error: the frame comes back with `crc_valid == false` and the
/// caller decides whether to trust it.
pub fn decode_frame(buf: &[u8]) -> Result<(Frame, usize)> {
    if buf.len() < MIN_FRAME_SIZE {
        return Err(FrameError::TooShort { len: buf.len() });
    }

    if buf[..4] != SYNC_BYTES {
        return Err(FrameError::BadSync {
            found: [buf[0], buf[1], buf[2], buf[3]],
        });
    }

    let frame_type = buf[4];
    let total = frame_len(buf[5]);
    if buf.len() < total {
        return Err(FrameError::Incomplete {
            needed: total,
            available: buf.len(),
        });
    }

    let content_end = total - CRC_SIZE;
    let crc = u16::from_be_bytes([buf[content_end], buf[content_end + 1]]);
    let computed = crc16_ccitt_false(&buf[4..content_end]);

    let frame = Frame {
        frame_type,
        content: Bytes::copy_from_slice(&buf[HEADER_SIZE..content_end]),
        crc,
        crc_valid: crc == computed,
    };
    Ok((frame, total))
}

fn check_content_len(len: usize) -> Result<()> {
    if len > MAX_CONTENT_SIZE {
        return Err(FrameError::ContentTooLarge {
            size: len,
            max: MAX_CONTENT_SIZE,
        });
    }
    Ok(())
}

fn checksum(frame_type: u8, content: &[u8]) -> u16 {
    let mut data = Vec::with_capacity(2 + content.len());
    data.push(frame_type);
    data.push(content.len() as u8);
    data.extend_from_slice(content);
    crc16_ccitt_false(&data)
}

// Caller guarantees content.len() <= MAX_CONTENT_SIZE.
fn put_frame(frame_type: u8, content: &[u8], dst: &mut BytesMut) {
    dst.reserve(MIN_FRAME_SIZE + content.len());
    dst.put_slice(&SYNC_BYTES);
    let crc_start = dst.len();
    dst.put_u8(frame_type);
    dst.put_u8(content.len() as u8);
    dst.put_slice(content);
    let crc = crc16_ccitt_false(&dst[crc_start..]);
    dst.put_u16(crc);
}
