use bytes::{Bytes, BytesMut};
use tracing::{trace, warn};

use crate::codec::{frame_len, MAX_FRAME_SIZE, MIN_FRAME_SIZE, SYNC_BYTES};

/// Bytes kept when no sync header is found: a header split across two
/// chunks may start in the last three bytes.
const SYNC_TAIL: usize = SYNC_BYTES.len() - 1;

/// Recovers frame boundaries from a byte stream.
///
/// Bytes preceding a sync header are discarded and counted. Partial frames
/// stay buffered until the rest arrives, so the same frames come out no
/// matter how the stream is chunked.
#[derive(Debug, Default)]
pub struct StreamReassembler {
    buf: BytesMut,
    discarded: u64,
}

impl StreamReassembler {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(MAX_FRAME_SIZE * 2),
            discarded: 0,
        }
    }

    /// Append `data` and return every complete raw frame now available.
    pub fn push(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            let Some(start) = find_sync(&self.buf) else {
                let drop = self.buf.len().saturating_sub(SYNC_TAIL);
                if drop > 0 {
                    self.discard(drop);
                }
                break;
            };

            if start > 0 {
                warn!(bytes = start, "discarding bytes before sync header");
                self.discard(start);
            }

            if self.buf.len() < MIN_FRAME_SIZE {
                break;
            }

            let total = frame_len(self.buf[5]);
            if self.buf.len() < total {
                trace!(buffered = self.buf.len(), needed = total, "waiting for frame tail");
                break;
            }

            frames.push(self.buf.split_to(total).freeze());
        }
        frames
    }

    /// Bytes currently held awaiting completion.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Total bytes dropped while hunting for sync.
    pub fn discarded_bytes(&self) -> u64 {
        self.discarded
    }

    /// Drop everything buffered.
    pub fn reset(&mut self) {
        let pending = self.buf.len();
        if pending > 0 {
            self.discard(pending);
        }
    }

    fn discard(&mut self, n: usize) {
        let _ = self.buf.split_to(n);
        self.discarded += n as u64;
    }
}

fn find_sync(buf: &[u8]) -> Option<usize> {
    buf.windows(SYNC_BYTES.len())
        .position(|window| window == SYNC_BYTES)
}
