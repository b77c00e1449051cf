use std::collections::VecDeque;
use std::io::{ErrorKind, Read};

use crate::codec::{decode_frame, Frame};
use crate::error::{FrameError, Result};
use crate::reassembler::StreamReassembler;

const READ_CHUNK_SIZE: usize = 1024;

/// Reads complete frames from any `Read` byte stream.
///
/// Handles partial reads and resynchronization internally: callers always
/// get whole frames.
pub struct FrameReader<T> {
    inner: T,
    reassembler: StreamReassembler,
    pending: VecDeque<Frame>,
}

impl<T: Read> FrameReader<T> {
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            reassembler: StreamReassembler::new(),
            pending: VecDeque::new(),
        }
    }

    /// Return the next buffered frame, or perform one read.
    ///
    /// `Ok(None)` means the read timed out (or would block) with no complete
    /// frame available. `Err(FrameError::ConnectionClosed)` on EOF.
    pub fn poll_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Ok(Some(frame));
            }

            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if matches!(err.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                    return Ok(None)
                }
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            for raw in self.reassembler.push(&chunk[..read]) {
                let (frame, _) = decode_frame(&raw)?;
                self.pending.push_back(frame);
            }

            if self.pending.is_empty() {
                return Ok(None);
            }
        }
    }

    /// Read the next complete frame, blocking through read timeouts.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.poll_frame()? {
                return Ok(frame);
            }
        }
    }

    /// Total bytes dropped while hunting for sync.
    pub fn discarded_bytes(&self) -> u64 {
        self.reassembler.discarded_bytes()
    }
}
