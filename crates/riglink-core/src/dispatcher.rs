use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use riglink_frame::frame_type::{self, frame_type_name};
use riglink_frame::Frame;
use serde::Serialize;
use tracing::{debug, warn};

use crate::correlator::Correlator;
use crate::queue::MessageQueue;
use crate::record::{DecodedRecord, SourceAddr};
use crate::sender::PeerSender;

#[derive(Debug, Default)]
struct Counters {
    frames: AtomicU64,
    crc_failures: AtomicU64,
    malformed: AtomicU64,
    queued: AtomicU64,
    forwarded: AtomicU64,
    forward_failures: AtomicU64,
    correlated: AtomicU64,
}

/// Snapshot of dispatcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub frames: u64,
    pub crc_failures: u64,
    pub malformed: u64,
    pub queued: u64,
    pub forwarded: u64,
    pub forward_failures: u64,
    pub correlated: u64,
}

/// Routes decoded frames to their side effects.
///
/// Per frame: decode the body, forward well-formed pass-through types to
/// the peer, offer the record to the shared queue, and notify the correlator
/// for response types. Never fails: a bad frame becomes a flagged record.
pub struct Dispatcher {
    queue: Arc<MessageQueue>,
    correlator: Arc<Correlator>,
    forward: Option<PeerSender>,
    counters: Counters,
}

impl Dispatcher {
    pub fn new(queue: Arc<MessageQueue>, correlator: Arc<Correlator>) -> Self {
        Self {
            queue,
            correlator,
            forward: None,
            counters: Counters::default(),
        }
    }

    /// Forward pass-through frames to `peer`.
    pub fn with_forward(mut self, peer: PeerSender) -> Self {
        self.forward = Some(peer);
        self
    }

    pub fn dispatch(&self, frame: Frame, source: SourceAddr) -> DecodedRecord {
        self.counters.frames.fetch_add(1, Ordering::Relaxed);

        if !frame.crc_valid {
            self.counters.crc_failures.fetch_add(1, Ordering::Relaxed);
            warn!(
                frame_type = frame.frame_type,
                crc = frame.crc,
                %source,
                "crc mismatch, delivering flagged frame"
            );
        }

        let record = DecodedRecord::decode(frame.frame_type, frame.content, frame.crc_valid, source);

        if record.body.is_malformed() {
            self.counters.malformed.fetch_add(1, Ordering::Relaxed);
            warn!(
                frame_type = record.frame_type,
                len = record.raw.len(),
                "malformed {} content",
                frame_type_name(record.frame_type)
            );
        }

        if frame_type::is_pass_through(record.frame_type) {
            if record.body.is_malformed() {
                warn!(
                    frame_type = record.frame_type,
                    len = record.raw.len(),
                    "not forwarding malformed pass-through frame"
                );
            } else {
                self.forward(&record);
            }
        }

        if self.queue.offer(record.clone()) {
            self.counters.queued.fetch_add(1, Ordering::Relaxed);
        }

        if frame_type::is_correlatable(record.frame_type)
            && self.correlator.notify_arrival(&record).is_some()
        {
            self.counters.correlated.fetch_add(1, Ordering::Relaxed);
        }

        debug!(
            frame_type = record.frame_type,
            name = record.type_name(),
            len = record.raw.len(),
            "frame dispatched"
        );
        record
    }

    fn forward(&self, record: &DecodedRecord) {
        let Some(peer) = &self.forward else {
            return;
        };
        match peer.send_frame(record.frame_type, &record.raw) {
            Ok(()) => {
                self.counters.forwarded.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.counters.forward_failures.fetch_add(1, Ordering::Relaxed);
                warn!(frame_type = record.frame_type, error = %err, "pass-through forward failed");
            }
        }
    }

    pub fn stats(&self) -> DispatchStats {
        let c = &self.counters;
        DispatchStats {
            frames: c.frames.load(Ordering::Relaxed),
            crc_failures: c.crc_failures.load(Ordering::Relaxed),
            malformed: c.malformed.load(Ordering::Relaxed),
            queued: c.queued.load(Ordering::Relaxed),
            forwarded: c.forwarded.load(Ordering::Relaxed),
            forward_failures: c.forward_failures.load(Ordering::Relaxed),
            correlated: c.correlated.load(Ordering::Relaxed),
        }
    }

    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    pub fn correlator(&self) -> &Arc<Correlator> {
        &self.correlator
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("forward", &self.forward)
            .field("stats", &self.stats())
            .finish()
    }
}
