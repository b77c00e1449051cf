use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use tracing::{debug, info};

use crate::mode::{Mode, ModeSnapshot};
use crate::record::DecodedRecord;

struct QueueState {
    records: VecDeque<DecodedRecord>,
    mode: Mode,
    since: SystemTime,
    dropped: u64,
}

/// Bounded FIFO of decoded records shared between receivers, the monitor
/// and API consumers.
///
/// The mode lives under the same lock as the records, so a mode switch is
/// atomic with respect to every enqueue: no record accepted under the old
/// mode can appear after the switch.
pub struct MessageQueue {
    state: Mutex<QueueState>,
    capacity: usize,
}

impl MessageQueue {
    /// Create a queue. A zero capacity is raised to one.
    pub fn new(capacity: usize, mode: Mode) -> Self {
        Self {
            state: Mutex::new(QueueState {
                records: VecDeque::with_capacity(capacity.clamp(1, 4096)),
                mode,
                since: SystemTime::now(),
                dropped: 0,
            }),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue `record` if the current mode retains its type.
    ///
    /// Returns whether the record was retained.
    pub fn offer(&self, record: DecodedRecord) -> bool {
        let mut state = self.lock();
        if !state.mode.retains(record.frame_type) {
            return false;
        }
        self.push_locked(&mut state, record);
        true
    }

    /// Enqueue `record` regardless of mode.
    pub fn push(&self, record: DecodedRecord) {
        let mut state = self.lock();
        self.push_locked(&mut state, record);
    }

    fn push_locked(&self, state: &mut QueueState, record: DecodedRecord) {
        if state.records.len() >= self.capacity {
            state.records.pop_front();
            state.dropped += 1;
            debug!(capacity = self.capacity, "queue full, dropped oldest record");
        }
        state.records.push_back(record);
    }

    /// Remove and return every record, oldest first.
    pub fn drain(&self) -> Vec<DecodedRecord> {
        self.lock().records.drain(..).collect()
    }

    /// Remove and return every record except register-read responses, which
    /// stay queued for the monitor. This is the drain for record consumers
    /// running alongside a monitor.
    pub fn drain_published(&self) -> Vec<DecodedRecord> {
        self.take_where(|record| !record.is_monitor_reply())
    }

    /// Copy of every record without removing them.
    pub fn peek(&self) -> Vec<DecodedRecord> {
        self.lock().records.iter().cloned().collect()
    }

    pub fn clear(&self) {
        self.lock().records.clear();
    }

    /// Remove and return the records matching `pred`, keeping the others in
    /// order.
    pub fn take_where<F>(&self, mut pred: F) -> Vec<DecodedRecord>
    where
        F: FnMut(&DecodedRecord) -> bool,
    {
        let mut state = self.lock();
        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(state.records.len());
        for record in state.records.drain(..) {
            if pred(&record) {
                taken.push(record);
            } else {
                kept.push_back(record);
            }
        }
        state.records = kept;
        taken
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Records dropped to overflow since creation.
    pub fn dropped(&self) -> u64 {
        self.lock().dropped
    }

    pub fn mode(&self) -> ModeSnapshot {
        let state = self.lock();
        ModeSnapshot {
            mode: state.mode,
            since: state.since,
        }
    }

    /// Clear the queue and enter `mode` in one critical section.
    ///
    /// Returns false (and leaves everything untouched) if already in `mode`.
    pub fn switch_mode(&self, mode: Mode) -> bool {
        let mut state = self.lock();
        if state.mode == mode {
            return false;
        }
        let from = state.mode;
        let discarded = state.records.len();
        state.records.clear();
        state.mode = mode;
        state.since = SystemTime::now();
        info!(%from, to = %mode, discarded, "mode switched");
        true
    }
}

impl std::fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("MessageQueue")
            .field("len", &state.records.len())
            .field("capacity", &self.capacity)
            .field("mode", &state.mode)
            .field("dropped", &state.dropped)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use riglink_frame::frame_type::{REGISTER, SIGNAL_SEND, TELEMETRY};
    use riglink_frame::{ContentLayout, RegisterBatch, RegisterOp};

    use super::*;
    use crate::record::SourceAddr;

    fn record(frame_type: u8, tag: u8) -> DecodedRecord {
        DecodedRecord::decode(
            frame_type,
            Bytes::from(vec![tag; 9]),
            true,
            SourceAddr::Local,
        )
    }

    #[test]
    fn never_exceeds_capacity_and_drops_oldest() {
        let queue = MessageQueue::new(3, Mode::Ground);
        for tag in 0..4 {
            assert!(queue.offer(record(TELEMETRY, tag)));
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.dropped(), 1);

        let tags: Vec<u8> = queue.drain().iter().map(|r| r.raw[0]).collect();
        assert_eq!(tags, vec![1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn offer_filters_by_mode() {
        let queue = MessageQueue::new(8, Mode::Ground);
        assert!(!queue.offer(record(REGISTER, 0)));
        assert!(queue.offer(record(TELEMETRY, 0)));

        queue.switch_mode(Mode::Virtual);
        assert!(queue.offer(record(REGISTER, 0)));
        assert!(queue.offer(record(SIGNAL_SEND, 0)));
        assert!(!queue.offer(record(TELEMETRY, 0)));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn push_ignores_mode() {
        let queue = MessageQueue::new(8, Mode::Ground);
        queue.push(record(REGISTER, 0));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn switch_mode_clears_once() {
        let queue = MessageQueue::new(8, Mode::Ground);
        queue.offer(record(TELEMETRY, 0));
        let before = queue.mode().since;

        assert!(!queue.switch_mode(Mode::Ground));
        assert_eq!(queue.len(), 1);

        assert!(queue.switch_mode(Mode::Virtual));
        assert!(queue.is_empty());
        let snap = queue.mode();
        assert_eq!(snap.mode, Mode::Virtual);
        assert!(snap.since >= before);
    }

    #[test]
    fn take_where_preserves_order_of_the_rest() {
        let queue = MessageQueue::new(8, Mode::Virtual);
        queue.offer(record(SIGNAL_SEND, 1));
        queue.offer(record(REGISTER, 2));
        queue.offer(record(SIGNAL_SEND, 3));
        queue.offer(record(REGISTER, 4));

        let taken = queue.take_where(|r| r.frame_type == REGISTER);
        assert_eq!(taken.iter().map(|r| r.raw[0]).collect::<Vec<_>>(), vec![2, 4]);
        assert_eq!(queue.peek().iter().map(|r| r.raw[0]).collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn drain_published_leaves_register_reads_for_the_monitor() {
        let queue = MessageQueue::new(8, Mode::Virtual);
        let read = RegisterBatch::read(&[0x25]).to_content();
        let write = RegisterBatch::write(&[(0x10, 1)]).to_content();
        queue.offer(record(SIGNAL_SEND, 1));
        queue.offer(DecodedRecord::decode(REGISTER, read, true, SourceAddr::Local));
        queue.offer(DecodedRecord::decode(REGISTER, write, true, SourceAddr::Local));

        let published = queue.drain_published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].frame_type, SIGNAL_SEND);
        assert!(published[1].register_batch(RegisterOp::Write).is_some());

        let left = queue.peek();
        assert_eq!(left.len(), 1);
        assert!(left[0].is_monitor_reply());
    }

    #[test]
    fn concurrent_producers_stay_bounded() {
        let queue = Arc::new(MessageQueue::new(64, Mode::Ground));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for tag in 0..100 {
                        queue.offer(record(TELEMETRY, tag));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 64);
        assert_eq!(queue.dropped(), 400 - 64);
    }
}
