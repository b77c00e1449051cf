//! Periodic register polling with edge-triggered notices.
//!
//! While the rig is in virtual mode the monitor reads a fixed set of status
//! registers once per poll interval. Two conditions are derived from 4-bit
//! subfields of those registers; when one rises, a notice frame carrying
//! the wall-clock time and the matching link-timestamp register is sent to
//! the peer. A condition must fall back before it can fire again.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{SystemTime, UNIX_EPOCH};

use riglink_frame::content::{
    ContentLayout, LinkNotice, RegisterBatch, RegisterOp, MAX_REGISTER_ENTRIES,
};
use riglink_frame::frame_type::{LINK_STATUS, REGISTER, TIMESTAMP_ECHO};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::error::{CoreError, Result};
use crate::mode::Mode;
use crate::queue::MessageQueue;
use crate::record::DecodedRecord;
use crate::sender::PeerSender;

/// A condition derived from one register subfield.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Condition {
    pub name: &'static str,
    /// Register holding the 4-bit subfield.
    pub source_register: u32,
    /// Bit offset of the subfield.
    pub shift: u32,
    /// Asserted when the subfield is strictly greater than this.
    pub threshold: u8,
    /// Register whose raw value goes into the notice.
    pub timestamp_register: u32,
    /// Frame type of the notice.
    pub notice_type: u8,
}

impl Condition {
    pub fn subfield(&self, value: u32) -> u8 {
        ((value >> self.shift) & 0xF) as u8
    }

    pub fn is_asserted(&self, value: u32) -> bool {
        self.subfield(value) > self.threshold
    }
}

/// Transmit complete: register 0x26 bits [11:8] non-zero.
pub const TX_COMPLETE: Condition = Condition {
    name: "tx-complete",
    source_register: 0x26,
    shift: 8,
    threshold: 0,
    timestamp_register: 0x25,
    notice_type: TIMESTAMP_ECHO,
};

/// Receive status: register 0x46 bits [19:16] above one.
pub const RX_STATUS: Condition = Condition {
    name: "rx-status",
    source_register: 0x46,
    shift: 16,
    threshold: 1,
    timestamp_register: 0x45,
    notice_type: LINK_STATUS,
};

pub const CONDITIONS: [Condition; 2] = [TX_COMPLETE, RX_STATUS];

/// Last known value of each monitored register.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterCache {
    values: BTreeMap<u32, u32>,
}

impl RegisterCache {
    /// Copy the pairs of `batch` whose address is in `monitored`.
    pub fn ingest(&mut self, batch: &RegisterBatch, monitored: &[u32]) -> usize {
        let mut updated = 0;
        for entry in &batch.entries {
            if monitored.contains(&entry.address) {
                self.values.insert(entry.address, entry.value);
                updated += 1;
            }
        }
        updated
    }

    pub fn get(&self, address: u32) -> Option<u32> {
        self.values.get(&address).copied()
    }

    pub fn snapshot(&self) -> BTreeMap<u32, u32> {
        self.values.clone()
    }
}

/// Rising-edge detector with a remembered level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EdgeDetector {
    asserted: bool,
}

impl EdgeDetector {
    /// Feed the current level; true only on a false-to-true transition.
    pub fn observe(&mut self, asserted: bool) -> bool {
        let rising = asserted && !self.asserted;
        self.asserted = asserted;
        rising
    }

    pub fn is_asserted(&self) -> bool {
        self.asserted
    }
}

/// A notice to emit after a rising edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Emission {
    pub condition: Condition,
    pub link_timestamp: u32,
}

/// Cache plus edge state; owned by the monitor thread.
#[derive(Debug, Default)]
pub struct MonitorCore {
    cache: RegisterCache,
    detectors: [EdgeDetector; 2],
}

impl MonitorCore {
    pub fn cache(&self) -> &RegisterCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut RegisterCache {
        &mut self.cache
    }

    /// Evaluate every condition against the cache.
    ///
    /// Conditions whose source register has never been read are treated as
    /// not asserted.
    pub fn evaluate(&mut self) -> Vec<Emission> {
        let mut emissions = Vec::new();
        for (condition, detector) in CONDITIONS.iter().zip(self.detectors.iter_mut()) {
            let asserted = self
                .cache
                .get(condition.source_register)
                .is_some_and(|value| condition.is_asserted(value));
            if detector.observe(asserted) {
                emissions.push(Emission {
                    condition: *condition,
                    link_timestamp: self.cache.get(condition.timestamp_register).unwrap_or(0),
                });
            }
        }
        emissions
    }

    pub fn asserted(&self) -> [bool; 2] {
        [self.detectors[0].is_asserted(), self.detectors[1].is_asserted()]
    }
}

/// Point-in-time view of the monitor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStatus {
    pub running: bool,
    pub poll_interval_ms: u64,
    pub registers: BTreeMap<u32, u32>,
    pub asserted: BTreeMap<&'static str, bool>,
    pub iterations: u64,
    pub notices_sent: u64,
    pub send_failures: u64,
}

struct Shared {
    running: AtomicBool,
    status: Mutex<MonitorStatus>,
}

impl Shared {
    fn status(&self) -> MutexGuard<'_, MonitorStatus> {
        self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct Worker {
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Background register poller.
pub struct RegisterMonitor {
    config: MonitorConfig,
    queue: Arc<MessageQueue>,
    peer: PeerSender,
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl RegisterMonitor {
    /// Registers beyond one read batch are dropped here, once, rather than
    /// on every poll.
    pub fn new(mut config: MonitorConfig, queue: Arc<MessageQueue>, peer: PeerSender) -> Self {
        if config.registers.len() > MAX_REGISTER_ENTRIES {
            warn!(
                configured = config.registers.len(),
                polled = MAX_REGISTER_ENTRIES,
                "monitor register list exceeds one read batch, polling the first entries only"
            );
            config.registers.truncate(MAX_REGISTER_ENTRIES);
        }
        let status = MonitorStatus {
            poll_interval_ms: config.poll_interval.as_millis() as u64,
            ..MonitorStatus::default()
        };
        Self {
            config,
            queue,
            peer,
            shared: Arc::new(Shared {
                running: AtomicBool::new(false),
                status: Mutex::new(status),
            }),
            worker: Mutex::new(None),
        }
    }

    fn worker(&self) -> MutexGuard<'_, Option<Worker>> {
        self.worker.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start polling. No-op if already running.
    pub fn start(&self) -> Result<()> {
        let mut worker = self.worker();
        if worker.is_some() {
            return Ok(());
        }

        let (stop_tx, stop_rx) = mpsc::channel();
        let ctx = LoopContext {
            config: self.config.clone(),
            queue: Arc::clone(&self.queue),
            peer: self.peer.clone(),
            shared: Arc::clone(&self.shared),
        };

        self.shared.running.store(true, Ordering::SeqCst);
        self.shared.status().running = true;
        let handle = thread::Builder::new()
            .name("riglink-monitor".to_string())
            .spawn(move || ctx.run(stop_rx))
            .map_err(|source| {
                self.shared.running.store(false, Ordering::SeqCst);
                self.shared.status().running = false;
                CoreError::Spawn {
                    name: "monitor",
                    source,
                }
            })?;

        info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "register monitor started"
        );
        *worker = Some(Worker { stop_tx, handle });
        Ok(())
    }

    /// Stop polling and join the thread. The in-flight iteration finishes.
    pub fn stop(&self) {
        let Some(worker) = self.worker().take() else {
            return;
        };
        let _ = worker.stop_tx.send(());
        if worker.handle.join().is_err() {
            warn!("register monitor thread panicked");
        }
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.status().running = false;
        info!("register monitor stopped");
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> MonitorStatus {
        self.shared.status().clone()
    }
}

impl Drop for RegisterMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

struct LoopContext {
    config: MonitorConfig,
    queue: Arc<MessageQueue>,
    peer: PeerSender,
    shared: Arc<Shared>,
}

impl LoopContext {
    fn run(self, stop_rx: mpsc::Receiver<()>) {
        let mut core = MonitorCore::default();
        loop {
            if self.queue.mode().mode == Mode::Virtual {
                self.iterate(&mut core);
            }
            match stop_rx.recv_timeout(self.config.poll_interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        self.shared.running.store(false, Ordering::SeqCst);
        debug!("register monitor loop exited");
    }

    fn iterate(&self, core: &mut MonitorCore) {
        let read = RegisterBatch::read(&self.config.registers);
        let mut failures = 0u64;
        if let Err(err) = self.peer.send_frame(REGISTER, &read.to_content()) {
            warn!(error = %err, "monitor register read failed");
            failures += 1;
        }

        thread::sleep(self.config.settle);

        let responses = self.queue.take_where(DecodedRecord::is_monitor_reply);
        for record in &responses {
            if let Some(batch) = record.register_batch(RegisterOp::Read) {
                core.cache_mut().ingest(batch, &self.config.registers);
            }
        }

        let mut sent = 0u64;
        for emission in core.evaluate() {
            let notice = LinkNotice::new(unix_seconds(), emission.link_timestamp);
            match self
                .peer
                .send_frame(emission.condition.notice_type, &notice.to_content())
            {
                Ok(()) => {
                    sent += 1;
                    info!(
                        condition = emission.condition.name,
                        link_timestamp = emission.link_timestamp,
                        "condition rose, notice sent"
                    );
                }
                Err(err) => {
                    failures += 1;
                    warn!(condition = emission.condition.name, error = %err, "notice send failed");
                }
            }
        }

        let asserted = core.asserted();
        let mut status = self.shared.status();
        status.iterations += 1;
        status.notices_sent += sent;
        status.send_failures += failures;
        status.registers = core.cache().snapshot();
        for (condition, level) in CONDITIONS.iter().zip(asserted) {
            status.asserted.insert(condition.name, level);
        }
    }
}

fn unix_seconds() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as u32)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::record::SourceAddr;
    use crate::sender::testing::RecordingSink;

    fn batch(pairs: &[(u32, u32)]) -> RegisterBatch {
        let mut b = RegisterBatch::write(pairs);
        b.op = RegisterOp::Read;
        b
    }

    #[test]
    fn subfield_extraction() {
        assert_eq!(TX_COMPLETE.subfield(0x0000_0A00), 0xA);
        assert!(!TX_COMPLETE.is_asserted(0x0000_00FF));
        assert!(TX_COMPLETE.is_asserted(0x0000_0100));

        assert_eq!(RX_STATUS.subfield(0x0003_0000), 3);
        assert!(!RX_STATUS.is_asserted(0x0001_0000));
        assert!(RX_STATUS.is_asserted(0x0002_0000));
    }

    #[test]
    fn rising_edges_only() {
        let mut core = MonitorCore::default();
        let mut emitted = 0;
        for subfield in [0u32, 0, 2, 2, 2, 0, 2] {
            core.cache_mut()
                .ingest(&batch(&[(0x26, subfield << 8), (0x25, 77)]), &[0x25, 0x26]);
            let emissions = core.evaluate();
            for e in &emissions {
                assert_eq!(e.condition, TX_COMPLETE);
                assert_eq!(e.link_timestamp, 77);
            }
            emitted += emissions.len();
        }
        assert_eq!(emitted, 2);
    }

    #[test]
    fn threshold_one_for_rx_status() {
        let mut core = MonitorCore::default();
        let mut emitted = Vec::new();
        for subfield in [1u32, 1, 2, 1, 5] {
            core.cache_mut()
                .ingest(&batch(&[(0x46, subfield << 16), (0x45, 9)]), &[0x45, 0x46]);
            emitted.extend(core.evaluate());
        }
        assert_eq!(emitted.len(), 2);
        assert!(emitted.iter().all(|e| e.condition == RX_STATUS));
    }

    #[test]
    fn cache_ignores_unmonitored_addresses() {
        let mut cache = RegisterCache::default();
        let n = cache.ingest(&batch(&[(0x25, 1), (0x99, 2)]), &[0x25, 0x26, 0x45, 0x46]);
        assert_eq!(n, 1);
        assert_eq!(cache.get(0x25), Some(1));
        assert_eq!(cache.get(0x99), None);
    }

    #[test]
    fn missing_register_is_not_asserted() {
        let mut core = MonitorCore::default();
        assert!(core.evaluate().is_empty());
        assert_eq!(core.asserted(), [false, false]);
    }

    fn quick_config() -> MonitorConfig {
        MonitorConfig {
            poll_interval: Duration::from_millis(20),
            settle: Duration::from_millis(5),
            ..MonitorConfig::default()
        }
    }

    #[test]
    fn loop_polls_consumes_responses_and_emits_notice() {
        let queue = Arc::new(MessageQueue::new(16, Mode::Virtual));
        let sink = Arc::new(RecordingSink::default());
        let monitor = RegisterMonitor::new(
            quick_config(),
            Arc::clone(&queue),
            PeerSender::new(sink.clone()),
        );

        // Pre-load the response the first iteration will consume.
        let response = batch(&[(0x25, 0xABCD), (0x26, 0x100), (0x45, 0), (0x46, 0)]);
        queue.offer(DecodedRecord::decode(
            REGISTER,
            response.to_content(),
            true,
            SourceAddr::Local,
        ));

        monitor.start().unwrap();
        assert!(monitor.is_running());
        std::thread::sleep(Duration::from_millis(100));
        monitor.stop();
        assert!(!monitor.is_running());

        let frames = sink.frames();
        assert!(frames.iter().any(|f| f.frame_type == REGISTER));
        let notices: Vec<_> = frames
            .iter()
            .filter(|f| f.frame_type == TIMESTAMP_ECHO)
            .collect();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].content.len(), 16);
        assert_eq!(&notices[0].content[4..8], &0xABCDu32.to_be_bytes());
        assert_eq!(&notices[0].content[8..], &[0u8; 8]);

        assert!(queue.is_empty());
        let status = monitor.status();
        assert!(!status.running);
        assert!(status.iterations >= 1);
        assert_eq!(status.notices_sent, 1);
        assert_eq!(status.registers.get(&0x25), Some(&0xABCD));
        assert_eq!(status.asserted.get("tx-complete"), Some(&true));
    }

    #[test]
    fn oversized_register_list_is_capped_to_one_batch() {
        let queue = Arc::new(MessageQueue::new(16, Mode::Virtual));
        let sink = Arc::new(RecordingSink::default());
        let config = MonitorConfig {
            registers: (0x100..0x128).collect(),
            ..quick_config()
        };
        let monitor = RegisterMonitor::new(config, queue, PeerSender::new(sink.clone()));
        assert_eq!(monitor.config.registers.len(), MAX_REGISTER_ENTRIES);

        monitor.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        monitor.stop();

        let frames = sink.frames();
        let read = frames
            .iter()
            .find(|f| f.frame_type == REGISTER)
            .expect("monitor should poll");
        let request = RegisterBatch::decode(&read.content).unwrap();
        assert_eq!(request.entries.len(), MAX_REGISTER_ENTRIES);
        assert_eq!(request.entries[0].address, 0x100);
    }

    #[test]
    fn idle_outside_virtual_mode() {
        let queue = Arc::new(MessageQueue::new(16, Mode::Ground));
        let sink = Arc::new(RecordingSink::default());
        let monitor = RegisterMonitor::new(quick_config(), queue, PeerSender::new(sink.clone()));

        monitor.start().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        monitor.stop();

        assert!(sink.frames().is_empty());
        assert_eq!(monitor.status().iterations, 0);
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let queue = Arc::new(MessageQueue::new(4, Mode::Ground));
        let sink = Arc::new(RecordingSink::default());
        let monitor = RegisterMonitor::new(quick_config(), queue, PeerSender::new(sink));

        monitor.stop();
        monitor.start().unwrap();
        monitor.start().unwrap();
        monitor.stop();
        monitor.stop();
        assert!(!monitor.is_running());
    }
}
