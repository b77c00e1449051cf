use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use riglink_frame::content::{
    ContentLayout, NodeConfig, RegisterBatch, RegisterEntry, RegisterOp, TelemetrySend,
    MAX_REGISTER_ENTRIES,
};
use riglink_frame::frame_type::{NODE_CONFIG, REGISTER, TELEMETRY_SEND};
use riglink_transport::{FrameSink, LinkConfig, SerialConfig, SerialLink, UdpLink};
use tracing::{info, warn};

use crate::config::CoreConfig;
use crate::correlator::{Correlator, MatchKind, TicketId};
use crate::dispatcher::{DispatchStats, Dispatcher};
use crate::error::{CoreError, Result};
use crate::mode::{Mode, ModeSnapshot};
use crate::monitor::{MonitorStatus, RegisterMonitor};
use crate::queue::MessageQueue;
use crate::receiver::{spawn_datagram_receiver, spawn_stream_receiver, ReceiverHandle, ReceiverStatus};
use crate::record::{DecodedRecord, SourceAddr};
use crate::sender::PeerSender;

/// Receive timeout applied to links opened by [`Controller::open`].
pub const LINK_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Owns every core component for one hardware peer.
///
/// This is the surface an API layer drives: mode control, queue access,
/// commands with correlated responses, and monitor status.
pub struct Controller {
    config: CoreConfig,
    queue: Arc<MessageQueue>,
    correlator: Arc<Correlator>,
    dispatcher: Arc<Dispatcher>,
    peer: PeerSender,
    monitor: RegisterMonitor,
    receivers: Mutex<Vec<ReceiverHandle>>,
    switch_lock: Mutex<()>,
}

impl Controller {
    /// Build the components around an outbound sink. No receiver is started;
    /// attach one with [`Controller::attach_receiver`].
    pub fn new(config: CoreConfig, sink: Arc<dyn FrameSink>) -> Result<Self> {
        let queue = Arc::new(MessageQueue::new(config.queue_capacity, config.initial_mode));
        let correlator = Arc::new(Correlator::new(config.response_timeout));
        let peer = PeerSender::new(sink);
        let dispatcher = Arc::new(
            Dispatcher::new(Arc::clone(&queue), Arc::clone(&correlator)).with_forward(peer.clone()),
        );
        let monitor = RegisterMonitor::new(config.monitor.clone(), Arc::clone(&queue), peer.clone());

        let controller = Self {
            config,
            queue,
            correlator,
            dispatcher,
            peer,
            monitor,
            receivers: Mutex::new(Vec::new()),
            switch_lock: Mutex::new(()),
        };
        if controller.config.initial_mode == Mode::Virtual {
            controller.monitor.start()?;
        }
        Ok(controller)
    }

    /// Open `link`, start its receiver and build a controller around it.
    pub fn open(link: &LinkConfig, config: CoreConfig) -> Result<Self> {
        match link {
            LinkConfig::Serial { path, baud } => {
                let serial = SerialLink::open(
                    &SerialConfig::new(path)
                        .with_baud(*baud)
                        .with_read_timeout(LINK_READ_TIMEOUT),
                )?;
                let reader = serial.try_clone()?;
                let controller = Self::new(config, Arc::new(serial.into_sink()))?;
                let handle = spawn_stream_receiver(
                    reader,
                    Arc::clone(&controller.dispatcher),
                    SourceAddr::Serial(path.clone()),
                )?;
                controller.attach_receiver(handle);
                Ok(controller)
            }
            LinkConfig::Udp { bind, peer } => {
                let udp = UdpLink::bind(*bind, *peer, LINK_READ_TIMEOUT)?;
                let rx = udp.try_clone()?;
                let controller = Self::new(config, Arc::new(udp))?;
                let handle = spawn_datagram_receiver(rx, Arc::clone(&controller.dispatcher))?;
                controller.attach_receiver(handle);
                Ok(controller)
            }
        }
    }

    fn receivers(&self) -> MutexGuard<'_, Vec<ReceiverHandle>> {
        self.receivers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Hand a running receiver to the controller; it is stopped on shutdown.
    pub fn attach_receiver(&self, handle: ReceiverHandle) {
        self.receivers().push(handle);
    }

    /// Dispatcher for receivers built outside the controller.
    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn current_mode(&self) -> ModeSnapshot {
        self.queue.mode()
    }

    /// Enter `mode`.
    ///
    /// Stops the monitor, clears the queue and records the new mode (the
    /// last two atomically with respect to receivers), then restarts the
    /// monitor when entering virtual mode. Returns false if already in
    /// `mode`.
    pub fn switch_mode(&self, mode: Mode) -> Result<bool> {
        let _guard = self.switch_lock.lock().unwrap_or_else(PoisonError::into_inner);
        if self.queue.mode().mode == mode {
            return Ok(false);
        }

        self.monitor.stop();
        self.queue.switch_mode(mode);
        if mode == Mode::Virtual {
            self.monitor.start()?;
        }
        Ok(true)
    }

    /// Send one frame, optionally registering a ticket for its response.
    ///
    /// The ticket exists before the frame leaves, so a fast response cannot
    /// be missed. If the send fails the ticket is cancelled.
    pub fn send_command(
        &self,
        frame_type: u8,
        content: &[u8],
        expect: Option<MatchKind>,
    ) -> Result<Option<TicketId>> {
        let ticket = expect.map(|kind| self.correlator.create_ticket(kind));
        if let Err(err) = self.peer.send_frame(frame_type, content) {
            if let Some(id) = ticket {
                self.correlator.cancel(id);
            }
            return Err(err);
        }
        Ok(ticket)
    }

    /// Wait for a ticket; `None` timeout uses the configured default.
    pub async fn await_ticket(
        &self,
        id: TicketId,
        timeout: Option<Duration>,
    ) -> Option<DecodedRecord> {
        let timeout = timeout.unwrap_or(self.config.response_timeout);
        self.correlator.await_ticket(id, timeout).await
    }

    /// Send a command and wait for its correlated response.
    pub async fn request(
        &self,
        frame_type: u8,
        content: &[u8],
        kind: MatchKind,
        timeout: Option<Duration>,
    ) -> Result<DecodedRecord> {
        let timeout = timeout.unwrap_or(self.config.response_timeout);
        let id = self
            .send_command(frame_type, content, Some(kind))?
            .ok_or_else(|| CoreError::InvalidArgument("no ticket issued".to_string()))?;
        self.correlator
            .await_ticket(id, timeout)
            .await
            .ok_or(CoreError::Timeout(timeout))
    }

    /// Batched register read. Returns the pairs the hardware reported.
    pub async fn read_registers(
        &self,
        addresses: &[u32],
        timeout: Option<Duration>,
    ) -> Result<Vec<RegisterEntry>> {
        check_batch_len(addresses.len())?;
        let content = RegisterBatch::read(addresses).to_content();
        let record = self
            .request(REGISTER, &content, MatchKind::RegisterRead, timeout)
            .await?;
        Ok(entries(&record, RegisterOp::Read))
    }

    /// Batched register write. Returns the pairs the hardware echoed.
    pub async fn write_registers(
        &self,
        pairs: &[(u32, u32)],
        timeout: Option<Duration>,
    ) -> Result<Vec<RegisterEntry>> {
        check_batch_len(pairs.len())?;
        let content = RegisterBatch::write(pairs).to_content();
        let record = self
            .request(REGISTER, &content, MatchKind::RegisterWrite, timeout)
            .await?;
        Ok(entries(&record, RegisterOp::Write))
    }

    /// Send a telemetry transmit request; with `wait`, await the measurement.
    pub async fn send_telemetry(
        &self,
        command: &TelemetrySend,
        wait: Option<Duration>,
    ) -> Result<Option<DecodedRecord>> {
        let content = command.to_content();
        match wait {
            Some(timeout) => self
                .request(TELEMETRY_SEND, &content, MatchKind::Telemetry, Some(timeout))
                .await
                .map(Some),
            None => {
                self.send_command(TELEMETRY_SEND, &content, None)?;
                Ok(None)
            }
        }
    }

    /// Push a node configuration. The hardware does not answer.
    pub fn configure_node(&self, node: &NodeConfig) -> Result<()> {
        self.peer.send_frame(NODE_CONFIG, &node.to_content())?;
        info!(node_id = node.node_id, frequency_khz = node.frequency_khz, "node configuration sent");
        Ok(())
    }

    pub fn monitor_status(&self) -> MonitorStatus {
        self.monitor.status()
    }

    pub fn receiver_status(&self) -> Vec<ReceiverStatus> {
        self.receivers().iter().map(ReceiverHandle::status).collect()
    }

    pub fn dispatch_stats(&self) -> DispatchStats {
        self.dispatcher.stats()
    }

    /// Stop the monitor and every receiver, joining their threads.
    pub fn shutdown(&self) {
        self.monitor.stop();
        let mut receivers = self.receivers();
        for handle in receivers.iter_mut() {
            handle.stop();
        }
        receivers.clear();
        let abandoned = self.correlator.pending();
        if abandoned > 0 {
            warn!(abandoned, "shutdown with pending tickets");
        }
        info!("controller shut down");
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("peer", &self.peer)
            .field("queue", &self.queue)
            .field("correlator", &self.correlator)
            .finish()
    }
}

fn check_batch_len(len: usize) -> Result<()> {
    if len == 0 || len > MAX_REGISTER_ENTRIES {
        return Err(CoreError::InvalidArgument(format!(
            "register batch must hold 1..={MAX_REGISTER_ENTRIES} entries, got {len}"
        )));
    }
    Ok(())
}

fn entries(record: &DecodedRecord, op: RegisterOp) -> Vec<RegisterEntry> {
    record
        .register_batch(op)
        .map(|batch| batch.entries.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use riglink_frame::frame_type::TELEMETRY;
    use riglink_frame::Frame;

    use super::*;
    use crate::config::MonitorConfig;
    use crate::sender::testing::RecordingSink;

    fn controller(mode: Mode) -> (Arc<Controller>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let config = CoreConfig {
            initial_mode: mode,
            response_timeout: Duration::from_millis(200),
            monitor: MonitorConfig {
                poll_interval: Duration::from_millis(20),
                settle: Duration::from_millis(5),
                ..MonitorConfig::default()
            },
            ..CoreConfig::default()
        };
        (Arc::new(Controller::new(config, sink.clone()).unwrap()), sink)
    }

    fn inject(controller: &Controller, frame_type: u8, content: Bytes) {
        controller
            .dispatcher()
            .dispatch(Frame::new(frame_type, content).unwrap(), SourceAddr::Local);
    }

    #[test]
    fn switch_mode_round_trip() {
        let (controller, _) = controller(Mode::Ground);
        inject(&controller, TELEMETRY, Bytes::from(vec![0u8; 9]));
        assert_eq!(controller.queue().len(), 1);

        assert!(!controller.switch_mode(Mode::Ground).unwrap());
        assert_eq!(controller.queue().len(), 1);

        assert!(controller.switch_mode(Mode::Virtual).unwrap());
        assert!(controller.queue().is_empty());
        assert!(controller.monitor_status().running);

        assert!(controller.switch_mode(Mode::Ground).unwrap());
        assert!(!controller.monitor_status().running);
        assert_eq!(controller.current_mode().mode, Mode::Ground);
    }

    #[test]
    fn virtual_initial_mode_starts_monitor() {
        let (controller, sink) = controller(Mode::Virtual);
        assert!(controller.monitor_status().running);
        std::thread::sleep(Duration::from_millis(50));
        controller.shutdown();
        assert!(!controller.monitor_status().running);
        assert!(sink.frames().iter().any(|f| f.frame_type == REGISTER));
    }

    #[test]
    fn failed_send_cancels_ticket() {
        let (controller, sink) = controller(Mode::Ground);
        sink.fail
            .store(true, std::sync::atomic::Ordering::SeqCst);

        let err = controller
            .send_command(REGISTER, &[0, 0], Some(MatchKind::RegisterRead))
            .unwrap_err();
        assert!(matches!(err, CoreError::Transport(_)));
        assert_eq!(controller.correlator().pending(), 0);
    }

    #[tokio::test]
    async fn read_registers_returns_reported_values() {
        let (controller, sink) = controller(Mode::Ground);

        let responder = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let mut reply = RegisterBatch::read(&[0x25, 0x26]);
                reply.entries[0].value = 11;
                reply.entries[1].value = 22;
                inject(&controller, REGISTER, reply.to_content());
            })
        };

        let values = controller
            .read_registers(&[0x25, 0x26], Some(Duration::from_secs(1)))
            .await
            .unwrap();
        responder.await.unwrap();

        assert_eq!(
            values,
            vec![
                RegisterEntry { address: 0x25, value: 11 },
                RegisterEntry { address: 0x26, value: 22 },
            ]
        );
        let sent = sink.frames();
        assert_eq!(sent[0].frame_type, REGISTER);
        assert_eq!(sent[0].content[0], 0);
    }

    #[tokio::test]
    async fn unanswered_request_times_out() {
        let (controller, _) = controller(Mode::Ground);
        let err = controller
            .write_registers(&[(0x10, 1)], Some(Duration::from_millis(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Timeout(_)));
        assert_eq!(controller.correlator().pending(), 0);
    }

    #[tokio::test]
    async fn empty_batch_rejected() {
        let (controller, sink) = controller(Mode::Ground);
        let err = controller.read_registers(&[], None).await.unwrap_err();
        assert!(matches!(err, CoreError::InvalidArgument(_)));
        assert!(sink.frames().is_empty());
    }

    #[test]
    fn configure_node_sends_fixed_layout() {
        let (controller, sink) = controller(Mode::Ground);
        controller.configure_node(&NodeConfig::default()).unwrap();
        let sent = sink.frames();
        assert_eq!(sent[0].frame_type, NODE_CONFIG);
        assert_eq!(sent[0].content.len(), NodeConfig::MIN_LEN);
    }
}
