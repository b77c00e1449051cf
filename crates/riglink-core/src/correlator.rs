//! Pairs outbound commands with the response frames that answer them.
//!
//! The wire protocol carries no request id, so matching is by coarse
//! classification only: an arriving frame resolves the *oldest* pending
//! ticket of the matching kind. Two concurrent register reads are therefore
//! answered in ticket-creation order, whichever command the hardware was
//! actually answering.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use riglink_frame::content::RegisterOp;
use riglink_frame::frame_type::TELEMETRY;
use serde::Serialize;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::record::DecodedRecord;

/// Identifier of a pending request. Strictly increasing per correlator.
pub type TicketId = u64;

/// What kind of frame answers a ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    RegisterRead,
    RegisterWrite,
    Telemetry,
}

impl MatchKind {
    pub fn matches(self, record: &DecodedRecord) -> bool {
        match self {
            MatchKind::RegisterRead => record.register_batch(RegisterOp::Read).is_some(),
            MatchKind::RegisterWrite => record.register_batch(RegisterOp::Write).is_some(),
            MatchKind::Telemetry => record.frame_type == TELEMETRY,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MatchKind::RegisterRead => "register-read",
            MatchKind::RegisterWrite => "register-write",
            MatchKind::Telemetry => "telemetry",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "register-read" | "read" => Ok(MatchKind::RegisterRead),
            "register-write" | "write" => Ok(MatchKind::RegisterWrite),
            "telemetry" => Ok(MatchKind::Telemetry),
            other => Err(format!(
                "unknown response kind '{other}' (expected register-read, register-write or telemetry)"
            )),
        }
    }
}

struct PendingTicket {
    kind: MatchKind,
    deadline: Instant,
    /// Taken when the ticket is resolved.
    tx: Option<oneshot::Sender<DecodedRecord>>,
    /// Taken when a caller starts awaiting.
    rx: Option<oneshot::Receiver<DecodedRecord>>,
}

impl PendingTicket {
    fn is_open(&self) -> bool {
        self.tx.as_ref().is_some_and(|tx| !tx.is_closed())
    }

    /// Nobody is or will be waiting on this ticket.
    fn is_stale(&self, now: Instant) -> bool {
        match (&self.tx, &self.rx) {
            (Some(tx), None) => tx.is_closed(),
            (_, Some(_)) => now >= self.deadline,
            (None, None) => true,
        }
    }
}

struct Registry {
    next_id: TicketId,
    tickets: BTreeMap<TicketId, PendingTicket>,
}

impl Registry {
    /// Drop tickets nobody will collect. Runs on every create and arrival,
    /// so a link that never answers still stays bounded.
    fn prune(&mut self, now: Instant) {
        let before = self.tickets.len();
        self.tickets.retain(|_, ticket| !ticket.is_stale(now));
        let pruned = before - self.tickets.len();
        if pruned > 0 {
            debug!(pruned, "pruned abandoned tickets");
        }
    }
}

/// Registry of pending requests.
pub struct Correlator {
    registry: Mutex<Registry>,
    default_timeout: Duration,
}

impl Correlator {
    /// `default_timeout` bounds how long an un-awaited ticket is kept.
    pub fn new(default_timeout: Duration) -> Self {
        Self {
            registry: Mutex::new(Registry {
                next_id: 1,
                tickets: BTreeMap::new(),
            }),
            default_timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    /// Register a new pending request.
    pub fn create_ticket(&self, kind: MatchKind) -> TicketId {
        let (tx, rx) = oneshot::channel();
        let mut registry = self.lock();
        registry.prune(Instant::now());
        let id = registry.next_id;
        registry.next_id += 1;
        registry.tickets.insert(
            id,
            PendingTicket {
                kind,
                deadline: Instant::now() + self.default_timeout,
                tx: Some(tx),
                rx: Some(rx),
            },
        );
        debug!(ticket = id, %kind, "ticket created");
        id
    }

    /// Wait for the response to `id`, at most `timeout`.
    ///
    /// Returns `None` on timeout, or if the ticket is unknown or already
    /// being awaited. The ticket is gone from the registry when this returns.
    pub async fn await_ticket(&self, id: TicketId, timeout: Duration) -> Option<DecodedRecord> {
        let mut rx = {
            let mut registry = self.lock();
            let Some(ticket) = registry.tickets.get_mut(&id) else {
                warn!(ticket = id, "await on unknown ticket");
                return None;
            };
            let Some(rx) = ticket.rx.take() else {
                warn!(ticket = id, "ticket already awaited");
                return None;
            };
            if ticket.tx.is_none() {
                registry.tickets.remove(&id);
            }
            rx
        };

        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(record)) => Some(record),
            Ok(Err(_)) => {
                // Sender dropped: cancelled.
                self.remove(id);
                None
            }
            Err(_) => {
                self.remove(id);
                // A match that landed between the timer firing and the
                // removal still wins.
                match rx.try_recv() {
                    Ok(record) => Some(record),
                    Err(_) => {
                        debug!(ticket = id, ?timeout, "ticket timed out");
                        None
                    }
                }
            }
        }
    }

    /// Resolve the oldest open ticket that `record` answers.
    pub fn notify_arrival(&self, record: &DecodedRecord) -> Option<TicketId> {
        let now = Instant::now();
        let mut registry = self.lock();
        registry.prune(now);

        let id = registry
            .tickets
            .iter()
            .find(|(_, ticket)| ticket.is_open() && ticket.kind.matches(record))
            .map(|(id, _)| *id)?;

        let ticket = registry.tickets.get_mut(&id)?;
        let tx = ticket.tx.take()?;
        if ticket.rx.is_none() {
            registry.tickets.remove(&id);
        }
        drop(registry);

        if tx.send(record.clone()).is_err() {
            // Waiter gave up between the scan and the send.
            return None;
        }
        debug!(ticket = id, frame_type = record.frame_type, "ticket resolved");
        Some(id)
    }

    /// Drop a pending ticket. Returns whether it existed.
    pub fn cancel(&self, id: TicketId) -> bool {
        let removed = self.remove(id);
        if removed {
            debug!(ticket = id, "ticket cancelled");
        }
        removed
    }

    /// Tickets currently registered.
    pub fn pending(&self) -> usize {
        self.lock().tickets.len()
    }

    fn remove(&self, id: TicketId) -> bool {
        self.lock().tickets.remove(&id).is_some()
    }
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_RESPONSE_TIMEOUT)
    }
}

impl fmt::Debug for Correlator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Correlator")
            .field("pending", &self.pending())
            .field("default_timeout", &self.default_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use riglink_frame::content::{ContentLayout, RegisterBatch};
    use riglink_frame::frame_type::REGISTER;

    use super::*;
    use crate::record::SourceAddr;

    fn read_response(value: u32) -> DecodedRecord {
        let mut batch = RegisterBatch::read(&[0x25]);
        batch.entries[0].value = value;
        DecodedRecord::decode(REGISTER, batch.to_content(), true, SourceAddr::Local)
    }

    fn write_response() -> DecodedRecord {
        let content = RegisterBatch::write(&[(0x10, 1)]).to_content();
        DecodedRecord::decode(REGISTER, content, true, SourceAddr::Local)
    }

    fn telemetry() -> DecodedRecord {
        DecodedRecord::decode(TELEMETRY, Bytes::from(vec![0u8; 9]), true, SourceAddr::Local)
    }

    #[tokio::test]
    async fn notify_before_await_resolves() {
        let correlator = Correlator::default();
        let id = correlator.create_ticket(MatchKind::RegisterRead);

        assert_eq!(correlator.notify_arrival(&read_response(7)), Some(id));

        let record = correlator
            .await_ticket(id, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(record.register_batch(RegisterOp::Read).unwrap().entries[0].value, 7);
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test]
    async fn notify_while_awaiting_resolves() {
        let correlator = Arc::new(Correlator::default());
        let id = correlator.create_ticket(MatchKind::Telemetry);

        let waiter = {
            let correlator = Arc::clone(&correlator);
            tokio::spawn(async move { correlator.await_ticket(id, Duration::from_secs(2)).await })
        };

        // Give the waiter a chance to take the receiver.
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(correlator.notify_arrival(&telemetry()), Some(id));

        let record = waiter.await.unwrap().unwrap();
        assert_eq!(record.frame_type, TELEMETRY);
        assert_eq!(correlator.pending(), 0);
    }

    #[tokio::test]
    async fn timeout_returns_none_promptly_and_removes_ticket() {
        let correlator = Correlator::default();
        let id = correlator.create_ticket(MatchKind::RegisterWrite);

        let started = Instant::now();
        let result = correlator.await_ticket(id, Duration::from_millis(50)).await;
        assert!(result.is_none());
        assert!(started.elapsed() < Duration::from_millis(500));
        assert_eq!(correlator.pending(), 0);

        // A late arrival finds nothing to resolve.
        assert_eq!(correlator.notify_arrival(&write_response()), None);
    }

    #[tokio::test]
    async fn same_kind_resolves_in_creation_order() {
        let correlator = Correlator::default();
        let a = correlator.create_ticket(MatchKind::RegisterRead);
        let b = correlator.create_ticket(MatchKind::RegisterRead);

        assert_eq!(correlator.notify_arrival(&read_response(1)), Some(a));
        assert_eq!(correlator.notify_arrival(&read_response(2)), Some(b));

        let ra = correlator.await_ticket(a, Duration::from_secs(1)).await.unwrap();
        let rb = correlator.await_ticket(b, Duration::from_secs(1)).await.unwrap();
        assert_eq!(ra.register_batch(RegisterOp::Read).unwrap().entries[0].value, 1);
        assert_eq!(rb.register_batch(RegisterOp::Read).unwrap().entries[0].value, 2);
    }

    #[tokio::test]
    async fn kinds_do_not_cross_match() {
        let correlator = Correlator::default();
        let read = correlator.create_ticket(MatchKind::RegisterRead);
        let write = correlator.create_ticket(MatchKind::RegisterWrite);

        assert_eq!(correlator.notify_arrival(&telemetry()), None);
        assert_eq!(correlator.notify_arrival(&write_response()), Some(write));
        assert_eq!(correlator.notify_arrival(&read_response(0)), Some(read));
    }

    #[tokio::test]
    async fn unknown_and_double_await() {
        let correlator = Arc::new(Correlator::default());
        assert!(correlator.await_ticket(99, Duration::from_millis(10)).await.is_none());

        let id = correlator.create_ticket(MatchKind::Telemetry);
        let first = {
            let correlator = Arc::clone(&correlator);
            tokio::spawn(async move { correlator.await_ticket(id, Duration::from_millis(300)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(correlator.await_ticket(id, Duration::from_millis(10)).await.is_none());

        correlator.notify_arrival(&telemetry());
        assert!(first.await.unwrap().is_some());
    }

    #[tokio::test]
    async fn cancel_wakes_waiter_with_none() {
        let correlator = Arc::new(Correlator::default());
        let id = correlator.create_ticket(MatchKind::Telemetry);
        let waiter = {
            let correlator = Arc::clone(&correlator);
            tokio::spawn(async move { correlator.await_ticket(id, Duration::from_secs(5)).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(correlator.cancel(id));
        assert!(waiter.await.unwrap().is_none());
        assert!(!correlator.cancel(id));
    }

    #[test]
    fn unawaited_tickets_are_pruned_after_deadline() {
        let correlator = Correlator::new(Duration::from_millis(10));
        correlator.create_ticket(MatchKind::RegisterRead);
        std::thread::sleep(Duration::from_millis(30));

        assert_eq!(correlator.notify_arrival(&telemetry()), None);
        assert_eq!(correlator.pending(), 0);
    }

    #[test]
    fn abandoned_tickets_do_not_accumulate_without_arrivals() {
        let correlator = Correlator::new(Duration::from_millis(10));
        for _ in 0..50 {
            correlator.create_ticket(MatchKind::RegisterWrite);
        }
        std::thread::sleep(Duration::from_millis(30));

        correlator.create_ticket(MatchKind::RegisterWrite);
        assert_eq!(correlator.pending(), 1);
    }

    #[test]
    fn ticket_ids_increase() {
        let correlator = Correlator::default();
        let a = correlator.create_ticket(MatchKind::Telemetry);
        let b = correlator.create_ticket(MatchKind::Telemetry);
        assert!(b > a);
        assert_eq!(correlator.pending(), 2);
    }

    #[test]
    fn kind_parse() {
        assert_eq!("read".parse::<MatchKind>().unwrap(), MatchKind::RegisterRead);
        assert_eq!(
            "register-write".parse::<MatchKind>().unwrap(),
            MatchKind::RegisterWrite
        );
        assert!("ack".parse::<MatchKind>().is_err());
    }
}
