//! Link core for the riglink hardware peer.
//!
//! Receivers turn transport bytes into frames, the [`Dispatcher`] turns
//! frames into [`DecodedRecord`]s and routes them: pass-through forwarding,
//! the mode-filtered [`MessageQueue`], and the [`Correlator`] that wakes
//! callers waiting on a command's response. The [`RegisterMonitor`] polls
//! status registers in virtual mode. [`Controller`] wires it all together.

pub mod config;
pub mod controller;
pub mod correlator;
pub mod dispatcher;
pub mod error;
pub mod mode;
pub mod monitor;
pub mod queue;
pub mod receiver;
pub mod record;
pub mod sender;

pub use config::{CoreConfig, MonitorConfig, DEFAULT_QUEUE_CAPACITY, DEFAULT_RESPONSE_TIMEOUT};
pub use controller::Controller;
pub use correlator::{Correlator, MatchKind, TicketId};
pub use dispatcher::{DispatchStats, Dispatcher};
pub use error::{CoreError, Result};
pub use mode::{Mode, ModeSnapshot};
pub use monitor::{MonitorStatus, RegisterMonitor};
pub use queue::MessageQueue;
pub use receiver::{spawn_datagram_receiver, spawn_stream_receiver, ReceiverHandle, ReceiverStatus};
pub use record::{DecodedRecord, RecordBody, SourceAddr};
pub use sender::PeerSender;
