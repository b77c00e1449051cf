use std::io::Read;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use riglink_frame::{decode_frame, FrameError, FrameReader};
use riglink_transport::{UdpLink, MAX_DATAGRAM_SIZE};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{CoreError, Result};
use crate::record::SourceAddr;

#[derive(Default)]
struct Shared {
    running: AtomicBool,
    frames: AtomicU64,
    discarded_bytes: AtomicU64,
    dropped_datagrams: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    fn fail(&self, err: String) {
        *self.last_error.lock().unwrap_or_else(PoisonError::into_inner) = Some(err);
    }
}

/// Point-in-time view of a receiver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReceiverStatus {
    pub name: String,
    /// Loop still accepting frames.
    pub running: bool,
    /// Thread not yet exited.
    pub alive: bool,
    pub frames: u64,
    pub discarded_bytes: u64,
    pub dropped_datagrams: u64,
    pub last_error: Option<String>,
}

/// Owns one receive thread. Dropping the handle stops and joins it.
pub struct ReceiverHandle {
    name: String,
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl ReceiverHandle {
    /// Signal the loop to stop and wait for it. Returns within one read
    /// timeout.
    pub fn stop(&mut self) {
        self.shared.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(receiver = %self.name, "receiver thread panicked");
            }
            info!(receiver = %self.name, "receiver stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn status(&self) -> ReceiverStatus {
        ReceiverStatus {
            name: self.name.clone(),
            running: self.is_running(),
            alive: self.thread.as_ref().is_some_and(|t| !t.is_finished()),
            frames: self.shared.frames.load(Ordering::Relaxed),
            discarded_bytes: self.shared.discarded_bytes.load(Ordering::Relaxed),
            dropped_datagrams: self.shared.dropped_datagrams.load(Ordering::Relaxed),
            last_error: self
                .shared
                .last_error
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}

impl Drop for ReceiverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ReceiverHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiverHandle")
            .field("name", &self.name)
            .field("running", &self.is_running())
            .finish()
    }
}

fn spawn<F>(name: String, body: F) -> Result<ReceiverHandle>
where
    F: FnOnce(Arc<Shared>) + Send + 'static,
{
    let shared = Arc::new(Shared::default());
    shared.running.store(true, Ordering::SeqCst);

    let thread = {
        let shared = Arc::clone(&shared);
        thread::Builder::new()
            .name(format!("riglink-rx-{name}"))
            .spawn(move || {
                body(Arc::clone(&shared));
                shared.running.store(false, Ordering::SeqCst);
            })
            .map_err(|source| CoreError::Spawn {
                name: "receiver",
                source,
            })?
    };

    info!(receiver = %name, "receiver started");
    Ok(ReceiverHandle {
        name,
        shared,
        thread: Some(thread),
    })
}

/// Receive frames from a byte stream (serial port) on a dedicated thread.
///
/// `reader` must have a finite read timeout so the stop flag is observed.
pub fn spawn_stream_receiver<R>(
    reader: R,
    dispatcher: Arc<Dispatcher>,
    source: SourceAddr,
) -> Result<ReceiverHandle>
where
    R: Read + Send + 'static,
{
    let name = source.to_string();
    spawn(name, move |shared| {
        let mut reader = FrameReader::new(reader);
        while shared.running.load(Ordering::SeqCst) {
            match reader.poll_frame() {
                Ok(Some(frame)) => {
                    shared.frames.fetch_add(1, Ordering::Relaxed);
                    dispatcher.dispatch(frame, source.clone());
                }
                Ok(None) => {}
                Err(FrameError::ConnectionClosed) => {
                    info!(%source, "stream closed");
                    shared.fail("connection closed".to_string());
                    break;
                }
                Err(err) => {
                    error!(%source, error = %err, "stream receive failed");
                    shared.fail(err.to_string());
                    break;
                }
            }
            shared
                .discarded_bytes
                .store(reader.discarded_bytes(), Ordering::Relaxed);
        }
    })
}

/// Receive one frame per datagram on a dedicated thread.
pub fn spawn_datagram_receiver(link: UdpLink, dispatcher: Arc<Dispatcher>) -> Result<ReceiverHandle> {
    let name = format!("udp:{}", link.local_addr());
    spawn(name, move |shared| {
        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        while shared.running.load(Ordering::SeqCst) {
            let (n, from) = match link.recv_datagram(&mut buf) {
                Ok(Some(received)) => received,
                Ok(None) => continue,
                Err(err) => {
                    error!(local = %link.local_addr(), error = %err, "datagram receive failed");
                    shared.fail(err.to_string());
                    break;
                }
            };

            match decode_frame(&buf[..n]) {
                Ok((frame, consumed)) => {
                    if consumed < n {
                        debug!(%from, trailing = n - consumed, "ignoring bytes after frame");
                    }
                    shared.frames.fetch_add(1, Ordering::Relaxed);
                    dispatcher.dispatch(frame, SourceAddr::Datagram(from));
                }
                Err(err) => {
                    shared.dropped_datagrams.fetch_add(1, Ordering::Relaxed);
                    shared.discarded_bytes.fetch_add(n as u64, Ordering::Relaxed);
                    warn!(%from, len = n, error = %err, "dropping undecodable datagram");
                }
            }
        }
    })
}
