use std::fmt;
use std::sync::Arc;

use riglink_frame::build_frame;
use riglink_transport::FrameSink;
use tracing::trace;

use crate::error::Result;

/// Outbound handle to the hardware peer.
///
/// Cheap to clone. Every send is one complete frame, written atomically
/// with respect to other senders by the underlying sink.
#[derive(Clone)]
pub struct PeerSender {
    sink: Arc<dyn FrameSink>,
}

impl PeerSender {
    pub fn new(sink: Arc<dyn FrameSink>) -> Self {
        Self { sink }
    }

    /// Frame `content` as `frame_type` and send it.
    pub fn send_frame(&self, frame_type: u8, content: &[u8]) -> Result<()> {
        let wire = build_frame(frame_type, content)?;
        self.sink.send_bytes(&wire)?;
        trace!(frame_type, len = content.len(), peer = %self.sink.describe(), "frame sent");
        Ok(())
    }

    pub fn describe(&self) -> String {
        self.sink.describe()
    }
}

impl fmt::Debug for PeerSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerSender")
            .field("peer", &self.sink.describe())
            .finish()
    }
}
