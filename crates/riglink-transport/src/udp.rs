use std::io::ErrorKind;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::FrameSink;

/// Largest datagram a receiver accepts. A maximal frame is 263 bytes.
pub const MAX_DATAGRAM_SIZE: usize = 1024;

/// UDP link to the hardware peer.
///
/// Bound to a local address for receiving; every send goes to the static
/// peer address. Each datagram carries exactly one frame.
#[derive(Debug)]
pub struct UdpLink {
    socket: UdpSocket,
    local: SocketAddr,
    peer: SocketAddr,
}

impl UdpLink {
    /// Bind the local address and remember the peer.
    pub fn bind(local: SocketAddr, peer: SocketAddr, read_timeout: Duration) -> Result<Self> {
        let socket = UdpSocket::bind(local).map_err(|source| TransportError::Bind {
            addr: local,
            source,
        })?;
        socket.set_read_timeout(Some(read_timeout))?;
        let local = socket.local_addr()?;

        info!(%local, %peer, "udp link bound");

        Ok(Self {
            socket,
            local,
            peer,
        })
    }

    /// Receive one datagram.
    ///
    /// Returns `Ok(None)` when the read timeout elapsed without data.
    pub fn recv_datagram(&self, buf: &mut [u8]) -> Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((n, from)) => Ok(Some((n, from))),
            Err(err)
                if matches!(
                    err.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(err) => Err(TransportError::Io(err)),
        }
    }

    /// Send bytes to the peer.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        let written = self.socket.send_to(bytes, self.peer)?;
        if written != bytes.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: bytes.len(),
            });
        }
        debug!(peer = %self.peer, len = written, "udp frame sent");
        Ok(())
    }

    /// Clone the socket (receiver thread and sender share one bound port).
    pub fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            socket: self.socket.try_clone()?,
            local: self.local,
            peer: self.peer,
        })
    }

    /// Actual bound address (resolves port 0).
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }

    /// Peer address.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }
}

impl FrameSink for UdpLink {
    fn send_bytes(&self, bytes: &[u8]) -> Result<()> {
        self.send(bytes)
    }

    fn describe(&self) -> String {
        format!("udp:{}", self.peer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[test]
    fn send_and_receive_over_loopback() {
        let a = UdpLink::bind(loopback(), loopback(), Duration::from_millis(200)).unwrap();
        let b = UdpLink::bind(loopback(), a.local_addr(), Duration::from_millis(200)).unwrap();

        b.send(b"frame").unwrap();

        let mut buf = [0u8; MAX_DATAGRAM_SIZE];
        let (n, from) = a.recv_datagram(&mut buf).unwrap().unwrap();
        assert_eq!(&buf[..n], b"frame");
        assert_eq!(from, b.local_addr());
    }

    #[test]
    fn recv_times_out_with_none() {
        let link = UdpLink::bind(loopback(), loopback(), Duration::from_millis(20)).unwrap();
        let mut buf = [0u8; 16];
        assert!(link.recv_datagram(&mut buf).unwrap().is_none());
    }

    #[test]
    fn sink_describes_peer() {
        let peer: SocketAddr = "127.0.0.1:8003".parse().unwrap();
        let link = UdpLink::bind(loopback(), peer, Duration::from_millis(20)).unwrap();
        assert_eq!(link.describe(), "udp:127.0.0.1:8003");
        assert_eq!(link.peer_addr(), peer);
    }

    #[test]
    fn bind_conflict_reports_address() {
        let first = UdpLink::bind(loopback(), loopback(), Duration::from_millis(20)).unwrap();
        let err = UdpLink::bind(first.local_addr(), loopback(), Duration::from_millis(20))
            .unwrap_err();
        assert!(matches!(err, TransportError::Bind { addr, .. } if addr == first.local_addr()));
    }
}
