//! TCP transport to the device host

use super::{Connector, Transport};
use crate::error::{Error, Result};
use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Blocking TCP stream with a short read timeout
///
/// The timeout only exists so a blocked read can notice shutdown. A timeout
/// in the middle of a frame resumes where it left off, so no bytes are lost.
pub struct TcpTransport {
    stream: TcpStream,
    peer: String,
    running: Arc<AtomicBool>,
}

impl TcpTransport {
    /// Wrap a connected stream
    pub fn new(
        stream: TcpStream,
        read_timeout: Duration,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        stream.set_read_timeout(Some(read_timeout))?;
        if let Err(e) = stream.set_nodelay(true) {
            log::warn!("Failed to set TCP_NODELAY: {}", e);
        }
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        Ok(Self {
            stream,
            peer,
            running,
        })
    }
}

impl Transport for TcpTransport {
    fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buffer.len() {
            match self.stream.read(&mut buffer[filled..]) {
                Ok(0) => return Err(Error::ConnectionClosed),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock || e.kind() == ErrorKind::TimedOut => {
                    if !self.running.load(Ordering::Relaxed) {
                        return Err(Error::Shutdown);
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(Error::Io(e)),
            }
        }
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.stream.write_all(data)?;
        self.stream.flush()?;
        Ok(())
    }

    fn peer(&self) -> String {
        self.peer.clone()
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

/// Connects to the device host over TCP
pub struct TcpConnector {
    address: String,
    connect_timeout: Duration,
    read_timeout: Duration,
    running: Arc<AtomicBool>,
}

impl TcpConnector {
    pub fn new(
        address: impl Into<String>,
        connect_timeout: Duration,
        read_timeout: Duration,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            address: address.into(),
            connect_timeout,
            read_timeout,
            running,
        }
    }

    fn resolve(&self) -> Result<SocketAddr> {
        self.address
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Config(format!("Address {} did not resolve", self.address)))
    }
}

impl Connector for TcpConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>> {
        let addr = self.resolve()?;
        let stream = TcpStream::connect_timeout(&addr, self.connect_timeout)?;
        let transport = TcpTransport::new(stream, self.read_timeout, Arc::clone(&self.running))?;
        Ok(Box::new(transport))
    }

    fn describe(&self) -> String {
        self.address.clone()
    }
}
