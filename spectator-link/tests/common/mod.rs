//! Test harness: an in-process device host connected through channels

#![allow(dead_code)]

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, unbounded};
use spectator_link::host::FrameWriter;
use spectator_link::transport::{Connector, Transport};
use spectator_link::{Config, Error, Result};
use std::collections::VecDeque;
use std::io::{self, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

pub const CAPACITY: usize = 26;

/// Config with a small fragment capacity and a fast retry loop
pub fn test_config() -> Config {
    let mut config = Config::default();
    config.protocol.fragment_payload_capacity = CAPACITY;
    config.connection.retry_backoff_ms = 5;
    config
}

pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Receive side of a live in-memory connection
///
/// Blocks until the host side writes or hangs up, like a socket would.
pub struct ChannelTransport {
    rx: Receiver<Vec<u8>>,
    pending: VecDeque<u8>,
    running: Arc<AtomicBool>,
}

impl Transport for ChannelTransport {
    fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        while self.pending.len() < buffer.len() {
            match self.rx.recv_timeout(Duration::from_millis(10)) {
                Ok(chunk) => self.pending.extend(chunk),
                Err(RecvTimeoutError::Timeout) => {
                    if !self.running.load(Ordering::Relaxed) {
                        return Err(Error::Shutdown);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(Error::ConnectionClosed),
            }
        }
        let n = buffer.len();
        for (slot, byte) in buffer.iter_mut().zip(self.pending.drain(..n)) {
            *slot = byte;
        }
        Ok(())
    }

    fn write_all(&mut self, _data: &[u8]) -> Result<()> {
        Ok(())
    }

    fn peer(&self) -> String {
        "channel".to_string()
    }
}

/// Host side of a live in-memory connection; dropping it closes the stream
pub struct ChannelWriter {
    tx: Sender<Vec<u8>>,
}

impl Write for ChannelWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.tx
            .send(buf.to_vec())
            .map_err(|_| io::Error::from(io::ErrorKind::BrokenPipe))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Connector whose connection attempts succeed only when the test has
/// queued a transport
pub struct TestConnector {
    rx: Receiver<Box<dyn Transport>>,
    attempts: Arc<AtomicUsize>,
}

impl Connector for TestConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        self.rx
            .try_recv()
            .map_err(|_| Error::Io(io::Error::from(io::ErrorKind::ConnectionRefused)))
    }

    fn describe(&self) -> String {
        "test host".to_string()
    }
}

/// Test-side control over what the connector hands out
pub struct TestHost {
    tx: Sender<Box<dyn Transport>>,
    attempts: Arc<AtomicUsize>,
    running: Arc<AtomicBool>,
}

impl TestHost {
    pub fn new(running: Arc<AtomicBool>) -> (Self, TestConnector) {
        let (tx, rx) = unbounded();
        let attempts = Arc::new(AtomicUsize::new(0));
        (
            Self {
                tx,
                attempts: Arc::clone(&attempts),
                running,
            },
            TestConnector { rx, attempts },
        )
    }

    /// Queue a live connection and return the host's writer for it
    pub fn accept(&self) -> FrameWriter<ChannelWriter> {
        let (tx, rx) = unbounded();
        let transport = ChannelTransport {
            rx,
            pending: VecDeque::new(),
            running: Arc::clone(&self.running),
        };
        // Receiver end lives in the connector for the whole test
        let _ = self.tx.send(Box::new(transport));
        FrameWriter::new(ChannelWriter { tx }, CAPACITY)
    }

    /// Queue a connection that delivers `bytes` and then closes
    pub fn accept_bytes(&self, bytes: &[u8]) {
        let _ = self
            .tx
            .send(Box::new(spectator_link::transport::MockTransport::with_bytes(bytes)));
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::Relaxed)
    }
}
