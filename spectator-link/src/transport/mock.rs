//! Mock transport for testing

use super::{Connector, Transport};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// In-memory byte stream
///
/// Reads are served from injected bytes; once they run out the stream
/// behaves like a peer that closed the connection. Clones share the same
/// buffers, so a test can keep a handle after giving the transport away.
#[derive(Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    write_buffer: Vec<u8>,
    name: String,
}

impl MockTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::named("mock")
    }

    /// Create a mock transport with a peer name for logs
    pub fn named(name: &str) -> Self {
        MockTransport {
            inner: Arc::new(Mutex::new(MockTransportInner {
                read_buffer: VecDeque::new(),
                write_buffer: Vec::new(),
                name: name.to_string(),
            })),
        }
    }

    /// Create a mock transport preloaded with `data`
    pub fn with_bytes(data: &[u8]) -> Self {
        let transport = Self::new();
        transport.inject_read(data);
        transport
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    /// Get all written data
    pub fn get_written(&self) -> Vec<u8> {
        self.inner.lock().write_buffer.clone()
    }

    /// Bytes injected but not yet read
    pub fn remaining(&self) -> usize {
        self.inner.lock().read_buffer.len()
    }
}

impl Transport for MockTransport {
    fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.read_buffer.len() < buffer.len() {
            inner.read_buffer.clear();
            return Err(Error::ConnectionClosed);
        }
        let n = buffer.len();
        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..n)) {
            *slot = byte;
        }
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.inner.lock().write_buffer.extend_from_slice(data);
        Ok(())
    }

    fn peer(&self) -> String {
        self.inner.lock().name.clone()
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Connector that hands out a fixed sequence of mock transports
///
/// Attempts past the end of the script fail with a refused-connection error,
/// which keeps the supervisor in its retry loop.
pub struct ScriptedConnector {
    script: Arc<Mutex<VecDeque<MockTransport>>>,
    attempts: Arc<Mutex<usize>>,
}

impl ScriptedConnector {
    pub fn new(transports: impl IntoIterator<Item = MockTransport>) -> Self {
        Self {
            script: Arc::new(Mutex::new(transports.into_iter().collect())),
            attempts: Arc::new(Mutex::new(0)),
        }
    }

    /// Handle for queueing more transports after the connector moved into a supervisor
    pub fn queue(&self) -> ScriptedQueue {
        ScriptedQueue {
            script: Arc::clone(&self.script),
            attempts: Arc::clone(&self.attempts),
        }
    }
}

impl Connector for ScriptedConnector {
    fn connect(&mut self) -> Result<Box<dyn Transport>> {
        *self.attempts.lock() += 1;
        match self.script.lock().pop_front() {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "no scripted transport available",
            ))),
        }
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}

/// Shared view of a `ScriptedConnector`'s queue
#[derive(Clone)]
pub struct ScriptedQueue {
    script: Arc<Mutex<VecDeque<MockTransport>>>,
    attempts: Arc<Mutex<usize>>,
}

impl ScriptedQueue {
    pub fn push(&self, transport: MockTransport) {
        self.script.lock().push_back(transport);
    }

    /// Connection attempts made so far, successful or not
    pub fn attempts(&self) -> usize {
        *self.attempts.lock()
    }

    pub fn pending(&self) -> usize {
        self.script.lock().len()
    }
}
