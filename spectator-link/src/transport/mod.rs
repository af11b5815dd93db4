//! Transport layer for I/O abstraction
//!
//! The receive pipeline only needs a reliable, ordered byte stream with
//! blocking exact-length reads. `tcp` provides the production stream,
//! `mock` scripted streams for tests and offline runs.

use crate::error::Result;

pub mod mock;
mod tcp;

pub use mock::{MockTransport, ScriptedConnector};
pub use tcp::{TcpConnector, TcpTransport};

/// Byte stream to the device host
pub trait Transport: Send {
    /// Fill `buffer` completely
    ///
    /// Fails with `Error::ConnectionClosed` if the peer closes the stream
    /// first. Bytes read before the failure are lost.
    fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()>;

    /// Write all of `data`
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    /// Human-readable peer description for logs
    fn peer(&self) -> String {
        "unknown".to_string()
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_exact(&mut self, buffer: &mut [u8]) -> Result<()> {
        (**self).read_exact(buffer)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        (**self).write_all(data)
    }

    fn peer(&self) -> String {
        (**self).peer()
    }
}

/// Establishes transports to the device host
///
/// Called repeatedly by the supervisor's connection thread until it
/// succeeds; each call is one attempt.
pub trait Connector: Send {
    /// Make one connection attempt
    fn connect(&mut self) -> Result<Box<dyn Transport>>;

    /// Target description for logs
    fn describe(&self) -> String;
}
