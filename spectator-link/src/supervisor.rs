//! Connection supervision
//!
//! Two threads cooperate over crossbeam channels:
//! - Connector thread: retries connection establishment with a fixed backoff
//!   until it succeeds, then hands the transport over and waits for a
//!   reconnect request
//! - Receive thread: runs the receive cycle on each transport it is handed;
//!   any failure marks the link disconnected and requests a reconnect
//!
//! ```text
//!   Disconnected ──► Connecting ──► Connected
//!        ▲                              │
//!        └──────── read failure ────────┘
//! ```

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, bounded};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::error::Result;
use crate::receiver::ReceiveCycle;
use crate::shared::{ConnectionState, SharedState};
use crate::transport::{Connector, Transport};

/// How often idle waits re-check the shutdown flag
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Owns the supervisor threads; dropping it shuts them down
pub struct SupervisorHandle {
    connector: Option<JoinHandle<()>>,
    receiver: Option<JoinHandle<()>>,
    shared: Arc<SharedState>,
}

impl SupervisorHandle {
    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Stop both threads and wait for them to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.shared.request_shutdown();
        for (name, handle) in [
            ("connector", self.connector.take()),
            ("receiver", self.receiver.take()),
        ] {
            if let Some(handle) = handle
                && handle.join().is_err()
            {
                log::error!("{} thread panicked", name);
            }
        }
    }
}

impl Drop for SupervisorHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

pub struct Supervisor;

impl Supervisor {
    /// Spawn the connector and receive threads
    pub fn start<C>(
        config: &Config,
        connector: C,
        shared: Arc<SharedState>,
    ) -> Result<SupervisorHandle>
    where
        C: Connector + 'static,
    {
        let (transport_tx, transport_rx) = bounded::<Box<dyn Transport>>(1);
        let (reconnect_tx, reconnect_rx) = bounded::<()>(1);

        let backoff = config.connection.retry_backoff();
        let connector_state = Arc::clone(&shared);
        let connector_handle = thread::Builder::new()
            .name("connector".into())
            .spawn(move || {
                let mut task = ConnectorTask {
                    connector,
                    backoff,
                    shared: connector_state,
                    transport_tx,
                    reconnect_rx,
                };
                task.run();
            })?;

        let cycle = ReceiveCycle::new(config, Arc::clone(&shared));
        let receiver_state = Arc::clone(&shared);
        let receiver_handle = thread::Builder::new()
            .name("receiver".into())
            .spawn(move || {
                let mut task = ReceiverTask {
                    cycle,
                    shared: receiver_state,
                    transport_rx,
                    reconnect_tx,
                };
                task.run();
            });

        let receiver_handle = match receiver_handle {
            Ok(handle) => handle,
            Err(e) => {
                shared.request_shutdown();
                let _ = connector_handle.join();
                return Err(e.into());
            }
        };

        Ok(SupervisorHandle {
            connector: Some(connector_handle),
            receiver: Some(receiver_handle),
            shared,
        })
    }
}

struct ConnectorTask<C> {
    connector: C,
    backoff: Duration,
    shared: Arc<SharedState>,
    transport_tx: Sender<Box<dyn Transport>>,
    reconnect_rx: Receiver<()>,
}

impl<C: Connector> ConnectorTask<C> {
    fn run(&mut self) {
        log::info!("Connector started for {}", self.connector.describe());

        while let Some(transport) = self.establish() {
            log::info!("Connected to device host at {}", transport.peer());
            self.shared.set_connection_state(ConnectionState::Connected);
            if self.transport_tx.send(transport).is_err() {
                break;
            }
            if !self.wait_for_reconnect_request() {
                break;
            }
            self.shared.note_reconnect();
        }

        self.shared.set_connection_state(ConnectionState::Disconnected);
        log::info!("Connector stopped");
    }

    /// Retry until connected; `None` on shutdown
    fn establish(&mut self) -> Option<Box<dyn Transport>> {
        self.shared.set_connection_state(ConnectionState::Connecting);
        let mut attempts: u64 = 0;

        while self.shared.is_running() {
            attempts += 1;
            match self.connector.connect() {
                Ok(transport) => {
                    if attempts > 1 {
                        log::debug!("Connected after {} attempts", attempts);
                    }
                    return Some(transport);
                }
                Err(e) => {
                    // Host is usually just not up yet
                    if attempts == 1 {
                        log::info!("Connection to {} failed: {}", self.connector.describe(), e);
                    } else {
                        log::trace!("Connection attempt {} failed: {}", attempts, e);
                    }
                    sleep_while_running(&self.shared, self.backoff);
                }
            }
        }
        None
    }

    /// Block until the receive side asks for a new connection; false on shutdown
    fn wait_for_reconnect_request(&self) -> bool {
        loop {
            match self.reconnect_rx.recv_timeout(POLL_INTERVAL) {
                Ok(()) => return self.shared.is_running(),
                Err(RecvTimeoutError::Timeout) => {
                    if !self.shared.is_running() {
                        return false;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return false,
            }
        }
    }
}

struct ReceiverTask {
    cycle: ReceiveCycle,
    shared: Arc<SharedState>,
    transport_rx: Receiver<Box<dyn Transport>>,
    reconnect_tx: Sender<()>,
}

impl ReceiverTask {
    fn run(&mut self) {
        while let Some(mut transport) = self.next_transport() {
            let peer = transport.peer();
            match self.cycle.run(&mut transport) {
                Ok(()) => break,
                Err(e) => {
                    if !self.shared.is_running() {
                        break;
                    }
                    if e.is_transport() {
                        log::info!("Connection to {} lost: {}", peer, e);
                    } else {
                        log::warn!("Protocol error from {}: {}", peer, e);
                    }
                }
            }

            drop(transport);
            self.shared.set_connection_state(ConnectionState::Disconnected);
            if self.reconnect_tx.send(()).is_err() {
                break;
            }
        }

        self.cycle.reset();
        log::info!("Receiver stopped");
    }

    fn next_transport(&self) -> Option<Box<dyn Transport>> {
        loop {
            match self.transport_rx.recv_timeout(POLL_INTERVAL) {
                Ok(transport) => return Some(transport),
                Err(RecvTimeoutError::Timeout) => {
                    if !self.shared.is_running() {
                        return None;
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return None,
            }
        }
    }
}

/// Sleep for `duration`, waking early on shutdown
fn sleep_while_running(shared: &SharedState, duration: Duration) {
    let deadline = Instant::now() + duration;
    loop {
        let now = Instant::now();
        if now >= deadline || !shared.is_running() {
            return;
        }
        thread::sleep((deadline - now).min(POLL_INTERVAL));
    }
}
