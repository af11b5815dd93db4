//! Shared state between the receive side and the consumer.
//!
//! The receive thread is the only writer; the consumer (compositor tick loop)
//! only reads poses and drains mesh sets. Mesh sets travel through a
//! single-slot channel, so a set is either fully decoded and visible or not
//! visible at all.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};

use crate::mesh::Mesh;
use crate::pose_cache::{CachedPose, PoseCache};
use crate::protocol::PoseSample;

/// Link state as seen by the consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Atomic wrapper for ConnectionState.
#[derive(Debug)]
pub struct AtomicConnectionState(AtomicU8);

impl AtomicConnectionState {
    pub fn new(state: ConnectionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self, order: Ordering) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(order))
    }

    /// Store a new state, returning the previous one
    pub fn swap(&self, state: ConnectionState, order: Ordering) -> ConnectionState {
        ConnectionState::from_u8(self.0.swap(state as u8, order))
    }
}

/// One complete, decoded mesh set
///
/// Replaces the previous set entirely. `sequence` increases by one per
/// published set, starting at 1.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshSet {
    pub sequence: u64,
    pub meshes: Vec<Mesh>,
}

impl MeshSet {
    pub fn len(&self) -> usize {
        self.meshes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.meshes.is_empty()
    }

    pub fn vertex_count(&self) -> usize {
        self.meshes.iter().map(Mesh::vertex_count).sum()
    }

    pub fn index_count(&self) -> usize {
        self.meshes.iter().map(Mesh::index_count).sum()
    }
}

/// Counter snapshot for status reporting
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    pub poses_received: u64,
    pub fragments_received: u64,
    pub mesh_sets_published: u64,
    /// Sets replaced by a newer one before the consumer took them
    pub mesh_sets_replaced: u64,
    pub receive_errors: u64,
    pub reconnects: u64,
}

/// Shared state between the supervisor threads and the consumer.
pub struct SharedState {
    connection: AtomicConnectionState,

    /// Recent poses, one lock per publish
    poses: Mutex<PoseCache>,

    /// Single-slot mailbox for the newest mesh set
    mesh_tx: Sender<Arc<MeshSet>>,
    mesh_rx: Receiver<Arc<MeshSet>>,
    mesh_sequence: AtomicU64,

    /// Cleared on shutdown; shared with TCP transports
    running: Arc<AtomicBool>,

    poses_received: AtomicU64,
    fragments_received: AtomicU64,
    mesh_sets_published: AtomicU64,
    mesh_sets_replaced: AtomicU64,
    receive_errors: AtomicU64,
    reconnects: AtomicU64,
}

impl SharedState {
    pub fn new(pose_cache_capacity: usize) -> Self {
        let (mesh_tx, mesh_rx) = bounded(1);
        Self {
            connection: AtomicConnectionState::new(ConnectionState::Disconnected),
            poses: Mutex::new(PoseCache::new(pose_cache_capacity)),
            mesh_tx,
            mesh_rx,
            mesh_sequence: AtomicU64::new(0),
            running: Arc::new(AtomicBool::new(true)),
            poses_received: AtomicU64::new(0),
            fragments_received: AtomicU64::new(0),
            mesh_sets_published: AtomicU64::new(0),
            mesh_sets_replaced: AtomicU64::new(0),
            receive_errors: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
        }
    }

    // ------------------------------------------------------------------
    // Connection state
    // ------------------------------------------------------------------

    pub fn connection_state(&self) -> ConnectionState {
        self.connection.load(Ordering::Acquire)
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub(crate) fn set_connection_state(&self, state: ConnectionState) {
        let previous = self.connection.swap(state, Ordering::AcqRel);
        if previous != state {
            log::info!("Connection state: {} -> {}", previous, state);
        }
    }

    // ------------------------------------------------------------------
    // Shutdown
    // ------------------------------------------------------------------

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Ask every thread using this state to stop
    pub fn request_shutdown(&self) {
        self.running.store(false, Ordering::Relaxed);
    }

    /// Flag handed to transports so blocked reads can observe shutdown
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    // ------------------------------------------------------------------
    // Poses
    // ------------------------------------------------------------------

    pub(crate) fn record_pose(&self, sample: PoseSample, time_seconds: f64) {
        self.poses.lock().push(CachedPose {
            sample,
            time_seconds,
        });
        self.poses_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Pose `frames_ago` samples behind the newest, or the neutral pose
    pub fn pose(&self, frames_ago: usize) -> CachedPose {
        self.poses.lock().get(frames_ago)
    }

    pub fn latest_pose(&self) -> Option<CachedPose> {
        self.poses.lock().latest()
    }

    pub fn reset_pose_cache(&self) {
        self.poses.lock().reset();
        log::debug!("Pose cache reset");
    }

    // ------------------------------------------------------------------
    // Mesh sets
    // ------------------------------------------------------------------

    /// Publish a decoded mesh set, replacing any set the consumer has not taken
    pub(crate) fn publish_mesh_set(&self, meshes: Vec<Mesh>) -> u64 {
        let sequence = self.mesh_sequence.fetch_add(1, Ordering::Relaxed) + 1;
        let mut set = Arc::new(MeshSet { sequence, meshes });

        loop {
            match self.mesh_tx.try_send(set) {
                Ok(()) => break,
                Err(TrySendError::Full(rejected)) => {
                    if let Ok(stale) = self.mesh_rx.try_recv() {
                        log::debug!("Replacing unconsumed mesh set #{}", stale.sequence);
                        self.mesh_sets_replaced.fetch_add(1, Ordering::Relaxed);
                    }
                    set = rejected;
                }
                // Both ends live in self
                Err(TrySendError::Disconnected(_)) => break,
            }
        }

        self.mesh_sets_published.fetch_add(1, Ordering::Relaxed);
        sequence
    }

    /// Take the newest mesh set, if one arrived since the last call
    pub fn take_mesh_set(&self) -> Option<Arc<MeshSet>> {
        self.mesh_rx.try_recv().ok()
    }

    /// True if a mesh set is waiting to be taken
    pub fn mesh_set_ready(&self) -> bool {
        !self.mesh_rx.is_empty()
    }

    // ------------------------------------------------------------------
    // Counters
    // ------------------------------------------------------------------

    pub(crate) fn note_fragment(&self) {
        self.fragments_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_receive_error(&self) {
        self.receive_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            poses_received: self.poses_received.load(Ordering::Relaxed),
            fragments_received: self.fragments_received.load(Ordering::Relaxed),
            mesh_sets_published: self.mesh_sets_published.load(Ordering::Relaxed),
            mesh_sets_replaced: self.mesh_sets_replaced.load(Ordering::Relaxed),
            receive_errors: self.receive_errors.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for SharedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedState")
            .field("connection", &self.connection_state())
            .field("running", &self.is_running())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::MeshTransform;

    fn mesh(indices: Vec<i16>) -> Mesh {
        Mesh {
            vertex_section_len: 0,
            index_section_len: indices.len() * 2,
            transform: MeshTransform::IDENTITY,
            vertices: Vec::new(),
            indices,
        }
    }

    #[test]
    fn test_initial_state() {
        let shared = SharedState::new(4);
        assert_eq!(shared.connection_state(), ConnectionState::Disconnected);
        assert!(!shared.is_connected());
        assert!(shared.is_running());
        assert!(shared.take_mesh_set().is_none());
        assert_eq!(shared.stats(), LinkStats::default());
        assert_eq!(shared.pose(0), CachedPose::NEUTRAL);
    }

    #[test]
    fn test_connection_transitions() {
        let shared = SharedState::new(4);
        shared.set_connection_state(ConnectionState::Connecting);
        assert!(!shared.is_connected());
        shared.set_connection_state(ConnectionState::Connected);
        assert!(shared.is_connected());
        shared.set_connection_state(ConnectionState::Disconnected);
        assert_eq!(shared.connection_state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_mesh_set_is_consumed_once() {
        let shared = SharedState::new(4);
        let seq = shared.publish_mesh_set(vec![mesh(vec![0, 1, 2])]);
        assert_eq!(seq, 1);
        assert!(shared.mesh_set_ready());

        let set = shared.take_mesh_set().unwrap();
        assert_eq!(set.sequence, 1);
        assert_eq!(set.index_count(), 3);
        assert!(shared.take_mesh_set().is_none());
        assert!(!shared.mesh_set_ready());
    }

    #[test]
    fn test_newer_set_replaces_unconsumed() {
        let shared = SharedState::new(4);
        shared.publish_mesh_set(vec![mesh(vec![1])]);
        shared.publish_mesh_set(vec![mesh(vec![2]), mesh(vec![3])]);

        let set = shared.take_mesh_set().unwrap();
        assert_eq!(set.sequence, 2);
        assert_eq!(set.len(), 2);
        assert!(shared.take_mesh_set().is_none());

        let stats = shared.stats();
        assert_eq!(stats.mesh_sets_published, 2);
        assert_eq!(stats.mesh_sets_replaced, 1);
    }

    #[test]
    fn test_pose_recording_and_reset() {
        let shared = SharedState::new(2);
        shared.record_pose(PoseSample::new([1.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0], 10), 0.5);
        assert_eq!(shared.pose(0).time_seconds, 0.5);
        assert_eq!(shared.stats().poses_received, 1);

        shared.reset_pose_cache();
        assert_eq!(shared.pose(0), CachedPose::NEUTRAL);
        assert!(shared.latest_pose().is_none());
    }

    #[test]
    fn test_shutdown_flag_is_shared() {
        let shared = SharedState::new(1);
        let flag = shared.running_flag();
        shared.request_shutdown();
        assert!(!flag.load(Ordering::Relaxed));
        assert!(!shared.is_running());
    }
}
