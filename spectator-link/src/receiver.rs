//! Receive cycle: frames in, poses and mesh sets out
//!
//! One `ReceiveCycle` lives on the receive thread for the whole process and
//! is handed each new transport in turn. Reassembly state never survives a
//! failed connection.

use std::sync::Arc;

use crate::config::Config;
use crate::error::Result;
use crate::mesh::{RemainderPolicy, decode_mesh_set};
use crate::protocol::{Frame, FrameReader, PoseTiming};
use crate::reassembly::{MeshAssembler, ReassemblyProgress};
use crate::shared::SharedState;
use crate::transport::Transport;

/// What a single step produced
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CycleEvent {
    /// A pose was stored in the cache
    Pose { sent_time: i64, time_seconds: f64 },
    /// A fragment was placed; the set is still incomplete
    Fragment,
    /// A mesh set completed and was published
    MeshSet { sequence: u64, meshes: usize },
}

pub struct ReceiveCycle {
    reader: FrameReader,
    assembler: MeshAssembler,
    timing: PoseTiming,
    policy: RemainderPolicy,
    shared: Arc<SharedState>,
}

impl ReceiveCycle {
    pub fn new(config: &Config, shared: Arc<SharedState>) -> Self {
        Self {
            reader: FrameReader::new(config.protocol.fragment_payload_capacity),
            assembler: MeshAssembler::new(config.protocol.max_mesh_set_bytes),
            timing: PoseTiming::new(config.pose.sent_time_scale),
            policy: config.mesh.remainder_policy,
            shared,
        }
    }

    /// Read and handle exactly one frame
    pub fn step<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<CycleEvent> {
        match self.reader.read_frame(transport)? {
            Frame::Pose(sample) => {
                let time_seconds = self.timing.seconds(sample.sent_time);
                self.shared.record_pose(sample, time_seconds);
                Ok(CycleEvent::Pose {
                    sent_time: sample.sent_time,
                    time_seconds,
                })
            }
            Frame::Fragment(fragment) => {
                self.shared.note_fragment();
                let Some(buffer) = self.assembler.accept(fragment)? else {
                    return Ok(CycleEvent::Fragment);
                };

                let meshes = decode_mesh_set(&buffer, self.policy)?;
                let count = meshes.len();
                let sequence = self.shared.publish_mesh_set(meshes);
                log::info!(
                    "Mesh set #{} ready: {} meshes from {} bytes",
                    sequence,
                    count,
                    buffer.len()
                );
                Ok(CycleEvent::MeshSet {
                    sequence,
                    meshes: count,
                })
            }
        }
    }

    /// Step until the transport fails or shutdown is requested
    ///
    /// Returns `Ok(())` only on shutdown. On error any partial mesh set is
    /// discarded before the error is returned.
    pub fn run<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<()> {
        while self.shared.is_running() {
            if let Err(e) = self.step(transport) {
                self.shared.note_receive_error();
                self.assembler.discard();
                return Err(e);
            }
        }
        self.assembler.discard();
        Ok(())
    }

    /// Drop any partially reassembled mesh set
    pub fn reset(&mut self) {
        self.assembler.discard();
    }

    pub fn reassembly_progress(&self) -> Option<ReassemblyProgress> {
        self.assembler.progress()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::protocol::{PoseSample, SpatialMappingFragment};
    use crate::transport::MockTransport;
    use approx::assert_relative_eq;

    const CAPACITY: usize = 26;

    fn config() -> Config {
        let mut config = Config::default();
        config.protocol.fragment_payload_capacity = CAPACITY;
        config
    }

    fn cycle() -> (ReceiveCycle, Arc<SharedState>) {
        let shared = Arc::new(SharedState::new(8));
        (ReceiveCycle::new(&config(), Arc::clone(&shared)), shared)
    }

    /// Index-only mesh holding `[1, 2]`, 12 bytes
    fn index_mesh_bytes() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(0i32.to_le_bytes());
        out.extend(4i32.to_le_bytes());
        out.extend(1i16.to_le_bytes());
        out.extend(2i16.to_le_bytes());
        out
    }

    #[test]
    fn test_pose_step_updates_cache() {
        let (mut cycle, shared) = cycle();
        let pose = PoseSample::new([1.0, 0.0, 0.0], [0.0, 0.5, 0.0, 1.0], 10000);
        let mut transport = MockTransport::with_bytes(&pose.to_bytes());

        let event = cycle.step(&mut transport).unwrap();
        assert!(matches!(event, CycleEvent::Pose { sent_time: 10000, .. }));

        let cached = shared.pose(0);
        assert_eq!(cached.position(), [1.0, 0.0, 0.0]);
        assert_relative_eq!(cached.time_seconds, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fragments_publish_mesh_set() {
        let (mut cycle, shared) = cycle();
        let data = index_mesh_bytes();
        let mut bytes = SpatialMappingFragment::new(12, 0, 2, data[..6].to_vec())
            .to_bytes(CAPACITY)
            .unwrap();
        bytes.extend(
            SpatialMappingFragment::new(12, 6, 2, data[6..].to_vec())
                .to_bytes(CAPACITY)
                .unwrap(),
        );
        let mut transport = MockTransport::with_bytes(&bytes);

        assert_eq!(cycle.step(&mut transport).unwrap(), CycleEvent::Fragment);
        assert!(cycle.reassembly_progress().is_some());
        assert_eq!(
            cycle.step(&mut transport).unwrap(),
            CycleEvent::MeshSet {
                sequence: 1,
                meshes: 1
            }
        );

        let set = shared.take_mesh_set().unwrap();
        assert_eq!(set.meshes[0].indices, vec![1, 2]);
        assert_eq!(shared.stats().fragments_received, 2);
    }

    #[test]
    fn test_run_discards_partial_set_on_error() {
        let (mut cycle, shared) = cycle();
        let frag = SpatialMappingFragment::new(52, 0, 2, vec![7; 26])
            .to_bytes(CAPACITY)
            .unwrap();
        let mut transport = MockTransport::with_bytes(&frag);

        let err = cycle.run(&mut transport).unwrap_err();
        assert!(matches!(err, Error::ConnectionClosed));
        assert!(cycle.reassembly_progress().is_none());
        assert_eq!(shared.stats().receive_errors, 1);
        assert!(shared.take_mesh_set().is_none());
    }

    #[test]
    fn test_run_returns_ok_after_shutdown() {
        let (mut cycle, shared) = cycle();
        shared.request_shutdown();
        let mut transport = MockTransport::new();
        assert!(cycle.run(&mut transport).is_ok());
    }

    #[test]
    fn test_undecodable_mesh_set_is_an_error() {
        let (mut cycle, shared) = cycle();
        // Vertex length 8 leaves no room for the transform
        let mut data = Vec::new();
        data.extend(8i32.to_le_bytes());
        data.extend(0i32.to_le_bytes());
        data.extend([0u8; 8]);
        let bytes = SpatialMappingFragment::new(16, 0, 1, data)
            .to_bytes(CAPACITY)
            .unwrap();
        let mut transport = MockTransport::with_bytes(&bytes);

        assert!(matches!(
            cycle.step(&mut transport),
            Err(Error::MissingTransform(8))
        ));
        assert!(shared.take_mesh_set().is_none());
    }
}
