//! Tagged-union frame reader
//!
//! Reads the discriminator first, then exactly the remaining bytes of the
//! frame kind it names. The bytes consumed per frame are the same as the
//! device host writes, so frame boundaries stay aligned without any length
//! prefix.

use super::fragment::SpatialMappingFragment;
use super::pose::PoseSample;
use super::{DISCRIMINATOR_LEN, POSE_FRAME_LEN, PacketKind, fragment_frame_len};
use crate::error::Result;
use crate::transport::Transport;

/// One decoded message from the device host
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Pose(PoseSample),
    Fragment(SpatialMappingFragment),
}

impl Frame {
    pub fn kind(&self) -> PacketKind {
        match self {
            Frame::Pose(_) => PacketKind::Pose,
            Frame::Fragment(_) => PacketKind::SpatialMapping,
        }
    }
}

/// Reads frames from a transport
///
/// Keeps its frame buffers between calls, so steady-state reading does not
/// allocate beyond the fragment payload copy.
pub struct FrameReader {
    payload_capacity: usize,
    pose_buf: [u8; POSE_FRAME_LEN],
    fragment_buf: Vec<u8>,
}

impl FrameReader {
    pub fn new(payload_capacity: usize) -> Self {
        Self {
            payload_capacity,
            pose_buf: [0u8; POSE_FRAME_LEN],
            fragment_buf: vec![0u8; fragment_frame_len(payload_capacity)],
        }
    }

    /// Block until one complete frame has been read
    ///
    /// An unknown discriminator fails with `Error::UnknownDiscriminator`
    /// after consuming only the four tag bytes; the stream cannot be
    /// resynchronized after that.
    pub fn read_frame<T: Transport + ?Sized>(&mut self, transport: &mut T) -> Result<Frame> {
        let mut prefix = [0u8; DISCRIMINATOR_LEN];
        transport.read_exact(&mut prefix)?;

        match PacketKind::classify(prefix)? {
            PacketKind::Pose => {
                self.pose_buf[..DISCRIMINATOR_LEN].copy_from_slice(&prefix);
                transport.read_exact(&mut self.pose_buf[DISCRIMINATOR_LEN..])?;
                let pose = PoseSample::decode(&self.pose_buf)?;
                log::trace!("Pose frame: sent_time={}", pose.sent_time);
                Ok(Frame::Pose(pose))
            }
            PacketKind::SpatialMapping => {
                self.fragment_buf[..DISCRIMINATOR_LEN].copy_from_slice(&prefix);
                transport.read_exact(&mut self.fragment_buf[DISCRIMINATOR_LEN..])?;
                let fragment =
                    SpatialMappingFragment::decode(&self.fragment_buf, self.payload_capacity)?;
                log::trace!(
                    "Fragment frame: [{}, {}) of {} ({} fragments)",
                    fragment.start_index,
                    fragment.end_index(),
                    fragment.total_bytes,
                    fragment.fragment_count
                );
                Ok(Frame::Fragment(fragment))
            }
        }
    }
}
