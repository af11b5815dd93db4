//! Device host wire protocol
//!
//! Two message kinds share one byte stream with no length prefix. Every frame
//! starts with a little-endian `i32` discriminator that fixes the layout of
//! the rest of the frame:
//!
//! ```text
//! Pose (40 bytes):
//! ┌─────────┬──────────────────┬──────────────────────────┬──────────────┐
//! │ tag = 0 │ pos x,y,z (f32)  │ rot x,y,z,w (f32)        │ sent_time    │
//! │ i32     │ 12 bytes         │ 16 bytes                 │ i64          │
//! └─────────┴──────────────────┴──────────────────────────┴──────────────┘
//!
//! Spatial mapping fragment (20 + capacity bytes):
//! ┌─────────┬───────────┬─────────────┬──────────────┬────────────┬───────────────────┐
//! │ tag = 1 │ total len │ start index │ bytes written│ num frags  │ payload[capacity] │
//! │ i32     │ i32       │ i32         │ i32          │ i32        │ padded            │
//! └─────────┴───────────┴─────────────┴──────────────┴────────────┴───────────────────┘
//! ```
//!
//! The fragment frame is always longer than the pose frame. A reader that
//! assumes the shorter layout has consumed a prefix of a fragment; `frame`
//! avoids that by reading the tag first and then exactly the bytes the tag
//! calls for.

pub mod fragment;
pub mod frame;
pub mod pose;

pub use fragment::SpatialMappingFragment;
pub use frame::{Frame, FrameReader};
pub use pose::{PoseSample, PoseTiming};

use crate::error::{Error, Result};

/// Size of the leading discriminator
pub const DISCRIMINATOR_LEN: usize = 4;

/// Full size of a pose frame, discriminator included
pub const POSE_FRAME_LEN: usize = 40;

/// Fixed fields of a fragment frame (discriminator + four `i32`s)
pub const FRAGMENT_HEADER_LEN: usize = 20;

/// Message kind carried in the discriminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum PacketKind {
    Pose = 0,
    SpatialMapping = 1,
}

impl PacketKind {
    /// Classify a discriminator value
    pub fn from_discriminator(tag: i32) -> Result<Self> {
        match tag {
            0 => Ok(PacketKind::Pose),
            1 => Ok(PacketKind::SpatialMapping),
            other => Err(Error::UnknownDiscriminator(other)),
        }
    }

    /// Classify the first four bytes of a frame
    pub fn classify(prefix: [u8; DISCRIMINATOR_LEN]) -> Result<Self> {
        Self::from_discriminator(i32::from_le_bytes(prefix))
    }

    pub fn discriminator(self) -> i32 {
        self as i32
    }
}

/// Total size of a fragment frame for a given payload capacity
pub const fn fragment_frame_len(payload_capacity: usize) -> usize {
    FRAGMENT_HEADER_LEN + payload_capacity
}

#[inline]
pub(crate) fn read_i32(bytes: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[inline]
pub(crate) fn read_f32(bytes: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

#[inline]
pub(crate) fn read_i64(bytes: &[u8], offset: usize) -> i64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[offset..offset + 8]);
    i64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_tags() {
        assert_eq!(
            PacketKind::classify(0i32.to_le_bytes()).unwrap(),
            PacketKind::Pose
        );
        assert_eq!(
            PacketKind::classify(1i32.to_le_bytes()).unwrap(),
            PacketKind::SpatialMapping
        );
    }

    #[test]
    fn test_classify_unknown_tag() {
        assert!(matches!(
            PacketKind::classify(2i32.to_le_bytes()),
            Err(Error::UnknownDiscriminator(2))
        ));
        assert!(matches!(
            PacketKind::classify((-1i32).to_le_bytes()),
            Err(Error::UnknownDiscriminator(-1))
        ));
    }

    #[test]
    fn test_fragment_frame_longer_than_pose() {
        assert_eq!(fragment_frame_len(4096), 4116);
        assert!(fragment_frame_len(21) > POSE_FRAME_LEN);
    }

    #[test]
    fn test_little_endian_helpers() {
        let bytes = [0x01, 0x00, 0x00, 0x00, 0x00, 0x00, 0x80, 0x3F];
        assert_eq!(read_i32(&bytes, 0), 1);
        assert_eq!(read_f32(&bytes, 4), 1.0);
        let wide = 10_000i64.to_le_bytes();
        assert_eq!(read_i64(&wide, 0), 10_000);
    }
}
