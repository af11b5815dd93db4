//! Pose frame decoding

use super::{POSE_FRAME_LEN, PacketKind, read_f32, read_i32, read_i64};
use crate::error::{Error, Result};

/// One head pose reported by the device host
///
/// Immutable once decoded; the pose cache stores copies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseSample {
    /// Position (x, y, z)
    pub position: [f32; 3],
    /// Rotation quaternion (x, y, z, w)
    pub rotation: [f32; 4],
    /// Capture time in sender clock units
    pub sent_time: i64,
}

impl PoseSample {
    /// Origin with identity rotation, returned when no history is available
    pub const NEUTRAL: PoseSample = PoseSample {
        position: [0.0, 0.0, 0.0],
        rotation: [0.0, 0.0, 0.0, 1.0],
        sent_time: 0,
    };

    pub fn new(position: [f32; 3], rotation: [f32; 4], sent_time: i64) -> Self {
        Self {
            position,
            rotation,
            sent_time,
        }
    }

    /// Decode a complete pose frame (discriminator included)
    pub fn decode(frame: &[u8; POSE_FRAME_LEN]) -> Result<Self> {
        let tag = read_i32(frame, 0);
        if tag != PacketKind::Pose.discriminator() {
            return Err(Error::InvalidHeader(format!(
                "pose frame carries discriminator {}",
                tag
            )));
        }

        Ok(Self {
            position: [read_f32(frame, 4), read_f32(frame, 8), read_f32(frame, 12)],
            rotation: [
                read_f32(frame, 16),
                read_f32(frame, 20),
                read_f32(frame, 24),
                read_f32(frame, 28),
            ],
            sent_time: read_i64(frame, 32),
        })
    }

    /// Encode as a pose frame, byte-identical to what `decode` accepts
    pub fn to_bytes(&self) -> [u8; POSE_FRAME_LEN] {
        let mut out = [0u8; POSE_FRAME_LEN];
        out[0..4].copy_from_slice(&PacketKind::Pose.discriminator().to_le_bytes());
        for (i, v) in self.position.iter().enumerate() {
            let at = 4 + i * 4;
            out[at..at + 4].copy_from_slice(&v.to_le_bytes());
        }
        for (i, v) in self.rotation.iter().enumerate() {
            let at = 16 + i * 4;
            out[at..at + 4].copy_from_slice(&v.to_le_bytes());
        }
        out[32..40].copy_from_slice(&self.sent_time.to_le_bytes());
        out
    }
}

impl Default for PoseSample {
    fn default() -> Self {
        Self::NEUTRAL
    }
}

/// Conversion from sender timestamp units to seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseTiming {
    /// Seconds per sender clock unit
    pub scale: f64,
}

impl PoseTiming {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }

    pub fn seconds(&self, sent_time: i64) -> f64 {
        sent_time as f64 * self.scale
    }
}
