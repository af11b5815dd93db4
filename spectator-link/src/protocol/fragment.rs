//! Spatial mapping fragment frames
//!
//! A mesh set is too large for one network write, so the host splits it
//! into fixed-size frames. Each frame carries placement metadata and up to
//! `capacity` payload bytes; unused payload bytes are padding.

use super::{FRAGMENT_HEADER_LEN, PacketKind, fragment_frame_len, read_i32};
use crate::error::{Error, Result};

/// One received fragment of a mesh set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpatialMappingFragment {
    /// Length of the complete mesh-set buffer
    pub total_bytes: usize,
    /// Offset of this payload in the mesh-set buffer
    pub start_index: usize,
    /// Number of fragments the host split the set into
    pub fragment_count: usize,
    /// Payload bytes actually written (padding stripped)
    pub payload: Vec<u8>,
}

impl SpatialMappingFragment {
    pub fn new(
        total_bytes: usize,
        start_index: usize,
        fragment_count: usize,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            total_bytes,
            start_index,
            fragment_count,
            payload,
        }
    }

    /// One past the last buffer offset this fragment writes
    pub fn end_index(&self) -> usize {
        self.start_index + self.payload.len()
    }

    /// Decode a complete fragment frame (discriminator included)
    pub fn decode(frame: &[u8], capacity: usize) -> Result<Self> {
        let expected = fragment_frame_len(capacity);
        if frame.len() != expected {
            return Err(Error::InvalidHeader(format!(
                "fragment frame is {} bytes, expected {}",
                frame.len(),
                expected
            )));
        }

        let tag = read_i32(frame, 0);
        if tag != PacketKind::SpatialMapping.discriminator() {
            return Err(Error::InvalidHeader(format!(
                "fragment frame carries discriminator {}",
                tag
            )));
        }

        let total_bytes = non_negative(read_i32(frame, 4), "totalSpatialMappingBytes")?;
        let start_index = non_negative(read_i32(frame, 8), "packetStartIndex")?;
        let written = non_negative(read_i32(frame, 12), "bytesWrittenThisPacket")?;
        let fragment_count = non_negative(read_i32(frame, 16), "numSpatialMappingPackets")?;

        if fragment_count == 0 {
            return Err(Error::InvalidHeader(
                "numSpatialMappingPackets is zero".into(),
            ));
        }
        if written > capacity {
            return Err(Error::PayloadTooLarge {
                declared: written,
                capacity,
            });
        }

        let payload = frame[FRAGMENT_HEADER_LEN..FRAGMENT_HEADER_LEN + written].to_vec();

        Ok(Self {
            total_bytes,
            start_index,
            fragment_count,
            payload,
        })
    }

    /// Encode as a fixed-size frame, zero-padding the payload to `capacity`
    pub fn to_bytes(&self, capacity: usize) -> Result<Vec<u8>> {
        if self.payload.len() > capacity {
            return Err(Error::PayloadTooLarge {
                declared: self.payload.len(),
                capacity,
            });
        }

        let mut out = vec![0u8; fragment_frame_len(capacity)];
        out[0..4].copy_from_slice(&PacketKind::SpatialMapping.discriminator().to_le_bytes());
        out[4..8].copy_from_slice(&to_wire(self.total_bytes, "total_bytes")?.to_le_bytes());
        out[8..12].copy_from_slice(&to_wire(self.start_index, "start_index")?.to_le_bytes());
        out[12..16].copy_from_slice(&to_wire(self.payload.len(), "payload")?.to_le_bytes());
        out[16..20]
            .copy_from_slice(&to_wire(self.fragment_count, "fragment_count")?.to_le_bytes());
        out[FRAGMENT_HEADER_LEN..FRAGMENT_HEADER_LEN + self.payload.len()]
            .copy_from_slice(&self.payload);
        Ok(out)
    }
}

fn non_negative(value: i32, field: &str) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| Error::InvalidHeader(format!("{} is negative ({})", field, value)))
}

fn to_wire(value: usize, field: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| Error::InvalidHeader(format!("{} does not fit in i32 ({})", field, value)))
}
