//! Device-host side encoders
//!
//! The sending half of the wire protocol: mesh-set serialization,
//! fragmentation and frame writing. Used by the `host-sim` binary and by
//! tests that need a byte-exact sender.

use std::io::Write;

use crate::error::{Error, Result};
use crate::mesh::{Mesh, TRANSFORM_LEN, VERTEX_STRIDE, to_receiver_handedness};
use crate::protocol::{PoseSample, SpatialMappingFragment};

/// Serialize meshes into one mesh-set buffer
///
/// Vertices are converted back to host handedness. A mesh carries its
/// transform whenever it has vertices or was received with one.
pub fn encode_mesh_set(meshes: &[Mesh]) -> Result<Vec<u8>> {
    let mut out = Vec::new();

    for mesh in meshes {
        let with_transform = !mesh.vertices.is_empty() || mesh.vertex_section_len > 0;
        let vertex_len = if with_transform {
            TRANSFORM_LEN + mesh.vertices.len() * VERTEX_STRIDE
        } else {
            0
        };
        let index_len = mesh.indices.len() * 2;

        out.extend(wire_len(vertex_len, "vertex section")?.to_le_bytes());
        out.extend(wire_len(index_len, "index section")?.to_le_bytes());

        if with_transform {
            out.extend(mesh.transform.to_bytes());
            for v in &mesh.vertices {
                for c in to_receiver_handedness(*v) {
                    out.extend(c.to_le_bytes());
                }
            }
        }
        for i in &mesh.indices {
            out.extend(i.to_le_bytes());
        }
    }

    Ok(out)
}

fn wire_len(len: usize, what: &str) -> Result<i32> {
    i32::try_from(len).map_err(|_| {
        Error::InvalidHeader(format!("{} of {} bytes does not fit in i32", what, len))
    })
}

/// Split a mesh-set buffer into fragments of at most `capacity` payload bytes
///
/// An empty buffer still produces one (empty) fragment so the receiver sees
/// the set.
pub fn fragment_mesh_set(bytes: &[u8], capacity: usize) -> Result<Vec<SpatialMappingFragment>> {
    if capacity == 0 {
        return Err(Error::Config("fragment payload capacity must be positive".into()));
    }
    if bytes.is_empty() {
        return Ok(vec![SpatialMappingFragment::new(0, 0, 1, Vec::new())]);
    }

    let count = bytes.len().div_ceil(capacity);
    Ok(bytes
        .chunks(capacity)
        .enumerate()
        .map(|(i, chunk)| {
            SpatialMappingFragment::new(bytes.len(), i * capacity, count, chunk.to_vec())
        })
        .collect())
}

/// Writes pose and fragment frames to a byte sink
pub struct FrameWriter<W: Write> {
    writer: W,
    payload_capacity: usize,
    frames_written: u64,
}

impl<W: Write> FrameWriter<W> {
    pub fn new(writer: W, payload_capacity: usize) -> Self {
        Self {
            writer,
            payload_capacity,
            frames_written: 0,
        }
    }

    pub fn write_pose(&mut self, pose: &PoseSample) -> Result<()> {
        self.writer.write_all(&pose.to_bytes())?;
        self.frames_written += 1;
        Ok(())
    }

    pub fn write_fragment(&mut self, fragment: &SpatialMappingFragment) -> Result<()> {
        let frame = fragment.to_bytes(self.payload_capacity)?;
        self.writer.write_all(&frame)?;
        self.frames_written += 1;
        Ok(())
    }

    /// Fragment and write a whole mesh set; returns the number of fragments
    pub fn write_mesh_set(&mut self, bytes: &[u8]) -> Result<usize> {
        let fragments = fragment_mesh_set(bytes, self.payload_capacity)?;
        for fragment in &fragments {
            self.write_fragment(fragment)?;
        }
        Ok(fragments.len())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
