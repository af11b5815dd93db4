//! Spatial mapping mesh decoding
//!
//! A completed mesh-set buffer is a sequence of meshes, each laid out as:
//!
//! ```text
//! ┌────────────┬───────────┬──────────────────────────────┬──────────────┬─────────────┐
//! │ vertex len │ index len │ transform (10 × f32)         │ vertices     │ indices     │
//! │ i32        │ i32       │ only if vertex len > 0       │ f32 triplets │ i16         │
//! └────────────┴───────────┴──────────────────────────────┴──────────────┴─────────────┘
//! ```
//!
//! The vertex length includes the 40-byte transform. The host uses the
//! opposite handedness, so every vertex goes through
//! [`to_receiver_handedness`] on the way in.

use crate::error::{Error, Result};
use crate::protocol::{read_f32, read_i32};
use serde::{Deserialize, Serialize};

/// Bytes of the per-mesh transform (translation 3 + rotation 4 + scale 3)
pub const TRANSFORM_LEN: usize = 40;

/// Bytes per vertex (three f32)
pub const VERTEX_STRIDE: usize = 12;

/// Bytes per index (one i16)
pub const INDEX_STRIDE: usize = 2;

/// Handling of a section that is not a whole number of elements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RemainderPolicy {
    /// Decode whole elements and skip the leftover bytes
    #[default]
    Truncate,
    /// Fail the whole mesh set
    Reject,
}

/// Placement of one mesh in the scene
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshTransform {
    pub translation: [f32; 3],
    /// Quaternion (x, y, z, w)
    pub rotation: [f32; 4],
    pub scale: [f32; 3],
}

impl MeshTransform {
    pub const IDENTITY: MeshTransform = MeshTransform {
        translation: [0.0, 0.0, 0.0],
        rotation: [0.0, 0.0, 0.0, 1.0],
        scale: [1.0, 1.0, 1.0],
    };

    fn decode(bytes: &[u8]) -> Self {
        let f = |i: usize| read_f32(bytes, i * 4);
        Self {
            translation: [f(0), f(1), f(2)],
            rotation: [f(3), f(4), f(5), f(6)],
            scale: [f(7), f(8), f(9)],
        }
    }

    /// Wire encoding (40 bytes)
    pub fn to_bytes(&self) -> [u8; TRANSFORM_LEN] {
        let mut out = [0u8; TRANSFORM_LEN];
        let values = self
            .translation
            .iter()
            .chain(self.rotation.iter())
            .chain(self.scale.iter());
        for (i, v) in values.enumerate() {
            out[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        out
    }
}

impl Default for MeshTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// One decoded spatial mapping mesh
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Vertex section length on the wire, transform included
    pub vertex_section_len: usize,
    /// Index section length on the wire
    pub index_section_len: usize,
    pub transform: MeshTransform,
    /// Vertices in receiver handedness
    pub vertices: Vec<[f32; 3]>,
    pub indices: Vec<i16>,
}

impl Mesh {
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Vertices as one flat `x, y, z, x, y, z, ...` array
    pub fn flat_vertices(&self) -> Vec<f32> {
        self.vertices.iter().flatten().copied().collect()
    }
}

/// Flip between the host's and the receiver's coordinate handedness
///
/// Negates Z. The conversion is its own inverse, so the host-side encoder
/// uses it too.
#[inline]
pub fn to_receiver_handedness(v: [f32; 3]) -> [f32; 3] {
    [v[0], v[1], -v[2]]
}

/// Sequential reader over a mesh-set buffer
struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn is_done(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let available = self.bytes.len() - self.pos;
        if len > available {
            return Err(Error::TruncatedMesh {
                offset: self.pos,
                needed: len,
                available,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn take_len(&mut self, field: &str) -> Result<usize> {
        let offset = self.pos;
        let raw = read_i32(self.take(4)?, 0);
        usize::try_from(raw).map_err(|_| {
            Error::InvalidHeader(format!("{} is negative ({}) at offset {}", field, raw, offset))
        })
    }
}

/// Decode a complete mesh-set buffer into meshes, in buffer order
///
/// Pure function of `bytes`: decoding the same buffer twice gives the same
/// meshes.
pub fn decode_mesh_set(bytes: &[u8], policy: RemainderPolicy) -> Result<Vec<Mesh>> {
    let mut cursor = Cursor::new(bytes);
    let mut meshes = Vec::new();

    while !cursor.is_done() {
        meshes.push(decode_mesh(&mut cursor, policy)?);
    }

    Ok(meshes)
}

fn decode_mesh(cursor: &mut Cursor<'_>, policy: RemainderPolicy) -> Result<Mesh> {
    let vertex_section_len = cursor.take_len("vertex byte length")?;
    let index_section_len = cursor.take_len("index byte length")?;

    let mut transform = MeshTransform::IDENTITY;
    let mut vertices = Vec::new();

    if vertex_section_len > 0 {
        if vertex_section_len < TRANSFORM_LEN {
            return Err(Error::MissingTransform(vertex_section_len));
        }
        let section = cursor.take(vertex_section_len)?;
        transform = MeshTransform::decode(&section[..TRANSFORM_LEN]);

        let data = &section[TRANSFORM_LEN..];
        check_remainder("vertex", data.len(), VERTEX_STRIDE, policy)?;
        vertices = data
            .chunks_exact(VERTEX_STRIDE)
            .map(|c| to_receiver_handedness([read_f32(c, 0), read_f32(c, 4), read_f32(c, 8)]))
            .collect();
    }

    let mut indices = Vec::new();
    if index_section_len > 0 {
        let section = cursor.take(index_section_len)?;
        check_remainder("index", section.len(), INDEX_STRIDE, policy)?;
        indices = section
            .chunks_exact(INDEX_STRIDE)
            .map(|c| i16::from_le_bytes([c[0], c[1]]))
            .collect();
    }

    Ok(Mesh {
        vertex_section_len,
        index_section_len,
        transform,
        vertices,
        indices,
    })
}

fn check_remainder(
    section: &'static str,
    len: usize,
    stride: usize,
    policy: RemainderPolicy,
) -> Result<()> {
    let leftover = len % stride;
    if leftover == 0 {
        return Ok(());
    }
    match policy {
        RemainderPolicy::Reject => Err(Error::MisalignedSection {
            section,
            len,
            stride,
        }),
        RemainderPolicy::Truncate => {
            log::warn!(
                "Skipping {} trailing bytes of {}-byte {} section",
                leftover,
                len,
                section
            );
            Ok(())
        }
    }
}
