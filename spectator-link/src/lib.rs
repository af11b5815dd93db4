//! SpectatorLink - pose and spatial mapping receiver for a spectator compositor
//!
//! Connects to a head-mounted-device host over TCP and demultiplexes its
//! byte stream into:
//!
//! - Head poses, kept in a bounded cache queryable by recency
//! - Spatial mapping meshes, reassembled from fragments and published as
//!   immutable mesh-set snapshots
//!
//! The connection is supervised: any read failure drops partial state and
//! reconnects with a fixed backoff.

pub mod config;
pub mod error;
pub mod host;
pub mod mesh;
pub mod pose_cache;
pub mod protocol;
pub mod reassembly;
pub mod receiver;
pub mod shared;
pub mod supervisor;
pub mod transport;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use mesh::{Mesh, MeshTransform, RemainderPolicy};
pub use pose_cache::CachedPose;
pub use protocol::PoseSample;
pub use shared::{ConnectionState, LinkStats, MeshSet, SharedState};
pub use supervisor::{Supervisor, SupervisorHandle};
