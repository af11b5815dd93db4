//! Error types for SpectatorLink

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// SpectatorLink error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Peer closed the stream (EOF before a full frame arrived)
    #[error("Connection closed by peer")]
    ConnectionClosed,

    /// Shutdown was requested while blocked on the transport
    #[error("Shutdown requested")]
    Shutdown,

    /// Leading frame tag matches no known message kind
    #[error("Unknown frame discriminator: {0}")]
    UnknownDiscriminator(i32),

    /// Header field that cannot be valid (negative length, zero fragment count)
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Fragment declares more payload than the frame can carry
    #[error("Fragment payload of {declared} bytes exceeds frame capacity of {capacity} bytes")]
    PayloadTooLarge {
        /// Bytes the header claims
        declared: usize,
        /// Payload capacity of a fragment frame
        capacity: usize,
    },

    /// Declared mesh-set length is above the configured ceiling
    #[error("Mesh set of {declared} bytes exceeds limit of {limit} bytes")]
    MeshSetTooLarge {
        /// Bytes the header claims
        declared: usize,
        /// Configured maximum
        limit: usize,
    },

    /// Fragment would write outside the mesh-set buffer
    #[error("Fragment [{start}, {end}) lies outside mesh set of {total} bytes")]
    FragmentOutOfBounds {
        /// First byte written
        start: usize,
        /// One past the last byte written
        end: usize,
        /// Mesh-set length
        total: usize,
    },

    /// Fragment disagrees with the set in flight about its shape
    #[error("Inconsistent fragment: {0}")]
    InconsistentFragment(String),

    /// All fragments counted but the buffer still has holes
    #[error("Mesh set incomplete after {received} fragments: {missing} bytes never written")]
    IncompleteMeshSet {
        /// Fragments received for this set
        received: usize,
        /// Bytes not covered by any fragment
        missing: usize,
    },

    /// Mesh section runs past the end of the mesh-set buffer
    #[error("Truncated mesh at offset {offset}: need {needed} bytes, {available} available")]
    TruncatedMesh {
        /// Cursor position of the failing read
        offset: usize,
        /// Bytes required
        needed: usize,
        /// Bytes remaining
        available: usize,
    },

    /// Vertex section shorter than the transform header it must start with
    #[error("Vertex section of {0} bytes is shorter than the 40-byte transform")]
    MissingTransform(usize),

    /// Section length not a whole number of elements
    #[error("Misaligned {section} section: {len} bytes is not a multiple of {stride}")]
    MisalignedSection {
        /// "vertex" or "index"
        section: &'static str,
        /// Section length in bytes
        len: usize,
        /// Element size in bytes
        stride: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML parse error
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// True for failures of the byte stream itself, as opposed to bad content on it
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::ConnectionClosed | Error::Shutdown
        )
    }
}
