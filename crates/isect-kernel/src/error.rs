//! Error types for mesh ingestion.

use thiserror::Error;

/// Errors raised while validating mesh input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// Mesh has no vertices.
    #[error("mesh has no vertices")]
    NoVertices,

    /// Vertex stride is smaller than a position or not float aligned.
    #[error("invalid vertex stride: {0} bytes")]
    InvalidStride(usize),

    /// Vertex array is shorter than `vertex_count` strided records.
    #[error("vertex data too short: need {needed} floats, got {got}")]
    VertexDataTooShort {
        /// Floats required.
        needed: usize,
        /// Floats supplied.
        got: usize,
    },

    /// Mesh has no faces.
    #[error("mesh has no faces")]
    NoFaces,

    /// Face vertex count array does not match the face count.
    #[error("expected {expected} face vertex counts, got {got}")]
    FaceCountMismatch {
        /// Declared face count.
        expected: usize,
        /// Length of the face vertex count array.
        got: usize,
    },

    /// A face has fewer than three vertices.
    #[error("face {face} has {count} vertices (minimum 3)")]
    TooFewFaceVertices {
        /// Face index.
        face: usize,
        /// Vertex count of that face.
        count: u32,
    },

    /// Index array length differs from the sum of face vertex counts.
    #[error("expected {expected} indices, got {got}")]
    IndexCountMismatch {
        /// Sum of face vertex counts.
        expected: usize,
        /// Indices supplied after the offset.
        got: usize,
    },

    /// Index offset points past the end of the index array.
    #[error("index offset {offset} exceeds index array length {len}")]
    IndexOffsetOutOfRange {
        /// Requested offset.
        offset: usize,
        /// Index array length.
        len: usize,
    },

    /// An index refers to a vertex that does not exist.
    #[error("index {index} out of range for {vertex_count} vertices")]
    IndexOutOfRange {
        /// Offending index.
        index: u32,
        /// Number of vertices.
        vertex_count: usize,
    },
}

/// Result type for mesh operations.
pub type Result<T> = std::result::Result<T, MeshError>;
