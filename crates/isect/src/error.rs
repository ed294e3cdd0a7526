//! Error types for the intersection API.

use isect_kernel::MeshError;
use thiserror::Error;

/// Errors that can occur in the intersection API.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed mesh input, rejected before the shape exists.
    #[error("invalid geometry: {0}")]
    InvalidGeometry(#[from] MeshError),

    /// Query issued against a scene with uncommitted edits.
    #[error("scene has uncommitted changes; commit before querying")]
    StaleScene,

    /// Buffer is mapped or used by an in-flight query.
    #[error("buffer in use: {0}")]
    BufferInUse(String),

    /// No device matches the request.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Allocation failed.
    #[error("out of memory: could not allocate {requested} bytes")]
    OutOfMemory {
        /// Bytes requested.
        requested: usize,
    },

    /// Handle was deleted or never existed.
    #[error("invalid {0} handle")]
    InvalidHandle(&'static str),

    /// Handle belongs to another API instance.
    #[error("handle belongs to a different API instance")]
    ForeignHandle,

    /// Shape must be detached before it can be deleted.
    #[error("shape is still attached to the scene")]
    ShapeAttached,

    /// Argument out of range or inconsistent with other arguments.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Asynchronous operation failed on the device.
    #[error("operation failed: {0}")]
    OperationFailed(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Result type for intersection API operations.
pub type Result<T> = std::result::Result<T, Error>;
