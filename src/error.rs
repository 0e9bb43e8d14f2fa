//! Error types for the `record-hashmap` crate

use alloc::string::String;

use crate::device::Device;

/// Errors reported by the batched hashmap and its memory collaborators.
///
/// A key that is already present is not an error: batched calls report it
/// through the mask of the affected element.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// The backend does not implement this operation.
    ///
    /// Returned instead of an empty result so that callers can tell it apart
    /// from "key not found".
    #[error("{0} is not supported by this hashmap backend")]
    UnsupportedOperation(&'static str),

    /// A key or value buffer could not be allocated.
    #[error("failed to allocate {size} bytes on {device}")]
    AllocationFailure {
        /// Requested size in bytes
        size: usize,
        /// Device the allocation was requested on
        device: Device,
    },

    /// The hashmap holds as many entries as its ids can address.
    #[error("hashmap is full at {len} entries")]
    CapacityExceeded {
        /// Number of live entries
        len: usize,
    },

    /// The memory manager or backend cannot serve this device.
    #[error("device {0} is not supported here")]
    UnsupportedDevice(Device),

    /// A copy was requested between devices the memory manager cannot bridge.
    #[error("cannot copy from {src} to {dst}")]
    DeviceMismatch {
        /// Destination device
        dst: Device,
        /// Source device
        src: Device,
    },

    /// The two sides of a copy do not have the same length.
    #[error("copy size mismatch: destination holds {dst} bytes, source holds {src}")]
    SizeMismatch {
        /// Destination length in bytes
        dst: usize,
        /// Source length in bytes
        src: usize,
    },

    /// A packed input slice is not a whole number of records.
    #[error("packed {what} of {len} bytes is not a whole number of {stride}-byte records")]
    BatchShape {
        /// Which input was malformed (`"keys"` or `"values"`)
        what: &'static str,
        /// Length of the slice in bytes
        len: usize,
        /// Record size in bytes
        stride: usize,
    },

    /// Keys and values disagree on the number of records in the batch.
    #[error("batch holds {keys} keys but {values} values")]
    BatchLength {
        /// Number of key records
        keys: usize,
        /// Number of value records
        values: usize,
    },

    /// The hashmap configuration cannot be built.
    #[error("invalid hashmap configuration: {0}")]
    InvalidConfig(&'static str),

    /// A device string could not be parsed.
    #[error("cannot parse device from {0:?}")]
    ParseDevice(String),
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = core::result::Result<T, E>;
