//! Error types for engine transactions

use std::path::PathBuf;

use nomad_protocol::{Bank, FrameError, TransportError, ValidationError};
use thiserror::Error;

/// Errors that abort an engine operation
///
/// Nothing is retried; the first failure ends the whole transaction and
/// carries the name of the step that failed.
#[derive(Debug, Error)]
pub enum NomadError {
    /// Channel-level failure, including timeouts
    #[error("{operation}: {source}")]
    Transport {
        /// Step that was running
        operation: &'static str,
        #[source]
        source: TransportError,
    },

    /// Bulk read returned fewer bytes than the protocol requires
    #[error("{operation}: short read at offset {offset}: expected {expected} bytes, got {actual}")]
    ShortRead {
        operation: &'static str,
        expected: usize,
        actual: usize,
        /// File offset of the block, zero outside transfers
        offset: u64,
    },

    /// Bulk write accepted fewer bytes than were sent
    #[error("{operation}: short write at offset {offset}: sent {expected} bytes, device took {actual}")]
    ShortWrite {
        operation: &'static str,
        expected: usize,
        actual: usize,
        offset: u64,
    },

    /// Response buffer could not be decoded
    #[error("malformed frame: {0}")]
    MalformedFrame(#[from] FrameError),

    /// Caller-supplied value rejected before anything was sent
    #[error("invalid argument: {0}")]
    Validation(#[from] ValidationError),

    /// Not enough room on the target bank for an upload
    #[error("not enough space in {bank} bank: need {needed} bytes, {free} free")]
    InsufficientSpace { bank: Bank, needed: u64, free: u64 },

    /// Slot holds no file
    #[error("no file in {bank} slot {index}")]
    EmptySlot { bank: Bank, index: u16 },

    /// Another upload already targets this slot
    #[error("upload to {bank} slot {index} already in progress")]
    SlotBusy { bank: Bank, index: u16 },

    /// Local file could not be read or written
    #[error("{}: {source}", path.display())]
    LocalIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Local sink or source failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Session configuration could not be loaded or saved
    #[error("configuration error: {0}")]
    Config(String),
}

impl NomadError {
    /// Wrap a transport failure with the step that hit it
    pub fn transport(operation: &'static str, source: TransportError) -> Self {
        NomadError::Transport { operation, source }
    }

    /// Whether the failure happened on the device channel
    ///
    /// After such an error the device may still have a file selected.
    pub fn is_device_side(&self) -> bool {
        matches!(
            self,
            NomadError::Transport { .. } | NomadError::ShortRead { .. } | NomadError::ShortWrite { .. }
        )
    }
}

/// Result alias for engine operations
pub type Result<T> = std::result::Result<T, NomadError>;
