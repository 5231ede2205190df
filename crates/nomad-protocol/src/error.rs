//! Error types for Nomad frame decoding, value validation and transport I/O

use thiserror::Error;

/// Errors raised while decoding a fixed-layout frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Buffer too short for a field at the given offset
    #[error("truncated frame: {width}-byte field at offset {offset} exceeds {len}-byte buffer")]
    Truncated {
        offset: usize,
        width: usize,
        len: usize,
    },

    /// Unknown vendor command code
    #[error("unknown command code: 0x{0:02X}")]
    UnknownCommand(u8),
}

/// Caller-supplied value outside the range the protocol can carry
///
/// These are raised before anything is sent to the device.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Bank selector other than 0 (internal) or 1 (external)
    #[error("bank {0} is not valid (expected 0 or 1)")]
    Bank(u8),

    /// File slot index outside 0..64
    #[error("file index {index} is out of range (max {max})")]
    FileIndex { index: usize, max: usize },

    /// Every file slot in the bank is taken
    #[error("no free file slot left in the {0} bank")]
    BankFull(&'static str),

    /// Owner string does not fit the 64-byte buffer with its terminator
    #[error("owner string is too long: {len} bytes (max {max})")]
    OwnerTooLong { len: usize, max: usize },

    /// Text exceeds a fixed UTF-16 field
    #[error("name is too long: {units} code units (max {max})")]
    NameTooLong { units: usize, max: usize },

    /// File does not fit the 32-bit size field
    #[error("file is too large: {size} bytes (max {max})")]
    FileTooLarge { size: u64, max: u64 },

    /// Source path has no usable file name component
    #[error("source path has no file name")]
    MissingFileName,

    /// Preset slot outside 0..32
    #[error("{0}: not valid as preset index")]
    PresetIndex(usize),

    /// Preset frequency outside the tuner range
    #[error("{mhz}.{fraction:02}: invalid frequency")]
    Frequency { mhz: u32, fraction: u32 },

    /// Preset specification could not be parsed
    #[error("invalid radio preset specification: {0}")]
    PresetSpec(String),

    /// Clock field outside its calendar range
    #[error("clock {field} {value} is out of range")]
    ClockField { field: &'static str, value: i64 },

    /// Clock text could not be parsed
    #[error("cannot parse time: {0}")]
    ClockSpec(String),
}

/// Channel-level failure reported by a [`Transport`](crate::Transport)
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request did not complete within the configured timeout
    #[error("timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Device went away
    #[error("device disconnected")]
    Disconnected,

    /// Device refused the request
    #[error("device stalled on {command}")]
    Stall { command: String },

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
