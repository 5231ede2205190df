//! Nomad Protocol Library
//!
//! This crate provides the wire-level pieces of the vendor protocol spoken
//! by Nomad-family portable media players over their USB control and bulk
//! endpoints:
//!
//! - **Frame codec**: little-endian integers, NUL-terminated and UTF-16
//!   string fields at fixed offsets
//! - **Command catalogue**: vendor command codes and control request
//!   descriptors
//! - **Layouts**: sizes, offsets and encoders/decoders for every request
//!   and response buffer
//! - **Data model**: directory entries, memory status, clock, owner string,
//!   FM presets and model info
//! - **Transport**: the channel contract the transaction engine drives
//!
//! # Example
//!
//! ```rust
//! use nomad_protocol::{layout, Bank, FileEntry, ShortName};
//!
//! // A file info response as the player would send it
//! let short = ShortName::from_text("IO00~000MP3");
//! let raw = layout::encode_file_info("track01.mp3", &short, 3_145_728).unwrap();
//!
//! let entry = FileEntry::decode(Bank::Internal, 0, &raw).unwrap();
//! assert_eq!(entry.name, "track01.mp3");
//! assert_eq!(entry.size, 3_145_728);
//! ```

pub mod codec;
pub mod command;
pub mod error;
pub mod layout;
pub mod models;
pub mod transport;

pub use command::{Command, ControlRequest, Direction};
pub use error::{FrameError, TransportError, ValidationError};
pub use layout::{DownloadBlock, DownloadPlan, UploadSelect};
pub use models::{
    check_file_index, Bank, ClockValue, FileEntry, MemoryStatus, ModelInfo, OwnerString,
    PresetFrequency, PresetTable, RadioPreset, ShortName,
};
pub use transport::Transport;
