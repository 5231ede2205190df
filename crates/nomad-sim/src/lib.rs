//! Nomad Simulation Library
//!
//! This crate provides a simulated player for exercising the transfer
//! engine without hardware. It includes:
//!
//! - **VirtualNomad**: an in-memory player implementing
//!   [`nomad_protocol::Transport`] with the device's select / ack / block
//!   handshakes, directory, memory accounting and settings
//! - **Journal**: an ordered record of every transport call, for asserting
//!   on exact request sequences
//!
//! # Example
//!
//! ```rust
//! use nomad_protocol::{Bank, Command, ControlRequest, Transport};
//! use nomad_sim::VirtualNomad;
//!
//! let mut nomad = VirtualNomad::new();
//! nomad.add_file(Bank::Internal, "intro.mp3", vec![0u8; 1000]);
//!
//! let mut buf = [0u8; 0x11];
//! nomad
//!     .control_in(&ControlRequest::read(Command::Memory, 0, 0, 0x11), &mut buf)
//!     .unwrap();
//!
//! assert_eq!(nomad.journal().commands(), vec![Command::Memory]);
//! ```

pub mod device;
pub mod journal;

pub use device::{StoredFile, VirtualNomad, VirtualNomadConfig};
pub use journal::{Journal, JournalEntry};
