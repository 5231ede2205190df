//! Nomad Transaction Engine
//!
//! This crate sequences the multi-step exchanges a Nomad player expects
//! over a [`Transport`](nomad_protocol::Transport):
//!
//! - **Directory**: per-slot file info reads and lazy bank listings
//! - **Transfers**: block-chunked downloads and uploads with their select,
//!   ack and end-of-I/O handshakes
//! - **Settings**: model info, memory status, clock, owner and FM presets
//! - **Maintenance**: delete and format
//! - **Session**: a mutex-guarded device handle for use from several
//!   threads, with upload slot reservations
//!
//! # Architecture
//!
//! Every operation is a free function taking `&mut impl Transport`. It
//! blocks on the calling thread until the last request completes and
//! fails on the first error without retrying. [`DeviceSession`] wraps the
//! same functions for callers that share one device.
//!
//! # Example
//!
//! ```rust
//! use nomad_engine::{directory, transfer};
//! use nomad_protocol::Bank;
//! use nomad_sim::VirtualNomad;
//!
//! let mut nomad = VirtualNomad::new();
//! nomad.add_file(Bank::Internal, "intro.mp3", b"ID3".to_vec());
//!
//! for entry in directory::list_bank(&mut nomad, Bank::Internal) {
//!     println!("{}", entry.unwrap());
//! }
//!
//! let mut contents = Vec::new();
//! transfer::download(&mut nomad, Bank::Internal, 0, &mut contents).unwrap();
//! assert_eq!(contents, b"ID3");
//! ```

pub mod config;
pub mod directory;
pub mod error;
pub mod maintenance;
pub mod session;
pub mod settings;
pub mod transfer;
pub mod transport;

pub use config::SessionConfig;
pub use directory::{list_bank, next_free_index, read_entry, BankListing};
pub use error::{NomadError, Result};
pub use maintenance::{delete, format};
pub use session::{DeviceSession, SlotReservation};
pub use settings::{
    get_clock, get_memory_status, get_model_info, get_owner, get_preset_table,
    get_radio_presets, set_clock, set_owner, set_preset,
};
pub use transfer::{
    download, download_entry, download_to_path, upload, upload_from_reader, upload_many,
};
pub use transport::Paced;
