//! Vendor command catalogue and control request descriptors
//!
//! Every exchange with the player starts with a vendor request on the
//! control sub-channel:
//!
//! ```text
//! [direction] [command] [value:u16] [index:u16] [length:u16] [data...]
//! ```
//!
//! `value` and `index` carry the two command parameters (bank, slot,
//! block length, ...). `length` is the size of the data stage, which is
//! sent to the device for [`Direction::Out`] and returned by it for
//! [`Direction::In`]. Larger payloads follow on the bulk sub-channels.

use crate::error::FrameError;

/// Vendor command codes understood by the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Command {
    /// Read one directory slot (value = bank, index = slot)
    FileInfo = 0x02,
    /// Select a file for transfer (value = bank, 0x100 | bank for reads)
    SelectFile = 0x03,
    /// Close the selected file
    EndFileIo = 0x04,
    /// Announce an upload block (value = byte count)
    SendBlock = 0x05,
    /// Request a download block
    RecvBlock = 0x06,
    /// Delete the file whose short name follows on the bulk channel
    DeleteFile = 0x08,
    /// Reorder directory entries
    Reorder = 0x0A,
    /// Memory totals and free space
    Memory = 0x0D,
    /// Model name and firmware version
    Model = 0x0E,
    /// Format a bank (value = 0x200 | bank)
    Format = 0x0F,
    /// Commit an upload
    EndUpload = 0x10,
    /// Read the clock
    GetClock = 0x11,
    /// Set the clock
    SetClock = 0x12,
    /// Read the owner string
    GetOwner = 0x1C,
    /// Set the owner string
    SetOwner = 0x1D,
    /// Read the FM preset table
    GetFmPresets = 0x1E,
    /// Write the FM preset table
    SetFmPresets = 0x1F,
    /// Start a download session
    StartDownload = 0x25,
    /// Start an upload session
    StartUpload = 0x28,
    /// Acknowledge / poll for file readiness
    FileAck = 0xF0,
}

impl Command {
    /// Raw command code as sent in the request
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Short mnemonic for logs and error context
    pub fn name(self) -> &'static str {
        match self {
            Self::FileInfo => "FILE_INFO",
            Self::SelectFile => "SELECT_FILE",
            Self::EndFileIo => "END_FILEIO",
            Self::SendBlock => "SEND_BLOCK",
            Self::RecvBlock => "RECV_BLOCK",
            Self::DeleteFile => "DELETE_FILE",
            Self::Reorder => "REORDER",
            Self::Memory => "MEMORY",
            Self::Model => "MODEL",
            Self::Format => "FORMAT",
            Self::EndUpload => "END_UPLOAD",
            Self::GetClock => "GET_CLOCK",
            Self::SetClock => "SET_CLOCK",
            Self::GetOwner => "GET_OWNER",
            Self::SetOwner => "SET_OWNER",
            Self::GetFmPresets => "GET_FM_PRESETS",
            Self::SetFmPresets => "SET_FM_PRESETS",
            Self::StartDownload => "START_DOWNLOAD",
            Self::StartUpload => "START_UPLOAD",
            Self::FileAck => "FILE_ACK",
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = FrameError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x02 => Ok(Self::FileInfo),
            0x03 => Ok(Self::SelectFile),
            0x04 => Ok(Self::EndFileIo),
            0x05 => Ok(Self::SendBlock),
            0x06 => Ok(Self::RecvBlock),
            0x08 => Ok(Self::DeleteFile),
            0x0A => Ok(Self::Reorder),
            0x0D => Ok(Self::Memory),
            0x0E => Ok(Self::Model),
            0x0F => Ok(Self::Format),
            0x10 => Ok(Self::EndUpload),
            0x11 => Ok(Self::GetClock),
            0x12 => Ok(Self::SetClock),
            0x1C => Ok(Self::GetOwner),
            0x1D => Ok(Self::SetOwner),
            0x1E => Ok(Self::GetFmPresets),
            0x1F => Ok(Self::SetFmPresets),
            0x25 => Ok(Self::StartDownload),
            0x28 => Ok(Self::StartUpload),
            0xF0 => Ok(Self::FileAck),
            _ => Err(FrameError::UnknownCommand(value)),
        }
    }
}

impl std::fmt::Display for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Direction of the control data stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Host to device (vendor write)
    Out,
    /// Device to host (vendor read)
    In,
}

/// A vendor request on the control sub-channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ControlRequest {
    /// Data stage direction
    pub direction: Direction,
    /// Vendor command
    pub command: Command,
    /// First parameter
    pub value: u16,
    /// Second parameter
    pub index: u16,
    /// Data stage length in bytes
    pub length: u16,
}

impl ControlRequest {
    /// Vendor read request
    pub const fn read(command: Command, value: u16, index: u16, length: u16) -> Self {
        Self {
            direction: Direction::In,
            command,
            value,
            index,
            length,
        }
    }

    /// Vendor write request
    pub const fn write(command: Command, value: u16, index: u16, length: u16) -> Self {
        Self {
            direction: Direction::Out,
            command,
            value,
            index,
            length,
        }
    }

    /// The one-byte acknowledgment poll used between transfer steps
    pub const fn file_ack() -> Self {
        Self::read(Command::FileAck, 0, 0, 1)
    }

    /// Whether the data stage flows from the device to the host
    pub fn is_read(&self) -> bool {
        self.direction == Direction::In
    }
}

impl std::fmt::Display for ControlRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dir = match self.direction {
            Direction::Out => "OUT",
            Direction::In => "IN",
        };
        write!(
            f,
            "{} {}(0x{:02X}) value=0x{:04X} index=0x{:04X} len={}",
            dir,
            self.command.name(),
            self.command.code(),
            self.value,
            self.index,
            self.length
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_codes_round_trip() {
        for code in 0u8..=0xFF {
            if let Ok(cmd) = Command::try_from(code) {
                assert_eq!(cmd.code(), code);
            }
        }
        assert_eq!(Command::try_from(0xF0), Ok(Command::FileAck));
        assert_eq!(Command::try_from(0x28), Ok(Command::StartUpload));
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(
            Command::try_from(0x01),
            Err(FrameError::UnknownCommand(0x01))
        );
    }

    #[test]
    fn test_request_display() {
        let req = ControlRequest::write(Command::SelectFile, 0x101, 0, 12);
        assert_eq!(
            req.to_string(),
            "OUT SELECT_FILE(0x03) value=0x0101 index=0x0000 len=12"
        );
        assert!(!req.is_read());
        assert!(ControlRequest::file_ack().is_read());
    }
}
