//! Wire layouts
//!
//! Sizes and offsets of every fixed-layout buffer the player exchanges,
//! with the encoders and decoders that move the data model in and out of
//! them.
//!
//! # File info response (0x215 bytes)
//! ```text
//! [hdr] [long name: 256 x u16 LE] [short name: 11] [size: u32 LE] [reserved]
//!   0    1                         513              524             528
//! ```
//!
//! # Download block (up to 16384 bytes)
//! ```text
//! [offset: u32 LE] [payload len: u32 LE] [56 bytes echo] [payload...]
//! ```
//!
//! # Upload select header (12 bytes)
//! ```text
//! [0 0] [name bytes: u16 LE] [F3 30 9F 29] [size: u32 LE]
//! ```

use std::path::Path;

use crate::codec::{
    decode_cstr, decode_utf16_field, encode_utf16_field, encode_utf16_units, get_array, get_u16, get_u32, put_bytes,
    put_u32,
};
use crate::error::{FrameError, ValidationError};
use crate::models::{
    Bank, ClockValue, FileEntry, MemoryStatus, ModelInfo, OwnerString, PresetTable, ShortName,
};

/// Largest block moved in one transfer step, header included
pub const BLOCK_SIZE: usize = 16384;
/// Header that precedes every download block
pub const DOWNLOAD_HEADER_LEN: usize = 64;
/// Largest payload carried by one download block
pub const DOWNLOAD_PAYLOAD_MAX: usize = BLOCK_SIZE - DOWNLOAD_HEADER_LEN;
/// Significant header bytes sent with a receive-block request
pub const RECV_BLOCK_REQUEST_LEN: usize = 8;
/// Allocation unit for free-space checks
pub const ALIGN: u64 = 512;

/// Directory slots per bank
pub const FILES_PER_BANK: usize = 64;
/// Long name capacity in UTF-16 code units
pub const NAME_UNITS: usize = 256;
/// Short name width in bytes
pub const SHORT_NAME_LEN: usize = 11;

/// File info response size
pub const FILE_INFO_LEN: usize = 0x215;
/// Probe bytes sent with a file info request
pub const FILE_INFO_PROBE_LEN: usize = 2;
pub const FILE_NAME_OFFSET: usize = 1;
pub const FILE_SHORT_NAME_OFFSET: usize = 513;
pub const FILE_SIZE_OFFSET: usize = 524;

/// Memory status response size
pub const MEMORY_LEN: usize = 0x11;
pub const MEMORY_OFFSET: usize = 1;

/// Clock response size
pub const CLOCK_READ_LEN: usize = 0x11;
/// Clock request size
pub const CLOCK_WRITE_LEN: usize = 14;
pub const CLOCK_OFFSET: usize = 1;

/// Owner buffer size, terminator included
pub const OWNER_LEN: usize = 64;

/// Number of FM presets
pub const PRESET_COUNT: usize = 32;
/// Preset table response size
pub const PRESET_READ_LEN: usize = 65;
/// Preset table request size
pub const PRESET_WRITE_LEN: usize = 64;
pub const PRESET_OFFSET: usize = 1;

/// Model info response size
pub const MODEL_INFO_LEN: usize = 0x74;
pub const MODEL_NAME_OFFSET: usize = 48;
const MODEL_VERSION_OFFSETS: [usize; 3] = [1, 3, 5];

/// Select-file header size (both directions)
pub const SELECT_HEADER_LEN: usize = 12;
/// Marker at bytes 4..8 of the upload select header
pub const UPLOAD_MAGIC: [u8; 4] = [0xF3, 0x30, 0x9F, 0x29];
/// Start-upload probe response size
pub const START_UPLOAD_LEN: usize = 18;

const DEFAULT_EXTENSION: &str = "MP3";

impl FileEntry {
    /// Decode a file info response for slot `index` of `bank`
    pub fn decode(bank: Bank, index: u16, buf: &[u8]) -> Result<Self, FrameError> {
        Ok(Self {
            bank,
            index,
            name: decode_utf16_field(buf, FILE_NAME_OFFSET, NAME_UNITS)?,
            short_name: ShortName(get_array(buf, FILE_SHORT_NAME_OFFSET)?),
            size: get_u32(buf, FILE_SIZE_OFFSET)?,
        })
    }
}

impl MemoryStatus {
    /// Decode a memory status response
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        Ok(Self {
            internal_total: get_u32(buf, MEMORY_OFFSET)?,
            internal_free: get_u32(buf, MEMORY_OFFSET + 4)?,
            external_total: get_u32(buf, MEMORY_OFFSET + 8)?,
            external_free: get_u32(buf, MEMORY_OFFSET + 12)?,
        })
    }

    /// Encode as a memory status response (device side)
    pub fn encode(&self) -> [u8; MEMORY_LEN] {
        let mut buf = [0u8; MEMORY_LEN];
        let fields = [
            self.internal_total,
            self.internal_free,
            self.external_total,
            self.external_free,
        ];
        for (i, value) in fields.into_iter().enumerate() {
            let at = MEMORY_OFFSET + i * 4;
            buf[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
        buf
    }
}

impl ClockValue {
    fn fields(&self) -> [u16; 7] {
        [
            self.year,
            self.month,
            self.day,
            self.weekday,
            self.hour,
            self.minute,
            self.second,
        ]
    }

    fn from_fields(buf: &[u8], offset: usize) -> Result<Self, FrameError> {
        let field = |i: usize| get_u16(buf, offset + i * 2);
        Ok(Self {
            year: field(0)?,
            month: field(1)?,
            day: field(2)?,
            weekday: field(3)?,
            hour: field(4)?,
            minute: field(5)?,
            second: field(6)?,
        })
    }

    /// Decode a 17-byte clock response
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        Self::from_fields(buf, CLOCK_OFFSET)
    }

    /// Decode a 14-byte set-clock request (device side)
    pub fn decode_request(buf: &[u8]) -> Result<Self, FrameError> {
        Self::from_fields(buf, 0)
    }

    /// Encode as a 14-byte set-clock request
    pub fn encode(&self) -> [u8; CLOCK_WRITE_LEN] {
        let mut buf = [0u8; CLOCK_WRITE_LEN];
        for (i, value) in self.fields().into_iter().enumerate() {
            buf[i * 2..i * 2 + 2].copy_from_slice(&value.to_le_bytes());
        }
        buf
    }

    /// Encode as a 17-byte clock response (device side)
    pub fn encode_response(&self) -> [u8; CLOCK_READ_LEN] {
        let mut buf = [0u8; CLOCK_READ_LEN];
        buf[CLOCK_OFFSET..CLOCK_OFFSET + CLOCK_WRITE_LEN].copy_from_slice(&self.encode());
        buf
    }
}

impl OwnerString {
    /// Decode the 64-byte owner buffer
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        Ok(OwnerString(decode_cstr(buf, 0, Self::MAX_LEN)?))
    }

    /// Encode into the 64-byte owner buffer, NUL-terminated
    pub fn encode(&self) -> [u8; OWNER_LEN] {
        let mut buf = [0u8; OWNER_LEN];
        let bytes = self.as_str().as_bytes();
        buf[..bytes.len()].copy_from_slice(bytes);
        buf
    }
}

impl PresetTable {
    /// Decode the 65-byte preset response
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        let mut table = [0u16; PRESET_COUNT];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = get_u16(buf, PRESET_OFFSET + i * 2)?;
        }
        Ok(Self(table))
    }

    /// Decode the 64-byte table body (device side)
    pub fn decode_body(buf: &[u8]) -> Result<Self, FrameError> {
        let mut table = [0u16; PRESET_COUNT];
        for (i, slot) in table.iter_mut().enumerate() {
            *slot = get_u16(buf, i * 2)?;
        }
        Ok(Self(table))
    }

    /// Encode the 64-byte table body, header byte excluded
    pub fn encode(&self) -> [u8; PRESET_WRITE_LEN] {
        let mut buf = [0u8; PRESET_WRITE_LEN];
        for (i, value) in self.0.iter().enumerate() {
            buf[i * 2..i * 2 + 2].copy_from_slice(&value.to_le_bytes());
        }
        buf
    }

    /// Encode as a 65-byte preset response (device side)
    pub fn encode_response(&self) -> [u8; PRESET_READ_LEN] {
        let mut buf = [0u8; PRESET_READ_LEN];
        buf[PRESET_OFFSET..].copy_from_slice(&self.encode());
        buf
    }
}

impl ModelInfo {
    /// Decode the 0x74-byte model info response
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        let [major, minor, patch] = MODEL_VERSION_OFFSETS.map(|offset| buf.get(offset).copied());
        let truncated = |offset| FrameError::Truncated {
            offset,
            width: 1,
            len: buf.len(),
        };
        Ok(Self {
            name: decode_cstr(buf, MODEL_NAME_OFFSET, MODEL_INFO_LEN - MODEL_NAME_OFFSET)?,
            major: major.ok_or_else(|| truncated(MODEL_VERSION_OFFSETS[0]))?,
            minor: minor.ok_or_else(|| truncated(MODEL_VERSION_OFFSETS[1]))?,
            patch: patch.ok_or_else(|| truncated(MODEL_VERSION_OFFSETS[2]))?,
        })
    }

    /// Encode as a model info response (device side)
    pub fn encode(&self) -> [u8; MODEL_INFO_LEN] {
        let mut buf = [0u8; MODEL_INFO_LEN];
        buf[MODEL_VERSION_OFFSETS[0]] = self.major;
        buf[MODEL_VERSION_OFFSETS[1]] = self.minor;
        buf[MODEL_VERSION_OFFSETS[2]] = self.patch;
        let name = self.name.as_bytes();
        let n = name.len().min(MODEL_INFO_LEN - MODEL_NAME_OFFSET - 1);
        buf[MODEL_NAME_OFFSET..MODEL_NAME_OFFSET + n].copy_from_slice(&name[..n]);
        buf
    }
}

/// Encode a file info response (device side)
///
/// The name must fit the field with its terminator.
pub fn encode_file_info(
    name: &str,
    short_name: &ShortName,
    size: u32,
) -> Result<[u8; FILE_INFO_LEN], ValidationError> {
    let encoded = encode_utf16_field(name, NAME_UNITS)?;
    let mut buf = [0u8; FILE_INFO_LEN];
    buf[FILE_NAME_OFFSET..FILE_NAME_OFFSET + encoded.len()].copy_from_slice(&encoded);
    buf[FILE_SHORT_NAME_OFFSET..FILE_SHORT_NAME_OFFSET + SHORT_NAME_LEN]
        .copy_from_slice(short_name.as_bytes());
    buf[FILE_SIZE_OFFSET..FILE_SIZE_OFFSET + 4].copy_from_slice(&size.to_le_bytes());
    Ok(buf)
}

/// One download step: where it starts and how much payload it carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadBlock {
    /// Byte offset of the payload within the file
    pub offset: u32,
    /// Payload bytes carried after the header
    pub payload_len: u32,
}

impl DownloadBlock {
    /// Bytes read back from the device for this block, header included
    pub fn block_len(&self) -> usize {
        self.payload_len as usize + DOWNLOAD_HEADER_LEN
    }

    /// Header bytes sent with the receive-block request
    pub fn encode_request(&self) -> [u8; RECV_BLOCK_REQUEST_LEN] {
        let mut buf = [0u8; RECV_BLOCK_REQUEST_LEN];
        buf[..4].copy_from_slice(&self.offset.to_le_bytes());
        buf[4..].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    /// Decode a receive-block request (device side)
    pub fn decode_request(buf: &[u8]) -> Result<Self, FrameError> {
        Ok(Self {
            offset: get_u32(buf, 0)?,
            payload_len: get_u32(buf, 4)?,
        })
    }
}

/// Iterator over the download blocks of a file of a given size
///
/// Each block carries `min(remaining, 16320)` payload bytes; the sum of
/// payloads equals the file size exactly and a zero-byte file has no
/// blocks.
#[derive(Debug, Clone)]
pub struct DownloadPlan {
    offset: u32,
    remaining: u32,
}

impl DownloadPlan {
    pub fn new(size: u32) -> Self {
        Self {
            offset: 0,
            remaining: size,
        }
    }

    /// Bytes not yet covered by a yielded block
    pub fn remaining(&self) -> u32 {
        self.remaining
    }
}

impl Iterator for DownloadPlan {
    type Item = DownloadBlock;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        let block_len = (self.remaining as usize + DOWNLOAD_HEADER_LEN).min(BLOCK_SIZE);
        let payload_len = (block_len - DOWNLOAD_HEADER_LEN) as u32;
        let block = DownloadBlock {
            offset: self.offset,
            payload_len,
        };
        self.offset += payload_len;
        self.remaining -= payload_len;
        Some(block)
    }
}

/// Three-letter extension used in a synthesized short name
///
/// Upper-cased; `MP3` when the name has no extension or a longer one.
pub fn upload_extension(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) if !ext.is_empty() && ext.len() <= 3 => ext.to_ascii_uppercase(),
        _ => DEFAULT_EXTENSION.to_string(),
    }
}

impl ShortName {
    /// Synthesize the short name for an upload into `bank`/`index`
    ///
    /// `IO` + two-digit bank + `~` + three-digit index + extension.
    pub fn for_upload(bank: Bank, index: u16, file_name: &str) -> Self {
        ShortName::from_text(&format!(
            "IO{:02}~{:03}{}",
            bank.number(),
            index,
            upload_extension(file_name)
        ))
    }
}

/// Everything the select-file step of an upload sends
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSelect {
    /// Device-side identifier
    pub short_name: ShortName,
    /// Base name of the source file
    pub long_name: String,
    /// File size in bytes
    pub size: u32,
}

impl UploadSelect {
    /// Prepare the select step for `source` going into `bank`/`index`
    ///
    /// Only the final path component is sent to the device.
    pub fn new(bank: Bank, index: u16, source: &Path, size: u32) -> Result<Self, ValidationError> {
        let long_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty())
            .ok_or(ValidationError::MissingFileName)?;
        Self::with_name(bank, index, long_name, size)
    }

    /// Prepare the select step for a file called `long_name`
    pub fn with_name(
        bank: Bank,
        index: u16,
        long_name: impl Into<String>,
        size: u32,
    ) -> Result<Self, ValidationError> {
        let long_name = long_name.into();
        let units = long_name.encode_utf16().count();
        if units == 0 {
            return Err(ValidationError::MissingFileName);
        }
        if units > NAME_UNITS {
            return Err(ValidationError::NameTooLong {
                units,
                max: NAME_UNITS,
            });
        }
        Ok(Self {
            short_name: ShortName::for_upload(bank, index, &long_name),
            long_name,
            size,
        })
    }

    /// The 12-byte header sent with the select-file request
    pub fn encode_header(&self) -> [u8; SELECT_HEADER_LEN] {
        let mut buf = [0u8; SELECT_HEADER_LEN];
        let name_len = (self.long_name.encode_utf16().count() * 2) as u16;
        buf[2..4].copy_from_slice(&name_len.to_le_bytes());
        buf[4..8].copy_from_slice(&UPLOAD_MAGIC);
        buf[8..12].copy_from_slice(&self.size.to_le_bytes());
        buf
    }

    /// Short name followed by the UTF-16LE long name, no terminator
    pub fn encode_payload(&self) -> Vec<u8> {
        let mut payload = self.short_name.as_bytes().to_vec();
        payload.extend(encode_utf16_units(&self.long_name));
        payload
    }

    /// Decode a select header and payload (device side)
    pub fn decode(header: &[u8], payload: &[u8]) -> Result<Self, FrameError> {
        let name_len = usize::from(get_u16(header, 2)?);
        let size = get_u32(header, 8)?;
        let short_name = ShortName(get_array(payload, 0)?);
        let units = (0..name_len / 2)
            .map(|i| get_u16(payload, SHORT_NAME_LEN + i * 2))
            .collect::<Result<Vec<_>, _>>()?;
        let long_name = char::decode_utf16(units)
            .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
            .collect();
        Ok(Self {
            short_name,
            long_name,
            size,
        })
    }
}

/// Scratch header for a read-direction select request (zeroed)
pub fn download_select_header() -> [u8; SELECT_HEADER_LEN] {
    [0u8; SELECT_HEADER_LEN]
}

/// Write the 64-byte header that opens a download block (device side)
pub fn write_block_header(buf: &mut [u8], block: &DownloadBlock) -> Result<(), FrameError> {
    put_u32(buf, 0, block.offset)?;
    put_u32(buf, 4, block.payload_len)?;
    put_bytes(
        buf,
        RECV_BLOCK_REQUEST_LEN,
        &[0u8; DOWNLOAD_HEADER_LEN - RECV_BLOCK_REQUEST_LEN],
    )
}
