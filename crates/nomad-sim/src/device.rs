//! Virtual player simulation
//!
//! Provides an in-memory player that answers vendor requests the way the
//! firmware does: directory slots, memory accounting, settings, and the
//! select / ack / block / end-of-I/O handshakes for both transfer
//! directions. Protocol misuse is reported as a stall so tests can catch
//! misordered steps.

use std::time::Duration;

use nomad_protocol::codec::round_up;
use nomad_protocol::layout::{
    self, ALIGN, BLOCK_SIZE, DOWNLOAD_HEADER_LEN, FILES_PER_BANK, SELECT_HEADER_LEN,
};
use nomad_protocol::{
    Bank, ClockValue, Command, ControlRequest, DownloadBlock, MemoryStatus, ModelInfo,
    OwnerString, PresetTable, ShortName, Transport, TransportError, UploadSelect,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::journal::{Journal, JournalEntry};

/// A file held by the virtual player
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// Long name
    pub name: String,
    /// Device identifier
    pub short_name: ShortName,
    /// Contents
    pub data: Vec<u8>,
}

/// Configuration for creating a virtual player
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualNomadConfig {
    /// Model name reported by the model info request
    pub model: String,
    /// Firmware version (major, minor, patch)
    pub version: (u8, u8, u8),
    /// Internal capacity in bytes
    pub internal_total: u32,
    /// Card capacity in bytes; zero means no card inserted
    pub external_total: u32,
    /// Initial owner string
    pub owner: String,
    /// Timeout reported when a bulk read has nothing to return
    pub timeout_ms: u64,
}

impl Default for VirtualNomadConfig {
    fn default() -> Self {
        Self {
            model: "NOMAD II MG".to_string(),
            version: (2, 0, 14),
            internal_total: 64 * 1024 * 1024,
            external_total: 0,
            owner: String::new(),
            timeout_ms: 2000,
        }
    }
}

/// What the next bulk write is expected to carry
#[derive(Debug, Clone)]
enum BulkExpect {
    None,
    DownloadSelect(Bank),
    UploadSelect(Bank, [u8; SELECT_HEADER_LEN]),
    UploadBlock(usize),
    DeleteName(Bank),
}

/// The file currently open for transfer
#[derive(Debug, Clone)]
enum Selection {
    Download {
        bank: Bank,
        slot: usize,
        acked: bool,
    },
    Upload {
        bank: Bank,
        select: UploadSelect,
        data: Vec<u8>,
    },
}

/// Injected failures, counted from the moment they are armed
#[derive(Debug, Clone, Default)]
struct Faults {
    fail_control: Option<usize>,
    truncate_bulk_read: Option<(usize, usize)>,
    short_bulk_write: Option<(usize, usize)>,
}

/// A simulated player implementing [`Transport`]
#[derive(Debug)]
pub struct VirtualNomad {
    model: ModelInfo,
    internal_total: u32,
    external_total: u32,
    banks: [Vec<StoredFile>; 2],
    clock: ClockValue,
    owner: OwnerString,
    presets: PresetTable,
    timeout: Duration,

    pending_read: Option<Vec<u8>>,
    expect: BulkExpect,
    selection: Option<Selection>,
    closed_upload: Option<(Bank, StoredFile)>,
    upload_started: bool,

    journal: Journal,
    faults: Faults,
}

impl Default for VirtualNomad {
    fn default() -> Self {
        Self::from_config(VirtualNomadConfig::default())
    }
}

impl VirtualNomad {
    /// Create a player with default settings and empty banks
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a player from configuration
    pub fn from_config(config: VirtualNomadConfig) -> Self {
        let (major, minor, patch) = config.version;
        Self {
            model: ModelInfo {
                name: config.model,
                major,
                minor,
                patch,
            },
            internal_total: config.internal_total,
            external_total: config.external_total,
            banks: [Vec::new(), Vec::new()],
            clock: ClockValue {
                year: 145,
                month: 1,
                day: 1,
                weekday: 1,
                hour: 0,
                minute: 0,
                second: 0,
            },
            owner: OwnerString::new(config.owner).unwrap_or_default(),
            presets: PresetTable::default(),
            timeout: Duration::from_millis(config.timeout_ms),
            pending_read: None,
            expect: BulkExpect::None,
            selection: None,
            closed_upload: None,
            upload_started: false,
            journal: Journal::default(),
            faults: Faults::default(),
        }
    }

    /// Store a file directly, bypassing the protocol
    ///
    /// Returns the short name it was given.
    pub fn add_file(&mut self, bank: Bank, name: &str, data: Vec<u8>) -> ShortName {
        let slot = self.banks[bank as usize].len() as u16;
        let short_name = ShortName::for_upload(bank, slot, name);
        self.banks[bank as usize].push(StoredFile {
            name: name.to_string(),
            short_name,
            data,
        });
        short_name
    }

    /// Files in a bank, in directory order
    pub fn files(&self, bank: Bank) -> &[StoredFile] {
        &self.banks[bank as usize]
    }

    /// One file by slot
    pub fn file(&self, bank: Bank, slot: usize) -> Option<&StoredFile> {
        self.banks[bank as usize].get(slot)
    }

    pub fn clock(&self) -> ClockValue {
        self.clock
    }

    pub fn set_clock(&mut self, clock: ClockValue) {
        self.clock = clock;
    }

    pub fn owner(&self) -> &OwnerString {
        &self.owner
    }

    pub fn presets(&self) -> &PresetTable {
        &self.presets
    }

    pub fn set_presets(&mut self, presets: PresetTable) {
        self.presets = presets;
    }

    /// Insert or remove the memory card
    pub fn set_external_total(&mut self, total: u32) {
        self.external_total = total;
        if total == 0 {
            self.banks[Bank::External as usize].clear();
        }
    }

    /// Timeout applied through [`Transport::set_timeout`]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Memory totals as the device reports them
    ///
    /// Each stored file occupies its size rounded up to 512 bytes.
    pub fn memory_status(&self) -> MemoryStatus {
        let used = |bank: Bank| -> u64 {
            self.banks[bank as usize]
                .iter()
                .map(|f| round_up(f.data.len() as u64, ALIGN))
                .sum()
        };
        let free = |total: u32, bank: Bank| (u64::from(total).saturating_sub(used(bank))) as u32;
        MemoryStatus {
            internal_total: self.internal_total,
            internal_free: free(self.internal_total, Bank::Internal),
            external_total: self.external_total,
            external_free: free(self.external_total, Bank::External),
        }
    }

    /// Whether a transfer is still open (no end-of-I/O seen)
    pub fn has_open_transfer(&self) -> bool {
        self.selection.is_some()
    }

    /// Transport calls seen so far
    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    pub fn clear_journal(&mut self) {
        self.journal.clear();
    }

    /// Fail the `n`th vendor request from now (0 = the next one) with a timeout
    pub fn fail_control_at(&mut self, n: usize) {
        self.faults.fail_control = Some(n);
    }

    /// Return only `len` bytes from the `n`th bulk read from now
    pub fn truncate_bulk_read_at(&mut self, n: usize, len: usize) {
        self.faults.truncate_bulk_read = Some((n, len));
    }

    /// Accept only `len` bytes of the `n`th bulk write from now
    pub fn short_bulk_write_at(&mut self, n: usize, len: usize) {
        self.faults.short_bulk_write = Some((n, len));
    }

    fn stall(command: &str) -> TransportError {
        TransportError::Stall {
            command: command.to_string(),
        }
    }

    fn timeout_error(&self) -> TransportError {
        TransportError::Timeout {
            ms: self.timeout.as_millis() as u64,
        }
    }

    fn bank_from_value(value: u16) -> Result<Bank, TransportError> {
        Bank::try_from((value & 0xFF) as u8).map_err(|_| Self::stall("bank"))
    }

    fn bank_present(&self, bank: Bank) -> bool {
        bank == Bank::Internal || self.external_total != 0
    }

    /// Count down an armed fault; true when it fires on this call
    fn fire(counter: &mut Option<usize>) -> bool {
        match counter {
            Some(0) => {
                *counter = None;
                true
            }
            Some(n) => {
                *n -= 1;
                false
            }
            None => false,
        }
    }

    fn fire_with_len(counter: &mut Option<(usize, usize)>) -> Option<usize> {
        match counter {
            Some((0, len)) => {
                let len = *len;
                *counter = None;
                Some(len)
            }
            Some((n, _)) => {
                *n -= 1;
                None
            }
            None => None,
        }
    }

    fn file_info(&self, bank: Bank, slot: usize) -> Result<Vec<u8>, TransportError> {
        match self.banks[bank as usize].get(slot) {
            Some(f) => layout::encode_file_info(&f.name, &f.short_name, f.data.len() as u32)
                .map(|buf| buf.to_vec())
                .map_err(|_| Self::stall("FILE_INFO name overflow")),
            None => Ok(vec![0u8; layout::FILE_INFO_LEN]),
        }
    }

    fn download_block(&self, block: &DownloadBlock) -> Result<Vec<u8>, TransportError> {
        let (bank, slot) = match &self.selection {
            Some(Selection::Download {
                bank,
                slot,
                acked: true,
            }) => (*bank, *slot),
            _ => return Err(Self::stall("RECV_BLOCK without acknowledged selection")),
        };
        let file = self.banks[bank as usize]
            .get(slot)
            .ok_or_else(|| Self::stall("RECV_BLOCK on removed file"))?;
        let start = block.offset as usize;
        let end = start + block.payload_len as usize;
        if end > file.data.len() || block.block_len() > BLOCK_SIZE {
            return Err(Self::stall("RECV_BLOCK beyond end of file"));
        }

        let mut out = vec![0u8; DOWNLOAD_HEADER_LEN];
        layout::write_block_header(&mut out, block).map_err(|_| Self::stall("RECV_BLOCK"))?;
        out.extend_from_slice(&file.data[start..end]);
        Ok(out)
    }

    /// Copy a fixed-size response into the data stage
    fn respond(
        buf: &mut [u8],
        response: &[u8],
        request: &ControlRequest,
    ) -> Result<(), TransportError> {
        if buf.len() != response.len() {
            return Err(Self::stall(request.command.name()));
        }
        buf.copy_from_slice(response);
        Ok(())
    }

    /// Drop a download selection that points into `bank`
    fn invalidate_selection(&mut self, bank: Bank) {
        if matches!(self.selection, Some(Selection::Download { bank: b, .. }) if b == bank) {
            self.selection = None;
        }
    }

    fn end_file_io(&mut self) {
        match self.selection.take() {
            Some(Selection::Upload { bank, select, data }) => {
                debug!(
                    "Virtual player closed upload {} ({} bytes)",
                    select.long_name,
                    data.len()
                );
                self.closed_upload = Some((
                    bank,
                    StoredFile {
                        name: select.long_name,
                        short_name: select.short_name,
                        data,
                    },
                ));
            }
            Some(Selection::Download { .. }) | None => {}
        }
        self.expect = BulkExpect::None;
    }

    fn end_upload(&mut self) -> Result<(), TransportError> {
        let (bank, file) = self
            .closed_upload
            .take()
            .ok_or_else(|| Self::stall("END_UPLOAD without closed upload"))?;
        if self.banks[bank as usize].len() >= FILES_PER_BANK {
            return Err(Self::stall("END_UPLOAD into full bank"));
        }
        debug!("Virtual player stored {} in {} bank", file.name, bank);
        self.banks[bank as usize].push(file);
        self.upload_started = false;
        Ok(())
    }
}

impl Transport for VirtualNomad {
    fn control_in(
        &mut self,
        request: &ControlRequest,
        buf: &mut [u8],
    ) -> Result<(), TransportError> {
        trace!("Virtual player <- {}", request);
        self.journal.push(JournalEntry::Control {
            request: *request,
            payload: Vec::new(),
        });

        if Self::fire(&mut self.faults.fail_control) {
            return Err(self.timeout_error());
        }
        if buf.len() != usize::from(request.length) {
            return Err(Self::stall(request.command.name()));
        }
        buf.fill(0);

        match request.command {
            Command::Model => self.pending_read = Some(self.model.encode().to_vec()),
            Command::Memory => Self::respond(buf, &self.memory_status().encode(), request)?,
            Command::GetOwner => self.pending_read = Some(self.owner.encode().to_vec()),
            Command::GetClock => Self::respond(buf, &self.clock.encode_response(), request)?,
            Command::GetFmPresets => {
                Self::respond(buf, &self.presets.encode_response(), request)?
            }
            Command::FileAck => {
                if let Some(Selection::Download { acked, .. }) = &mut self.selection {
                    *acked = true;
                }
            }
            Command::StartUpload => {
                self.upload_started = true;
            }
            Command::SendBlock => {
                if !matches!(self.selection, Some(Selection::Upload { .. })) {
                    return Err(Self::stall("SEND_BLOCK without upload selection"));
                }
                let len = usize::from(request.value);
                if len == 0 || len > BLOCK_SIZE {
                    return Err(Self::stall("SEND_BLOCK length"));
                }
                self.expect = BulkExpect::UploadBlock(len);
            }
            Command::EndFileIo => self.end_file_io(),
            Command::EndUpload => self.end_upload()?,
            Command::Format => {
                if request.value & 0xFF00 != 0x200 {
                    return Err(Self::stall("FORMAT value"));
                }
                let bank = Self::bank_from_value(request.value)?;
                debug!("Virtual player formatting {} bank", bank);
                self.banks[bank as usize].clear();
                self.invalidate_selection(bank);
            }
            other => return Err(Self::stall(other.name())),
        }
        Ok(())
    }

    fn control_out(
        &mut self,
        request: &ControlRequest,
        payload: &[u8],
    ) -> Result<(), TransportError> {
        trace!("Virtual player <- {} ({} bytes)", request, payload.len());
        self.journal.push(JournalEntry::Control {
            request: *request,
            payload: payload.to_vec(),
        });

        if Self::fire(&mut self.faults.fail_control) {
            return Err(self.timeout_error());
        }
        if payload.len() != usize::from(request.length) {
            return Err(Self::stall(request.command.name()));
        }
        let malformed = |_| Self::stall(request.command.name());

        match request.command {
            Command::FileInfo => {
                let bank = Self::bank_from_value(request.value)?;
                self.pending_read = Some(self.file_info(bank, usize::from(request.index))?);
            }
            Command::SelectFile => {
                let bank = Self::bank_from_value(request.value)?;
                if !self.bank_present(bank) {
                    return Err(Self::stall("SELECT_FILE on missing card"));
                }
                if request.value & 0x100 != 0 {
                    self.expect = BulkExpect::DownloadSelect(bank);
                } else {
                    if !self.upload_started {
                        return Err(Self::stall("SELECT_FILE before START_UPLOAD"));
                    }
                    let header: [u8; SELECT_HEADER_LEN] =
                        payload.try_into().map_err(|_| Self::stall("SELECT_FILE"))?;
                    self.expect = BulkExpect::UploadSelect(bank, header);
                }
            }
            Command::RecvBlock => {
                let block = DownloadBlock::decode_request(payload).map_err(malformed)?;
                self.pending_read = Some(self.download_block(&block)?);
            }
            Command::SetOwner => {
                self.owner = OwnerString::decode(payload).map_err(malformed)?;
            }
            Command::SetClock => {
                self.clock = ClockValue::decode_request(payload).map_err(malformed)?;
            }
            Command::SetFmPresets => {
                self.presets = PresetTable::decode_body(payload).map_err(malformed)?;
            }
            Command::DeleteFile => {
                let bank = Self::bank_from_value(request.value)?;
                self.expect = BulkExpect::DeleteName(bank);
            }
            other => return Err(Self::stall(other.name())),
        }
        Ok(())
    }

    fn bulk_write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        trace!("Virtual player <- bulk {} bytes", data.len());
        self.journal.push(JournalEntry::BulkWrite {
            data: data.to_vec(),
        });

        if let Some(accepted) = Self::fire_with_len(&mut self.faults.short_bulk_write) {
            self.expect = BulkExpect::None;
            return Ok(accepted.min(data.len()));
        }

        match std::mem::replace(&mut self.expect, BulkExpect::None) {
            BulkExpect::DownloadSelect(bank) => {
                let slot = self.banks[bank as usize]
                    .iter()
                    .position(|f| f.short_name.as_bytes()[..] == *data)
                    .ok_or_else(|| Self::stall("SELECT_FILE unknown short name"))?;
                self.selection = Some(Selection::Download {
                    bank,
                    slot,
                    acked: false,
                });
            }
            BulkExpect::UploadSelect(bank, header) => {
                let select = UploadSelect::decode(&header, data)
                    .map_err(|_| Self::stall("SELECT_FILE payload"))?;
                self.selection = Some(Selection::Upload {
                    bank,
                    select,
                    data: Vec::new(),
                });
            }
            BulkExpect::UploadBlock(len) => {
                if data.len() != len {
                    return Err(Self::stall("SEND_BLOCK length mismatch"));
                }
                match &mut self.selection {
                    Some(Selection::Upload { data: stored, .. }) => stored.extend_from_slice(data),
                    _ => return Err(Self::stall("SEND_BLOCK without upload selection")),
                }
            }
            BulkExpect::DeleteName(bank) => {
                let files = &mut self.banks[bank as usize];
                let slot = files
                    .iter()
                    .position(|f| f.short_name.as_bytes()[..] == *data)
                    .ok_or_else(|| Self::stall("DELETE_FILE unknown short name"))?;
                let removed = files.remove(slot);
                debug!("Virtual player deleted {} from {} bank", removed.name, bank);
                self.invalidate_selection(bank);
            }
            BulkExpect::None => return Err(Self::stall("unexpected bulk write")),
        }
        Ok(data.len())
    }

    fn bulk_read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let pending = match self.pending_read.take() {
            Some(pending) => pending,
            None => {
                self.journal.push(JournalEntry::BulkRead {
                    requested: buf.len(),
                    returned: 0,
                });
                return Err(self.timeout_error());
            }
        };

        let mut n = pending.len().min(buf.len());
        if let Some(len) = Self::fire_with_len(&mut self.faults.truncate_bulk_read) {
            n = n.min(len);
        }
        buf[..n].copy_from_slice(&pending[..n]);
        trace!("Virtual player -> bulk {} of {} bytes", n, buf.len());
        self.journal.push(JournalEntry::BulkRead {
            requested: buf.len(),
            returned: n,
        });
        Ok(n)
    }

    fn set_timeout(&mut self, timeout: Duration) -> Result<(), TransportError> {
        self.timeout = timeout;
        Ok(())
    }
}
