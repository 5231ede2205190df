//! Block transfer engine
//!
//! Moves file contents between the host and the player in blocks of at
//! most 16384 bytes.
//!
//! # Download
//!
//! ```text
//! ResolveMetadata -> SelectFile -> AwaitAck -> TransferBlock* -> Finalize
//! ```
//!
//! Every block read back starts with a 64-byte header echo; the rest is
//! payload. The payloads add up to the file size exactly.
//!
//! # Upload
//!
//! ```text
//! Stat -> CheckSpace -> StartUpload -> SelectFile -> TransferBlock* -> Finalize -> EndUpload
//! ```
//!
//! Each upload block is preceded by an ack poll and a send-block request
//! announcing its length.
//!
//! Any failure aborts the transaction. The player has no resync command,
//! so after a failure past `SelectFile` it may still hold the file open.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use nomad_protocol::codec::round_up;
use nomad_protocol::layout::{
    self, ALIGN, BLOCK_SIZE, DOWNLOAD_HEADER_LEN, RECV_BLOCK_REQUEST_LEN, SELECT_HEADER_LEN,
    START_UPLOAD_LEN,
};
use nomad_protocol::{
    check_file_index, Bank, Command, ControlRequest, DownloadPlan, FileEntry, Transport,
    UploadSelect, ValidationError,
};
use tracing::{debug, info, trace, warn};

use crate::directory::{next_free_index, read_entry};
use crate::error::{NomadError, Result};
use crate::settings::get_memory_status;
use crate::transport::{control_read, control_write, file_ack, read_exact_bulk, write_all_bulk};

/// Download transaction steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadState {
    ResolveMetadata,
    SelectFile,
    AwaitAck,
    TransferBlock { offset: u32 },
    Finalize,
}

/// Upload transaction steps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadState {
    Stat,
    CheckSpace,
    StartUpload,
    SelectFile,
    TransferBlock { offset: u64 },
    Finalize,
    EndUpload,
}

impl UploadState {
    /// Whether the device has an upload open at this step
    fn device_engaged(self) -> bool {
        !matches!(self, Self::Stat | Self::CheckSpace)
    }
}

/// Download the file in `bank`/`index` into `sink`
///
/// Returns the directory entry of the downloaded file.
pub fn download<T, W>(transport: &mut T, bank: Bank, index: usize, sink: &mut W) -> Result<FileEntry>
where
    T: Transport + ?Sized,
    W: Write + ?Sized,
{
    debug!("download: {:?}", DownloadState::ResolveMetadata);
    let entry = resolve(transport, bank, index)?;
    download_entry(transport, &entry, sink)?;
    Ok(entry)
}

/// Download the file in `bank`/`index` to a local path
///
/// When `dest` is an existing directory the file is written inside it
/// under its long name. Returns the path written.
///
/// Data lands in a `.part` file next to the destination and is renamed
/// over it only once the transfer completes, so a failed download leaves
/// any existing file untouched.
pub fn download_to_path<T: Transport + ?Sized>(
    transport: &mut T,
    bank: Bank,
    index: usize,
    dest: &Path,
) -> Result<PathBuf> {
    debug!("download: {:?}", DownloadState::ResolveMetadata);
    let entry = resolve(transport, bank, index)?;

    let path = if dest.is_dir() {
        let name = Path::new(&entry.name)
            .file_name()
            .ok_or(ValidationError::MissingFileName)?;
        dest.join(name)
    } else {
        dest.to_path_buf()
    };

    let partial = partial_path(&path);
    let result = write_partial(transport, &entry, &partial).and_then(|()| {
        fs::rename(&partial, &path).map_err(|source| NomadError::LocalIo {
            path: path.clone(),
            source,
        })
    });
    if let Err(e) = result {
        if let Err(cleanup) = fs::remove_file(&partial) {
            debug!("Could not remove {}: {}", partial.display(), cleanup);
        }
        return Err(e);
    }
    Ok(path)
}

/// Sibling of `path` that holds an in-progress download
fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    path.with_file_name(name)
}

fn write_partial<T: Transport + ?Sized>(
    transport: &mut T,
    entry: &FileEntry,
    partial: &Path,
) -> Result<()> {
    let local_io = |source| NomadError::LocalIo {
        path: partial.to_path_buf(),
        source,
    };
    let file = File::create(partial).map_err(local_io)?;
    let mut sink = BufWriter::new(file);
    download_entry(transport, entry, &mut sink).map_err(|e| match e {
        NomadError::Io(source) => local_io(source),
        other => other,
    })?;
    sink.flush().map_err(local_io)?;
    Ok(())
}

fn resolve<T: Transport + ?Sized>(transport: &mut T, bank: Bank, index: usize) -> Result<FileEntry> {
    let entry = read_entry(transport, bank, index)?;
    if entry.is_end_marker() {
        return Err(NomadError::EmptySlot {
            bank,
            index: entry.index,
        });
    }
    Ok(entry)
}

/// Download a file already resolved from the directory
///
/// Returns the number of payload bytes written to `sink`.
pub fn download_entry<T, W>(transport: &mut T, entry: &FileEntry, sink: &mut W) -> Result<u64>
where
    T: Transport + ?Sized,
    W: Write + ?Sized,
{
    let mut state = DownloadState::SelectFile;
    let result = run_download(transport, entry, sink, &mut state);
    match &result {
        Ok(total) => info!(
            "Downloaded {} ({} bytes) from {} slot {}",
            entry.name, total, entry.bank, entry.index
        ),
        Err(e) if state != DownloadState::SelectFile => warn!(
            "Download of {} aborted in {:?}: {}; device may still have the file selected",
            entry.name, state, e
        ),
        Err(_) => {}
    }
    result
}

fn run_download<T, W>(
    transport: &mut T,
    entry: &FileEntry,
    sink: &mut W,
    state: &mut DownloadState,
) -> Result<u64>
where
    T: Transport + ?Sized,
    W: Write + ?Sized,
{
    debug!("download: {:?}", state);
    control_write(
        transport,
        ControlRequest::write(
            Command::SelectFile,
            0x100 | entry.bank.number(),
            0,
            SELECT_HEADER_LEN as u16,
        ),
        &layout::download_select_header(),
    )?;
    write_all_bulk(
        transport,
        entry.short_name.as_bytes(),
        Command::SelectFile.name(),
        0,
    )?;

    *state = DownloadState::AwaitAck;
    debug!("download: {:?}", state);
    file_ack(transport)?;

    let mut plan = DownloadPlan::new(entry.size);
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut total = 0u64;
    for block in plan.by_ref() {
        *state = DownloadState::TransferBlock {
            offset: block.offset,
        };
        trace!(
            "download: block at {} carrying {} bytes",
            block.offset,
            block.payload_len
        );
        control_write(
            transport,
            ControlRequest::write(Command::RecvBlock, 0, 0, RECV_BLOCK_REQUEST_LEN as u16),
            &block.encode_request(),
        )?;
        let block_buf = &mut buf[..block.block_len()];
        read_exact_bulk(
            transport,
            block_buf,
            Command::RecvBlock.name(),
            u64::from(block.offset),
        )?;
        sink.write_all(&block_buf[DOWNLOAD_HEADER_LEN..])?;
        total += u64::from(block.payload_len);
    }
    debug_assert_eq!(plan.remaining(), 0);

    *state = DownloadState::Finalize;
    debug!("download: {:?}", state);
    control_read(transport, ControlRequest::read(Command::EndFileIo, 0, 0, 1))?;
    Ok(total)
}

/// Upload `size` bytes from `source` into `bank`/`index` under `name`
///
/// Reading stops at `size` bytes or at end of input, whichever comes
/// first. Returns the directory entry the file will have.
pub fn upload_from_reader<T, R>(
    transport: &mut T,
    bank: Bank,
    index: usize,
    name: &str,
    size: u64,
    source: &mut R,
) -> Result<FileEntry>
where
    T: Transport + ?Sized,
    R: Read + ?Sized,
{
    let mut state = UploadState::Stat;
    let result = run_upload(transport, bank, index, name, size, source, &mut state);
    match &result {
        Ok(entry) => info!(
            "Uploaded {} ({} bytes) to {} slot {} as {}",
            entry.name, entry.size, bank, entry.index, entry.short_name
        ),
        Err(e) if state.device_engaged() => warn!(
            "Upload of {} aborted in {:?}: {}; device may still have the upload open",
            name, state, e
        ),
        Err(_) => {}
    }
    result
}

fn run_upload<T, R>(
    transport: &mut T,
    bank: Bank,
    index: usize,
    name: &str,
    size: u64,
    source: &mut R,
    state: &mut UploadState,
) -> Result<FileEntry>
where
    T: Transport + ?Sized,
    R: Read + ?Sized,
{
    debug!("upload: {:?}", state);
    let index = check_file_index(index)?;
    let size32 = u32::try_from(size).map_err(|_| ValidationError::FileTooLarge {
        size,
        max: u64::from(u32::MAX),
    })?;
    let select = UploadSelect::with_name(bank, index, name, size32)?;

    *state = UploadState::CheckSpace;
    debug!("upload: {:?}", state);
    let status = get_memory_status(transport)?;
    let needed = round_up(size, ALIGN);
    let free = u64::from(status.free(bank));
    if free < needed {
        return Err(NomadError::InsufficientSpace { bank, needed, free });
    }

    *state = UploadState::StartUpload;
    debug!("upload: {:?}", state);
    control_read(
        transport,
        ControlRequest::read(Command::StartUpload, 0, 0, START_UPLOAD_LEN as u16),
    )?;

    *state = UploadState::SelectFile;
    debug!("upload: {:?} {} as {}", state, select.long_name, select.short_name);
    control_write(
        transport,
        ControlRequest::write(
            Command::SelectFile,
            bank.number(),
            0,
            SELECT_HEADER_LEN as u16,
        ),
        &select.encode_header(),
    )?;
    write_all_bulk(
        transport,
        &select.encode_payload(),
        Command::SelectFile.name(),
        0,
    )?;

    let mut source = source.take(size);
    let mut buf = vec![0u8; BLOCK_SIZE];
    let mut offset = 0u64;
    loop {
        let n = fill_block(&mut source, &mut buf)?;
        if n == 0 {
            break;
        }
        *state = UploadState::TransferBlock { offset };
        trace!("upload: block at {} carrying {} bytes", offset, n);
        file_ack(transport)?;
        control_read(
            transport,
            ControlRequest::read(Command::SendBlock, n as u16, 0, 1),
        )?;
        write_all_bulk(transport, &buf[..n], Command::SendBlock.name(), offset)?;
        offset += n as u64;
    }
    if offset != size {
        warn!(
            "upload: source ended after {} of {} announced bytes",
            offset, size
        );
    }

    *state = UploadState::Finalize;
    debug!("upload: {:?}", state);
    control_read(transport, ControlRequest::read(Command::EndFileIo, 0, 0, 1))?;

    *state = UploadState::EndUpload;
    debug!("upload: {:?}", state);
    control_read(transport, ControlRequest::read(Command::EndUpload, 0, 0, 1))?;

    Ok(FileEntry {
        bank,
        index,
        name: select.long_name,
        short_name: select.short_name,
        size: size32,
    })
}

/// Read until `buf` is full or the source is exhausted
fn fill_block<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Upload a local file into `bank`/`index`
///
/// Only the final path component is sent as the long name.
pub fn upload<T: Transport + ?Sized>(
    transport: &mut T,
    bank: Bank,
    index: usize,
    path: &Path,
) -> Result<FileEntry> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or(ValidationError::MissingFileName)?;
    let local_io = |source| NomadError::LocalIo {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(local_io)?;
    let size = file.metadata().map_err(local_io)?.len();
    let mut reader = BufReader::new(file);
    upload_from_reader(transport, bank, index, &name, size, &mut reader).map_err(|e| match e {
        NomadError::Io(source) => local_io(source),
        other => other,
    })
}

/// Upload several files into consecutive free slots of a bank
///
/// Stops at the first failure; files uploaded before it stay on the
/// device.
pub fn upload_many<T, P>(transport: &mut T, bank: Bank, paths: &[P]) -> Result<Vec<FileEntry>>
where
    T: Transport + ?Sized,
    P: AsRef<Path>,
{
    if paths.is_empty() {
        return Ok(Vec::new());
    }
    let start = usize::from(next_free_index(transport, bank)?);
    let mut uploaded = Vec::with_capacity(paths.len());
    for (i, path) in paths.iter().enumerate() {
        let index = start + i;
        if index >= layout::FILES_PER_BANK {
            return Err(ValidationError::BankFull(bank.name()).into());
        }
        uploaded.push(upload(transport, bank, index, path.as_ref())?);
    }
    Ok(uploaded)
}
