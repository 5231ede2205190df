//! Directory reader
//!
//! Each bank holds up to 64 slots, read one at a time with a file info
//! request. The first slot with an empty long name ends the directory.
//! Nothing is cached: every call goes back to the device.

use nomad_protocol::layout::{FILES_PER_BANK, FILE_INFO_LEN, FILE_INFO_PROBE_LEN};
use nomad_protocol::{
    check_file_index, Bank, Command, ControlRequest, FileEntry, Transport, ValidationError,
};
use tracing::debug;

use crate::error::Result;
use crate::transport::{control_write, read_response};

/// Read one directory slot
///
/// The returned entry has an empty name when the slot is past the end of
/// the directory.
pub fn read_entry<T: Transport + ?Sized>(
    transport: &mut T,
    bank: Bank,
    index: usize,
) -> Result<FileEntry> {
    let index = check_file_index(index)?;
    let request = ControlRequest::write(
        Command::FileInfo,
        bank.number(),
        index,
        FILE_INFO_PROBE_LEN as u16,
    );
    control_write(transport, request, &[0u8; FILE_INFO_PROBE_LEN])?;
    let buf = read_response(transport, FILE_INFO_LEN, Command::FileInfo.name())?;
    Ok(FileEntry::decode(bank, index, &buf)?)
}

/// Lazily enumerate the files in a bank
///
/// Yields at most 64 entries and stops, without yielding it, at the first
/// empty slot. After an error the listing ends.
pub fn list_bank<T: Transport + ?Sized>(transport: &mut T, bank: Bank) -> BankListing<'_, T> {
    BankListing {
        transport,
        bank,
        next: 0,
        done: false,
    }
}

/// Iterator returned by [`list_bank`]
pub struct BankListing<'a, T: ?Sized> {
    transport: &'a mut T,
    bank: Bank,
    next: usize,
    done: bool,
}

impl<T: Transport + ?Sized> Iterator for BankListing<'_, T> {
    type Item = Result<FileEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.next >= FILES_PER_BANK {
            return None;
        }
        match read_entry(&mut *self.transport, self.bank, self.next) {
            Ok(entry) if entry.is_end_marker() => {
                debug!("{} bank: {} files", self.bank, self.next);
                self.done = true;
                None
            }
            Ok(entry) => {
                self.next += 1;
                Some(Ok(entry))
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

impl<T: Transport + ?Sized> std::iter::FusedIterator for BankListing<'_, T> {}

/// First unused slot in a bank
///
/// Slots are filled in order, so this is the slot after the last listed
/// file.
pub fn next_free_index<T: Transport + ?Sized>(transport: &mut T, bank: Bank) -> Result<u16> {
    let mut count = 0;
    for entry in list_bank(transport, bank) {
        entry?;
        count += 1;
    }
    if count >= FILES_PER_BANK {
        return Err(ValidationError::BankFull(bank.name()).into());
    }
    Ok(count as u16)
}
