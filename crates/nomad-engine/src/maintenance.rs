//! Delete and format

use nomad_protocol::{Bank, Command, ControlRequest, FileEntry, Transport};
use tracing::info;

use crate::directory::read_entry;
use crate::error::{NomadError, Result};
use crate::transport::{control_read, control_write, write_all_bulk};

/// Delete the file in `bank`/`index`
///
/// The slot is resolved to its short name first; the device compacts the
/// remaining slots afterwards. Returns the entry that was removed.
pub fn delete<T: Transport + ?Sized>(
    transport: &mut T,
    bank: Bank,
    index: usize,
) -> Result<FileEntry> {
    let entry = read_entry(transport, bank, index)?;
    if entry.is_end_marker() {
        return Err(NomadError::EmptySlot {
            bank,
            index: entry.index,
        });
    }

    control_write(
        transport,
        ControlRequest::write(Command::DeleteFile, bank.number(), 0, 0),
        &[],
    )?;
    write_all_bulk(
        transport,
        entry.short_name.as_bytes(),
        Command::DeleteFile.name(),
        0,
    )?;
    info!("Deleted {} from {} slot {}", entry.name, bank, entry.index);
    Ok(entry)
}

/// Erase every file in a bank
///
/// Asking the user first is up to the caller.
pub fn format<T: Transport + ?Sized>(transport: &mut T, bank: Bank) -> Result<()> {
    control_read(
        transport,
        ControlRequest::read(Command::Format, 0x200 | bank.number(), 0, 1),
    )?;
    info!("Formatted {} bank", bank);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use nomad_sim::{VirtualNomad, VirtualNomadConfig};

    #[test]
    fn test_delete_compacts_directory() {
        let mut nomad = VirtualNomad::new();
        nomad.add_file(Bank::Internal, "a.mp3", vec![1]);
        let short_b = nomad.add_file(Bank::Internal, "b.mp3", vec![2]);
        nomad.add_file(Bank::Internal, "c.mp3", vec![3]);

        let removed = delete(&mut nomad, Bank::Internal, 1).unwrap();
        assert_eq!(removed.name, "b.mp3");

        let names: Vec<&str> = nomad
            .files(Bank::Internal)
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["a.mp3", "c.mp3"]);
        assert_eq!(
            nomad.journal().requests()[1],
            ControlRequest::write(Command::DeleteFile, 0, 0, 0)
        );
        assert_eq!(nomad.journal().bulk_writes(), vec![&short_b.as_bytes()[..]]);
    }

    #[test]
    fn test_delete_empty_slot_sends_nothing() {
        let mut nomad = VirtualNomad::new();
        assert!(matches!(
            delete(&mut nomad, Bank::Internal, 3),
            Err(NomadError::EmptySlot { index: 3, .. })
        ));
        assert_eq!(nomad.journal().commands(), vec![Command::FileInfo]);
    }

    #[test]
    fn test_format_external() {
        let mut nomad = VirtualNomad::from_config(VirtualNomadConfig {
            external_total: 1 << 20,
            ..Default::default()
        });
        nomad.add_file(Bank::Internal, "keep.mp3", vec![0; 10]);
        nomad.add_file(Bank::External, "gone.mp3", vec![0; 10]);

        format(&mut nomad, Bank::External).unwrap();
        assert!(nomad.files(Bank::External).is_empty());
        assert_eq!(nomad.files(Bank::Internal).len(), 1);
        assert_eq!(
            nomad.journal().requests(),
            vec![ControlRequest::read(Command::Format, 0x201, 0, 1)]
        );
    }
}
