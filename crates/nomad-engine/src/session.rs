//! Exclusive device session
//!
//! The player keeps per-session state (a selected file, an open upload)
//! and has no request IDs, so two transactions must never interleave on
//! one device. [`DeviceSession`] owns the transport behind a mutex and
//! runs every operation with the lock held from first request to last.
//!
//! Uploads additionally reserve their target slot before waiting for the
//! lock. A second upload aimed at a reserved slot fails with
//! [`NomadError::SlotBusy`] instead of queueing behind the first.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use nomad_protocol::{
    check_file_index, Bank, ClockValue, FileEntry, MemoryStatus, ModelInfo, OwnerString,
    PresetFrequency, RadioPreset, Transport,
};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::{NomadError, Result};
use crate::transport::Paced;
use crate::{directory, maintenance, settings, transfer};

/// One player, shared between threads
#[derive(Debug)]
pub struct DeviceSession<T> {
    transport: Mutex<T>,
    reserved: Mutex<HashSet<(Bank, u16)>>,
}

/// Holds an upload slot until dropped
#[derive(Debug)]
pub struct SlotReservation<'a> {
    reserved: &'a Mutex<HashSet<(Bank, u16)>>,
    slot: (Bank, u16),
}

impl Drop for SlotReservation<'_> {
    fn drop(&mut self) {
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.slot);
    }
}

impl<T: Transport> DeviceSession<T> {
    /// Wrap a transport as is
    pub fn new(transport: T) -> Self {
        Self {
            transport: Mutex::new(transport),
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Apply session settings to a transport and wrap it
    ///
    /// The timeout is handed to the transport; the command delay is
    /// applied by a [`Paced`] adapter.
    pub fn open(mut transport: T, config: &SessionConfig) -> Result<DeviceSession<Paced<T>>> {
        transport
            .set_timeout(config.timeout())
            .map_err(|e| NomadError::transport("set timeout", e))?;
        debug!(
            "Session opened: timeout {}ms, command delay {}us",
            config.timeout_ms, config.command_delay_us
        );
        Ok(DeviceSession::new(Paced::new(
            transport,
            config.command_delay(),
        )))
    }

    /// Run `f` with exclusive access to the transport
    pub fn with_transport<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut *self.lock())
    }

    pub fn into_inner(self) -> T {
        self.transport
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock(&self) -> MutexGuard<'_, T> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve `bank`/`index` for an upload
    pub fn reserve_slot(&self, bank: Bank, index: usize) -> Result<SlotReservation<'_>> {
        let index = check_file_index(index)?;
        let mut reserved = self.reserved.lock().unwrap_or_else(PoisonError::into_inner);
        if !reserved.insert((bank, index)) {
            return Err(NomadError::SlotBusy { bank, index });
        }
        Ok(SlotReservation {
            reserved: &self.reserved,
            slot: (bank, index),
        })
    }

    /// Whether an upload currently holds `bank`/`index`
    pub fn is_reserved(&self, bank: Bank, index: u16) -> bool {
        self.reserved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(bank, index))
    }

    pub fn model_info(&self) -> Result<ModelInfo> {
        settings::get_model_info(&mut *self.lock())
    }

    pub fn memory_status(&self) -> Result<MemoryStatus> {
        settings::get_memory_status(&mut *self.lock())
    }

    pub fn clock(&self) -> Result<ClockValue> {
        settings::get_clock(&mut *self.lock())
    }

    pub fn set_clock(&self, clock: &ClockValue) -> Result<()> {
        settings::set_clock(&mut *self.lock(), clock)
    }

    pub fn owner(&self) -> Result<OwnerString> {
        settings::get_owner(&mut *self.lock())
    }

    pub fn set_owner(&self, text: &str) -> Result<()> {
        settings::set_owner(&mut *self.lock(), text)
    }

    pub fn radio_presets(&self) -> Result<Vec<RadioPreset>> {
        settings::get_radio_presets(&mut *self.lock())
    }

    pub fn set_preset(&self, index: usize, frequency: PresetFrequency) -> Result<()> {
        settings::set_preset(&mut *self.lock(), index, frequency)
    }

    pub fn read_entry(&self, bank: Bank, index: usize) -> Result<FileEntry> {
        directory::read_entry(&mut *self.lock(), bank, index)
    }

    /// Every file in a bank, read under one lock
    pub fn list_bank(&self, bank: Bank) -> Result<Vec<FileEntry>> {
        directory::list_bank(&mut *self.lock(), bank).collect()
    }

    pub fn next_free_index(&self, bank: Bank) -> Result<u16> {
        directory::next_free_index(&mut *self.lock(), bank)
    }

    pub fn download<W: Write + ?Sized>(
        &self,
        bank: Bank,
        index: usize,
        sink: &mut W,
    ) -> Result<FileEntry> {
        transfer::download(&mut *self.lock(), bank, index, sink)
    }

    pub fn download_to_path(&self, bank: Bank, index: usize, dest: &Path) -> Result<PathBuf> {
        transfer::download_to_path(&mut *self.lock(), bank, index, dest)
    }

    pub fn upload(&self, bank: Bank, index: usize, path: &Path) -> Result<FileEntry> {
        let _slot = self.reserve_slot(bank, index)?;
        transfer::upload(&mut *self.lock(), bank, index, path)
    }

    pub fn upload_from_reader<R: Read + ?Sized>(
        &self,
        bank: Bank,
        index: usize,
        name: &str,
        size: u64,
        source: &mut R,
    ) -> Result<FileEntry> {
        let _slot = self.reserve_slot(bank, index)?;
        transfer::upload_from_reader(&mut *self.lock(), bank, index, name, size, source)
    }

    /// Upload several files into consecutive free slots
    ///
    /// All target slots are reserved before the first byte is sent.
    pub fn upload_many<P: AsRef<Path>>(&self, bank: Bank, paths: &[P]) -> Result<Vec<FileEntry>> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }
        let mut transport = self.lock();
        let start = usize::from(directory::next_free_index(&mut *transport, bank)?);
        let _slots = (start..start + paths.len())
            .map(|index| self.reserve_slot(bank, index))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| match e {
                NomadError::Validation(nomad_protocol::ValidationError::FileIndex { .. }) => {
                    nomad_protocol::ValidationError::BankFull(bank.name()).into()
                }
                other => other,
            })?;
        transfer::upload_many(&mut *transport, bank, paths)
    }

    pub fn delete(&self, bank: Bank, index: usize) -> Result<FileEntry> {
        maintenance::delete(&mut *self.lock(), bank, index)
    }

    pub fn format(&self, bank: Bank) -> Result<()> {
        maintenance::format(&mut *self.lock(), bank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nomad_protocol::Command;
    use nomad_sim::VirtualNomad;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_open_applies_config() {
        let config = SessionConfig {
            timeout_ms: 1234,
            command_delay_us: 0,
        };
        let session = DeviceSession::open(VirtualNomad::new(), &config).unwrap();
        let paced = session.into_inner();
        assert_eq!(paced.delay(), Duration::ZERO);
        assert_eq!(paced.get_ref().timeout(), Duration::from_millis(1234));
    }

    #[test]
    fn test_reserved_slot_rejects_upload() {
        let session = DeviceSession::new(VirtualNomad::new());
        let slot = session.reserve_slot(Bank::Internal, 0).unwrap();

        let err = session
            .upload_from_reader(Bank::Internal, 0, "a.mp3", 1, &mut &b"x"[..])
            .unwrap_err();
        assert!(matches!(
            err,
            NomadError::SlotBusy {
                bank: Bank::Internal,
                index: 0
            }
        ));
        session.with_transport(|t| assert!(t.journal().entries().is_empty()));

        drop(slot);
        assert!(!session.is_reserved(Bank::Internal, 0));
        session
            .upload_from_reader(Bank::Internal, 0, "a.mp3", 1, &mut &b"x"[..])
            .unwrap();
    }

    #[test]
    fn test_reservation_released_after_failure() {
        let session = DeviceSession::new(VirtualNomad::new());
        session.with_transport(|t| t.fail_control_at(0));

        assert!(session
            .upload_from_reader(Bank::Internal, 0, "a.mp3", 1, &mut &b"x"[..])
            .is_err());
        assert!(!session.is_reserved(Bank::Internal, 0));
    }

    #[test]
    fn test_concurrent_operations_do_not_interleave() {
        let mut nomad = VirtualNomad::new();
        for i in 0..4 {
            nomad.add_file(Bank::Internal, &format!("{}.mp3", i), vec![i as u8; 20_000]);
        }
        let session = Arc::new(DeviceSession::new(nomad));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let session = Arc::clone(&session);
                thread::spawn(move || {
                    let mut out = Vec::new();
                    session.download(Bank::Internal, i, &mut out).unwrap();
                    out
                })
            })
            .collect();
        for (i, handle) in handles.into_iter().enumerate() {
            assert_eq!(handle.join().unwrap(), vec![i as u8; 20_000]);
        }

        // Every transaction runs FILE_INFO .. END_FILEIO without another in between
        session.with_transport(|t| {
            let commands = t.journal().commands();
            for txn in commands.chunks(6) {
                assert_eq!(txn[0], Command::FileInfo);
                assert_eq!(txn[5], Command::EndFileIo);
            }
        });
    }

    #[test]
    fn test_upload_many_fills_consecutive_slots() {
        let dir = std::env::temp_dir().join(format!("nomad-session-many-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let paths: Vec<PathBuf> = ["one.mp3", "two.wav"]
            .iter()
            .map(|name| {
                let path = dir.join(name);
                std::fs::write(&path, name.as_bytes()).unwrap();
                path
            })
            .collect();

        let mut nomad = VirtualNomad::new();
        nomad.add_file(Bank::Internal, "existing.mp3", vec![0; 4]);
        let session = DeviceSession::new(nomad);

        let entries = session.upload_many(Bank::Internal, &paths).unwrap();
        assert_eq!(entries[0].index, 1);
        assert_eq!(entries[1].index, 2);
        assert_eq!(entries[1].short_name.as_bytes(), b"IO00~002WAV");
        assert!(!session.is_reserved(Bank::Internal, 1));

        let listing = session.list_bank(Bank::Internal).unwrap();
        let names: Vec<&str> = listing.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["existing.mp3", "one.mp3", "two.wav"]);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_upload_many_with_no_paths_is_noop() {
        let mut nomad = VirtualNomad::new();
        for i in 0..64 {
            nomad.add_file(Bank::Internal, &format!("f{i}.mp3"), vec![0; 1]);
        }
        let session = DeviceSession::new(nomad);

        let entries = session.upload_many::<PathBuf>(Bank::Internal, &[]).unwrap();
        assert!(entries.is_empty());
        assert!(matches!(
            session.upload_many(Bank::Internal, &[PathBuf::from("more.mp3")]),
            Err(NomadError::Validation(nomad_protocol::ValidationError::BankFull(_)))
        ));

        let nomad = session.into_inner();
        assert_eq!(nomad.journal().count(Command::FileInfo), 64);
        assert_eq!(nomad.files(Bank::Internal).len(), 64);
    }
}
