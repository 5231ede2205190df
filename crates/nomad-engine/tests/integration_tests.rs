//! Integration tests for the Nomad transaction engine
//!
//! These tests drive the engine against a simulated player and verify:
//! - Directory reads and bank listings
//! - Download block accounting at block boundaries
//! - Upload handshakes, short names and space checks
//! - Setting accessors and preset validation
//! - Delete, format and session-level behavior

use nomad_engine::{directory, maintenance, settings, transfer, DeviceSession, NomadError};
use nomad_protocol::{Bank, ClockValue, Command, PresetFrequency, ValidationError};
use nomad_sim::{JournalEntry, VirtualNomad, VirtualNomadConfig};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Once;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    static LOGGING: Once = Once::new();

    /// Install a test-friendly subscriber once; filter with RUST_LOG
    pub fn init_logging() {
        LOGGING.call_once(|| {
            let _ = tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| "nomad_engine=warn".into()),
                )
                .with(tracing_subscriber::fmt::layer().with_test_writer())
                .try_init();
        });
    }

    /// A player with a card inserted
    pub fn nomad_with_card() -> VirtualNomad {
        init_logging();
        VirtualNomad::from_config(VirtualNomadConfig {
            external_total: 128 * 1024 * 1024,
            ..Default::default()
        })
    }

    /// Deterministic file contents
    pub fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    /// Fresh scratch directory under the system temp dir
    pub fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "nomad-it-{}-{}",
            name,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// Payload lengths of every RECV_BLOCK request in the journal
    pub fn recv_block_payloads(nomad: &VirtualNomad) -> Vec<u32> {
        nomad
            .journal()
            .entries()
            .iter()
            .filter_map(|e| match e {
                JournalEntry::Control { request, payload } if request.command == Command::RecvBlock => {
                    Some(u32::from_le_bytes([payload[4], payload[5], payload[6], payload[7]]))
                }
                _ => None,
            })
            .collect()
    }
}

// ============================================================================
// Directory Tests
// ============================================================================

mod directory_tests {
    use super::*;

    #[test]
    fn test_read_entry_is_idempotent() {
        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::External, "Track 01.mp3", helpers::pattern(1234));

        let first = directory::read_entry(&mut nomad, Bank::External, 0).unwrap();
        let second = directory::read_entry(&mut nomad, Bank::External, 0).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.bank, Bank::External);
        assert_eq!(first.size, 1234);
    }

    #[test]
    fn test_listing_display() {
        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::Internal, "intro.mp3", vec![0; 3_145_728]);

        let entry = directory::list_bank(&mut nomad, Bank::Internal)
            .next()
            .unwrap()
            .unwrap();
        assert_eq!(entry.to_string(), " 0:  3145728\tIO00~000MP3\tintro.mp3");
    }

    #[test]
    fn test_listing_is_restartable() {
        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::Internal, "a.mp3", vec![1]);

        assert_eq!(directory::list_bank(&mut nomad, Bank::Internal).count(), 1);
        nomad.add_file(Bank::Internal, "b.mp3", vec![2]);
        assert_eq!(directory::list_bank(&mut nomad, Bank::Internal).count(), 2);
    }

    #[test]
    fn test_banks_are_independent() {
        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::Internal, "inside.mp3", vec![1]);
        nomad.add_file(Bank::External, "card.mp3", vec![2]);

        let internal: Vec<_> = directory::list_bank(&mut nomad, Bank::Internal)
            .collect::<Result<_, _>>()
            .unwrap();
        let external: Vec<_> = directory::list_bank(&mut nomad, Bank::External)
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(internal.len(), 1);
        assert_eq!(external.len(), 1);
        assert_eq!(external[0].name, "card.mp3");
        assert_eq!(external[0].short_name.as_bytes(), b"IO01~000MP3");
    }
}

// ============================================================================
// Download Tests
// ============================================================================

mod download_tests {
    use super::*;

    fn download_size(size: usize) -> (Vec<u8>, Vec<u32>) {
        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::Internal, "f.mp3", helpers::pattern(size));
        let mut out = Vec::new();
        transfer::download(&mut nomad, Bank::Internal, 0, &mut out).unwrap();
        assert!(!nomad.has_open_transfer());
        (out, helpers::recv_block_payloads(&nomad))
    }

    #[test]
    fn test_zero_byte_file_has_no_blocks() {
        let (out, blocks) = download_size(0);
        assert!(out.is_empty());
        assert!(blocks.is_empty());
    }

    #[test]
    fn test_one_byte_file() {
        let (out, blocks) = download_size(1);
        assert_eq!(out, helpers::pattern(1));
        assert_eq!(blocks, vec![1]);
    }

    #[test]
    fn test_exact_block_boundary() {
        let (out, blocks) = download_size(16320);
        assert_eq!(out, helpers::pattern(16320));
        assert_eq!(blocks, vec![16320]);
    }

    #[test]
    fn test_crossing_block_boundary() {
        let (out, blocks) = download_size(16321);
        assert_eq!(out, helpers::pattern(16321));
        assert_eq!(blocks, vec![16320, 1]);
    }

    #[test]
    fn test_download_to_directory_uses_long_name() {
        let dir = helpers::scratch_dir("dl-dir");
        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::External, "Song Title.mp3", helpers::pattern(5000));

        let path = transfer::download_to_path(&mut nomad, Bank::External, 0, &dir).unwrap();
        assert_eq!(path, dir.join("Song Title.mp3"));
        assert_eq!(std::fs::read(&path).unwrap(), helpers::pattern(5000));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_download_to_explicit_file() {
        let dir = helpers::scratch_dir("dl-file");
        let dest = dir.join("copy.bin");
        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::Internal, "x.mp3", helpers::pattern(70));

        let path = transfer::download_to_path(&mut nomad, Bank::Internal, 0, &dest).unwrap();
        assert_eq!(path, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), helpers::pattern(70));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_failed_download_keeps_existing_file() {
        let dir = helpers::scratch_dir("dl-keep");
        let dest = dir.join("keep.mp3");
        std::fs::write(&dest, b"previous contents").unwrap();
        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::Internal, "x.mp3", helpers::pattern(100));
        // FILE_INFO, SELECT_FILE, FILE_ACK
        nomad.fail_control_at(2);

        let err = transfer::download_to_path(&mut nomad, Bank::Internal, 0, &dest).unwrap_err();
        assert!(err.is_device_side());
        assert_eq!(std::fs::read(&dest).unwrap(), b"previous contents");
        assert!(!dir.join("keep.mp3.part").exists());

        let path = transfer::download_to_path(&mut nomad, Bank::Internal, 0, &dest).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), helpers::pattern(100));
        assert!(!dir.join("keep.mp3.part").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_download_into_missing_directory_fails_locally() {
        let dir = helpers::scratch_dir("dl-missing");
        let dest = dir.join("no").join("such").join("file.mp3");
        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::Internal, "x.mp3", vec![1, 2, 3]);

        let err = transfer::download_to_path(&mut nomad, Bank::Internal, 0, &dest).unwrap_err();
        assert!(matches!(err, NomadError::LocalIo { .. }));
        assert!(!nomad.has_open_transfer());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_timeout_aborts_download() {
        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::Internal, "x.mp3", helpers::pattern(100));
        // FILE_INFO, SELECT_FILE, FILE_ACK
        nomad.fail_control_at(2);

        let err = transfer::download(&mut nomad, Bank::Internal, 0, &mut Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            NomadError::Transport {
                operation: "FILE_ACK",
                ..
            }
        ));
        assert_eq!(nomad.journal().count(Command::RecvBlock), 0);
    }
}

// ============================================================================
// Upload Tests
// ============================================================================

mod upload_tests {
    use super::*;

    #[test]
    fn test_zero_byte_upload_has_no_blocks() {
        let mut nomad = helpers::nomad_with_card();

        transfer::upload_from_reader(&mut nomad, Bank::Internal, 0, "empty.mp3", 0, &mut &[][..])
            .unwrap();

        assert_eq!(
            nomad.journal().commands(),
            vec![
                Command::Memory,
                Command::StartUpload,
                Command::SelectFile,
                Command::EndFileIo,
                Command::EndUpload,
            ]
        );
        // only the select payload went over bulk-out
        assert_eq!(nomad.journal().bulk_writes().len(), 1);
        let stored = nomad.file(Bank::Internal, 0).unwrap();
        assert_eq!(stored.name, "empty.mp3");
        assert!(stored.data.is_empty());
    }

    #[test]
    fn test_upload_from_path_sends_base_name() {
        let dir = helpers::scratch_dir("ul-path");
        let path = dir.join("My Song.wma");
        std::fs::write(&path, helpers::pattern(40_000)).unwrap();

        let mut nomad = helpers::nomad_with_card();
        let entry = transfer::upload(&mut nomad, Bank::External, 5, &path).unwrap();
        assert_eq!(entry.name, "My Song.wma");
        assert_eq!(entry.short_name.as_bytes(), b"IO01~005WMA");

        let stored = nomad.file(Bank::External, 0).unwrap();
        assert_eq!(stored.name, "My Song.wma");
        assert_eq!(stored.data, helpers::pattern(40_000));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_extension_defaults() {
        let mut nomad = helpers::nomad_with_card();
        for (i, name) in ["track.mp3", "track", "track.verylongext"].iter().enumerate() {
            let entry = transfer::upload_from_reader(
                &mut nomad,
                Bank::Internal,
                i,
                name,
                1,
                &mut &[0u8][..],
            )
            .unwrap();
            assert!(entry.short_name.as_bytes().ends_with(b"MP3"));
        }
    }

    #[test]
    fn test_upload_then_download() {
        let mut nomad = helpers::nomad_with_card();
        let data = helpers::pattern(50_000);
        transfer::upload_from_reader(
            &mut nomad,
            Bank::Internal,
            0,
            "loop.mp3",
            data.len() as u64,
            &mut data.as_slice(),
        )
        .unwrap();

        let mut out = Vec::new();
        let entry = transfer::download(&mut nomad, Bank::Internal, 0, &mut out).unwrap();
        assert_eq!(entry.size, 50_000);
        assert_eq!(out, data);
    }

    #[test]
    fn test_space_check_uses_rounded_size() {
        let mut nomad = VirtualNomad::from_config(VirtualNomadConfig {
            internal_total: 1024,
            ..Default::default()
        });

        // 1024 bytes fits exactly
        transfer::upload_from_reader(
            &mut nomad,
            Bank::Internal,
            0,
            "a.mp3",
            1024,
            &mut &vec![0u8; 1024][..],
        )
        .unwrap();

        let err = transfer::upload_from_reader(
            &mut nomad,
            Bank::Internal,
            1,
            "b.mp3",
            1,
            &mut &[0u8][..],
        )
        .unwrap_err();
        assert!(matches!(
            err,
            NomadError::InsufficientSpace {
                bank: Bank::Internal,
                needed: 512,
                free: 0
            }
        ));
    }

    #[test]
    fn test_missing_source_file() {
        let dir = helpers::scratch_dir("ul-missing");
        let mut nomad = helpers::nomad_with_card();
        let err = transfer::upload(&mut nomad, Bank::Internal, 0, &dir.join("nope.mp3"))
            .unwrap_err();
        assert!(matches!(err, NomadError::LocalIo { .. }));
        assert!(nomad.journal().entries().is_empty());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_name_too_long_is_not_sent() {
        let mut nomad = helpers::nomad_with_card();
        let name = format!("{}.mp3", "n".repeat(300));
        let err = transfer::upload_from_reader(&mut nomad, Bank::Internal, 0, &name, 1, &mut &[0u8][..])
            .unwrap_err();
        assert!(matches!(
            err,
            NomadError::Validation(ValidationError::NameTooLong { .. })
        ));
        assert!(nomad.journal().entries().is_empty());
    }

    #[test]
    fn test_upload_many_after_existing_files() {
        let dir = helpers::scratch_dir("ul-many");
        let paths: Vec<_> = (0..3)
            .map(|i| {
                let path = dir.join(format!("part{}.mp3", i));
                std::fs::write(&path, helpers::pattern(100 * (i + 1))).unwrap();
                path
            })
            .collect();

        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::Internal, "first.mp3", vec![0; 10]);

        let entries = transfer::upload_many(&mut nomad, Bank::Internal, &paths).unwrap();
        let indices: Vec<u16> = entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![1, 2, 3]);
        assert_eq!(nomad.files(Bank::Internal).len(), 4);
        assert_eq!(nomad.file(Bank::Internal, 3).unwrap().data, helpers::pattern(300));
        let _ = std::fs::remove_dir_all(&dir);
    }
}

// ============================================================================
// Settings Tests
// ============================================================================

mod settings_tests {
    use super::*;

    #[test]
    fn test_preset_validation() {
        let mut nomad = helpers::nomad_with_card();
        let hz = |n| PresetFrequency::from_hundredths(n);

        settings::set_preset(&mut nomad, 31, hz(14999).unwrap()).unwrap();
        settings::set_preset(&mut nomad, 0, hz(10099).unwrap()).unwrap();
        assert!(matches!(
            settings::set_preset(&mut nomad, 32, hz(10000).unwrap()),
            Err(NomadError::Validation(ValidationError::PresetIndex(32)))
        ));
        assert!(matches!(
            hz(5999),
            Err(ValidationError::Frequency { mhz: 59, fraction: 99 })
        ));
        assert!(matches!(
            "100.100".parse::<PresetFrequency>(),
            Err(ValidationError::Frequency {
                mhz: 100,
                fraction: 100
            })
        ));

        let presets = settings::get_radio_presets(&mut nomad).unwrap();
        assert_eq!(presets[31].frequency_hundredths_mhz, 14999);
        assert_eq!(presets[0].to_string(), " 0: 100.99 MHz");

        // 101.00 MHz is in range; only the three-digit fraction form is not
        settings::set_preset(&mut nomad, 0, hz(10100).unwrap()).unwrap();
        let presets = settings::get_radio_presets(&mut nomad).unwrap();
        assert_eq!(presets[0].frequency_hundredths_mhz, 10100);
        assert_eq!(presets[0].to_string(), " 0: 101.00 MHz");
        assert_eq!(nomad.journal().count(Command::SetFmPresets), 3);
    }

    #[test]
    fn test_clock_display_after_set() {
        let mut nomad = helpers::nomad_with_card();
        let clock = ClockValue::new(2006, 3, 15, 8, 5, 9).unwrap();
        settings::set_clock(&mut nomad, &clock).unwrap();

        let read = settings::get_clock(&mut nomad).unwrap();
        assert_eq!(read.to_string(), "06/03/15 3 08:05:09");
    }

    #[test]
    fn test_memory_display() {
        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::Internal, "half.mp3", vec![0; 512 * 1024]);

        let status = settings::get_memory_status(&mut nomad).unwrap();
        assert_eq!(status.to_string(), "0.5M/64M, 0.0M/128M");
    }

    #[test]
    fn test_owner_boundary() {
        let mut nomad = helpers::nomad_with_card();
        let longest = "o".repeat(63);
        settings::set_owner(&mut nomad, &longest).unwrap();
        assert_eq!(settings::get_owner(&mut nomad).unwrap().as_str(), longest);
    }
}

// ============================================================================
// Maintenance and Session Tests
// ============================================================================

mod maintenance_tests {
    use super::*;

    #[test]
    fn test_delete_then_list() {
        let mut nomad = helpers::nomad_with_card();
        for name in ["a.mp3", "b.mp3", "c.mp3"] {
            nomad.add_file(Bank::Internal, name, vec![0; 600]);
        }
        let before = settings::get_memory_status(&mut nomad).unwrap();

        maintenance::delete(&mut nomad, Bank::Internal, 0).unwrap();

        let names: Vec<String> = directory::list_bank(&mut nomad, Bank::Internal)
            .map(|e| e.unwrap().name)
            .collect();
        assert_eq!(names, vec!["b.mp3", "c.mp3"]);
        let after = settings::get_memory_status(&mut nomad).unwrap();
        assert_eq!(after.internal_free - before.internal_free, 1024);
    }

    #[test]
    fn test_format_then_list() {
        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::Internal, "a.mp3", vec![0; 10]);
        maintenance::format(&mut nomad, Bank::Internal).unwrap();
        assert_eq!(directory::list_bank(&mut nomad, Bank::Internal).count(), 0);
    }

    #[test]
    fn test_session_wraps_operations() {
        let mut nomad = helpers::nomad_with_card();
        nomad.add_file(Bank::Internal, "a.mp3", vec![9; 3]);
        let session = DeviceSession::new(nomad);

        assert_eq!(session.model_info().unwrap().name, "NOMAD II MG");
        assert_eq!(session.list_bank(Bank::Internal).unwrap().len(), 1);
        session.set_owner("me").unwrap();
        assert_eq!(session.owner().unwrap().as_str(), "me");

        let mut out = Vec::new();
        session.download(Bank::Internal, 0, &mut out).unwrap();
        assert_eq!(out, vec![9; 3]);

        session.delete(Bank::Internal, 0).unwrap();
        assert_eq!(session.next_free_index(Bank::Internal).unwrap(), 0);
    }
}

// ============================================================================
// Property-Based Tests
// ============================================================================

mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn long_name() -> impl Strategy<Value = String> {
        "[a-zA-Z0-9 _äöüé日本]{1,40}\\.(mp3|wav|wma|ogg)"
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn download_payloads_sum_to_size(size in 0usize..50_000) {
            let mut nomad = VirtualNomad::new();
            nomad.add_file(Bank::Internal, "f.mp3", helpers::pattern(size));

            let mut out = Vec::new();
            transfer::download(&mut nomad, Bank::Internal, 0, &mut out).unwrap();

            let blocks = helpers::recv_block_payloads(&nomad);
            prop_assert_eq!(blocks.iter().map(|&n| n as usize).sum::<usize>(), size);
            prop_assert!(blocks.iter().all(|&n| n > 0 && n <= 16320));
            prop_assert_eq!(out, helpers::pattern(size));
        }

        #[test]
        fn uploaded_names_list_back(name in long_name(), size in 0usize..40_000) {
            let mut nomad = VirtualNomad::new();
            let data = helpers::pattern(size);
            transfer::upload_from_reader(
                &mut nomad,
                Bank::Internal,
                0,
                &name,
                size as u64,
                &mut data.as_slice(),
            )
            .unwrap();

            let entry = directory::read_entry(&mut nomad, Bank::Internal, 0).unwrap();
            prop_assert_eq!(&entry.name, &name);
            prop_assert_eq!(entry.size as usize, size);
        }

        #[test]
        fn listing_never_exceeds_64(count in 0usize..=64) {
            let mut nomad = VirtualNomad::new();
            for i in 0..count {
                nomad.add_file(Bank::Internal, &format!("{}.mp3", i), Vec::new());
            }
            let listed = directory::list_bank(&mut nomad, Bank::Internal).count();
            prop_assert_eq!(listed, count);
            prop_assert!(nomad.journal().count(Command::FileInfo) <= 64);
        }

        #[test]
        fn valid_presets_are_accepted(index in 0usize..32, mhz in 60u32..=150, fraction in 0u32..100) {
            let mut nomad = VirtualNomad::new();
            let freq = PresetFrequency::from_parts(mhz, fraction).unwrap();
            settings::set_preset(&mut nomad, index, freq).unwrap();
            let presets = settings::get_radio_presets(&mut nomad).unwrap();
            prop_assert_eq!(u32::from(presets[index].frequency_hundredths_mhz), mhz * 100 + fraction);
        }
    }
}
