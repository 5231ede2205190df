//! Device data model
//!
//! Value types decoded from device responses or built by the caller
//! before an encode step. None of them hold a reference to the transport.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::layout::{FILES_PER_BANK, OWNER_LEN, PRESET_COUNT, SHORT_NAME_LEN};

/// Physical store selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Bank {
    /// Built-in memory
    Internal = 0,
    /// Removable memory card
    External = 1,
}

impl Bank {
    /// Both banks in directory order
    pub const ALL: [Bank; 2] = [Bank::Internal, Bank::External];

    /// Bank number as carried in command parameters
    pub fn number(self) -> u16 {
        self as u16
    }

    /// Human-readable name
    pub fn name(self) -> &'static str {
        match self {
            Bank::Internal => "internal",
            Bank::External => "external",
        }
    }
}

impl TryFrom<u8> for Bank {
    type Error = ValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Bank::Internal),
            1 => Ok(Bank::External),
            other => Err(ValidationError::Bank(other)),
        }
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Check a directory slot number against the bank size
pub fn check_file_index(index: usize) -> Result<u16, ValidationError> {
    if index < FILES_PER_BANK {
        Ok(index as u16)
    } else {
        Err(ValidationError::FileIndex {
            index,
            max: FILES_PER_BANK - 1,
        })
    }
}

/// Device-assigned 11-byte file identifier
///
/// Not necessarily printable; uploads synthesize one of the form
/// `IObb~iiiEXT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShortName(pub [u8; SHORT_NAME_LEN]);

impl ShortName {
    /// Raw identifier bytes
    pub fn as_bytes(&self) -> &[u8; SHORT_NAME_LEN] {
        &self.0
    }

    /// Build from text, zero-padding to 11 bytes
    ///
    /// Text longer than 11 bytes is cut.
    pub fn from_text(text: &str) -> Self {
        let mut raw = [0u8; SHORT_NAME_LEN];
        for (dst, src) in raw.iter_mut().zip(text.bytes()) {
            *dst = src;
        }
        ShortName(raw)
    }
}

impl fmt::Display for ShortName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(SHORT_NAME_LEN);
        f.write_str(&String::from_utf8_lossy(&self.0[..end]))
    }
}

/// One directory slot
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileEntry {
    /// Store holding the file
    pub bank: Bank,
    /// Slot number (0-63)
    pub index: u16,
    /// Long name; empty marks the end of the bank's directory
    pub name: String,
    /// Device identifier used to select the file
    pub short_name: ShortName,
    /// Size in bytes
    pub size: u32,
}

impl FileEntry {
    /// Whether this slot terminates the directory
    pub fn is_end_marker(&self) -> bool {
        self.name.is_empty()
    }
}

impl fmt::Display for FileEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:2}: {:8}\t{:>11}\t{}",
            self.index,
            self.size,
            self.short_name.to_string(),
            self.name
        )
    }
}

/// Capacity and free space of both stores, in bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemoryStatus {
    pub internal_total: u32,
    pub internal_free: u32,
    pub external_total: u32,
    pub external_free: u32,
}

impl MemoryStatus {
    /// A zero external total means no card is inserted
    pub fn has_external(&self) -> bool {
        self.external_total != 0
    }

    /// Total capacity of a bank
    pub fn total(&self, bank: Bank) -> u32 {
        match bank {
            Bank::Internal => self.internal_total,
            Bank::External => self.external_total,
        }
    }

    /// Free space of a bank
    pub fn free(&self, bank: Bank) -> u32 {
        match bank {
            Bank::Internal => self.internal_free,
            Bank::External => self.external_free,
        }
    }

    /// Used space of a bank
    pub fn used(&self, bank: Bank) -> u32 {
        self.total(bank).saturating_sub(self.free(bank))
    }
}

const MIB: u64 = 1024 * 1024;

fn fmt_megabytes(f: &mut fmt::Formatter<'_>, used: u32, total: u32) -> fmt::Result {
    let used = u64::from(used);
    write!(
        f,
        "{}.{}M/{}M",
        used / MIB,
        used * 10 / MIB % 10,
        u64::from(total) / MIB
    )
}

impl fmt::Display for MemoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_megabytes(f, self.used(Bank::Internal), self.internal_total)?;
        if self.has_external() {
            f.write_str(", ")?;
            fmt_megabytes(f, self.used(Bank::External), self.external_total)?;
        }
        Ok(())
    }
}

/// Device clock, stored as seven 16-bit fields
///
/// `year` is the raw device value: calendar year minus [`ClockValue::YEAR_EPOCH`].
/// `weekday` counts from Sunday = 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ClockValue {
    pub year: u16,
    pub month: u16,
    pub day: u16,
    pub weekday: u16,
    pub hour: u16,
    pub minute: u16,
    pub second: u16,
}

impl ClockValue {
    /// Calendar year the device counts from
    pub const YEAR_EPOCH: i32 = 1856;

    /// Build a clock value from a calendar date and time, computing the weekday
    pub fn new(
        year: i32,
        month: u16,
        day: u16,
        hour: u16,
        minute: u16,
        second: u16,
    ) -> Result<Self, ValidationError> {
        let stored = year - Self::YEAR_EPOCH;
        if !(0..=i32::from(u16::MAX)).contains(&stored) {
            return Err(ValidationError::ClockField {
                field: "year",
                value: i64::from(year),
            });
        }
        if !(1..=12).contains(&month) {
            return Err(ValidationError::ClockField {
                field: "month",
                value: i64::from(month),
            });
        }
        if day == 0 || day > days_in_month(year, month) {
            return Err(ValidationError::ClockField {
                field: "day",
                value: i64::from(day),
            });
        }
        let time_fields = [("hour", hour, 24), ("minute", minute, 60), ("second", second, 60)];
        for (field, value, limit) in time_fields {
            if value >= limit {
                return Err(ValidationError::ClockField {
                    field,
                    value: i64::from(value),
                });
            }
        }

        Ok(Self {
            year: stored as u16,
            month,
            day,
            weekday: weekday(year, month, day),
            hour,
            minute,
            second,
        })
    }

    /// Calendar year
    pub fn calendar_year(&self) -> i32 {
        i32::from(self.year) + Self::YEAR_EPOCH
    }
}

impl fmt::Display for ClockValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02}/{:02}/{:02} {} {:02}:{:02}:{:02}",
            self.calendar_year().rem_euclid(100),
            self.month,
            self.day,
            self.weekday,
            self.hour,
            self.minute,
            self.second
        )
    }
}

impl FromStr for ClockValue {
    type Err = ValidationError;

    /// Parse `yy/mm/dd hh:mm:ss`; two-digit years 69-99 are 19xx, 00-68 are 20xx
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || ValidationError::ClockSpec(s.to_string());

        let mut parts = s.split_whitespace();
        let (date, time) = match (parts.next(), parts.next(), parts.next()) {
            (Some(date), Some(time), None) => (date, time),
            _ => return Err(bad()),
        };

        let fields = |text: &str, sep: char| -> Option<[u16; 3]> {
            let mut it = text.split(sep).map(|p| p.parse::<u16>().ok());
            let out = [it.next()??, it.next()??, it.next()??];
            it.next().is_none().then_some(out)
        };
        let [yy, month, day] = fields(date, '/').ok_or_else(bad)?;
        let [hour, minute, second] = fields(time, ':').ok_or_else(bad)?;

        let year = match i32::from(yy) {
            y @ 0..=68 => 2000 + y,
            y @ 69..=99 => 1900 + y,
            y => y,
        };
        Self::new(year, month, day, hour, minute, second)
    }
}

fn is_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: i32, month: u16) -> u16 {
    match month {
        2 if is_leap(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

/// Day of week, Sunday = 0 (Sakamoto)
fn weekday(year: i32, month: u16, day: u16) -> u16 {
    const T: [i32; 12] = [0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4];
    let y = if month < 3 { year - 1 } else { year };
    let d = y + y / 4 - y / 100 + y / 400 + T[usize::from(month - 1)] + i32::from(day);
    d.rem_euclid(7) as u16
}

/// Owner string, at most 63 bytes so the terminator fits the 64-byte buffer
#[derive(Debug, Clone, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct OwnerString(pub(crate) String);

impl OwnerString {
    /// Longest owner text in bytes
    pub const MAX_LEN: usize = OWNER_LEN - 1;

    /// Validate and wrap owner text
    pub fn new(text: impl Into<String>) -> Result<Self, ValidationError> {
        let text = text.into();
        if text.len() > Self::MAX_LEN {
            return Err(ValidationError::OwnerTooLong {
                len: text.len(),
                max: Self::MAX_LEN,
            });
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// FM tuner frequency in hundredths of a MHz
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PresetFrequency(u16);

impl PresetFrequency {
    /// Lowest whole-MHz part the tuner accepts
    pub const MIN_MHZ: u32 = 60;
    /// Highest whole-MHz part the tuner accepts
    pub const MAX_MHZ: u32 = 150;

    /// Validate a frequency given as whole MHz and hundredths
    pub fn from_parts(mhz: u32, fraction: u32) -> Result<Self, ValidationError> {
        if !(Self::MIN_MHZ..=Self::MAX_MHZ).contains(&mhz) || fraction >= 100 {
            return Err(ValidationError::Frequency { mhz, fraction });
        }
        Ok(Self((mhz * 100 + fraction) as u16))
    }

    /// Validate a frequency given as MHz x 100
    pub fn from_hundredths(value: u32) -> Result<Self, ValidationError> {
        Self::from_parts(value / 100, value % 100)
    }

    pub fn hundredths(self) -> u16 {
        self.0
    }

    pub fn mhz(self) -> u16 {
        self.0 / 100
    }

    pub fn fraction(self) -> u16 {
        self.0 % 100
    }
}

impl fmt::Display for PresetFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:3}.{:02} MHz", self.mhz(), self.fraction())
    }
}

impl FromStr for PresetFrequency {
    type Err = ValidationError;

    /// Parse `MHz.ff`, e.g. `98.30`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mhz, fraction) = s
            .trim()
            .split_once('.')
            .ok_or_else(|| ValidationError::PresetSpec(s.to_string()))?;
        let mhz: u32 = mhz
            .parse()
            .map_err(|_| ValidationError::PresetSpec(s.to_string()))?;
        let fraction: u32 = fraction
            .parse()
            .map_err(|_| ValidationError::PresetSpec(s.to_string()))?;
        Self::from_parts(mhz, fraction)
    }
}

/// One slot of the preset table as stored on the device
///
/// The device may hold values outside the tuner range (e.g. an unset
/// slot), so the raw value is kept as-is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RadioPreset {
    pub index: u8,
    pub frequency_hundredths_mhz: u16,
}

impl fmt::Display for RadioPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.frequency_hundredths_mhz;
        write!(f, "{:2}: {:3}.{:02} MHz", self.index, n / 100, n % 100)
    }
}

/// The full 32-entry preset table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PresetTable(pub [u16; PRESET_COUNT]);

impl PresetTable {
    /// Validate a preset slot number
    pub fn check_index(index: usize) -> Result<usize, ValidationError> {
        if index < PRESET_COUNT {
            Ok(index)
        } else {
            Err(ValidationError::PresetIndex(index))
        }
    }

    /// Replace one slot
    pub fn set(&mut self, index: usize, frequency: PresetFrequency) -> Result<(), ValidationError> {
        let index = Self::check_index(index)?;
        self.0[index] = frequency.hundredths();
        Ok(())
    }

    /// All slots with their indices
    pub fn presets(&self) -> Vec<RadioPreset> {
        self.0
            .iter()
            .enumerate()
            .map(|(i, &n)| RadioPreset {
                index: i as u8,
                frequency_hundredths_mhz: n,
            })
            .collect()
    }
}

/// Model name and firmware version
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ModelInfo {
    pub name: String,
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl fmt::Display for ModelInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}, v{}.{:02}.{:02}",
            self.name, self.major, self.minor, self.patch
        )
    }
}
