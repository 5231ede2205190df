//! Device setting accessors
//!
//! Each accessor is one fixed-size request/response pair. Small responses
//! come back in the control data stage; model info and owner follow on
//! the bulk-in sub-channel. Presets are only ever written as a whole
//! table, so changing one slot is a read-modify-write.

use nomad_protocol::layout::{
    CLOCK_READ_LEN, CLOCK_WRITE_LEN, MEMORY_LEN, MODEL_INFO_LEN, OWNER_LEN, PRESET_READ_LEN,
    PRESET_WRITE_LEN,
};
use nomad_protocol::{
    ClockValue, Command, ControlRequest, MemoryStatus, ModelInfo, OwnerString, PresetFrequency,
    PresetTable, RadioPreset, Transport,
};
use tracing::{debug, info};

use crate::error::Result;
use crate::transport::{control_read, control_write, file_ack, read_response};

/// Model name and firmware version
pub fn get_model_info<T: Transport + ?Sized>(transport: &mut T) -> Result<ModelInfo> {
    control_read(transport, ControlRequest::read(Command::Model, 0, 0, 0))?;
    let buf = read_response(transport, MODEL_INFO_LEN, Command::Model.name())?;
    Ok(ModelInfo::decode(&buf)?)
}

/// Capacity and free space of both banks
pub fn get_memory_status<T: Transport + ?Sized>(transport: &mut T) -> Result<MemoryStatus> {
    let buf = control_read(
        transport,
        ControlRequest::read(Command::Memory, 0, 0, MEMORY_LEN as u16),
    )?;
    let status = MemoryStatus::decode(&buf)?;
    debug!("Memory: {}", status);
    Ok(status)
}

pub fn get_clock<T: Transport + ?Sized>(transport: &mut T) -> Result<ClockValue> {
    let buf = control_read(
        transport,
        ControlRequest::read(Command::GetClock, 0, 0, CLOCK_READ_LEN as u16),
    )?;
    Ok(ClockValue::decode(&buf)?)
}

pub fn set_clock<T: Transport + ?Sized>(transport: &mut T, clock: &ClockValue) -> Result<()> {
    control_write(
        transport,
        ControlRequest::write(Command::SetClock, 0, 0, CLOCK_WRITE_LEN as u16),
        &clock.encode(),
    )?;
    info!("Clock set to {}", clock);
    Ok(())
}

pub fn get_owner<T: Transport + ?Sized>(transport: &mut T) -> Result<OwnerString> {
    control_read(transport, ControlRequest::read(Command::GetOwner, 0, 0, 0))?;
    let buf = read_response(transport, OWNER_LEN, Command::GetOwner.name())?;
    Ok(OwnerString::decode(&buf)?)
}

/// Set the owner string
///
/// Text longer than 63 bytes is rejected before anything is sent.
pub fn set_owner<T: Transport + ?Sized>(transport: &mut T, text: &str) -> Result<()> {
    let owner = OwnerString::new(text)?;
    control_write(
        transport,
        ControlRequest::write(Command::SetOwner, 0, 0, OWNER_LEN as u16),
        &owner.encode(),
    )?;
    file_ack(transport)?;
    info!("Owner set to {:?}", owner.as_str());
    Ok(())
}

/// The full 32-slot preset table
pub fn get_preset_table<T: Transport + ?Sized>(transport: &mut T) -> Result<PresetTable> {
    let buf = control_read(
        transport,
        ControlRequest::read(Command::GetFmPresets, 0, 0, PRESET_READ_LEN as u16),
    )?;
    Ok(PresetTable::decode(&buf)?)
}

/// All 32 presets with their slot numbers
pub fn get_radio_presets<T: Transport + ?Sized>(transport: &mut T) -> Result<Vec<RadioPreset>> {
    Ok(get_preset_table(transport)?.presets())
}

/// Replace one preset, leaving the other 31 as the device has them
pub fn set_preset<T: Transport + ?Sized>(
    transport: &mut T,
    index: usize,
    frequency: PresetFrequency,
) -> Result<()> {
    let index = PresetTable::check_index(index)?;
    let mut table = get_preset_table(transport)?;
    table.set(index, frequency)?;
    control_write(
        transport,
        ControlRequest::write(Command::SetFmPresets, 0, 0, PRESET_WRITE_LEN as u16),
        &table.encode(),
    )?;
    info!("Preset {} set to {}", index, frequency);
    Ok(())
}
