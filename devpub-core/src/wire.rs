//! Fixed-layout wire record published to listener clients.
//!
//! Layout (no padding, no length prefix):
//!
//! ```text
//! offset  0 .. 16   event   NUL-terminated, zero-filled
//! offset 16 .. 32   device  NUL-terminated, zero-filled
//! offset 32 .. 48   parent  NUL-terminated, zero-filled
//! ```
//!
//! One record travels as one SEQPACKET message, so clients never reassemble.
//! A value that does not fit its slot is an encoding error: the record is
//! never truncated.

use std::str;

use crate::error::WireError;
use crate::types::{DeviceEvent, DeviceName};

/// Bytes per string slot, terminator included.
pub const FIELD_CAPACITY: usize = 16;

/// Total record size.
pub const RECORD_LEN: usize = FIELD_CAPACITY * 3;

/// One encoded event.
pub type Record = [u8; RECORD_LEN];

const EVENT: &str = "event";
const DEVICE: &str = "device";
const PARENT: &str = "parent";

/// Encode `event` into a wire record.
pub fn encode(event: &DeviceEvent) -> Result<Record, WireError> {
    let mut record = [0u8; RECORD_LEN];
    let (event_slot, rest) = record.split_at_mut(FIELD_CAPACITY);
    let (device_slot, parent_slot) = rest.split_at_mut(FIELD_CAPACITY);

    put_field(event_slot, EVENT, &event.event)?;
    put_field(device_slot, DEVICE, event.device.as_str())?;
    put_field(parent_slot, PARENT, event.parent.as_str())?;
    Ok(record)
}

/// Decode one received message. The message must be exactly one record.
pub fn decode(bytes: &[u8]) -> Result<DeviceEvent, WireError> {
    if bytes.len() != RECORD_LEN {
        return Err(WireError::BadLength {
            len: bytes.len(),
            expected: RECORD_LEN,
        });
    }

    let event = take_field(&bytes[..FIELD_CAPACITY], EVENT)?;
    let device = take_field(&bytes[FIELD_CAPACITY..FIELD_CAPACITY * 2], DEVICE)?;
    let parent = take_field(&bytes[FIELD_CAPACITY * 2..], PARENT)?;

    Ok(DeviceEvent {
        event,
        device: DeviceName(device),
        parent: DeviceName(parent),
    })
}

fn put_field(slot: &mut [u8], field: &'static str, value: &str) -> Result<(), WireError> {
    let bytes = value.as_bytes();
    let max = slot.len() - 1;
    if bytes.len() > max {
        return Err(WireError::FieldTooLong {
            field,
            len: bytes.len(),
            max,
        });
    }
    if bytes.contains(&0) {
        return Err(WireError::InteriorNul { field });
    }
    slot[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

fn take_field(slot: &[u8], field: &'static str) -> Result<String, WireError> {
    let end = slot
        .iter()
        .position(|b| *b == 0)
        .ok_or(WireError::Unterminated { field })?;
    str::from_utf8(&slot[..end])
        .map(str::to_owned)
        .map_err(|_| WireError::NotUtf8 { field })
}
