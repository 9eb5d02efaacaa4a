//! devpub core library: device event model and the listener wire record.
//!
//! Public API surface:
//! - [`types`]: [`DeviceEvent`] and well-known event names
//! - [`wire`]: fixed-layout record encoding shared by daemon and clients
//! - [`error`]: [`WireError`]

pub mod error;
pub mod types;
pub mod wire;

pub use error::WireError;
pub use types::{DeviceEvent, DeviceName, ATTACH_EVENT, DETACH_EVENT};
pub use wire::{decode, encode, Record, FIELD_CAPACITY, RECORD_LEN};
