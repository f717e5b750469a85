//! Common types for the forwarding dataplane.
//!
//! This crate provides the primitives every forwarding table speaks:
//!
//! - [`MacAddress`]: 48-bit Ethernet MAC addresses
//! - [`FieldId`] / [`FieldRegistry`]: packet-field identifiers and their
//!   maximum encoded sizes
//! - [`FieldValue`]: one field of an entry descriptor (value and optional mask)
//! - [`Packet`]: the read/write view of a packet that tables match against

mod field;
mod mac;
mod packet;

pub use field::{FieldId, FieldInfo, FieldRegistry, FieldValue};
pub use mac::MacAddress;
pub use packet::{FieldPacket, Packet};

/// Common error type for parsing and field validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("invalid MAC address format: {0}")]
    InvalidMacAddress(String),

    #[error("unknown packet field: {0}")]
    UnknownField(String),

    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },
}
