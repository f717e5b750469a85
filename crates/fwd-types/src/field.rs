//! Packet-field identifiers and their encoding limits.
//!
//! Every field that a table can match on has a maximum encoded size. Keys
//! are built by placing each field value right-aligned into a zero-filled
//! slot of that size, so the registry is the single source of truth for
//! key layout.

use crate::{MacAddress, ParseError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Identifier of a packet field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FieldId(pub u16);

impl FieldId {
    pub const ETH_DST: FieldId = FieldId(1);
    pub const ETH_SRC: FieldId = FieldId(2);
    pub const ETH_TYPE: FieldId = FieldId(3);
    pub const VLAN_ID: FieldId = FieldId(4);
    pub const IPV4_SRC: FieldId = FieldId(10);
    pub const IPV4_DST: FieldId = FieldId(11);
    pub const IPV6_SRC: FieldId = FieldId(12);
    pub const IPV6_DST: FieldId = FieldId(13);
    pub const IP_PROTO: FieldId = FieldId(14);
    pub const L4_SRC_PORT: FieldId = FieldId(20);
    pub const L4_DST_PORT: FieldId = FieldId(21);
    /// Numeric id of the port the packet arrived on.
    pub const INPUT_PORT: FieldId = FieldId(30);
    /// Numeric id of the port the packet leaves on, once decided.
    pub const OUTPUT_PORT: FieldId = FieldId(31);
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "field#{}", self.0)
    }
}

/// Registry metadata for a single field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    pub name: String,
    /// Maximum encoded size in bytes.
    pub max_size: usize,
}

/// Explicit registry of the fields known to the dataplane.
///
/// Constructed once at startup and handed to every table builder; there is
/// no process-wide mutable field table.
#[derive(Debug, Clone, Default)]
pub struct FieldRegistry {
    fields: HashMap<FieldId, FieldInfo>,
    by_name: HashMap<String, FieldId>,
}

impl FieldRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry populated with the standard L2-L4 header fields.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for (id, name, size) in [
            (FieldId::ETH_DST, "eth_dst", 6),
            (FieldId::ETH_SRC, "eth_src", 6),
            (FieldId::ETH_TYPE, "eth_type", 2),
            (FieldId::VLAN_ID, "vlan_id", 2),
            (FieldId::IPV4_SRC, "ipv4_src", 4),
            (FieldId::IPV4_DST, "ipv4_dst", 4),
            (FieldId::IPV6_SRC, "ipv6_src", 16),
            (FieldId::IPV6_DST, "ipv6_dst", 16),
            (FieldId::IP_PROTO, "ip_proto", 1),
            (FieldId::L4_SRC_PORT, "l4_src_port", 2),
            (FieldId::L4_DST_PORT, "l4_dst_port", 2),
            (FieldId::INPUT_PORT, "input_port", 8),
            (FieldId::OUTPUT_PORT, "output_port", 8),
        ] {
            registry.register(id, name, size);
        }
        registry
    }

    /// Registers (or redefines) a field.
    pub fn register(&mut self, id: FieldId, name: impl Into<String>, max_size: usize) {
        let name = name.into();
        self.by_name.insert(name.clone(), id);
        self.fields.insert(id, FieldInfo { name, max_size });
    }

    /// Returns the metadata of a field.
    pub fn get(&self, id: FieldId) -> Option<&FieldInfo> {
        self.fields.get(&id)
    }

    /// Returns the max size of a field, or an error for unknown ids.
    pub fn max_size(&self, id: FieldId) -> Result<usize, ParseError> {
        self.fields
            .get(&id)
            .map(|info| info.max_size)
            .ok_or_else(|| ParseError::UnknownField(id.to_string()))
    }

    /// Resolves a field by its registered name.
    pub fn lookup(&self, name: &str) -> Result<FieldId, ParseError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| ParseError::UnknownField(name.to_string()))
    }

    /// Returns the registered name of a field, falling back to its id.
    pub fn name(&self, id: FieldId) -> String {
        self.fields
            .get(&id)
            .map(|info| info.name.clone())
            .unwrap_or_else(|| id.to_string())
    }

    /// Parses the textual form of a field value.
    ///
    /// Accepted forms are MAC addresses, IPv4 and IPv6 addresses, `0x` hex
    /// strings and decimal numbers. Decimal numbers are encoded big-endian
    /// across the whole field. A `/len` suffix makes the value a prefix
    /// match on its first `len` bits.
    pub fn parse_value(&self, name: &str, text: &str) -> Result<FieldValue, ParseError> {
        let field = self.lookup(name)?;
        let width = self.max_size(field)?;
        let invalid = || ParseError::InvalidValue {
            field: name.to_string(),
            value: text.to_string(),
        };

        let (value, prefix_len) = match text.split_once('/') {
            Some((value, len)) => (value, Some(len.parse::<usize>().map_err(|_| invalid())?)),
            None => (text, None),
        };
        let bytes = parse_bytes(value.trim(), width).ok_or_else(invalid)?;
        if bytes.len() > width {
            return Err(invalid());
        }
        match prefix_len {
            Some(len) if len > width * 8 => Err(invalid()),
            Some(len) => Ok(FieldValue::prefix(field, bytes, width, len)),
            None => Ok(FieldValue::new(field, bytes)),
        }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One field of an entry descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldValue {
    pub field: FieldId,
    pub bytes: Vec<u8>,
    /// Optional mask, right-aligned like the value.
    pub mask: Option<Vec<u8>>,
}

impl FieldValue {
    /// Creates an exact value with no mask.
    pub fn new(field: FieldId, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            field,
            bytes: bytes.into(),
            mask: None,
        }
    }

    /// Attaches a mask to the value.
    pub fn with_mask(mut self, mask: impl Into<Vec<u8>>) -> Self {
        self.mask = Some(mask.into());
        self
    }

    /// Creates a masked value whose mask selects the first `prefix_len` bits
    /// of a `width`-byte field.
    pub fn prefix(field: FieldId, bytes: impl Into<Vec<u8>>, width: usize, prefix_len: usize) -> Self {
        let mut mask = vec![0u8; width];
        for (i, byte) in mask.iter_mut().enumerate() {
            let bits = prefix_len.saturating_sub(i * 8).min(8);
            *byte = if bits == 0 { 0 } else { 0xffu8 << (8 - bits) };
        }
        Self::new(field, bytes).with_mask(mask)
    }
}

fn parse_bytes(text: &str, width: usize) -> Option<Vec<u8>> {
    if let Ok(mac) = text.parse::<MacAddress>() {
        return Some(mac.as_bytes().to_vec());
    }
    if let Ok(addr) = text.parse::<Ipv4Addr>() {
        return Some(addr.octets().to_vec());
    }
    if let Ok(addr) = text.parse::<Ipv6Addr>() {
        return Some(addr.octets().to_vec());
    }
    if let Some(hex) = text.strip_prefix("0x") {
        return decode_hex(hex);
    }

    let number: u64 = text.parse().ok()?;
    let bytes = number.to_be_bytes();
    let skip = bytes.len() - width.min(bytes.len());
    if bytes[..skip].iter().any(|b| *b != 0) {
        return None;
    }
    Some(bytes[skip..].to_vec())
}

fn decode_hex(hex: &str) -> Option<Vec<u8>> {
    if hex.is_empty() || hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| hex.get(i..i + 2).and_then(|pair| u8::from_str_radix(pair, 16).ok()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_standard_registry_sizes() {
        let registry = FieldRegistry::standard();
        assert_eq!(registry.max_size(FieldId::ETH_DST).unwrap(), 6);
        assert_eq!(registry.max_size(FieldId::IPV6_DST).unwrap(), 16);
        assert_eq!(registry.max_size(FieldId::INPUT_PORT).unwrap(), 8);
        assert_eq!(registry.lookup("ipv4_dst").unwrap(), FieldId::IPV4_DST);
    }

    #[test]
    fn test_unknown_field_is_error() {
        let registry = FieldRegistry::standard();
        assert!(registry.max_size(FieldId(999)).is_err());
        assert!(registry.lookup("not_a_field").is_err());
        assert_eq!(registry.name(FieldId(999)), "field#999");
    }

    #[test]
    fn test_prefix_mask_construction() {
        let value = FieldValue::prefix(FieldId::IPV4_DST, vec![10, 1, 0, 0], 4, 12);
        assert_eq!(value.mask, Some(vec![0xff, 0xf0, 0x00, 0x00]));

        let full = FieldValue::prefix(FieldId::IPV4_DST, vec![10, 1, 2, 3], 4, 32);
        assert_eq!(full.mask, Some(vec![0xff; 4]));
    }

    #[test]
    fn test_parse_value_forms() {
        let registry = FieldRegistry::standard();
        assert_eq!(
            registry.parse_value("eth_dst", "02:00:00:00:00:0b").unwrap(),
            FieldValue::new(FieldId::ETH_DST, vec![2, 0, 0, 0, 0, 0xb])
        );
        assert_eq!(
            registry.parse_value("ipv4_dst", "10.1.0.0/16").unwrap(),
            FieldValue::prefix(FieldId::IPV4_DST, vec![10, 1, 0, 0], 4, 16)
        );
        assert_eq!(
            registry.parse_value("eth_type", "0x0800").unwrap(),
            FieldValue::new(FieldId::ETH_TYPE, vec![8, 0])
        );
        assert_eq!(
            registry.parse_value("vlan_id", "10").unwrap(),
            FieldValue::new(FieldId::VLAN_ID, vec![0, 10])
        );
        assert_eq!(
            registry.parse_value("input_port", "7").unwrap().bytes,
            7u64.to_be_bytes().to_vec()
        );
        assert_eq!(
            registry.parse_value("ipv6_dst", "2001:db8::/32").unwrap().bytes.len(),
            16
        );
    }

    #[test]
    fn test_parse_value_rejects_bad_input() {
        let registry = FieldRegistry::standard();
        assert!(matches!(
            registry.parse_value("ip_proto", "300"),
            Err(ParseError::InvalidValue { .. })
        ));
        assert!(registry.parse_value("eth_type", "0x080").is_err());
        assert!(registry.parse_value("ipv4_dst", "10.0.0.0/33").is_err());
        assert!(matches!(
            registry.parse_value("nope", "1"),
            Err(ParseError::UnknownField(_))
        ));
    }
}
