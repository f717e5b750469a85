//! Packet view consumed by forwarding tables.

use crate::{FieldId, MacAddress};
use std::collections::BTreeMap;

/// Field-level access to a packet.
///
/// Header parsing lives outside the dataplane core; tables only ever see a
/// packet through this trait.
pub trait Packet: Send + Sync {
    /// Returns the raw bytes of a field, or `None` if the packet lacks it.
    fn field(&self, id: FieldId) -> Option<&[u8]>;

    /// Overwrites (or adds) a field.
    fn set_field(&mut self, id: FieldId, bytes: &[u8]);

    /// Reads a big-endian numeric field such as a port NID.
    fn field_u64(&self, id: FieldId) -> Option<u64> {
        let bytes = self.field(id)?;
        if bytes.len() > 8 {
            return None;
        }
        Some(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }
}

/// Map-backed packet, used by the engine's injection path and by tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldPacket {
    fields: BTreeMap<FieldId, Vec<u8>>,
}

impl FieldPacket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field setter.
    pub fn with(mut self, id: FieldId, bytes: impl Into<Vec<u8>>) -> Self {
        self.fields.insert(id, bytes.into());
        self
    }

    /// Sets source and destination MAC addresses.
    pub fn with_macs(self, src: MacAddress, dst: MacAddress) -> Self {
        self.with(FieldId::ETH_SRC, src.as_bytes().to_vec())
            .with(FieldId::ETH_DST, dst.as_bytes().to_vec())
    }

    /// Sets the input port NID (8 bytes, big-endian).
    pub fn with_input_port(self, nid: u64) -> Self {
        self.with(FieldId::INPUT_PORT, nid.to_be_bytes().to_vec())
    }

    /// Iterates over the fields present in the packet.
    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &Vec<u8>)> {
        self.fields.iter()
    }
}

impl Packet for FieldPacket {
    fn field(&self, id: FieldId) -> Option<&[u8]> {
        self.fields.get(&id).map(Vec::as_slice)
    }

    fn set_field(&mut self, id: FieldId, bytes: &[u8]) {
        self.fields.insert(id, bytes.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_field_access() {
        let src = MacAddress::new([2, 0, 0, 0, 0, 1]);
        let dst = MacAddress::new([2, 0, 0, 0, 0, 2]);
        let mut packet = FieldPacket::new().with_macs(src, dst).with_input_port(7);

        assert_eq!(packet.field(FieldId::ETH_SRC), Some(&src.as_bytes()[..]));
        assert_eq!(packet.field_u64(FieldId::INPUT_PORT), Some(7));
        assert!(packet.field(FieldId::IPV4_DST).is_none());

        packet.set_field(FieldId::ETH_DST, src.as_bytes());
        assert_eq!(packet.field(FieldId::ETH_DST), Some(&src.as_bytes()[..]));
    }

    #[test]
    fn test_field_u64_rejects_oversized() {
        let packet = FieldPacket::new().with(FieldId::IPV6_DST, vec![1; 16]);
        assert_eq!(packet.field_u64(FieldId::IPV6_DST), None);
    }
}
