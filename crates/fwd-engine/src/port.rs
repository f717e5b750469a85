//! Port objects.
//!
//! Port I/O lives outside the dataplane core. A port here is only an
//! addressable transmit target: a registry id, the numeric id packets carry
//! as their input port, and optionally the MAC it owns.

use fwd_common::Object;
use fwd_types::MacAddress;
use std::any::Any;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Port {
    id: String,
    nid: u64,
    mac: Option<MacAddress>,
}

impl Port {
    pub fn new(id: impl Into<String>, nid: u64) -> Self {
        Self {
            id: id.into(),
            nid,
            mac: None,
        }
    }

    pub fn with_mac(mut self, mac: MacAddress) -> Self {
        self.mac = Some(mac);
        self
    }

    pub fn nid(&self) -> u64 {
        self.nid
    }

    pub fn mac(&self) -> Option<MacAddress> {
        self.mac
    }
}

impl Object for Port {
    fn id(&self) -> &str {
        &self.id
    }

    fn kind(&self) -> &'static str {
        "port"
    }

    fn nid(&self) -> Option<u64> {
        Some(self.nid)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mac {
            Some(mac) => write!(f, "{} (nid {}, {})", self.id, self.nid, mac),
            None => write!(f, "{} (nid {})", self.id, self.nid),
        }
    }
}
