//! Applies table results to a packet.
//!
//! The pipeline runs entirely under the context read lock. Tables only
//! return actions; the pipeline walks them in order, following lookups into
//! further tables and collecting the ports a packet leaves on.

use crate::actions::{Action, ProcessingState};
use crate::bridge::learn_action;
use crate::counters::Counters;
use crate::table::find_table;
use fwd_common::ObjectRegistry;
use fwd_types::Packet;
use log::{error, warn};
use std::fmt;
use std::sync::atomic::Ordering;

/// Maximum number of chained table lookups per packet.
pub const MAX_LOOKUP_DEPTH: usize = 16;

/// Final outcome for one packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Transmit on these ports, in action order.
    Forward(Vec<String>),
    Drop,
}

impl Verdict {
    pub fn ports(&self) -> &[String] {
        match self {
            Verdict::Forward(ports) => ports,
            Verdict::Drop => &[],
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Forward(ports) => write!(f, "forward({})", ports.join(", ")),
            Verdict::Drop => f.write_str("drop"),
        }
    }
}

/// Action interpreter.
#[derive(Debug, Clone)]
pub struct Pipeline {
    max_depth: usize,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            max_depth: MAX_LOOKUP_DEPTH,
        }
    }
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_depth(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Processes a packet starting at `table`.
    ///
    /// A packet that ends without any transmit is dropped.
    pub fn run(
        &self,
        objects: &ObjectRegistry,
        table: &str,
        packet: &mut dyn Packet,
        counters: &Counters,
    ) -> Verdict {
        Counters::inc(&counters.rx_packets);
        let mut ports = Vec::new();
        let state = self.run_table(objects, table, packet, counters, 0, &mut ports);
        if state == ProcessingState::Drop || ports.is_empty() {
            Counters::inc(&counters.drops);
            return Verdict::Drop;
        }
        counters
            .tx_packets
            .fetch_add(ports.len() as u64, Ordering::Relaxed);
        Verdict::Forward(ports)
    }

    fn run_table(
        &self,
        objects: &ObjectRegistry,
        id: &str,
        packet: &mut dyn Packet,
        counters: &Counters,
        depth: usize,
        ports: &mut Vec<String>,
    ) -> ProcessingState {
        if depth >= self.max_depth {
            error!("lookup chain deeper than {} at table {}", self.max_depth, id);
            Counters::inc(&counters.errors);
            return ProcessingState::Drop;
        }
        let table = match find_table(objects, id) {
            Ok(table) => table,
            Err(err) => {
                warn!("lookup: {}", err);
                Counters::inc(&counters.errors);
                return ProcessingState::Drop;
            }
        };

        let (actions, state) = table.process(&*packet, counters);
        if state == ProcessingState::Drop {
            return state;
        }
        for action in actions.iter() {
            let state = match action {
                Action::Drop => ProcessingState::Drop,
                Action::Transmit { port } => {
                    ports.push(port.id().to_string());
                    ProcessingState::Continue
                }
                Action::Lookup { table } => {
                    self.run_table(objects, table.id(), packet, counters, depth + 1, ports)
                }
                Action::BridgeLearn { table } => {
                    learn_action(objects, table.as_ref(), &*packet, counters)
                }
                Action::SetField { field, value } => {
                    packet.set_field(*field, value);
                    ProcessingState::Continue
                }
            };
            if state == ProcessingState::Drop {
                return state;
            }
        }
        ProcessingState::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionDesc, Actions};
    use crate::port::Port;
    use crate::table::{find_table_mut, EntryDesc, TableDesc, TableRegistry};
    use fwd_types::{FieldId, FieldPacket, FieldValue};
    use pretty_assertions::assert_eq;

    fn setup() -> ObjectRegistry {
        let registry = TableRegistry::standard();
        let mut objects = ObjectRegistry::new();
        objects.insert(Box::new(Port::new("p1", 1))).unwrap();
        objects.insert(Box::new(Port::new("p2", 2))).unwrap();

        let routes = TableDesc::prefix("routes", vec![FieldId::IPV4_DST])
            .with_default(vec![ActionDesc::Drop]);
        let table = registry.build(None, &objects, &routes).unwrap();
        objects.insert(table).unwrap();

        let acl = TableDesc::exact("acl", vec![FieldId::IP_PROTO])
            .with_default(vec![ActionDesc::lookup("routes")]);
        let table = registry.build(None, &objects, &acl).unwrap();
        objects.insert(table).unwrap();

        let actions = Actions::build(
            &objects,
            &[
                ActionDesc::SetField {
                    field: FieldId::VLAN_ID,
                    value: vec![0, 20],
                },
                ActionDesc::transmit("p2"),
            ],
        )
        .unwrap();
        find_table_mut(&mut objects, "routes")
            .unwrap()
            .add_entry(
                &EntryDesc::new(vec![FieldValue::prefix(
                    FieldId::IPV4_DST,
                    vec![10, 0, 0, 0],
                    4,
                    8,
                )]),
                actions,
            )
            .unwrap();

        let actions = Actions::build(&objects, &[ActionDesc::Drop]).unwrap();
        find_table_mut(&mut objects, "acl")
            .unwrap()
            .add_entry(
                &EntryDesc::new(vec![FieldValue::new(FieldId::IP_PROTO, vec![17])]),
                actions,
            )
            .unwrap();
        objects
    }

    fn packet(proto: u8, dst: [u8; 4]) -> FieldPacket {
        FieldPacket::new()
            .with(FieldId::IP_PROTO, vec![proto])
            .with(FieldId::IPV4_DST, dst.to_vec())
    }

    #[test]
    fn test_lookup_chain_forwards_and_rewrites() {
        let objects = setup();
        let counters = Counters::new();
        let mut pkt = packet(6, [10, 1, 2, 3]);

        let verdict = Pipeline::new().run(&objects, "acl", &mut pkt, &counters);
        assert_eq!(verdict, Verdict::Forward(vec!["p2".into()]));
        assert_eq!(pkt.field(FieldId::VLAN_ID), Some(&[0u8, 20][..]));

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.rx_packets, 1);
        assert_eq!(snapshot.tx_packets, 1);
        assert_eq!(snapshot.table_misses, 1);
        assert_eq!(snapshot.table_hits, 1);
    }

    #[test]
    fn test_drop_action_and_default_drop() {
        let objects = setup();
        let counters = Counters::new();

        let mut udp = packet(17, [10, 1, 2, 3]);
        assert_eq!(
            Pipeline::new().run(&objects, "acl", &mut udp, &counters),
            Verdict::Drop
        );
        let mut unrouted = packet(6, [192, 0, 2, 1]);
        assert_eq!(
            Pipeline::new().run(&objects, "acl", &mut unrouted, &counters),
            Verdict::Drop
        );
        assert_eq!(counters.snapshot().drops, 2);
    }

    #[test]
    fn test_lookup_depth_is_bounded() {
        let registry = TableRegistry::standard();
        let mut objects = ObjectRegistry::new();
        let desc = TableDesc::exact("loop", vec![FieldId::IP_PROTO]);
        let table = registry.build(None, &objects, &desc).unwrap();
        objects.insert(table).unwrap();
        // Point the table's own entry back at itself.
        let actions = Actions::build(&objects, &[ActionDesc::lookup("loop")]).unwrap();
        find_table_mut(&mut objects, "loop")
            .unwrap()
            .add_entry(
                &EntryDesc::new(vec![FieldValue::new(FieldId::IP_PROTO, vec![1])]),
                actions,
            )
            .unwrap();

        let counters = Counters::new();
        let mut pkt = FieldPacket::new().with(FieldId::IP_PROTO, vec![1]);
        assert_eq!(
            Pipeline::with_max_depth(4).run(&objects, "loop", &mut pkt, &counters),
            Verdict::Drop
        );
        assert_eq!(counters.snapshot().errors, 1);
        assert_eq!(counters.snapshot().table_hits, 4);
    }

    #[test]
    fn test_unknown_start_table() {
        let objects = ObjectRegistry::new();
        let counters = Counters::new();
        let mut pkt = FieldPacket::new();
        assert_eq!(
            Pipeline::new().run(&objects, "missing", &mut pkt, &counters),
            Verdict::Drop
        );
        assert_eq!(counters.snapshot().errors, 1);
    }

    #[test]
    fn test_verdict_display() {
        assert_eq!(
            Verdict::Forward(vec!["a".into(), "b".into()]).to_string(),
            "forward(a, b)"
        );
        assert_eq!(Verdict::Drop.to_string(), "drop");
    }
}
