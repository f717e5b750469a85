//! Asynchronous MAC learning.
//!
//! The learn action runs on the packet path and only enqueues. The consumer
//! task drains the queue one request at a time and installs each learned
//! MAC under the context write lock, never while the read lock taken for
//! the triggering packet is still held.

use super::table::BridgeTable;
use crate::actions::{ActionDesc, Actions, ProcessingState};
use crate::counters::Counters;
use crate::error::Result;
use crate::table::{find_table, find_table_mut, EntryDesc};
use fwd_common::{Context, ObjectHandle, ObjectRegistry, Queue};
use fwd_types::{FieldId, FieldValue, MacAddress, Packet};
use log::{debug, error, info, warn};
use std::sync::{Arc, Weak};

/// A (source MAC, input port) pair observed on the packet path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LearnRequest {
    pub mac: MacAddress,
    pub port_nid: u64,
}

/// Applies a learn action to a packet.
///
/// Learning is best effort: failures are logged and processing continues.
/// The only exception is an action built without a table, which is a
/// provisioning error and drops the packet.
pub fn learn_action(
    objects: &ObjectRegistry,
    table: Option<&ObjectHandle>,
    packet: &dyn Packet,
    counters: &Counters,
) -> ProcessingState {
    let Some(table) = table else {
        error!("learn action has no bridge table");
        Counters::inc(&counters.errors);
        return ProcessingState::Drop;
    };
    let bridge = match find_table(objects, table.id()) {
        Ok(found) => found.as_any().downcast_ref::<BridgeTable>(),
        Err(err) => {
            warn!("learn action: {}", err);
            return ProcessingState::Continue;
        }
    };
    let Some(bridge) = bridge else {
        warn!("learn action: table {} is not a bridge", table.id());
        return ProcessingState::Continue;
    };
    match bridge.learn(packet) {
        Ok(true) => Counters::inc(&counters.learn_requests),
        Ok(false) => {}
        Err(err) => debug!("bridge {}: learn skipped: {}", table.id(), err),
    }
    ProcessingState::Continue
}

/// Drains a bridge's learn queue until it is closed.
pub(super) async fn consume(
    context: Weak<Context>,
    table: String,
    queue: Arc<Queue<LearnRequest>>,
) {
    while let Some(request) = queue.receive().await {
        let Some(context) = context.upgrade() else {
            break;
        };
        let result = {
            let mut objects = context.write();
            if queue.is_closed() {
                // The table was cleaned up; drain without installing.
                continue;
            }
            install(&mut objects, &table, request)
        };
        if let Err(err) = result {
            warn!(
                "bridge {}: learn of {} on port {} failed: {}",
                table, request.mac, request.port_nid, err
            );
        }
    }
    debug!("bridge {}: learn consumer stopped", table);
}

/// Installs one learned MAC as a transient entry. Write lock held.
fn install(objects: &mut ObjectRegistry, table: &str, request: LearnRequest) -> Result<()> {
    let port = objects.find_by_nid(request.port_nid)?.id().to_string();
    let actions = Actions::build(objects, &[ActionDesc::transmit(port.as_str())])?;
    let entry = EntryDesc::transient(vec![FieldValue::new(
        FieldId::ETH_DST,
        request.mac.as_bytes().to_vec(),
    )]);
    find_table_mut(objects, table)?.add_entry(&entry, actions)?;
    info!("bridge {}: learned {} on {}", table, request.mac, port);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::Port;
    use crate::table::{TableDesc, TableRegistry};
    use fwd_common::ContextConfig;
    use fwd_types::FieldPacket;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    const MAC_A: MacAddress = MacAddress::new([2, 0, 0, 0, 0, 0xa]);
    const MAC_B: MacAddress = MacAddress::new([2, 0, 0, 0, 0, 0xb]);

    #[test]
    fn test_learn_without_table_drops() {
        let objects = ObjectRegistry::new();
        let counters = Counters::new();
        let packet = FieldPacket::new().with_macs(MAC_A, MAC_B);
        assert_eq!(
            learn_action(&objects, None, &packet, &counters),
            ProcessingState::Drop
        );
        assert_eq!(counters.snapshot().errors, 1);
    }

    #[test]
    fn test_learn_errors_continue() {
        let mut objects = ObjectRegistry::new();
        let registry = TableRegistry::standard();
        let bridge = registry
            .build(None, &objects, &TableDesc::bridge("br"))
            .unwrap();
        objects.insert(bridge).unwrap();
        let handle = objects.acquire("br").unwrap();

        let counters = Counters::new();
        let no_source = FieldPacket::new();
        assert_eq!(
            learn_action(&objects, Some(&handle), &no_source, &counters),
            ProcessingState::Continue
        );
        assert_eq!(counters.snapshot().learn_requests, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_consumer_installs_transient_entry() {
        let context = Context::new("ctx", ContextConfig::default());
        let handle = {
            let mut objects = context.write();
            objects.insert(Box::new(Port::new("pb", 2))).unwrap();
            TableRegistry::standard()
                .create(&context, &mut objects, &TableDesc::bridge("br"))
                .unwrap();
            objects.acquire("br").unwrap()
        };

        let packet = FieldPacket::new()
            .with_macs(MAC_B, MAC_A)
            .with_input_port(2);
        let counters = Counters::new();
        assert_eq!(
            learn_action(&context.read(), Some(&handle), &packet, &counters),
            ProcessingState::Continue
        );
        assert_eq!(counters.snapshot().learn_requests, 1);

        let mut entries = Vec::new();
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            entries = find_table(&context.read(), "br").unwrap().entries();
            if !entries.is_empty() {
                break;
            }
        }
        assert_eq!(
            entries,
            vec!["eth_dst=02000000000b -> [transmit(pb)] (transient)"]
        );

        drop(handle);
        context.destroy().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_learn_does_not_override_static_entry() {
        let context = Context::new("ctx", ContextConfig::default());
        {
            let mut objects = context.write();
            objects.insert(Box::new(Port::new("pa", 1))).unwrap();
            objects.insert(Box::new(Port::new("pb", 2))).unwrap();
            TableRegistry::standard()
                .create(&context, &mut objects, &TableDesc::bridge("br"))
                .unwrap();
        }

        // Queue a request directly: the MAC is then provisioned statically
        // before the consumer gets the write lock.
        let request = LearnRequest {
            mac: MAC_A,
            port_nid: 2,
        };
        {
            let mut objects = context.write();
            let actions = Actions::build(&objects, &[ActionDesc::transmit("pa")]).unwrap();
            find_table_mut(&mut objects, "br")
                .unwrap()
                .add_entry(
                    &EntryDesc::new(vec![FieldValue::new(
                        FieldId::ETH_DST,
                        MAC_A.as_bytes().to_vec(),
                    )]),
                    actions,
                )
                .unwrap();
            assert!(install(&mut objects, "br", request).is_err());
        }

        let objects = context.read();
        assert_eq!(
            find_table(&objects, "br").unwrap().entries(),
            vec!["eth_dst=02000000000a -> [transmit(pa)]"]
        );
        assert_eq!(objects.ref_count("pb"), Some(0));
        drop(objects);
        context.destroy().await;
    }
}
