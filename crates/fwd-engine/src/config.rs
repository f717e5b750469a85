//! YAML scenario files for `fwdd`.
//!
//! A scenario provisions one context and then injects packets into it:
//!
//! ```yaml
//! context: default
//! ports:
//!   - { id: pa, nid: 1 }
//!   - { id: pb, nid: 2, mac: "02:00:00:00:00:0b" }
//! tables:
//!   - id: br
//!     type: bridge
//!     transient_timeout_ms: 60000
//!     default: [drop]
//!     entries:
//!       - fields: { eth_dst: "02:00:00:00:00:0a" }
//!         actions: [ { learn: br }, { transmit: pa } ]
//! packets:
//!   - table: br
//!     fields: { eth_src: "02:00:00:00:00:0b", eth_dst: "02:00:00:00:00:0a", input_port: "2" }
//!   - table: br
//!     wait_ms: 50
//!     fields: { eth_dst: "02:00:00:00:00:0b" }
//! ```
//!
//! Tables are created in file order, so a default action may only refer to
//! tables listed before it. Entries are added once every table exists.

use crate::actions::ActionDesc;
use crate::engine::Engine;
use crate::error::{EngineError, EngineResult, TableError};
use crate::pipeline::Verdict;
use crate::port::Port;
use crate::table::{EntryDesc, TableDesc, TableType};
use fwd_common::ContextConfig;
use fwd_types::{FieldPacket, FieldRegistry, MacAddress, Packet};
use log::{debug, info};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

fn default_context() -> String {
    "default".to_string()
}

/// A complete scenario file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Scenario {
    #[serde(default = "default_context")]
    pub context: String,
    /// Overrides the context's deadlock timer; 0 disables it.
    #[serde(default)]
    pub deadlock_timeout_ms: Option<u64>,
    #[serde(default)]
    pub ports: Vec<PortConfig>,
    #[serde(default)]
    pub tables: Vec<TableConfig>,
    #[serde(default)]
    pub packets: Vec<PacketConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PortConfig {
    pub id: String,
    pub nid: u64,
    #[serde(default)]
    pub mac: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    pub id: String,
    #[serde(rename = "type")]
    pub table_type: String,
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default, rename = "default")]
    pub default_actions: Vec<ActionConfig>,
    #[serde(default)]
    pub transient_timeout_ms: Option<u64>,
    #[serde(default)]
    pub hash_size: Option<usize>,
    #[serde(default)]
    pub entries: Vec<EntryConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntryConfig {
    /// Field name to textual value, see [`FieldRegistry::parse_value`].
    pub fields: BTreeMap<String, String>,
    #[serde(default)]
    pub actions: Vec<ActionConfig>,
    #[serde(default)]
    pub transient: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PacketConfig {
    /// Table the packet enters the pipeline at.
    pub table: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Delay before injecting, so background learning can settle.
    #[serde(default)]
    pub wait_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionConfig {
    Drop,
    Transmit(String),
    Lookup(String),
    Learn(String),
    SetField { field: String, value: String },
}

impl ActionConfig {
    fn to_desc(&self, fields: &FieldRegistry) -> EngineResult<ActionDesc> {
        let desc = match self {
            ActionConfig::Drop => ActionDesc::Drop,
            ActionConfig::Transmit(port) => ActionDesc::transmit(port.as_str()),
            ActionConfig::Lookup(table) => ActionDesc::lookup(table.as_str()),
            ActionConfig::Learn(table) => ActionDesc::learn(table.as_str()),
            ActionConfig::SetField { field, value } => {
                let value = fields.parse_value(field, value)?;
                ActionDesc::SetField {
                    field: value.field,
                    value: value.bytes,
                }
            }
        };
        Ok(desc)
    }
}

fn action_descs(fields: &FieldRegistry, actions: &[ActionConfig]) -> EngineResult<Vec<ActionDesc>> {
    actions.iter().map(|action| action.to_desc(fields)).collect()
}

impl TableConfig {
    fn to_desc(&self, fields: &FieldRegistry) -> EngineResult<TableDesc> {
        let table_type: TableType = self
            .table_type
            .parse()
            .map_err(TableError::InvalidConfig)?;
        let key = self
            .fields
            .iter()
            .map(|name| fields.lookup(name))
            .collect::<Result<Vec<_>, _>>()?;
        let mut desc = TableDesc::new(self.id.clone(), table_type, key)
            .with_default(action_descs(fields, &self.default_actions)?);
        if let Some(ms) = self.transient_timeout_ms {
            desc = desc.with_transient_timeout(Duration::from_millis(ms));
        }
        if let Some(size) = self.hash_size {
            desc = desc.with_hash_size(size);
        }
        Ok(desc)
    }
}

impl EntryConfig {
    fn to_desc(&self, fields: &FieldRegistry) -> EngineResult<EntryDesc> {
        let values = self
            .fields
            .iter()
            .map(|(name, text)| fields.parse_value(name, text))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(EntryDesc {
            fields: values,
            transient: self.transient,
        })
    }
}

impl PacketConfig {
    fn to_packet(&self, fields: &FieldRegistry) -> EngineResult<FieldPacket> {
        let mut packet = FieldPacket::new();
        for (name, text) in &self.fields {
            let value = fields.parse_value(name, text)?;
            packet.set_field(value.field, &value.bytes);
        }
        Ok(packet)
    }
}

/// Verdict of one injected packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketResult {
    pub index: usize,
    pub table: String,
    pub verdict: Verdict,
}

impl Scenario {
    pub fn load(path: impl AsRef<Path>) -> EngineResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Parses a scenario. Actions with an argument are written as
    /// single-key maps such as `{ transmit: p1 }`.
    pub fn from_yaml(text: &str) -> EngineResult<Self> {
        let deserializer = serde_yaml::Deserializer::from_str(text);
        Ok(serde_yaml::with::singleton_map_recursive::deserialize(
            deserializer,
        )?)
    }

    fn context_config(&self) -> ContextConfig {
        let mut config = ContextConfig::default();
        if let Some(ms) = self.deadlock_timeout_ms {
            config.deadlock_timeout = Duration::from_millis(ms);
        }
        config
    }

    /// Creates the context and provisions ports, tables and entries.
    pub fn apply(&self, engine: &Engine) -> EngineResult<()> {
        let fields = engine.fields();
        engine.create_context(self.context.as_str(), self.context_config())?;

        for port in &self.ports {
            let mut object = Port::new(port.id.as_str(), port.nid);
            if let Some(mac) = &port.mac {
                object = object.with_mac(mac.parse::<MacAddress>()?);
            }
            engine.create_port(&self.context, object)?;
        }
        for table in &self.tables {
            engine.create_table(&self.context, &table.to_desc(fields)?)?;
        }
        for table in &self.tables {
            for entry in &table.entries {
                let actions = action_descs(fields, &entry.actions)?;
                engine.add_entry(&self.context, &table.id, &entry.to_desc(fields)?, &actions)?;
            }
        }
        info!(
            "context {}: provisioned {} ports, {} tables",
            self.context,
            self.ports.len(),
            self.tables.len()
        );
        Ok(())
    }

    /// Injects every packet in order and collects the verdicts.
    pub async fn run(&self, engine: &Engine) -> EngineResult<Vec<PacketResult>> {
        let mut results = Vec::with_capacity(self.packets.len());
        for (index, config) in self.packets.iter().enumerate() {
            if config.wait_ms > 0 {
                tokio::time::sleep(Duration::from_millis(config.wait_ms)).await;
            }
            let mut packet = config.to_packet(engine.fields())?;
            let verdict = engine.inject(&self.context, &config.table, &mut packet)?;
            debug!("packet {} at {}: {}", index, config.table, verdict);
            results.push(PacketResult {
                index,
                table: config.table.clone(),
                verdict,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fwd_types::{FieldId, FieldValue};
    use pretty_assertions::assert_eq;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ROUTED: &str = r#"
context: lab
ports:
  - { id: p1, nid: 1 }
  - { id: p2, nid: 2, mac: "02:00:00:00:00:02" }
tables:
  - id: routes
    type: prefix
    fields: [ipv4_dst]
    default: [drop]
    entries:
      - fields: { ipv4_dst: "10.0.0.0/8" }
        actions: [ { transmit: p1 } ]
      - fields: { ipv4_dst: "10.1.0.0/16" }
        actions:
          - set_field: { field: vlan_id, value: "20" }
          - transmit: p2
  - id: acl
    type: exact
    fields: [ip_proto]
    hash_size: 64
    default: [ { lookup: routes } ]
    entries:
      - fields: { ip_proto: "17" }
        actions: [drop]
packets:
  - { table: acl, fields: { ip_proto: "6", ipv4_dst: "10.1.2.3" } }
  - { table: acl, fields: { ip_proto: "6", ipv4_dst: "10.9.9.9" } }
  - { table: acl, fields: { ip_proto: "17", ipv4_dst: "10.1.2.3" } }
"#;

    #[test]
    fn test_parse_scenario() {
        let scenario = Scenario::from_yaml(ROUTED).unwrap();
        assert_eq!(scenario.context, "lab");
        assert_eq!(scenario.ports.len(), 2);
        assert_eq!(scenario.tables[1].hash_size, Some(64));
        assert_eq!(
            scenario.tables[0].entries[1].actions,
            vec![
                ActionConfig::SetField {
                    field: "vlan_id".into(),
                    value: "20".into()
                },
                ActionConfig::Transmit("p2".into()),
            ]
        );

        let fields = FieldRegistry::standard();
        let desc = scenario.tables[1].to_desc(&fields).unwrap();
        assert_eq!(desc.table_type, TableType::Exact);
        assert_eq!(desc.fields, vec![FieldId::IP_PROTO]);
        assert_eq!(desc.default_actions, vec![ActionDesc::lookup("routes")]);

        let entry = scenario.tables[0].entries[0].to_desc(&fields).unwrap();
        assert_eq!(
            entry.fields,
            vec![FieldValue::prefix(FieldId::IPV4_DST, [10, 0, 0, 0], 4, 8)]
        );
    }

    #[test]
    fn test_every_action_form_parses() {
        let scenario = Scenario::from_yaml(
            r#"
tables:
  - id: t
    type: exact
    fields: [eth_dst]
    default:
      - drop
      - { transmit: p1 }
      - { lookup: other }
      - learn: br
      - set_field: { field: vlan_id, value: "7" }
"#,
        )
        .unwrap();
        assert_eq!(
            scenario.tables[0].default_actions,
            vec![
                ActionConfig::Drop,
                ActionConfig::Transmit("p1".into()),
                ActionConfig::Lookup("other".into()),
                ActionConfig::Learn("br".into()),
                ActionConfig::SetField {
                    field: "vlan_id".into(),
                    value: "7".into()
                },
            ]
        );
        assert!(matches!(
            Scenario::from_yaml("tables: [ { id: t, type: exact, default: [ { flood: p1 } ] } ]"),
            Err(EngineError::Yaml(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_bridge_scenario_learns() {
        let scenario = Scenario::from_yaml(
            r#"
ports:
  - { id: pa, nid: 1 }
  - { id: pb, nid: 2, mac: "02:00:00:00:00:0b" }
tables:
  - id: br
    type: bridge
    transient_timeout_ms: 60000
    default: [drop]
    entries:
      - fields: { eth_dst: "02:00:00:00:00:0a" }
        actions: [ { learn: br }, { transmit: pa } ]
packets:
  - table: br
    fields: { eth_src: "02:00:00:00:00:0b", eth_dst: "02:00:00:00:00:0a", input_port: "2" }
  - table: br
    wait_ms: 100
    fields: { eth_dst: "02:00:00:00:00:0b" }
"#,
        )
        .unwrap();
        let engine = Engine::standard();
        scenario.apply(&engine).unwrap();

        let verdicts: Vec<Verdict> = scenario
            .run(&engine)
            .await
            .unwrap()
            .into_iter()
            .map(|result| result.verdict)
            .collect();
        assert_eq!(
            verdicts,
            vec![
                Verdict::Forward(vec!["pa".into()]),
                Verdict::Forward(vec!["pb".into()]),
            ]
        );
        engine.shutdown().await;
    }

    #[tokio::test]
    async fn test_apply_and_run() {
        let scenario = Scenario::from_yaml(ROUTED).unwrap();
        let engine = Engine::standard();
        scenario.apply(&engine).unwrap();

        let verdicts: Vec<Verdict> = scenario
            .run(&engine)
            .await
            .unwrap()
            .into_iter()
            .map(|result| result.verdict)
            .collect();
        assert_eq!(
            verdicts,
            vec![
                Verdict::Forward(vec!["p2".into()]),
                Verdict::Forward(vec!["p1".into()]),
                Verdict::Drop,
            ]
        );
        assert_eq!(engine.entries("lab", "routes").unwrap().len(), 2);
        engine.shutdown().await;
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "ports:\n  - {{ id: p1, nid: 1 }}").unwrap();
        file.flush().unwrap();

        let scenario = Scenario::load(file.path()).unwrap();
        assert_eq!(scenario.context, "default");
        assert_eq!(scenario.ports[0].id, "p1");
        assert!(scenario.packets.is_empty());
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            Scenario::load("/nonexistent/scenario.yaml"),
            Err(EngineError::Io { .. })
        ));
        assert!(matches!(
            Scenario::from_yaml("tables: [ { id: t } ]"),
            Err(EngineError::Yaml(_))
        ));
        assert!(matches!(
            Scenario::from_yaml("bogus: 1"),
            Err(EngineError::Yaml(_))
        ));
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let fields = FieldRegistry::standard();
        let table = TableConfig {
            id: "t".into(),
            table_type: "hash".into(),
            fields: vec![],
            default_actions: vec![],
            transient_timeout_ms: None,
            hash_size: None,
            entries: vec![],
        };
        assert!(matches!(
            table.to_desc(&fields),
            Err(EngineError::Table(TableError::InvalidConfig(_)))
        ));

        let entry = EntryConfig {
            fields: BTreeMap::from([("ip_proto".to_string(), "300".to_string())]),
            actions: vec![],
            transient: false,
        };
        assert!(matches!(
            entry.to_desc(&fields),
            Err(EngineError::Parse(_))
        ));
    }
}
