//! Override resolution: local per-host rules merged into raw inventory
//! records before they become typed entities.
//!
//! Rules are keyed `hosts[<node name>][<service type or "ssh">]` and merged
//! one level deep: an override field replaces the record field wholesale.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// A raw inventory record, as returned by the API.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Fields that identify a record and are never overridden.
const IDENTITY_FIELDS: &[&str] = &[
    "node_id",
    "node_name",
    "node_type",
    "service_id",
    "service_name",
    "service_type",
];

/// The `inventory` section of the config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InventoryOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub hosts: HashMap<String, HashMap<String, RawRecord>>,
    #[serde(default)]
    pub default_commands: HashMap<String, String>,
    #[serde(default)]
    pub default_ports: HashMap<String, u16>,
}

/// Looks up and applies host overrides. Lookup only: nothing here is ever
/// written back to the inventory.
#[derive(Debug, Clone, Default)]
pub struct OverrideResolver {
    hosts: HashMap<String, HashMap<String, RawRecord>>,
}

impl OverrideResolver {
    pub fn new(overrides: &InventoryOverrides) -> Self {
        Self {
            hosts: overrides.hosts.clone(),
        }
    }

    pub fn lookup(&self, host: &str, kind: &str) -> Option<&RawRecord> {
        self.hosts.get(host).and_then(|kinds| kinds.get(kind))
    }

    /// Return `record` with `hosts[host][kind]` merged over it. A missing
    /// host or kind passes the record through unchanged.
    pub fn apply(&self, host: &str, kind: &str, mut record: RawRecord) -> RawRecord {
        let Some(rule) = self.lookup(host, kind) else {
            return record;
        };

        debug!(
            host,
            kind,
            fields = ?rule.keys().collect::<Vec<_>>(),
            "applying override"
        );

        for (field, value) in rule {
            if IDENTITY_FIELDS.contains(&field.as_str()) {
                warn!(host, kind, field = %field, "ignoring override of identity field");
                continue;
            }
            record.insert(field.clone(), value.clone());
        }
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: serde_json::Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn resolver(doc: serde_json::Value) -> OverrideResolver {
        let overrides: InventoryOverrides = serde_json::from_value(doc).unwrap();
        OverrideResolver::new(&overrides)
    }

    #[test]
    fn matching_rule_replaces_fields() {
        let resolver = resolver(json!({"hosts": {"db1": {"mysql": {"port": 33061}}}}));
        let merged = resolver.apply(
            "db1",
            "mysql",
            record(json!({"service_id": "s1", "port": 3306})),
        );
        assert_eq!(merged["port"], json!(33061));
        assert_eq!(merged["service_id"], json!("s1"));
    }

    #[test]
    fn unknown_host_or_kind_passes_through() {
        let resolver = resolver(json!({"hosts": {"db1": {"mysql": {"port": 33061}}}}));
        let original = record(json!({"service_id": "s1"}));
        assert_eq!(resolver.apply("db2", "mysql", original.clone()), original);
        assert_eq!(resolver.apply("db1", "postgresql", original.clone()), original);
    }

    #[test]
    fn merge_is_one_level_deep() {
        let resolver = resolver(json!({
            "hosts": {"web1": {"ssh": {"custom_labels": {"port": "2222"}}}}
        }));
        let merged = resolver.apply(
            "web1",
            "ssh",
            record(json!({"custom_labels": {"environment": "prod", "port": "22"}})),
        );
        assert_eq!(merged["custom_labels"], json!({"port": "2222"}));
    }

    #[test]
    fn applying_twice_equals_applying_once() {
        let resolver = resolver(json!({
            "hosts": {"db1": {"mysql": {"port": 33061, "cluster": "east"}}}
        }));
        let raw = record(json!({"service_id": "s1", "cluster": "west"}));
        let once = resolver.apply("db1", "mysql", raw.clone());
        let twice = resolver.apply("db1", "mysql", once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn identity_fields_are_not_overridden() {
        let resolver = resolver(json!({
            "hosts": {"db1": {"mysql": {"service_id": "evil", "service_name": "other", "port": 1}}}
        }));
        let merged = resolver.apply(
            "db1",
            "mysql",
            record(json!({"service_id": "s1", "service_name": "db1-mysql"})),
        );
        assert_eq!(merged["service_id"], json!("s1"));
        assert_eq!(merged["service_name"], json!("db1-mysql"));
        assert_eq!(merged["port"], json!(1));
    }
}
