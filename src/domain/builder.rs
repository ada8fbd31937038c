//! Entity construction: typed Nodes and Services from overridden raw records.
//!
//! Building is pure. A record that cannot become an entity yields a
//! `BuildError`; callers log it and skip the record, since partial
//! inventories are normal.

use std::collections::HashMap;

use serde_json::Value;
use thiserror::Error;

use super::overrides::{InventoryOverrides, RawRecord};
use super::types::{Node, NodeType, Service, ServiceType};

/// Port and command fallbacks, fixed for the lifetime of one resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultTables {
    commands: HashMap<String, String>,
    ports: HashMap<String, u16>,
}

impl Default for DefaultTables {
    fn default() -> Self {
        let commands = [
            ("mongodb", "/usr/bin/mongo"),
            ("mysql", "/usr/bin/mysql"),
            ("postgresql", "/usr/bin/psql"),
            ("ssh", "/usr/bin/ssh"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let ports = [("mongodb", 27011), ("mysql", 3306), ("postgresql", 1234), ("ssh", 22)]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        Self { commands, ports }
    }
}

impl DefaultTables {
    /// The built-in tables with `default_commands`/`default_ports` from the
    /// override document replacing individual entries.
    pub fn from_overrides(overrides: &InventoryOverrides) -> Self {
        let mut tables = Self::default();
        tables.commands.extend(
            overrides
                .default_commands
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        tables
            .ports
            .extend(overrides.default_ports.iter().map(|(k, v)| (k.clone(), *v)));
        tables
    }

    pub fn port(&self, kind: &str) -> Option<u16> {
        self.ports.get(kind).copied()
    }

    pub fn command(&self, kind: &str) -> Option<&str> {
        self.commands.get(kind).map(String::as_str)
    }
}

#[derive(Error, Debug, PartialEq)]
pub enum BuildError {
    #[error("{entity} record is missing required field '{field}'")]
    MissingField { entity: &'static str, field: &'static str },

    #[error("{entity} record has invalid port {value}")]
    InvalidPort { entity: &'static str, value: Value },

    #[error("no default port for service type '{0}'")]
    NoDefaultPort(String),
}

#[derive(Debug, Clone)]
pub struct EntityBuilder {
    defaults: DefaultTables,
}

impl EntityBuilder {
    pub fn new(defaults: DefaultTables) -> Self {
        Self { defaults }
    }

    pub fn defaults(&self) -> &DefaultTables {
        &self.defaults
    }

    pub fn node(&self, node_type: &str, record: &RawRecord) -> Result<Node, BuildError> {
        const ENTITY: &str = "node";

        let labels = record.get("custom_labels").and_then(Value::as_object);
        let port = match labels
            .and_then(|l| l.get("port"))
            .or_else(|| record.get("port"))
        {
            Some(value) if !value.is_null() => parse_port(ENTITY, value)?,
            _ => self.defaults.port("ssh").unwrap_or(22),
        };

        Ok(Node {
            id: required(ENTITY, record, "node_id")?,
            name: required(ENTITY, record, "node_name")?,
            node_type: NodeType::from(node_type),
            address: required(ENTITY, record, "address")?,
            distro: optional(record, "distro"),
            port,
            environment: labels.and_then(|l| optional(l, "environment")),
        })
    }

    /// Build a Service. The Node relation is left unset for the joiner.
    pub fn service(&self, service_type: &str, record: &RawRecord) -> Result<Service, BuildError> {
        const ENTITY: &str = "service";

        let port = match record.get("port") {
            Some(value) if !value.is_null() => parse_port(ENTITY, value)?,
            _ => self
                .defaults
                .port(service_type)
                .ok_or_else(|| BuildError::NoDefaultPort(service_type.to_string()))?,
        };

        Ok(Service {
            id: required(ENTITY, record, "service_id")?,
            name: required(ENTITY, record, "service_name")?,
            service_type: ServiceType::from(service_type),
            cluster: optional(record, "cluster"),
            port,
            address: optional(record, "address"),
            connect_cmd: optional(record, "connect_cmd"),
            node_id: required(ENTITY, record, "node_id")?,
            node: None,
        })
    }
}

fn optional(record: &RawRecord, field: &str) -> Option<String> {
    match record.get(field)? {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

fn required(
    entity: &'static str,
    record: &RawRecord,
    field: &'static str,
) -> Result<String, BuildError> {
    optional(record, field).ok_or(BuildError::MissingField { entity, field })
}

// Custom labels are string maps, so "3307" is as valid as 3307.
fn parse_port(entity: &'static str, value: &Value) -> Result<u16, BuildError> {
    let parsed = match value {
        Value::Number(n) => n.as_u64().and_then(|n| u16::try_from(n).ok()),
        Value::String(s) => s.trim().parse::<u16>().ok(),
        _ => None,
    };
    parsed
        .filter(|p| *p != 0)
        .ok_or_else(|| BuildError::InvalidPort {
            entity,
            value: value.clone(),
        })
}
