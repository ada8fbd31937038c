use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::{ConnectError, ConnectResult};

/// Node subtype, taken from the key the inventory files the node under.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum NodeType {
    Generic,
    Container,
    Remote,
    RemoteRds,
    RemoteAzureDatabase,
    Other(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            NodeType::Generic => "generic",
            NodeType::Container => "container",
            NodeType::Remote => "remote",
            NodeType::RemoteRds => "remote_rds",
            NodeType::RemoteAzureDatabase => "remote_azure_database",
            NodeType::Other(other) => other,
        }
    }

    /// Only generic hosts are reachable over SSH.
    pub fn is_ssh_addressable(&self) -> bool {
        matches!(self, NodeType::Generic)
    }
}

impl From<&str> for NodeType {
    fn from(s: &str) -> Self {
        match s {
            "generic" => NodeType::Generic,
            "container" => NodeType::Container,
            "remote" => NodeType::Remote,
            "remote_rds" => NodeType::RemoteRds,
            "remote_azure_database" => NodeType::RemoteAzureDatabase,
            other => NodeType::Other(other.to_string()),
        }
    }
}

impl From<NodeType> for String {
    fn from(t: NodeType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Service subtype. Selects the default port and the command template.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "String")]
pub enum ServiceType {
    Mysql,
    Postgresql,
    Mongodb,
    Ssh,
    Other(String),
}

impl ServiceType {
    pub fn as_str(&self) -> &str {
        match self {
            ServiceType::Mysql => "mysql",
            ServiceType::Postgresql => "postgresql",
            ServiceType::Mongodb => "mongodb",
            ServiceType::Ssh => "ssh",
            ServiceType::Other(other) => other,
        }
    }
}

impl From<&str> for ServiceType {
    fn from(s: &str) -> Self {
        match s {
            "mysql" => ServiceType::Mysql,
            "postgresql" => ServiceType::Postgresql,
            "mongodb" => ServiceType::Mongodb,
            "ssh" => ServiceType::Ssh,
            other => ServiceType::Other(other.to_string()),
        }
    }
}

impl From<ServiceType> for String {
    fn from(t: ServiceType) -> Self {
        t.as_str().to_string()
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A managed host.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub name: String,
    pub node_type: NodeType,
    pub address: String,
    pub distro: Option<String>,
    pub port: u16,
    pub environment: Option<String>,
}

/// A database or application endpoint hosted on one Node.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Service {
    pub id: String,
    pub name: String,
    pub service_type: ServiceType,
    pub cluster: Option<String>,
    pub port: u16,
    /// Set only by a host override; the API's own service address is
    /// agent-local and is dropped before building.
    pub address: Option<String>,
    pub connect_cmd: Option<String>,
    pub node_id: String,
    #[serde(skip)]
    pub node: Option<Arc<Node>>,
}

impl Service {
    /// The owning Node, or `MissingRelation` if the join found none.
    pub fn node(&self) -> ConnectResult<&Node> {
        self.node
            .as_deref()
            .ok_or_else(|| ConnectError::MissingRelation {
                service: self.name.clone(),
                node_id: self.node_id.clone(),
            })
    }

    pub fn host_name(&self) -> ConnectResult<&str> {
        Ok(&self.node()?.name)
    }

    /// The address to connect to: the override address, else the Node's.
    pub fn address(&self) -> ConnectResult<&str> {
        let node = self.node()?;
        Ok(self.address.as_deref().unwrap_or(&node.address))
    }
}
