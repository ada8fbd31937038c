//! Service → Node join over an id-keyed index.

use std::sync::Arc;

use indexmap::IndexMap;
use tracing::warn;

use super::types::{Node, Service};

/// Nodes keyed by id, in inventory order.
pub type NodeSet = IndexMap<String, Arc<Node>>;

/// Services keyed by id, in inventory order.
pub type ServiceSet = IndexMap<String, Service>;

/// Index nodes by id. A repeated id replaces the earlier node in place.
pub fn index_nodes(nodes: impl IntoIterator<Item = Node>) -> NodeSet {
    let mut set = NodeSet::new();
    for node in nodes {
        if let Some(previous) = set.insert(node.id.clone(), Arc::new(node)) {
            warn!(node_id = %previous.id, name = %previous.name, "duplicate node id, keeping the later record");
        }
    }
    set
}

pub struct RelationJoiner<'a> {
    nodes: &'a NodeSet,
}

impl<'a> RelationJoiner<'a> {
    pub fn new(nodes: &'a NodeSet) -> Self {
        Self { nodes }
    }

    pub fn owner(&self, node_id: &str) -> Option<&'a Arc<Node>> {
        self.nodes.get(node_id)
    }

    /// Attach the owning Node. A Service whose Node is unknown is kept but
    /// stays unjoined; reading Node-derived fields on it fails later.
    pub fn join(&self, mut service: Service) -> Service {
        service.node = self.owner(&service.node_id).cloned();
        if service.node.is_none() {
            warn!(
                service = %service.name,
                service_id = %service.id,
                node_id = %service.node_id,
                "service references an unknown node"
            );
        }
        service
    }
}
