//! Inventory resolution with per-invocation memoization.
//!
//! Pipeline per collection:
//!   InventoryClient → OverrideResolver → EntityBuilder → (services) RelationJoiner
//!
//! Nodes and services are fetched lazily and kept for the lifetime of the
//! `Inventory`, unless `force_requests` is set, in which case every call
//! goes back to the API.

use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::client::InventoryClient;
use crate::error::{ConnectError, ConnectResult};

use super::builder::{DefaultTables, EntityBuilder};
use super::overrides::{InventoryOverrides, OverrideResolver};
use super::relation::{index_nodes, NodeSet, RelationJoiner, ServiceSet};

/// Override key applied to node records.
const NODE_OVERRIDE_KIND: &str = "ssh";

const SERVICE_ADDRESS_FIELD: &str = "address";

pub struct Inventory<C> {
    client: C,
    overrides: OverrideResolver,
    builder: EntityBuilder,
    force_requests: bool,
    nodes: Option<Arc<NodeSet>>,
    services: Option<Arc<ServiceSet>>,
}

impl<C: InventoryClient> Inventory<C> {
    pub fn new(client: C, overrides: &InventoryOverrides) -> Self {
        Self {
            client,
            overrides: OverrideResolver::new(overrides),
            builder: EntityBuilder::new(DefaultTables::from_overrides(overrides)),
            force_requests: false,
            nodes: None,
            services: None,
        }
    }

    pub fn with_force_requests(mut self, force: bool) -> Self {
        self.force_requests = force;
        self
    }

    pub fn force_requests(&self) -> bool {
        self.force_requests
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn defaults(&self) -> &DefaultTables {
        self.builder.defaults()
    }

    /// All nodes, fetched on first use.
    pub fn nodes(&mut self) -> ConnectResult<Arc<NodeSet>> {
        if let Some(nodes) = self.cached(&self.nodes) {
            return Ok(nodes);
        }

        let raw = self.client.fetch_nodes().map_err(|e| self.unavailable(e))?;

        let mut built = Vec::new();
        for (node_type, records) in raw {
            for record in records {
                let host = record
                    .get("node_name")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let record = self.overrides.apply(&host, NODE_OVERRIDE_KIND, record);
                match self.builder.node(&node_type, &record) {
                    Ok(node) => built.push(node),
                    Err(e) => warn!(error = %e, node_type = %node_type, "skipping node record"),
                }
            }
        }

        let nodes = Arc::new(index_nodes(built));
        debug!(count = nodes.len(), "resolved nodes");
        if !self.force_requests {
            self.nodes = Some(nodes.clone());
        }
        Ok(nodes)
    }

    /// All services, each joined to its owning node. Resolves nodes first.
    pub fn services(&mut self) -> ConnectResult<Arc<ServiceSet>> {
        if let Some(services) = self.cached(&self.services) {
            return Ok(services);
        }

        let nodes = self.nodes()?;
        let raw = self.client.fetch_services().map_err(|e| self.unavailable(e))?;
        let joiner = RelationJoiner::new(&nodes);

        let mut services = ServiceSet::new();
        for (service_type, records) in raw {
            for mut record in records {
                // The API reports the agent-local address; connections go
                // through the owning node unless an override says otherwise.
                record.remove(SERVICE_ADDRESS_FIELD);
                let node_id = record.get("node_id").and_then(|v| v.as_str()).unwrap_or_default();
                let record = match joiner.owner(node_id) {
                    Some(owner) => self.overrides.apply(&owner.name, &service_type, record),
                    None => record,
                };
                match self.builder.service(&service_type, &record) {
                    Ok(service) => {
                        let service = joiner.join(service);
                        if let Some(previous) = services.insert(service.id.clone(), service) {
                            warn!(service_id = %previous.id, name = %previous.name, "duplicate service id, keeping the later record");
                        }
                    }
                    Err(e) => warn!(error = %e, service_type = %service_type, "skipping service record"),
                }
            }
        }

        let services = Arc::new(services);
        debug!(count = services.len(), "resolved services");
        if !self.force_requests {
            self.services = Some(services.clone());
        }
        Ok(services)
    }

    fn cached<T>(&self, slot: &Option<Arc<T>>) -> Option<Arc<T>> {
        if self.force_requests {
            return None;
        }
        slot.clone()
    }

    fn unavailable(&self, source: ConnectError) -> ConnectError {
        error!(base_uri = %self.client.base_uri(), error = %source, "failed to reach PMM");
        ConnectError::Unavailable {
            base_uri: self.client.base_uri().to_string(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::fake::FakeClient;
    use crate::domain::types::ServiceType;
    use serde_json::json;

    fn fake() -> FakeClient {
        FakeClient::new(
            json!({
                "generic": [
                    {"node_id": "n1", "node_name": "db1", "address": "10.0.0.5"},
                    {"node_id": "n2", "node_name": "web1", "address": "10.0.0.9",
                     "custom_labels": {"environment": "prod"}},
                    {"node_id": "n3", "node_name": "broken"}
                ],
                "container": [
                    {"node_id": "n4", "node_name": "c1", "address": "172.17.0.2"}
                ]
            }),
            json!({
                "mysql": [
                    {"service_name": "db1-mysql", "node_id": "n1", "service_id": "s1"},
                    {"service_name": "orphan-mysql", "node_id": "n404", "service_id": "s2"}
                ],
                "postgresql": [
                    {"service_name": "db1-pg", "node_id": "n1", "service_id": "s3", "port": 5432}
                ]
            }),
        )
    }

    fn overrides(doc: serde_json::Value) -> InventoryOverrides {
        serde_json::from_value(doc).unwrap()
    }

    #[test]
    fn nodes_are_built_and_malformed_records_skipped() {
        let mut inventory = Inventory::new(fake(), &InventoryOverrides::default());
        let nodes = inventory.nodes().unwrap();
        assert_eq!(nodes.keys().collect::<Vec<_>>(), ["n1", "n2", "n4"]);
        assert_eq!(nodes["n1"].port, 22);
        assert_eq!(nodes["n2"].environment.as_deref(), Some("prod"));
    }

    #[test]
    fn collections_are_memoized() {
        let mut inventory = Inventory::new(fake(), &InventoryOverrides::default());
        inventory.nodes().unwrap();
        inventory.services().unwrap();
        inventory.services().unwrap();
        inventory.nodes().unwrap();
        assert_eq!(inventory.client().node_calls.get(), 1);
        assert_eq!(inventory.client().service_calls.get(), 1);
    }

    #[test]
    fn force_requests_refetches_every_time() {
        let mut inventory =
            Inventory::new(fake(), &InventoryOverrides::default()).with_force_requests(true);
        inventory.nodes().unwrap();
        inventory.nodes().unwrap();
        inventory.services().unwrap();
        assert_eq!(inventory.client().node_calls.get(), 3);
        assert_eq!(inventory.client().service_calls.get(), 1);
    }

    #[test]
    fn services_resolve_nodes_first() {
        let mut inventory = Inventory::new(fake(), &InventoryOverrides::default());
        let services = inventory.services().unwrap();
        assert_eq!(inventory.client().node_calls.get(), 1);
        assert_eq!(services["s1"].address().unwrap(), "10.0.0.5");
        assert_eq!(services["s3"].port, 5432);
    }

    #[test]
    fn orphaned_service_is_kept_but_unjoined() {
        let mut inventory = Inventory::new(fake(), &InventoryOverrides::default());
        let services = inventory.services().unwrap();
        let orphan = &services["s2"];
        assert!(matches!(
            orphan.address(),
            Err(ConnectError::MissingRelation { .. })
        ));
    }

    #[test]
    fn service_overrides_are_keyed_by_owning_node_name() {
        let mut inventory = Inventory::new(
            fake(),
            &overrides(json!({"hosts": {"db1": {"mysql": {"port": 33061}}}})),
        );
        let services = inventory.services().unwrap();
        assert_eq!(services["s1"].port, 33061);
        assert_eq!(services["s3"].port, 5432);
    }

    #[test]
    fn node_overrides_use_the_ssh_key() {
        let mut inventory = Inventory::new(
            fake(),
            &overrides(json!({"hosts": {"web1": {"ssh": {"custom_labels": {"port": 2222}}}}})),
        );
        let nodes = inventory.nodes().unwrap();
        assert_eq!(nodes["n2"].port, 2222);
        assert_eq!(nodes["n2"].environment, None);
        assert_eq!(nodes["n1"].port, 22);
    }

    #[test]
    fn default_port_without_override_tracks_seeded_table() {
        let mut inventory = Inventory::new(fake(), &overrides(json!({"default_ports": {"mysql": 3310}})));
        let services = inventory.services().unwrap();
        assert_eq!(services["s1"].port, 3310);
    }

    #[test]
    fn request_errors_become_unavailable() {
        let mut inventory = Inventory::new(FakeClient::failing(), &InventoryOverrides::default());
        let err = inventory.services().unwrap_err();
        assert!(matches!(err, ConnectError::Unavailable { ref base_uri, .. } if base_uri == "https://pmm.test"));
        assert_eq!(inventory.client().service_calls.get(), 0);
    }

    #[test]
    fn api_service_address_never_replaces_the_node_address() {
        let client = FakeClient::new(
            json!({"generic": [{"node_id": "n1", "node_name": "db1", "address": "10.0.0.5"}]}),
            json!({"mysql": [
                {"service_id": "s1", "service_name": "db1-mysql", "node_id": "n1", "address": "127.0.0.1"}
            ]}),
        );
        let mut inventory = Inventory::new(client, &InventoryOverrides::default());
        let services = inventory.services().unwrap();
        assert_eq!(services["s1"].address, None);
        assert_eq!(services["s1"].address().unwrap(), "10.0.0.5");
    }

    #[test]
    fn override_address_still_applies() {
        let client = FakeClient::new(
            json!({"generic": [{"node_id": "n1", "node_name": "db1", "address": "10.0.0.5"}]}),
            json!({"mysql": [
                {"service_id": "s1", "service_name": "db1-mysql", "node_id": "n1", "address": "127.0.0.1"}
            ]}),
        );
        let mut inventory = Inventory::new(
            client,
            &overrides(json!({"hosts": {"db1": {"mysql": {"address": "db1.vip.internal"}}}})),
        );
        let services = inventory.services().unwrap();
        assert_eq!(services["s1"].address().unwrap(), "db1.vip.internal");
    }

    #[test]
    fn duplicate_service_ids_keep_the_later_record_in_place() {
        let client = FakeClient::new(
            json!({"generic": [{"node_id": "n1", "node_name": "db1", "address": "10.0.0.5"}]}),
            json!({
                "mysql": [
                    {"service_id": "s1", "service_name": "first", "node_id": "n1"},
                    {"service_id": "s2", "service_name": "other", "node_id": "n1"}
                ],
                "postgresql": [
                    {"service_id": "s1", "service_name": "second", "node_id": "n1"}
                ]
            }),
        );
        let mut inventory = Inventory::new(client, &InventoryOverrides::default());
        let services = inventory.services().unwrap();
        assert_eq!(services.keys().collect::<Vec<_>>(), ["s1", "s2"]);
        assert_eq!(services["s1"].name, "second");
        assert_eq!(services["s1"].service_type, ServiceType::Postgresql);
    }
}
