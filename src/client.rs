//! Typed HTTP client for the PMM inventory API.

use std::time::Duration;

use indexmap::IndexMap;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde_json::Value;
use tracing::debug;

use crate::domain::overrides::RawRecord;
use crate::error::{ConnectError, ConnectResult};

pub const NODES_PATH: &str = "/v1/inventory/Nodes/List";
pub const SERVICES_PATH: &str = "/v1/inventory/Services/List";

/// Raw records grouped by the entity subtype the API files them under.
pub type RawInventory = IndexMap<String, Vec<RawRecord>>;

/// Source of raw node and service records.
pub trait InventoryClient {
    fn base_uri(&self) -> &str;
    fn fetch_nodes(&self) -> ConnectResult<RawInventory>;
    fn fetch_services(&self) -> ConnectResult<RawInventory>;
}

pub struct HttpInventoryClient {
    base_uri: String,
    http: Client,
}

impl HttpInventoryClient {
    pub fn new(
        base_uri: &str,
        token: &str,
        verify_tls: bool,
        timeout: Duration,
    ) -> ConnectResult<Self> {
        let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| ConnectError::fatal("Unexpected content in token"))?;
        bearer.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(!verify_tls)
            .timeout(timeout)
            .build()
            .map_err(|e| ConnectError::fatal(format!("building HTTP client: {e}")))?;

        Ok(Self {
            base_uri: base_uri.trim_end_matches('/').to_string(),
            http,
        })
    }

    fn list(&self, path: &str) -> ConnectResult<RawInventory> {
        let url = format!("{}{}", self.base_uri, path);
        debug!(url = %url, "requesting inventory");

        let resp = self
            .http
            .post(&url)
            .body("{}")
            .send()
            .map_err(|e| ConnectError::request(&url, e))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(ConnectError::request(&url, format!("HTTP {status}")));
        }

        let body = resp.text().map_err(|e| ConnectError::request(&url, e))?;
        let json: Value = serde_json::from_str(&body)
            .map_err(|e| ConnectError::request(&url, format!("Unable to decode response: {e}")))?;

        group_records(&url, json)
    }
}

impl InventoryClient for HttpInventoryClient {
    fn base_uri(&self) -> &str {
        &self.base_uri
    }

    fn fetch_nodes(&self) -> ConnectResult<RawInventory> {
        self.list(NODES_PATH)
    }

    fn fetch_services(&self) -> ConnectResult<RawInventory> {
        self.list(SERVICES_PATH)
    }
}

fn group_records(url: &str, json: Value) -> ConnectResult<RawInventory> {
    let Value::Object(groups) = json else {
        return Err(ConnectError::request(url, "expected a JSON object"));
    };

    let mut inventory = RawInventory::new();
    for (subtype, entries) in groups {
        let Value::Array(entries) = entries else {
            debug!(subtype = %subtype, "skipping non-list inventory group");
            continue;
        };
        let records = entries
            .into_iter()
            .filter_map(|entry| match entry {
                Value::Object(record) => Some(record),
                _ => None,
            })
            .collect();
        inventory.insert(subtype, records);
    }
    Ok(inventory)
}
