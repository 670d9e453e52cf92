//! Prism Central v3 discovery client.
//!
//! Issues the four list queries behind the verify endpoint and normalizes
//! the entity documents into the flat records the UI renders. Normalization
//! is pure over parsed JSON so it stays testable without a live endpoint.

use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::errors::InventoryError;

const PRISM_PORT: u16 = 9440;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct PrismCredentials {
    pub host: String,
    pub username: String,
    pub password: String,
    pub verify_ssl: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClusterRecord {
    pub name: String,
    pub uuid: Option<String>,
    pub nodes: Value,
    pub network: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubnetRecord {
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub vlan_id: Option<i64>,
    pub subnet_type: String,
    pub ip_config: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageContainerRecord {
    pub name: Option<String>,
    pub uuid: Option<String>,
    pub replication_factor: Option<i64>,
    pub max_capacity: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectRecord {
    pub name: Option<String>,
    pub uuid: Option<String>,
}

/// Everything the verify endpoint reports in one pass.
#[derive(Debug, Clone, Serialize)]
pub struct Inventory {
    pub clusters: Vec<ClusterRecord>,
    pub subnets: Vec<SubnetRecord>,
    pub storage_containers: Vec<StorageContainerRecord>,
    pub projects: Vec<ProjectRecord>,
}

pub struct PrismClient {
    credentials: PrismCredentials,
    http: reqwest::Client,
    base_url: String,
}

impl PrismClient {
    pub fn new(credentials: PrismCredentials) -> Result<Self, InventoryError> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(!credentials.verify_ssl)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| InventoryError(format!("building HTTP client: {e}")))?;
        let base_url = format!(
            "https://{}:{}/api/nutanix/v3",
            credentials.host, PRISM_PORT
        );
        Ok(Self { credentials, http, base_url })
    }

    async fn list(&self, path: &str, kind: &str, length: u32) -> Result<Value, InventoryError> {
        let url = format!("{}/{path}", self.base_url);
        let payload = serde_json::json!({
            "kind": kind,
            "offset": 0,
            "length": length,
        });
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .json(&payload)
            .send()
            .await
            .map_err(|e| InventoryError(format!("querying {path}: {e}")))?;
        let response = response
            .error_for_status()
            .map_err(|e| InventoryError(format!("querying {path}: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| InventoryError(format!("decoding {path} response: {e}")))
    }

    pub async fn list_clusters(&self) -> Result<Vec<ClusterRecord>, InventoryError> {
        let data = self.list("clusters/list", "cluster", 50).await?;
        Ok(entities(&data).iter().map(normalize_cluster).collect())
    }

    pub async fn list_subnets(&self) -> Result<Vec<SubnetRecord>, InventoryError> {
        let data = self.list("subnets/list", "subnet", 100).await?;
        Ok(entities(&data).iter().map(normalize_subnet).collect())
    }

    pub async fn list_storage_containers(
        &self,
    ) -> Result<Vec<StorageContainerRecord>, InventoryError> {
        let data = self
            .list("storage_containers/list", "storage_container", 50)
            .await?;
        Ok(entities(&data).iter().map(normalize_container).collect())
    }

    pub async fn list_projects(&self) -> Result<Vec<ProjectRecord>, InventoryError> {
        let data = self.list("projects/list", "project", 50).await?;
        Ok(entities(&data).iter().map(normalize_project).collect())
    }

    /// Gather the full discovery inventory. Any single failed query fails
    /// the whole verification.
    pub async fn gather_inventory(&self) -> Result<Inventory, InventoryError> {
        Ok(Inventory {
            clusters: self.list_clusters().await?,
            subnets: self.list_subnets().await?,
            storage_containers: self.list_storage_containers().await?,
            projects: self.list_projects().await?,
        })
    }
}

fn entities(data: &Value) -> Vec<Value> {
    data.get("entities")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn str_field(value: &Value, path: &[&str]) -> Option<String> {
    let mut cursor = value;
    for key in path {
        cursor = cursor.get(key)?;
    }
    cursor.as_str().map(str::to_string)
}

fn int_field(value: &Value, path: &[&str]) -> Option<i64> {
    let mut cursor = value;
    for key in path {
        cursor = cursor.get(key)?;
    }
    cursor.as_i64()
}

fn json_field(value: &Value, path: &[&str], default: Value) -> Value {
    let mut cursor = value;
    for key in path {
        match cursor.get(key) {
            Some(next) => cursor = next,
            None => return default,
        }
    }
    cursor.clone()
}

fn normalize_cluster(entity: &Value) -> ClusterRecord {
    ClusterRecord {
        name: str_field(entity, &["metadata", "name"])
            .unwrap_or_else(|| "unknown-cluster".to_string()),
        uuid: str_field(entity, &["metadata", "uuid"]),
        nodes: json_field(entity, &["status", "resources", "nodes"], Value::Array(vec![])),
        network: json_field(
            entity,
            &["status", "resources", "network"],
            Value::Object(Default::default()),
        ),
    }
}

fn normalize_subnet(entity: &Value) -> SubnetRecord {
    SubnetRecord {
        name: str_field(entity, &["metadata", "name"]),
        uuid: str_field(entity, &["metadata", "uuid"]),
        vlan_id: int_field(entity, &["status", "resources", "vlan_id"]),
        subnet_type: str_field(entity, &["status", "resources", "subnet_type"])
            .unwrap_or_default(),
        ip_config: json_field(
            entity,
            &["status", "resources", "ip_config"],
            Value::Object(Default::default()),
        ),
    }
}

fn normalize_container(entity: &Value) -> StorageContainerRecord {
    StorageContainerRecord {
        name: str_field(entity, &["metadata", "name"]),
        uuid: str_field(entity, &["metadata", "uuid"]),
        replication_factor: int_field(entity, &["status", "resources", "replication_factor"]),
        max_capacity: int_field(entity, &["status", "resources", "max_capacity"]),
    }
}

fn normalize_project(entity: &Value) -> ProjectRecord {
    ProjectRecord {
        name: str_field(entity, &["metadata", "name"]),
        uuid: str_field(entity, &["metadata", "uuid"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cluster_normalization_extracts_fields() {
        let entity = json!({
            "metadata": {"name": "lab-pe", "uuid": "abc-123"},
            "status": {"resources": {
                "nodes": {"hypervisor_server_list": [{"ip": "10.0.0.10"}]},
                "network": {"external_ip": "10.0.0.9"}
            }}
        });
        let record = normalize_cluster(&entity);
        assert_eq!(record.name, "lab-pe");
        assert_eq!(record.uuid.as_deref(), Some("abc-123"));
        assert_eq!(record.network["external_ip"], "10.0.0.9");
    }

    #[test]
    fn cluster_name_defaults_when_metadata_is_sparse() {
        let record = normalize_cluster(&json!({"status": {}}));
        assert_eq!(record.name, "unknown-cluster");
        assert_eq!(record.uuid, None);
        assert_eq!(record.nodes, json!([]));
        assert_eq!(record.network, json!({}));
    }

    #[test]
    fn subnet_normalization_extracts_fields() {
        let entity = json!({
            "metadata": {"name": "vm-network", "uuid": "def-456"},
            "status": {"resources": {
                "vlan_id": 120,
                "subnet_type": "VLAN",
                "ip_config": {"default_gateway_ip": "192.168.1.1"}
            }}
        });
        let record = normalize_subnet(&entity);
        assert_eq!(record.name.as_deref(), Some("vm-network"));
        assert_eq!(record.vlan_id, Some(120));
        assert_eq!(record.subnet_type, "VLAN");
        assert_eq!(record.ip_config["default_gateway_ip"], "192.168.1.1");
    }

    #[test]
    fn subnet_type_defaults_to_empty() {
        let record = normalize_subnet(&json!({"metadata": {"name": "n"}}));
        assert_eq!(record.subnet_type, "");
        assert_eq!(record.vlan_id, None);
    }

    #[test]
    fn container_and_project_normalization() {
        let container = normalize_container(&json!({
            "metadata": {"name": "default-container", "uuid": "ghi-789"},
            "status": {"resources": {"replication_factor": 2, "max_capacity": 1099511627776i64}}
        }));
        assert_eq!(container.name.as_deref(), Some("default-container"));
        assert_eq!(container.replication_factor, Some(2));
        assert_eq!(container.max_capacity, Some(1_099_511_627_776));

        let project = normalize_project(&json!({"metadata": {"name": "default", "uuid": "p-1"}}));
        assert_eq!(project.name.as_deref(), Some("default"));
        assert_eq!(project.uuid.as_deref(), Some("p-1"));
    }

    #[test]
    fn entities_tolerates_missing_or_malformed_lists() {
        assert!(entities(&json!({})).is_empty());
        assert!(entities(&json!({"entities": "nope"})).is_empty());
        assert_eq!(entities(&json!({"entities": [{"a": 1}]})).len(), 1);
    }

    #[test]
    fn inventory_serializes_with_section_keys() {
        let inventory = Inventory {
            clusters: vec![],
            subnets: vec![],
            storage_containers: vec![],
            projects: vec![],
        };
        let value = serde_json::to_value(&inventory).unwrap();
        for key in ["clusters", "subnets", "storage_containers", "projects"] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
    }
}
