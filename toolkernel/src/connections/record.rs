//! Persisted connection records.

use crate::utils::{now_utc, Timestamp};
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

/// Derives a stable server id from its URL.
#[must_use]
pub fn server_id_for_url(url: &str) -> String {
    hex::encode(Md5::digest(url.as_bytes()))
}

/// Connection health as last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    /// Connected and healthy.
    Active,
    /// Known but not connected.
    Disconnected,
    /// Last connection attempt failed.
    Error,
}

/// Parameters a connection was established with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    /// Server URL.
    pub url: String,
    /// Display name.
    pub name: String,
    /// Description.
    pub description: String,
}

impl ConnectionParams {
    /// Creates parameters with an empty description.
    #[must_use]
    pub fn new(url: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            name: name.into(),
            description: String::new(),
        }
    }
}

/// One known tool server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    /// Stable id derived from the URL.
    pub server_id: String,
    /// Server URL.
    #[serde(alias = "server_url")]
    pub url: String,
    /// Display name.
    pub name: String,
    /// Description.
    #[serde(default)]
    pub description: String,
    /// Tool names the server advertised.
    #[serde(default)]
    pub capabilities: Vec<String>,
    /// When the record was first written.
    #[serde(default = "now_utc")]
    pub created_at: Timestamp,
    /// Last successful connection.
    pub last_connected: Timestamp,
    /// Connection health.
    pub status: ConnectionStatus,
}

impl ConnectionRecord {
    /// Creates an active record for `params`.
    #[must_use]
    pub fn new(params: &ConnectionParams, capabilities: Vec<String>) -> Self {
        let now = now_utc();
        Self {
            server_id: server_id_for_url(&params.url),
            url: params.url.clone(),
            name: params.name.clone(),
            description: params.description.clone(),
            capabilities,
            created_at: now,
            last_connected: now,
            status: ConnectionStatus::Active,
        }
    }

    /// Returns the parameters this record was created with.
    #[must_use]
    pub fn params(&self) -> ConnectionParams {
        ConnectionParams {
            url: self.url.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_server_id_is_md5_hex() {
        assert_eq!(server_id_for_url(""), "d41d8cd98f00b204e9800998ecf8427e");
        let id = server_id_for_url("http://localhost:8000");
        assert_eq!(id.len(), 32);
        assert_eq!(id, server_id_for_url("http://localhost:8000"));
        assert_ne!(id, server_id_for_url("http://localhost:8001"));
    }

    #[test]
    fn test_record_serialization() {
        let record = ConnectionRecord::new(
            &ConnectionParams::new("http://a", "A"),
            vec!["echo".to_string()],
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["status"], "active");
        assert_eq!(value["url"], "http://a");
        assert_eq!(value["capabilities"], json!(["echo"]));
        assert!(value["last_connected"].as_str().is_some());
    }

    #[test]
    fn test_record_accepts_server_url_alias() {
        let record: ConnectionRecord = serde_json::from_value(json!({
            "server_id": "abc",
            "server_url": "http://b",
            "name": "B",
            "last_connected": "2024-01-15T10:30:00+00:00",
            "status": "disconnected"
        }))
        .unwrap();
        assert_eq!(record.url, "http://b");
        assert_eq!(record.status, ConnectionStatus::Disconnected);
        assert!(record.capabilities.is_empty());
        assert_eq!(record.params(), ConnectionParams::new("http://b", "B"));
    }
}
