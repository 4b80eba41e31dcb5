//! Connection manager.

use super::client::{ClientConnector, RemoteToolInfo, ToolServerClient};
use super::record::{server_id_for_url, ConnectionParams, ConnectionRecord, ConnectionStatus};
use super::store::ConnectionStore;
use crate::errors::ConnectionError;
use crate::tools::ServerLocator;
use crate::utils::now_utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Notification type names.
pub mod notification_types {
    /// A connected server advertised its tools.
    pub const TOOLS_DISCOVERED: &str = "tools_discovered";
    /// A server added a tool.
    pub const TOOL_ADDED: &str = "tool_added";
    /// A server removed a tool.
    pub const TOOL_REMOVED: &str = "tool_removed";
    /// A server changed a tool.
    pub const TOOL_UPDATED: &str = "tool_updated";
    /// A server's connection status changed.
    pub const SERVER_STATUS_CHANGE: &str = "server_status_change";
}

/// A message from (or about) a tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Server the notification concerns.
    pub server_id: String,
    /// Server URL.
    pub url: String,
    /// Tools the notification concerns.
    #[serde(default)]
    pub tools: Vec<RemoteToolInfo>,
    /// Extra payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Notification {
    /// Creates a notification without tools.
    #[must_use]
    pub fn new(server_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            url: url.into(),
            tools: Vec::new(),
            data: serde_json::Value::Null,
        }
    }

    /// Attaches tools.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<RemoteToolInfo>) -> Self {
        self.tools = tools;
        self
    }

    /// Attaches a payload.
    #[must_use]
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    /// Returns the locator of the server this notification concerns.
    #[must_use]
    pub fn locator(&self) -> ServerLocator {
        ServerLocator::new(&self.server_id, &self.url)
    }
}

/// Callback invoked for notifications of one type.
pub type NotificationHandler = Arc<dyn Fn(&Notification) + Send + Sync>;

/// Tracks known tool servers and live clients.
pub struct ConnectionManager {
    store: Box<dyn ConnectionStore>,
    connector: Arc<dyn ClientConnector>,
    clients: RwLock<HashMap<String, Arc<dyn ToolServerClient>>>,
    default_client: RwLock<Option<Arc<dyn ToolServerClient>>>,
    handlers: RwLock<HashMap<String, Vec<NotificationHandler>>>,
    // Serialises read-modify-write cycles on the store.
    store_lock: Mutex<()>,
    connection_timeout: Duration,
}

impl ConnectionManager {
    /// Creates a manager over `store`, opening clients with `connector`.
    pub fn new(store: Box<dyn ConnectionStore>, connector: Arc<dyn ClientConnector>) -> Self {
        Self {
            store,
            connector,
            clients: RwLock::new(HashMap::new()),
            default_client: RwLock::new(None),
            handlers: RwLock::new(HashMap::new()),
            store_lock: Mutex::new(()),
            connection_timeout: Duration::from_secs(30),
        }
    }

    /// Sets the handshake timeout.
    #[must_use]
    pub const fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Connects to `url`, records it and announces its tools.
    ///
    /// Never fails: problems are logged and reported as `false`.
    pub async fn connect(&self, url: &str, name: &str) -> bool {
        self.connect_with(ConnectionParams::new(url, name)).await
    }

    /// Connects using full parameters.
    pub async fn connect_with(&self, params: ConnectionParams) -> bool {
        let server_id = server_id_for_url(&params.url);
        info!(server_id = %server_id, url = %params.url, "Connecting to tool server");

        let client = match self.handshake(&params.url).await {
            Ok(client) => client,
            Err(e) => {
                warn!(server_id = %server_id, error = %e, "Connection failed");
                if self.get(&server_id).is_some() {
                    self.update_status(&server_id, ConnectionStatus::Error);
                }
                return false;
            }
        };

        let tools = match client.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(server_id = %server_id, error = %e, "Tool listing failed");
                Vec::new()
            }
        };
        let capabilities = tools.iter().map(|t| t.name.clone()).collect();

        let mut record = ConnectionRecord::new(&params, capabilities);
        if let Some(existing) = self.get(&server_id) {
            record.created_at = existing.created_at;
        }
        if let Err(e) = self.upsert(record) {
            warn!(server_id = %server_id, error = %e, "Failed to persist connection");
            client.close().await;
            return false;
        }

        self.clients.write().insert(server_id.clone(), client);
        self.notify(
            notification_types::TOOLS_DISCOVERED,
            &Notification::new(&server_id, &params.url).with_tools(tools),
        );
        info!(server_id = %server_id, "Connected to tool server");
        true
    }

    async fn handshake(&self, url: &str) -> Result<Arc<dyn ToolServerClient>, ConnectionError> {
        match tokio::time::timeout(self.connection_timeout, self.connector.connect(url)).await {
            Ok(result) => result,
            Err(_) => Err(ConnectionError::Timeout {
                url: url.to_string(),
                timeout_seconds: self.connection_timeout.as_secs(),
            }),
        }
    }

    fn upsert(&self, record: ConnectionRecord) -> Result<(), ConnectionError> {
        let _guard = self.store_lock.lock();
        let mut records = self.store.load()?;
        match records.iter_mut().find(|r| r.server_id == record.server_id) {
            Some(existing) => *existing = record,
            None => records.push(record),
        }
        self.store.save(&records)
    }

    fn load_or_empty(&self) -> Vec<ConnectionRecord> {
        self.store.load().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to load connection registry");
            Vec::new()
        })
    }

    /// Returns the ids of all known servers.
    #[must_use]
    pub fn list_known(&self) -> Vec<String> {
        self.load_or_empty().into_iter().map(|r| r.server_id).collect()
    }

    /// Returns all known server records.
    #[must_use]
    pub fn list_known_detailed(&self) -> Vec<ConnectionRecord> {
        self.load_or_empty()
    }

    /// Returns one record.
    #[must_use]
    pub fn get(&self, server_id: &str) -> Option<ConnectionRecord> {
        self.load_or_empty()
            .into_iter()
            .find(|r| r.server_id == server_id)
    }

    /// Returns true if `server_id` is known and was created with exactly `params`.
    #[must_use]
    pub fn is_connection_valid(&self, server_id: &str, params: &ConnectionParams) -> bool {
        self.get(server_id).is_some_and(|r| r.params() == *params)
    }

    /// Forgets a server and closes its client. Returns false if it was unknown.
    pub async fn remove(&self, server_id: &str) -> bool {
        let client = self.clients.write().remove(server_id);
        if let Some(client) = client {
            client.close().await;
        }

        let removed = {
            let _guard = self.store_lock.lock();
            match self.store.load() {
                Ok(mut records) => {
                    let before = records.len();
                    records.retain(|r| r.server_id != server_id);
                    let removed = records.len() != before;
                    if removed {
                        if let Err(e) = self.store.save(&records) {
                            warn!(server_id = %server_id, error = %e, "Failed to persist removal");
                            return false;
                        }
                    }
                    removed
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load connection registry");
                    false
                }
            }
        };

        if removed {
            info!(server_id = %server_id, "Removed tool server");
        }
        removed
    }

    /// Updates a record's status and notifies `server_status_change` handlers.
    pub fn update_status(&self, server_id: &str, status: ConnectionStatus) -> bool {
        let url = {
            let _guard = self.store_lock.lock();
            let Ok(mut records) = self.store.load() else {
                return false;
            };
            let Some(record) = records.iter_mut().find(|r| r.server_id == server_id) else {
                return false;
            };
            record.status = status;
            if status == ConnectionStatus::Active {
                record.last_connected = now_utc();
            }
            let url = record.url.clone();
            if let Err(e) = self.store.save(&records) {
                warn!(server_id = %server_id, error = %e, "Failed to persist status");
                return false;
            }
            url
        };

        self.notify(
            notification_types::SERVER_STATUS_CHANGE,
            &Notification::new(server_id, url).with_data(serde_json::json!({ "status": status })),
        );
        true
    }

    /// Re-connects every server recorded as active; failures are marked disconnected.
    ///
    /// Returns the number of servers connected.
    pub async fn reconnect_known(&self) -> usize {
        let mut connected = 0;
        for record in self.load_or_empty() {
            if record.status != ConnectionStatus::Active {
                continue;
            }
            if self.connect_with(record.params()).await {
                connected += 1;
            } else {
                self.update_status(&record.server_id, ConnectionStatus::Disconnected);
            }
        }
        connected
    }

    /// Adds a handler for `notification_type`. Handlers accumulate.
    pub fn register_notification_handler<F>(&self, notification_type: &str, handler: F)
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        self.handlers
            .write()
            .entry(notification_type.to_string())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Delivers a notification to every handler of its type.
    ///
    /// A panicking handler is logged and does not stop the others.
    pub fn notify(&self, notification_type: &str, notification: &Notification) {
        let handlers: Vec<NotificationHandler> = self
            .handlers
            .read()
            .get(notification_type)
            .cloned()
            .unwrap_or_default();

        if handlers.is_empty() {
            debug!(notification_type, "No handlers for notification");
            return;
        }

        for handler in handlers {
            if let Err(e) = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                handler(notification);
            })) {
                warn!(notification_type, "Notification handler panicked: {:?}", e);
            }
        }
    }

    /// Returns the live client for `server_id`.
    #[must_use]
    pub fn client(&self, server_id: &str) -> Option<Arc<dyn ToolServerClient>> {
        self.clients.read().get(server_id).cloned()
    }

    /// Returns the client named by `locator`, falling back to the default connection.
    #[must_use]
    pub fn client_for(&self, locator: &ServerLocator) -> Option<Arc<dyn ToolServerClient>> {
        self.client(&locator.server_id)
            .or_else(|| self.client(&server_id_for_url(&locator.url)))
            .or_else(|| self.default_client())
    }

    /// Sets the client used when a tool's server is not connected.
    pub fn set_default_client(&self, client: Arc<dyn ToolServerClient>) {
        *self.default_client.write() = Some(client);
    }

    /// Returns the default client.
    #[must_use]
    pub fn default_client(&self) -> Option<Arc<dyn ToolServerClient>> {
        self.default_client.read().clone()
    }

    /// Returns the number of live clients.
    #[must_use]
    pub fn connected_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Closes every live client. Records are kept.
    pub async fn shutdown(&self) {
        let clients: Vec<(String, Arc<dyn ToolServerClient>)> =
            self.clients.write().drain().collect();
        for (server_id, client) in clients {
            debug!(server_id = %server_id, "Closing tool server client");
            client.close().await;
        }
        let default = self.default_client.write().take();
        if let Some(client) = default {
            client.close().await;
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("connected_count", &self.connected_count())
            .field("handler_types", &self.handlers.read().len())
            .finish_non_exhaustive()
    }
}
