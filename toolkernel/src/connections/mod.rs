//! Connections to external tool servers.
//!
//! The [`ConnectionManager`] keeps a persistent registry of known servers,
//! holds live [`ToolServerClient`]s for connected ones and fans server
//! notifications out to registered handlers.

mod client;
#[cfg(feature = "http")]
mod http;
mod manager;
mod record;
mod store;

pub use client::{ClientConnector, RemoteToolInfo, ToolServerClient};
#[cfg(feature = "http")]
pub use http::{HttpConnector, HttpToolServerClient};
pub use manager::{
    notification_types, ConnectionManager, Notification, NotificationHandler,
};
pub use record::{server_id_for_url, ConnectionParams, ConnectionRecord, ConnectionStatus};
pub use store::{ConnectionStore, InMemoryStore, JsonFileStore};

#[cfg(test)]
pub use client::MockToolServerClient;
