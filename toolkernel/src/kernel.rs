//! Kernel facade wiring every component together.

use crate::adaptive::{AdaptiveLoopService, AiOrchestrator};
use crate::config::KernelConfig;
use crate::connections::{
    notification_types, ClientConnector, ConnectionManager, ConnectionStore, JsonFileStore,
    Notification,
};
use crate::errors::KernelError;
use crate::event_loop::{ContentGenerator, Event, EventLoop, NoOpContentGenerator, Turn};
use crate::events::{EventSink, NoOpEventSink};
use crate::resources::ResourceAllocationManager;
use crate::security::{ApprovalPolicy, SecurityLayer};
use crate::tools::{
    ApprovalMode, ExecutionManager, ExecutionOptions, Tool, ToolCall, ToolCallOutcome,
    ToolRegistry,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builder for a [`Kernel`].
#[derive(Default)]
pub struct KernelBuilder {
    config: KernelConfig,
    store: Option<Box<dyn ConnectionStore>>,
    connector: Option<Arc<dyn ClientConnector>>,
    sink: Option<Arc<dyn EventSink>>,
    orchestrator: Option<Arc<dyn AiOrchestrator>>,
    content_generator: Option<Arc<dyn ContentGenerator>>,
    policies: Vec<(ApprovalMode, Arc<dyn ApprovalPolicy>)>,
}

impl KernelBuilder {
    /// Creates a builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[must_use]
    pub fn config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the connection store. Defaults to the JSON registry file.
    #[must_use]
    pub fn store(mut self, store: Box<dyn ConnectionStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the client connector. Defaults to HTTP.
    #[must_use]
    pub fn connector(mut self, connector: Arc<dyn ClientConnector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Sets the lifecycle event sink.
    #[must_use]
    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Enables the adaptive loop with `orchestrator`.
    #[must_use]
    pub fn orchestrator(mut self, orchestrator: Arc<dyn AiOrchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    /// Sets the collaborator receiving turn output.
    #[must_use]
    pub fn content_generator(mut self, generator: Arc<dyn ContentGenerator>) -> Self {
        self.content_generator = Some(generator);
        self
    }

    /// Sets the approval policy for `mode`.
    #[must_use]
    pub fn approval_policy(mut self, mode: ApprovalMode, policy: Arc<dyn ApprovalPolicy>) -> Self {
        self.policies.push((mode, policy));
        self
    }

    /// Builds the kernel.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or no connector is
    /// available.
    pub fn build(self) -> Result<Kernel, KernelError> {
        let config = self.config;
        config.validate()?;

        let registry = Arc::new(
            ToolRegistry::new().with_discovery_commands(config.discovery.commands.clone()),
        );

        let store = self.store.unwrap_or_else(|| {
            Box::new(JsonFileStore::new(config.connections.registry_path()))
        });
        let connector = match self.connector {
            Some(connector) => connector,
            None => default_connector(&config)?,
        };
        let connections = Arc::new(
            ConnectionManager::new(store, connector)
                .with_connection_timeout(config.connections.connection_timeout()),
        );

        let resources = Arc::new(ResourceAllocationManager::new(config.resources.limits));

        let mut security = SecurityLayer::new();
        for (mode, policy) in self.policies {
            security = security.with_policy(mode, policy);
        }
        let security = Arc::new(security);

        let sink = self.sink.unwrap_or_else(|| Arc::new(NoOpEventSink));
        let adaptive = self
            .orchestrator
            .map(|orchestrator| Arc::new(AdaptiveLoopService::new(orchestrator)));

        let mut executor = ExecutionManager::new(
            Arc::clone(&registry),
            Arc::clone(&connections),
            Arc::clone(&resources),
            Arc::clone(&security),
        )
        .with_config(config.execution.clone())
        .with_default_quota(config.resources.default_execution_quota)
        .with_sink(Arc::clone(&sink));
        if let Some(adaptive) = &adaptive {
            executor = executor.with_adaptive(Arc::clone(adaptive));
        }
        let executor = Arc::new(executor);

        let generator = self
            .content_generator
            .unwrap_or_else(|| Arc::new(NoOpContentGenerator));
        let event_loop = Arc::new(
            EventLoop::new(&config.event_loop)
                .with_execution_manager(Arc::clone(&executor))
                .with_content_generator(generator),
        );

        wire_notifications(&connections, &registry);

        if config.discovery.enabled {
            registry.register_command_tools();
        }

        info!(tools = registry.len(), "Kernel built");
        Ok(Kernel {
            config,
            registry,
            connections,
            resources,
            security,
            executor,
            event_loop,
            adaptive,
        })
    }
}

impl std::fmt::Debug for KernelBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelBuilder")
            .field("config", &self.config)
            .field("has_store", &self.store.is_some())
            .field("has_connector", &self.connector.is_some())
            .field("has_orchestrator", &self.orchestrator.is_some())
            .field("policies", &self.policies.len())
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "http")]
fn default_connector(config: &KernelConfig) -> Result<Arc<dyn ClientConnector>, KernelError> {
    Ok(Arc::new(crate::connections::HttpConnector::new(
        std::time::Duration::from_secs(config.connections.request_timeout_seconds),
    )))
}

#[cfg(not(feature = "http"))]
fn default_connector(_config: &KernelConfig) -> Result<Arc<dyn ClientConnector>, KernelError> {
    Err(KernelError::Config(
        "no client connector configured and the http feature is disabled".to_string(),
    ))
}

fn register_remote_tools(registry: Arc<ToolRegistry>) -> impl Fn(&Notification) + Send + Sync + 'static {
    move |notification: &Notification| {
        let locator = notification.locator();
        for tool in &notification.tools {
            if !registry.register_external(tool.to_definition(), locator.clone()) {
                warn!(server_id = %locator.server_id, "Skipping unnamed remote tool");
            }
        }
        debug!(
            server_id = %locator.server_id,
            count = notification.tools.len(),
            "Registered remote tools"
        );
    }
}

fn wire_notifications(connections: &ConnectionManager, registry: &Arc<ToolRegistry>) {
    connections.register_notification_handler(
        notification_types::TOOLS_DISCOVERED,
        register_remote_tools(Arc::clone(registry)),
    );
    connections.register_notification_handler(
        notification_types::TOOL_ADDED,
        register_remote_tools(Arc::clone(registry)),
    );

    let removals = Arc::clone(registry);
    connections.register_notification_handler(
        notification_types::TOOL_REMOVED,
        move |notification: &Notification| {
            let named = notification
                .data
                .get("name")
                .and_then(serde_json::Value::as_str)
                .map(String::from);
            for name in notification.tools.iter().map(|t| t.name.clone()).chain(named) {
                removals.deregister(&name);
            }
        },
    );
}

/// The tool execution kernel.
pub struct Kernel {
    config: KernelConfig,
    registry: Arc<ToolRegistry>,
    connections: Arc<ConnectionManager>,
    resources: Arc<ResourceAllocationManager>,
    security: Arc<SecurityLayer>,
    executor: Arc<ExecutionManager>,
    event_loop: Arc<EventLoop>,
    adaptive: Option<Arc<AdaptiveLoopService>>,
}

impl Kernel {
    /// Returns a builder.
    #[must_use]
    pub fn builder() -> KernelBuilder {
        KernelBuilder::new()
    }

    /// Starts the event loop and restores connections.
    ///
    /// Returns the number of servers connected.
    pub async fn start(&self) -> usize {
        self.event_loop.start();
        let mut connected = 0;

        if let Some(url) = self.config.connections.default_server_url.clone() {
            if self.connections.connect(&url, "default").await {
                connected += 1;
                let server_id = crate::connections::server_id_for_url(&url);
                if let Some(client) = self.connections.client(&server_id) {
                    self.connections.set_default_client(client);
                }
            } else {
                warn!(url = %url, "Default tool server unavailable");
            }
        }

        if self.config.connections.reconnect_on_start {
            connected += self.connections.reconnect_known().await;
        }
        info!(connected, "Kernel started");
        connected
    }

    /// Cancels in-flight executions, stops the loop and closes connections.
    pub async fn shutdown(&self) {
        self.executor.shutdown();
        self.event_loop.stop().await;
        self.connections.shutdown().await;
        info!("Kernel shut down");
    }

    /// Registers a local tool.
    pub fn register_tool(&self, tool: Arc<dyn Tool>) -> bool {
        self.registry.register(tool)
    }

    /// Removes a tool.
    pub fn deregister_tool(&self, name: &str) -> bool {
        self.registry.deregister(name)
    }

    /// Connects to a tool server and registers its tools.
    pub async fn connect(&self, url: &str, name: &str) -> bool {
        self.connections.connect(url, name).await
    }

    /// Forgets a tool server and removes its tools.
    pub async fn disconnect(&self, server_id: &str) -> bool {
        let removed = self.registry.deregister_server(server_id);
        debug!(server_id = %server_id, removed, "Deregistered server tools");
        self.connections.remove(server_id).await
    }

    /// Runs one call directly, bypassing the event loop.
    pub async fn execute(&self, call: ToolCall) -> ToolCallOutcome {
        self.executor.execute(call).await
    }

    /// Runs one call with overrides.
    pub async fn execute_with(&self, call: ToolCall, options: ExecutionOptions) -> ToolCallOutcome {
        self.executor.execute_with(call, options).await
    }

    /// Queues an AI response turn.
    pub fn submit_turn(&self, turn: Turn) {
        self.event_loop.submit_turn(turn);
    }

    /// Queues a kernel event.
    pub fn submit_event(&self, event: Event) {
        self.event_loop.submit_event(event);
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &KernelConfig {
        &self.config
    }

    /// Returns the tool registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Returns the connection manager.
    #[must_use]
    pub const fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    /// Returns the resource manager.
    #[must_use]
    pub const fn resources(&self) -> &Arc<ResourceAllocationManager> {
        &self.resources
    }

    /// Returns the security layer.
    #[must_use]
    pub const fn security(&self) -> &Arc<SecurityLayer> {
        &self.security
    }

    /// Returns the execution manager.
    #[must_use]
    pub const fn executor(&self) -> &Arc<ExecutionManager> {
        &self.executor
    }

    /// Returns the event loop.
    #[must_use]
    pub const fn event_loop(&self) -> &Arc<EventLoop> {
        &self.event_loop
    }

    /// Returns the adaptive loop, if an orchestrator was configured.
    #[must_use]
    pub const fn adaptive(&self) -> Option<&Arc<AdaptiveLoopService>> {
        self.adaptive.as_ref()
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("tools", &self.registry.len())
            .field("connections", &self.connections.connected_count())
            .field("event_loop_running", &self.event_loop.is_running())
            .field("adaptive", &self.adaptive.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connections::{server_id_for_url, InMemoryStore};
    use crate::testing::{EchoTool, MockConnector, MockToolServer};
    use serde_json::json;

    fn kernel_with(server: Arc<MockToolServer>) -> Kernel {
        Kernel::builder()
            .store(Box::new(InMemoryStore::new()))
            .connector(Arc::new(MockConnector::new(server)))
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_connect_registers_remote_tools() {
        let server = Arc::new(MockToolServer::new().with_tool("remote_ls"));
        let kernel = kernel_with(server);

        assert!(kernel.connect("http://tools", "Tools").await);
        let locator = kernel.registry().server_locator_for("remote_ls").unwrap();
        assert_eq!(locator.server_id, server_id_for_url("http://tools"));

        assert!(kernel.disconnect(&locator.server_id).await);
        assert!(!kernel.registry().has("remote_ls"));
    }

    #[tokio::test]
    async fn test_tool_added_and_removed_notifications() {
        let kernel = kernel_with(Arc::new(MockToolServer::new()));
        let connections = kernel.connections();

        connections.notify(
            notification_types::TOOL_ADDED,
            &Notification::new("srv", "http://srv").with_tools(vec![crate::connections::RemoteToolInfo {
                name: "late".to_string(),
                description: String::new(),
                parameter_schema: json!({"type": "object"}),
            }]),
        );
        assert!(kernel.registry().has("late"));

        connections.notify(
            notification_types::TOOL_REMOVED,
            &Notification::new("srv", "http://srv").with_data(json!({"name": "late"})),
        );
        assert!(!kernel.registry().has("late"));
    }

    #[tokio::test]
    async fn test_start_connects_default_server() {
        let mut config = KernelConfig::default();
        config.connections.default_server_url = Some("http://default".to_string());
        let server = Arc::new(MockToolServer::new().with_tool("remote_echo"));
        let kernel = Kernel::builder()
            .config(config)
            .store(Box::new(InMemoryStore::new()))
            .connector(Arc::new(MockConnector::new(server)))
            .build()
            .unwrap();

        assert_eq!(kernel.start().await, 1);
        assert!(kernel.event_loop().is_running());
        assert!(kernel.connections().default_client().is_some());
        assert!(kernel.registry().has("remote_echo"));

        kernel.shutdown().await;
        assert!(!kernel.event_loop().is_running());
        assert_eq!(kernel.connections().connected_count(), 0);
    }

    #[tokio::test]
    async fn test_execute_local_tool() {
        let kernel = kernel_with(Arc::new(MockToolServer::new()));
        kernel.register_tool(Arc::new(EchoTool::new()));

        let outcome = kernel
            .execute(ToolCall::from_json("echo", json!({"message": "hello"})))
            .await;
        assert!(outcome.is_success());
        assert!(kernel.deregister_tool("echo"));
        assert!(!kernel.registry().has("echo"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = KernelConfig::default();
        config.execution.worker_pool_size = 0;
        let result = Kernel::builder()
            .config(config)
            .store(Box::new(InMemoryStore::new()))
            .connector(Arc::new(MockConnector::new(Arc::new(MockToolServer::new()))))
            .build();
        assert!(matches!(result, Err(KernelError::Config(_))));
    }
}
