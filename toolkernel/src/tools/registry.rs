//! Tool registry.
//!
//! Every registered name is backed either by an in-process [`Tool`] or by a
//! remote tool server identified through a [`ServerLocator`].

use super::definitions::{ToolDefinition, ToolResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// An in-process tool.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool's definition.
    fn describe(&self) -> ToolDefinition;

    /// Runs the tool. Failures are reported through the result, not by panicking.
    async fn execute(&self, args: Map<String, Value>) -> ToolResult;
}

/// Identifies the tool server hosting an external tool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerLocator {
    /// Connection id of the server.
    pub server_id: String,
    /// Server URL.
    pub url: String,
}

impl ServerLocator {
    /// Creates a locator.
    #[must_use]
    pub fn new(server_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
            url: url.into(),
        }
    }
}

/// What executes a registered tool.
#[derive(Clone)]
pub enum ToolBacking {
    /// Runs in this process.
    Local(Arc<dyn Tool>),
    /// Runs on a remote tool server.
    External(ServerLocator),
}

impl ToolBacking {
    /// Returns true for remote tools.
    #[must_use]
    pub const fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

impl std::fmt::Debug for ToolBacking {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local(_) => f.write_str("Local"),
            Self::External(locator) => f.debug_tuple("External").field(locator).finish(),
        }
    }
}

#[derive(Clone)]
struct RegisteredTool {
    definition: ToolDefinition,
    backing: ToolBacking,
}

/// Thread-safe mapping from tool name to definition and backing.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, RegisteredTool>>,
    discovery_commands: Vec<String>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
            discovery_commands: Vec::new(),
        }
    }

    /// Sets the command names looked up by [`discover_command_based_tools`](Self::discover_command_based_tools).
    #[must_use]
    pub fn with_discovery_commands(mut self, commands: Vec<String>) -> Self {
        self.discovery_commands = commands;
        self
    }

    /// Registers a local tool, replacing any tool with the same name.
    pub fn register(&self, tool: Arc<dyn Tool>) -> bool {
        let definition = tool.describe();
        self.insert(definition, ToolBacking::Local(tool))
    }

    /// Registers a tool hosted on a remote server.
    pub fn register_external(&self, definition: ToolDefinition, locator: ServerLocator) -> bool {
        self.insert(definition, ToolBacking::External(locator))
    }

    fn insert(&self, definition: ToolDefinition, backing: ToolBacking) -> bool {
        if definition.name.trim().is_empty() {
            debug!("Refusing to register tool with empty name");
            return false;
        }
        let name = definition.name.clone();
        let replaced = self
            .tools
            .write()
            .insert(name.clone(), RegisteredTool { definition, backing })
            .is_some();
        info!(tool = %name, replaced, "Registered tool");
        true
    }

    /// Removes a tool. Returns false if it was not registered.
    pub fn deregister(&self, name: &str) -> bool {
        let removed = self.tools.write().remove(name).is_some();
        if removed {
            info!(tool = %name, "Deregistered tool");
        }
        removed
    }

    /// Removes every tool hosted on `server_id`. Returns how many were removed.
    pub fn deregister_server(&self, server_id: &str) -> usize {
        let mut tools = self.tools.write();
        let before = tools.len();
        tools.retain(|_, t| {
            !matches!(&t.backing, ToolBacking::External(loc) if loc.server_id == server_id)
        });
        before - tools.len()
    }

    /// Returns a tool's definition.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<ToolDefinition> {
        self.tools.read().get(name).map(|t| t.definition.clone())
    }

    /// Returns a tool's definition together with its backing.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<(ToolDefinition, ToolBacking)> {
        self.tools
            .read()
            .get(name)
            .map(|t| (t.definition.clone(), t.backing.clone()))
    }

    /// Returns a tool's backing.
    #[must_use]
    pub fn backing(&self, name: &str) -> Option<ToolBacking> {
        self.tools.read().get(name).map(|t| t.backing.clone())
    }

    /// Returns all definitions keyed by name.
    #[must_use]
    pub fn all(&self) -> HashMap<String, ToolDefinition> {
        self.tools
            .read()
            .iter()
            .map(|(name, t)| (name.clone(), t.definition.clone()))
            .collect()
    }

    /// Returns registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns true if `name` is registered.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.tools.read().contains_key(name)
    }

    /// Returns the server hosting `name`, or `None` for local and unknown tools.
    #[must_use]
    pub fn server_locator_for(&self, name: &str) -> Option<ServerLocator> {
        match self.backing(name)? {
            ToolBacking::External(locator) => Some(locator),
            ToolBacking::Local(_) => None,
        }
    }

    /// Returns definitions in the OpenAI function shape, sorted by name.
    #[must_use]
    pub fn function_schemas(&self) -> Vec<Value> {
        let tools = self.tools.read();
        let mut names: Vec<&String> = tools.keys().collect();
        names.sort();
        names
            .into_iter()
            .filter_map(|n| tools.get(n))
            .filter_map(|t| serde_json::to_value(&t.definition).ok())
            .collect()
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }

    fn locate_commands(&self) -> Vec<(String, PathBuf)> {
        self.discovery_commands
            .iter()
            .filter_map(|command| {
                let program = resolve_command(command)?;
                debug!(command = %command, path = %program.display(), "Discovered command");
                Some((command.clone(), program))
            })
            .collect()
    }

    /// Probes `PATH` for the configured commands.
    ///
    /// Nothing is registered. Any probing failure yields fewer (or no) entries.
    #[must_use]
    pub fn discover_command_based_tools(&self) -> HashMap<String, ToolDefinition> {
        self.locate_commands()
            .into_iter()
            .map(|(command, _)| {
                let definition = super::command::command_definition(&command);
                (command, definition)
            })
            .collect()
    }

    /// Registers a [`CommandTool`](super::command::CommandTool) for every
    /// configured command found on `PATH`. Returns how many were registered.
    pub fn register_command_tools(&self) -> usize {
        let found = self.locate_commands();
        let count = found.len();
        for (command, program) in found {
            self.register(Arc::new(super::command::CommandTool::new(&command, program)));
        }
        info!(count, "Registered command tools");
        count
    }
}

/// Resolves a bare command name against `PATH`.
fn resolve_command(command: &str) -> Option<PathBuf> {
    if command.is_empty() || command.contains(std::path::MAIN_SEPARATOR) {
        return None;
    }
    which::which(command).ok()
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tool_count", &self.len())
            .field("tools", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::EchoTool;

    #[test]
    fn test_register_and_get() {
        let registry = ToolRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.register(Arc::new(EchoTool::new())));

        assert!(registry.has("echo"));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("echo").map(|d| d.name), Some("echo".to_string()));
        assert!(registry.server_locator_for("echo").is_none());
        assert!(matches!(registry.backing("echo"), Some(ToolBacking::Local(_))));
    }

    #[test]
    fn test_register_overwrites() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new()));
        registry.register_external(
            ToolDefinition::new("echo", "remote echo"),
            ServerLocator::new("srv", "http://localhost:8000"),
        );

        assert_eq!(registry.len(), 1);
        let (def, backing) = registry.resolve("echo").unwrap();
        assert_eq!(def.description, "remote echo");
        assert!(backing.is_external());
        assert_eq!(
            registry.server_locator_for("echo"),
            Some(ServerLocator::new("srv", "http://localhost:8000"))
        );
    }

    #[test]
    fn test_empty_name_rejected() {
        let registry = ToolRegistry::new();
        let ok = registry.register_external(
            ToolDefinition::new("  ", ""),
            ServerLocator::new("srv", "http://x"),
        );
        assert!(!ok);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_deregister() {
        let registry = ToolRegistry::new();
        registry.register(Arc::new(EchoTool::new()));
        assert!(registry.deregister("echo"));
        assert!(!registry.deregister("echo"));
        assert!(registry.get("echo").is_none());
    }

    #[test]
    fn test_deregister_server() {
        let registry = ToolRegistry::new();
        let a = ServerLocator::new("a", "http://a");
        let b = ServerLocator::new("b", "http://b");
        registry.register_external(ToolDefinition::new("t1", ""), a.clone());
        registry.register_external(ToolDefinition::new("t2", ""), a);
        registry.register_external(ToolDefinition::new("t3", ""), b);
        registry.register(Arc::new(EchoTool::new()));

        assert_eq!(registry.deregister_server("a"), 2);
        assert_eq!(registry.names(), vec!["echo", "t3"]);
    }

    #[test]
    fn test_function_schemas_sorted() {
        let registry = ToolRegistry::new();
        registry.register_external(ToolDefinition::new("zeta", ""), ServerLocator::new("s", "u"));
        registry.register(Arc::new(EchoTool::new()));

        let schemas = registry.function_schemas();
        assert_eq!(schemas.len(), 2);
        assert_eq!(schemas[0]["function"]["name"], "echo");
        assert_eq!(schemas[1]["type"], "function");
    }

    #[test]
    fn test_discovery_never_fails() {
        let registry = ToolRegistry::new()
            .with_discovery_commands(vec!["definitely-not-a-command-xyz".to_string()]);
        assert!(registry.discover_command_based_tools().is_empty());
        assert_eq!(registry.register_command_tools(), 0);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_resolve_command_rejects_paths_and_empty_names() {
        assert_eq!(resolve_command(""), None);
        assert_eq!(resolve_command("definitely-not-a-command-xyz"), None);
        let nested = format!("bin{}sh", std::path::MAIN_SEPARATOR);
        assert_eq!(resolve_command(&nested), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_discovery_finds_commands_on_path() {
        if which::which("sh").is_err() {
            return;
        }
        let registry = ToolRegistry::new().with_discovery_commands(vec![
            "sh".to_string(),
            "definitely-not-a-command-xyz".to_string(),
        ]);

        let found = registry.discover_command_based_tools();
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("sh"));
        assert!(registry.is_empty());

        assert_eq!(registry.register_command_tools(), 1);
        assert!(registry.has("sh"));
    }
}
