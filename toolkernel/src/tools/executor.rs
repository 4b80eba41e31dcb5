//! Execution manager: drives tool calls through their lifecycle.
//!
//! ```text
//! Validating ──> AwaitingApproval ──> Scheduled ──> Executing ──> Completed
//!      │               │                  │
//!      └───────────────┴──────────────────┴──────────> Completed (error)
//! ```
//!
//! Every call ends in `Completed` with a [`ToolResult`]; failures are carried in
//! the result rather than returned as errors.

use super::definitions::{
    ApprovalMode, ToolCall, ToolCallOutcome, ToolExecution, ToolResult, ToolState,
};
use super::registry::{ServerLocator, Tool, ToolBacking, ToolRegistry};
use super::similarity::closest_match;
use super::validation::validate_arguments;
use crate::adaptive::AdaptiveLoopService;
use crate::cancellation::CancellationToken;
use crate::config::ExecutionConfig;
use crate::connections::{ConnectionManager, ToolServerClient};
use crate::errors::ToolError;
use crate::events::{names, EventSink, NoOpEventSink};
use crate::observability::{ExecutionSpanAttributes, SpanTimer};
use crate::resources::{ResourceAllocationManager, ResourceQuota};
use crate::security::SecurityLayer;
use dashmap::DashMap;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Per-call overrides.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Approval mode replacing the tool's default.
    pub approval_mode: Option<ApprovalMode>,
    /// Timeout replacing the configured one.
    pub timeout: Option<Duration>,
}

impl ExecutionOptions {
    /// Sets the approval mode.
    #[must_use]
    pub const fn with_approval_mode(mut self, mode: ApprovalMode) -> Self {
        self.approval_mode = Some(mode);
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

struct Prepared {
    call_id: String,
    name: String,
    arguments: Map<String, Value>,
    execution_id: String,
    token: Arc<CancellationToken>,
}

fn cancelled_error(name: &str, token: &CancellationToken) -> ToolError {
    ToolError::cancelled(name, token.reason().unwrap_or_else(|| "cancelled".to_string()))
}

fn transport_reason(err: ToolError) -> String {
    match err {
        ToolError::Transport { reason, .. } => reason,
        other => other.to_string(),
    }
}

/// Schedules and runs tool calls.
pub struct ExecutionManager {
    registry: Arc<ToolRegistry>,
    connections: Arc<ConnectionManager>,
    resources: Arc<ResourceAllocationManager>,
    security: Arc<SecurityLayer>,
    sink: Arc<dyn EventSink>,
    adaptive: Option<Arc<AdaptiveLoopService>>,
    config: ExecutionConfig,
    default_quota: ResourceQuota,
    executions: DashMap<String, ToolExecution>,
    cancellations: DashMap<String, Arc<CancellationToken>>,
    session: CancellationToken,
    workers: Arc<Semaphore>,
}

impl ExecutionManager {
    /// Creates a manager over the given components.
    pub fn new(
        registry: Arc<ToolRegistry>,
        connections: Arc<ConnectionManager>,
        resources: Arc<ResourceAllocationManager>,
        security: Arc<SecurityLayer>,
    ) -> Self {
        let config = ExecutionConfig::default();
        Self {
            registry,
            connections,
            resources,
            security,
            sink: Arc::new(NoOpEventSink),
            adaptive: None,
            workers: Arc::new(Semaphore::new(config.worker_pool_size)),
            config,
            default_quota: ResourceQuota::default(),
            executions: DashMap::new(),
            cancellations: DashMap::new(),
            session: CancellationToken::new(),
        }
    }

    /// Sets the scheduler configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExecutionConfig) -> Self {
        self.workers = Arc::new(Semaphore::new(config.worker_pool_size.max(1)));
        self.config = config;
        self
    }

    /// Sets the quota used for tools without their own.
    #[must_use]
    pub const fn with_default_quota(mut self, quota: ResourceQuota) -> Self {
        self.default_quota = quota;
        self
    }

    /// Sets the lifecycle event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Enables AI-assisted suggestions for unknown tool names.
    #[must_use]
    pub fn with_adaptive(mut self, adaptive: Arc<AdaptiveLoopService>) -> Self {
        self.adaptive = Some(adaptive);
        self
    }

    /// Returns the registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Runs one call with default options.
    pub async fn execute(&self, call: ToolCall) -> ToolCallOutcome {
        self.execute_with(call, ExecutionOptions::default()).await
    }

    /// Runs one call.
    pub async fn execute_with(&self, call: ToolCall, options: ExecutionOptions) -> ToolCallOutcome {
        let prepared = self.prepare(call);
        self.drive(prepared, options).await
    }

    /// Runs all calls concurrently. Outcomes keep the input order.
    pub async fn execute_all(&self, calls: Vec<ToolCall>) -> Vec<ToolCallOutcome> {
        self.execute_all_with(calls, ExecutionOptions::default()).await
    }

    /// Runs all calls concurrently with shared options.
    pub async fn execute_all_with(
        &self,
        calls: Vec<ToolCall>,
        options: ExecutionOptions,
    ) -> Vec<ToolCallOutcome> {
        debug!(count = calls.len(), "Executing tool call batch");
        futures::future::join_all(calls.into_iter().map(|call| self.execute_with(call, options)))
            .await
    }

    /// Starts a call in the background and returns its execution id.
    pub fn submit(self: &Arc<Self>, call: ToolCall, options: ExecutionOptions) -> String {
        let prepared = self.prepare(call);
        let execution_id = prepared.execution_id.clone();
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.drive(prepared, options).await;
        });
        execution_id
    }

    /// Requests cancellation of an in-flight execution.
    pub fn cancel(&self, execution_id: &str) -> bool {
        let token = self.cancellations.get(execution_id).map(|t| Arc::clone(t.value()));
        match token {
            Some(token) => {
                info!(execution_id = %execution_id, "Cancelling execution");
                token.cancel("cancelled by request");
                true
            }
            None => false,
        }
    }

    /// Cancels every in-flight execution and refuses new ones.
    pub fn shutdown(&self) {
        self.session.cancel("session shutdown");
        let tokens: Vec<Arc<CancellationToken>> = self
            .cancellations
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        info!(in_flight = tokens.len(), "Shutting down execution manager");
        for token in tokens {
            token.cancel("session shutdown");
        }
    }

    /// Returns a snapshot of an execution record.
    #[must_use]
    pub fn get_execution(&self, execution_id: &str) -> Option<ToolExecution> {
        self.executions.get(execution_id).map(|e| e.value().clone())
    }

    /// Returns the result of a completed execution.
    #[must_use]
    pub fn get_execution_result(&self, execution_id: &str) -> Option<ToolResult> {
        self.executions
            .get(execution_id)
            .and_then(|e| e.value().result.clone())
    }

    /// Returns snapshots of all execution records.
    #[must_use]
    pub fn executions(&self) -> Vec<ToolExecution> {
        self.executions.iter().map(|e| e.value().clone()).collect()
    }

    /// Returns the number of executions not yet completed.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.cancellations.len()
    }

    /// Drops completed records. Returns how many were removed.
    pub fn purge_completed(&self) -> usize {
        let before = self.executions.len();
        self.executions.retain(|_, e| !e.is_completed());
        before - self.executions.len()
    }

    /// Keeps the newest `limit` completed records and drops the rest.
    ///
    /// In-flight executions are never touched. Returns how many were removed.
    pub fn retain_completed(&self, limit: usize) -> usize {
        let mut completed: Vec<_> = self
            .executions
            .iter()
            .filter_map(|e| e.value().completed_at.map(|at| (at, e.key().clone())))
            .collect();
        if completed.len() <= limit {
            return 0;
        }
        completed.sort();
        let excess = completed.len() - limit;
        for (_, execution_id) in completed.into_iter().take(excess) {
            self.executions.remove(&execution_id);
        }
        debug!(removed = excess, "Evicted completed executions");
        excess
    }

    fn prepare(&self, call: ToolCall) -> Prepared {
        let ToolCall {
            id: call_id,
            name,
            arguments,
        } = call;
        let execution = ToolExecution::new(&name, arguments.clone());
        let execution_id = execution.id.clone();

        let token = Arc::new(CancellationToken::new());
        if self.session.is_cancelled() {
            token.cancel(self.session.reason().unwrap_or_else(|| "session shutdown".to_string()));
        }

        self.executions.insert(execution_id.clone(), execution);
        self.cancellations.insert(execution_id.clone(), Arc::clone(&token));
        self.sink.try_emit(
            names::TOOL_INVOKED,
            json!({"execution_id": execution_id, "call_id": call_id, "tool": name}),
        );

        Prepared {
            call_id,
            name,
            arguments,
            execution_id,
            token,
        }
    }

    async fn drive(&self, prepared: Prepared, options: ExecutionOptions) -> ToolCallOutcome {
        let Prepared {
            call_id,
            name,
            arguments,
            execution_id,
            token,
        } = prepared;
        let timer = SpanTimer::start();

        let result = match self
            .run(&execution_id, &name, arguments, options, &token)
            .await
        {
            Ok(result) => result,
            Err(err) => ToolResult::from_error(&err),
        };

        self.finish(&execution_id, &call_id, result.clone(), timer);
        self.cancellations.remove(&execution_id);
        if self.executions.len() > self.config.completed_retention {
            self.retain_completed(self.config.completed_retention);
        }

        ToolCallOutcome {
            call_id,
            tool_name: name,
            execution_id,
            result,
        }
    }

    async fn run(
        &self,
        execution_id: &str,
        name: &str,
        arguments: Map<String, Value>,
        options: ExecutionOptions,
        token: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let Some((definition, backing)) = self.registry.resolve(name) else {
            let suggestion = tokio::select! {
                found = tokio::time::timeout(self.config.suggestion_timeout(), self.suggest(name)) => {
                    found.unwrap_or_else(|_| {
                        debug!(tool = %name, "Suggestion lookup timed out");
                        None
                    })
                }
                () = token.cancelled() => return Err(cancelled_error(name, token)),
            };
            return Err(ToolError::not_found(name, suggestion));
        };
        validate_arguments(&definition, &arguments)?;

        if token.is_cancelled() {
            return Err(cancelled_error(name, token));
        }

        let mode = options.approval_mode.unwrap_or(definition.approval_mode);
        if definition.approval_required && mode != ApprovalMode::Yolo {
            self.transition(execution_id, ToolState::AwaitingApproval);
            self.sink.try_emit(
                names::APPROVAL_REQUESTED,
                json!({"execution_id": execution_id, "tool": name, "mode": mode}),
            );

            let approved = tokio::select! {
                approved = self.security.approve(name, &arguments, mode) => approved,
                () = token.cancelled() => return Err(cancelled_error(name, token)),
            };
            self.sink.try_emit(
                names::APPROVAL_DECIDED,
                json!({"execution_id": execution_id, "tool": name, "approved": approved}),
            );
            if !approved {
                return Err(ToolError::approval_denied(name, mode.as_str()));
            }
        }

        self.transition(execution_id, ToolState::Scheduled);

        let quota = definition.resource_quota.unwrap_or(self.default_quota);
        let Some(_allocation) = self.resources.allocate_guard(quota) else {
            warn!(tool = %name, execution_id = %execution_id, "Resource quota denied");
            return Err(ToolError::resource_exhausted(name));
        };

        if token.is_cancelled() {
            return Err(cancelled_error(name, token));
        }
        self.transition(execution_id, ToolState::Executing);

        match backing {
            ToolBacking::Local(tool) => {
                let mut timeout = options.timeout.unwrap_or_else(|| self.config.local_timeout());
                if quota.max_execution_seconds > 0 {
                    timeout = timeout.min(Duration::from_secs(quota.max_execution_seconds));
                }
                self.run_local(name, tool, arguments, timeout, token).await
            }
            ToolBacking::External(locator) => {
                let timeout = options
                    .timeout
                    .unwrap_or_else(|| self.config.external_timeout());
                self.run_remote(name, &locator, &arguments, timeout, token).await
            }
        }
    }

    async fn run_local(
        &self,
        name: &str,
        tool: Arc<dyn Tool>,
        arguments: Map<String, Value>,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let permit = tokio::select! {
            permit = Arc::clone(&self.workers).acquire_owned() => permit
                .map_err(|_| ToolError::execution_failed(name, "worker pool closed"))?,
            () = token.cancelled() => return Err(cancelled_error(name, token)),
        };

        let handle = tokio::spawn(async move {
            let _permit = permit;
            tool.execute(arguments).await
        });
        let abort = handle.abort_handle();
        token.on_cancel({
            let abort = abort.clone();
            move || abort.abort()
        });

        match tokio::time::timeout(timeout, handle).await {
            Ok(Ok(mut result)) => {
                if result.tool_name.is_empty() {
                    result.tool_name = name.to_string();
                }
                Ok(result)
            }
            Ok(Err(join_err)) if join_err.is_panic() => {
                warn!(tool = %name, "Tool handler panicked");
                Err(ToolError::execution_failed(name, "tool handler panicked"))
            }
            Ok(Err(_)) if token.is_cancelled() => Err(cancelled_error(name, token)),
            Ok(Err(_)) => Err(ToolError::execution_failed(name, "tool task aborted")),
            Err(_) => {
                abort.abort();
                Err(ToolError::timeout(name, timeout.as_secs_f64()))
            }
        }
    }

    async fn run_remote(
        &self,
        name: &str,
        locator: &ServerLocator,
        arguments: &Map<String, Value>,
        timeout: Duration,
        token: &CancellationToken,
    ) -> Result<ToolResult, ToolError> {
        let client = self.connections.client_for(locator).ok_or_else(|| {
            ToolError::transport(
                name,
                format!("no connection to server {}", locator.server_id),
            )
        })?;

        tokio::select! {
            outcome = tokio::time::timeout(timeout, self.submit_and_poll(name, client.as_ref(), arguments)) => {
                outcome.unwrap_or_else(|_| Err(ToolError::timeout(name, timeout.as_secs_f64())))
            }
            () = token.cancelled() => Err(cancelled_error(name, token)),
        }
    }

    async fn submit_and_poll(
        &self,
        name: &str,
        client: &dyn ToolServerClient,
        arguments: &Map<String, Value>,
    ) -> Result<ToolResult, ToolError> {
        let remote_id = client
            .submit_execution(name, arguments)
            .await
            .map_err(|e| ToolError::transport(name, transport_reason(e)))?;
        debug!(tool = %name, remote_id = %remote_id, "Polling remote execution");

        let mut consecutive_errors = 0u32;
        loop {
            match client.get_execution_result(&remote_id).await {
                Ok(Some(mut result)) => {
                    if result.tool_name.is_empty() {
                        result.tool_name = name.to_string();
                    }
                    return Ok(result);
                }
                Ok(None) => consecutive_errors = 0,
                Err(e) => {
                    consecutive_errors += 1;
                    debug!(tool = %name, attempt = consecutive_errors, error = %e, "Poll failed");
                    if consecutive_errors > self.config.max_poll_errors {
                        return Err(ToolError::transport(name, transport_reason(e)));
                    }
                }
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    async fn suggest(&self, name: &str) -> Option<String> {
        let names = self.registry.names();
        if let Some(found) = closest_match(name, names.iter().map(String::as_str)) {
            return Some(found);
        }

        let adaptive = self.adaptive.as_ref()?;
        if names.is_empty() {
            return None;
        }
        let answer = adaptive
            .adapt(
                &json!({"requested_tool": name, "available_tools": names}),
                "Which of the available tools did the caller most likely mean? Answer with TOOL_NAME.",
                Value::Null,
            )
            .await;
        answer
            .as_str()
            .map(str::trim)
            .filter(|candidate| self.registry.has(candidate))
            .map(String::from)
    }

    fn transition(&self, execution_id: &str, state: ToolState) {
        let moved = match self.executions.get_mut(execution_id) {
            Some(mut execution) => execution.transition(state),
            None => return,
        };
        match moved {
            Ok(()) => {
                debug!(execution_id = %execution_id, state = %state, "Execution state changed");
                self.sink.try_emit(
                    names::TOOL_STATE_CHANGED,
                    json!({"execution_id": execution_id, "state": state}),
                );
            }
            Err(e) => warn!(error = %e, "Ignoring state transition"),
        }
    }

    fn finish(&self, execution_id: &str, call_id: &str, result: ToolResult, timer: SpanTimer) {
        let completed = match self.executions.get_mut(execution_id) {
            Some(mut execution) => execution.complete(result.clone()),
            None => return,
        };
        if let Err(e) = completed {
            warn!(error = %e, "Execution already completed");
            return;
        }

        let attrs = ExecutionSpanAttributes::new(execution_id, &result.tool_name)
            .with_call_id(call_id)
            .with_state(ToolState::Completed.as_str())
            .with_duration_ms(timer.elapsed_ms())
            .with_outcome(
                result.success,
                result.error_kind.map(|k| k.as_str().to_string()),
                result.error.clone(),
            );

        if result.success {
            info!(tool = %result.tool_name, execution_id = %execution_id, duration_ms = attrs.duration_ms, "Tool execution completed");
            self.sink.try_emit(names::TOOL_COMPLETED, attrs.to_json());
        } else {
            info!(
                tool = %result.tool_name,
                execution_id = %execution_id,
                error = result.error.as_deref().unwrap_or_default(),
                "Tool execution failed"
            );
            self.sink.try_emit(names::TOOL_FAILED, attrs.to_json());
        }
    }
}

impl std::fmt::Debug for ExecutionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionManager")
            .field("executions", &self.executions.len())
            .field("active", &self.active_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adaptive::AdaptiveLoopService;
    use crate::connections::{server_id_for_url, InMemoryStore};
    use crate::errors::ToolErrorKind;
    use crate::events::CollectingEventSink;
    use crate::security::{DenyAllPolicy, InteractiveApproval};
    use crate::testing::{
        EchoTool, MockConnector, MockOrchestrator, MockToolServer, PanickingTool, SlowTool,
    };
    use crate::tools::ToolDefinition;
    use pretty_assertions::assert_eq;

    struct Harness {
        registry: Arc<ToolRegistry>,
        connections: Arc<ConnectionManager>,
        resources: Arc<ResourceAllocationManager>,
        security: Arc<SecurityLayer>,
        server: Arc<MockToolServer>,
    }

    impl Harness {
        fn new() -> Self {
            let server = Arc::new(MockToolServer::new().with_tool("remote_echo"));
            Self {
                registry: Arc::new(ToolRegistry::new()),
                connections: Arc::new(ConnectionManager::new(
                    Box::new(InMemoryStore::new()),
                    Arc::new(MockConnector::new(server.clone())),
                )),
                resources: Arc::new(ResourceAllocationManager::default()),
                security: Arc::new(SecurityLayer::new()),
                server,
            }
        }

        fn manager(&self) -> ExecutionManager {
            ExecutionManager::new(
                self.registry.clone(),
                self.connections.clone(),
                self.resources.clone(),
                self.security.clone(),
            )
            .with_config(ExecutionConfig::default().with_poll_interval_ms(10))
        }
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[tokio::test]
    async fn test_echo_success() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let manager = h.manager();

        let outcome = manager
            .execute(ToolCall::from_json("echo", json!({"message": "hi"})).with_id("c1"))
            .await;

        assert!(outcome.is_success());
        assert_eq!(outcome.call_id, "c1");
        assert!(outcome.result.llm_content.contains("hi"));

        let record = manager.get_execution(&outcome.execution_id).unwrap();
        assert_eq!(record.state, ToolState::Completed);
        assert_eq!(
            record.history,
            vec![
                ToolState::Validating,
                ToolState::AwaitingApproval,
                ToolState::Scheduled,
                ToolState::Executing,
                ToolState::Completed
            ]
        );
        assert_eq!(manager.active_count(), 0);
        assert_eq!(h.resources.current_usage().allocation_count, 0);
    }

    #[tokio::test]
    async fn test_missing_parameter_fails_validation() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let manager = h.manager();

        let outcome = manager.execute(ToolCall::from_json("echo", json!({}))).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.result.error_kind, Some(ToolErrorKind::Validation));
        assert!(outcome.result.error.unwrap().contains("message"));

        let record = manager.get_execution(&outcome.execution_id).unwrap();
        assert_eq!(record.history, vec![ToolState::Validating, ToolState::Completed]);
    }

    #[tokio::test]
    async fn test_unknown_tool_suggestion() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let manager = h.manager();

        let outcome = manager.execute(ToolCall::from_json("echoo", json!({}))).await;
        assert_eq!(outcome.result.error_kind, Some(ToolErrorKind::NotFound));
        assert!(outcome.result.error.unwrap().contains("Did you mean 'echo'?"));

        let outcome = manager.execute(ToolCall::from_json("zzzzzz", json!({}))).await;
        assert_eq!(
            outcome.result.error.as_deref(),
            Some("Tool 'zzzzzz' not found")
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_adaptive_suggestion() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let orchestrator = Arc::new(MockOrchestrator::new().with_reply("TOOL_NAME: echo"));
        let manager = h
            .manager()
            .with_adaptive(Arc::new(AdaptiveLoopService::new(orchestrator.clone())));

        let outcome = manager.execute(ToolCall::from_json("repeat_back", json!({}))).await;
        assert_eq!(outcome.result.error_kind, Some(ToolErrorKind::NotFound));
        assert!(outcome.result.error.unwrap().contains("Did you mean 'echo'?"));
        assert_eq!(orchestrator.prompts().len(), 1);
    }

    #[tokio::test]
    async fn test_adaptive_answer_must_be_registered() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let orchestrator = Arc::new(MockOrchestrator::new().with_reply("TOOL_NAME: shred"));
        let manager = h
            .manager()
            .with_adaptive(Arc::new(AdaptiveLoopService::new(orchestrator)));

        let outcome = manager.execute(ToolCall::from_json("repeat_back", json!({}))).await;
        assert_eq!(
            outcome.result.error.as_deref(),
            Some("Tool 'repeat_back' not found")
        );
    }

    #[tokio::test]
    async fn test_yolo_skips_approval() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let security = Arc::new(SecurityLayer::new().with_policy(ApprovalMode::Default, Arc::new(DenyAllPolicy)));
        let manager = ExecutionManager::new(
            h.registry.clone(),
            h.connections.clone(),
            h.resources.clone(),
            security,
        );

        let call = ToolCall::from_json("echo", json!({"message": "hi"}));
        let outcome = manager
            .execute_with(call, ExecutionOptions::default().with_approval_mode(ApprovalMode::Yolo))
            .await;

        assert!(outcome.is_success());
        let record = manager.get_execution(&outcome.execution_id).unwrap();
        assert!(!record.history.contains(&ToolState::AwaitingApproval));
    }

    #[tokio::test]
    async fn test_denied_approval() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let security = Arc::new(SecurityLayer::new().with_policy(ApprovalMode::Default, Arc::new(DenyAllPolicy)));
        let manager = ExecutionManager::new(
            h.registry.clone(),
            h.connections.clone(),
            h.resources.clone(),
            security,
        );

        let outcome = manager
            .execute(ToolCall::from_json("echo", json!({"message": "hi"})))
            .await;
        assert_eq!(outcome.result.error_kind, Some(ToolErrorKind::ApprovalDenied));
        assert!(outcome.result.error.unwrap().contains("not approved"));
    }

    #[tokio::test]
    async fn test_cancel_while_awaiting_approval() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let approvals = Arc::new(InteractiveApproval::new(Duration::from_secs(30)));
        h.security.set_policy(ApprovalMode::Default, approvals.clone());
        let manager = Arc::new(h.manager());

        let execution_id = manager.submit(
            ToolCall::from_json("echo", json!({"message": "hi"})),
            ExecutionOptions::default(),
        );

        for _ in 0..100 {
            if approvals.pending_count() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(
            manager.get_execution(&execution_id).map(|e| e.state),
            Some(ToolState::AwaitingApproval)
        );

        assert!(manager.cancel(&execution_id));

        let mut result = None;
        for _ in 0..100 {
            result = manager.get_execution_result(&execution_id);
            if result.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let result = result.unwrap();
        assert_eq!(result.error_kind, Some(ToolErrorKind::Cancelled));
        assert!(result.error.unwrap().contains("cancelled"));
        assert!(!manager.cancel(&execution_id));
    }

    #[tokio::test]
    async fn test_resource_exhausted() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let _hog = h.resources.allocate(ResourceQuota::new(1.0, 0)).unwrap();
        let manager = h.manager();

        let outcome = manager
            .execute(ToolCall::from_json("echo", json!({"message": "hi"})))
            .await;
        assert_eq!(outcome.result.error_kind, Some(ToolErrorKind::ResourceExhausted));
        let record = manager.get_execution(&outcome.execution_id).unwrap();
        assert!(!record.history.contains(&ToolState::Executing));
    }

    #[tokio::test]
    async fn test_local_timeout_releases_allocation() {
        let h = Harness::new();
        h.registry.register(Arc::new(SlowTool::new(Duration::from_secs(5))));
        let manager = h.manager();

        let call = ToolCall::from_json("slow", json!({}));
        let outcome = manager
            .execute_with(
                call,
                ExecutionOptions::default()
                    .with_approval_mode(ApprovalMode::Yolo)
                    .with_timeout(Duration::from_millis(50)),
            )
            .await;

        assert_eq!(outcome.result.error_kind, Some(ToolErrorKind::Timeout));
        assert!(outcome.result.error.unwrap().contains("timeout"));
        assert_eq!(h.resources.current_usage().allocation_count, 0);
    }

    #[tokio::test]
    async fn test_panicking_tool_is_contained() {
        let h = Harness::new();
        h.registry.register(Arc::new(PanickingTool));
        let manager = h.manager();

        let outcome = manager.execute(ToolCall::from_json("panic", json!({}))).await;
        assert_eq!(outcome.result.error_kind, Some(ToolErrorKind::ExecutionFailed));
    }

    #[tokio::test]
    async fn test_execute_all_correlates_by_call_id() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let manager = h.manager();

        let calls = vec![
            ToolCall::from_json("echo", json!({"message": "one"})).with_id("a"),
            ToolCall::from_json("missing", json!({})).with_id("b"),
            ToolCall::from_json("echo", json!({"message": "three"})).with_id("c"),
        ];
        let outcomes = manager.execute_all(calls).await;

        let ids: Vec<&str> = outcomes.iter().map(|o| o.call_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(outcomes[0].result.llm_content.contains("one"));
        assert!(!outcomes[1].is_success());
        assert!(outcomes[2].result.llm_content.contains("three"));
    }

    #[tokio::test]
    async fn test_remote_submit_and_poll() {
        let h = Harness::new();
        h.server.set_pending_polls(2);
        assert!(h.connections.connect("http://remote", "Remote").await);
        let locator = ServerLocator::new(server_id_for_url("http://remote"), "http://remote");
        h.registry.register_external(
            ToolDefinition::new("remote_echo", "Remote echo").with_approval_required(false),
            locator,
        );
        let manager = h.manager();

        let outcome = manager
            .execute(ToolCall::from_json("remote_echo", json!({"message": "far"})))
            .await;

        assert!(outcome.is_success(), "{:?}", outcome.result);
        assert!(outcome.result.llm_content.contains("far"));
        assert_eq!(h.server.submissions().len(), 1);
        assert!(h.server.poll_count() >= 3);
    }

    #[tokio::test]
    async fn test_remote_timeout() {
        let h = Harness::new();
        h.server.set_pending_polls(usize::MAX);
        h.connections.connect("http://remote", "Remote").await;
        h.registry.register_external(
            ToolDefinition::new("remote_echo", "").with_approval_required(false),
            ServerLocator::new(server_id_for_url("http://remote"), "http://remote"),
        );
        let manager = h.manager();

        let outcome = manager
            .execute_with(
                ToolCall::from_json("remote_echo", json!({})),
                ExecutionOptions::default().with_timeout(Duration::from_millis(60)),
            )
            .await;
        assert_eq!(outcome.result.error_kind, Some(ToolErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_remote_submit_failure_is_transport_error() {
        let h = Harness::new();
        h.server.fail_submissions(true);
        h.connections.connect("http://remote", "Remote").await;
        h.registry.register_external(
            ToolDefinition::new("remote_echo", "").with_approval_required(false),
            ServerLocator::new(server_id_for_url("http://remote"), "http://remote"),
        );
        let manager = h.manager();

        let outcome = manager.execute(ToolCall::from_json("remote_echo", json!({}))).await;
        assert_eq!(outcome.result.error_kind, Some(ToolErrorKind::Transport));
    }

    #[tokio::test]
    async fn test_remote_without_connection() {
        let h = Harness::new();
        h.registry.register_external(
            ToolDefinition::new("orphan", "").with_approval_required(false),
            ServerLocator::new("nowhere", "http://nowhere"),
        );
        let manager = h.manager();

        let outcome = manager.execute(ToolCall::from_json("orphan", json!({}))).await;
        assert_eq!(outcome.result.error_kind, Some(ToolErrorKind::Transport));
        assert!(outcome.result.error.unwrap().contains("no connection"));
    }

    #[tokio::test]
    async fn test_remote_poll_errors_exhaust() {
        let h = Harness::new();
        h.server.fail_polls(true);
        h.connections.connect("http://remote", "Remote").await;
        h.registry.register_external(
            ToolDefinition::new("remote_echo", "").with_approval_required(false),
            ServerLocator::new(server_id_for_url("http://remote"), "http://remote"),
        );
        let manager = h.manager();

        let outcome = manager.execute(ToolCall::from_json("remote_echo", json!({}))).await;
        assert_eq!(outcome.result.error_kind, Some(ToolErrorKind::Transport));
        assert_eq!(h.server.poll_count(), 4);
    }

    #[tokio::test]
    async fn test_shutdown_cancels_in_flight_and_new_calls() {
        let h = Harness::new();
        h.registry.register(Arc::new(SlowTool::new(Duration::from_secs(5))));
        h.registry.register(Arc::new(EchoTool::new()));
        let manager = Arc::new(h.manager());

        let execution_id = manager.submit(
            ToolCall::from_json("slow", json!({})),
            ExecutionOptions::default().with_approval_mode(ApprovalMode::Yolo),
        );
        for _ in 0..100 {
            if manager.get_execution(&execution_id).map(|e| e.state) == Some(ToolState::Executing) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        manager.shutdown();

        let mut result = None;
        for _ in 0..100 {
            result = manager.get_execution_result(&execution_id);
            if result.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(result.unwrap().error_kind, Some(ToolErrorKind::Cancelled));

        let late = manager
            .execute(ToolCall::from_json("echo", json!({"message": "late"})))
            .await;
        assert_eq!(late.result.error_kind, Some(ToolErrorKind::Cancelled));
        assert_eq!(h.resources.current_usage().allocation_count, 0);
    }

    #[tokio::test]
    async fn test_lifecycle_events_emitted() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let sink = Arc::new(CollectingEventSink::new());
        let manager = h.manager().with_sink(sink.clone());

        manager
            .execute(ToolCall::from_json("echo", json!({"message": "hi"})))
            .await;
        manager.execute(ToolCall::from_json("echo", json!({}))).await;

        assert_eq!(sink.events_of_type(names::TOOL_INVOKED).len(), 2);
        assert_eq!(sink.events_of_type(names::TOOL_COMPLETED).len(), 1);
        assert_eq!(sink.events_of_type(names::APPROVAL_DECIDED).len(), 1);
        let failed = sink.events_of_type(names::TOOL_FAILED);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0]["error_kind"], "validation");
    }

    #[tokio::test]
    async fn test_completed_is_monotonic_and_purgeable() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let manager = h.manager();

        let outcome = manager
            .execute(ToolCall::from_json("echo", json!({"message": "hi"})))
            .await;
        manager.transition(&outcome.execution_id, ToolState::Executing);
        let record = manager.get_execution(&outcome.execution_id).unwrap();
        assert_eq!(record.state, ToolState::Completed);
        assert_eq!(record.history.last(), Some(&ToolState::Completed));

        assert_eq!(manager.executions().len(), 1);
        assert_eq!(manager.purge_completed(), 1);
        assert!(manager.get_execution(&outcome.execution_id).is_none());
    }

    #[tokio::test]
    async fn test_cancel_during_adaptive_suggestion() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let orchestrator = Arc::new(MockOrchestrator::hanging());
        let manager = Arc::new(
            h.manager()
                .with_adaptive(Arc::new(AdaptiveLoopService::new(orchestrator.clone()))),
        );

        let execution_id = manager.submit(
            ToolCall::from_json("zzzzzz", json!({})),
            ExecutionOptions::default(),
        );
        for _ in 0..100 {
            if orchestrator.prompts().len() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(orchestrator.prompts().len(), 1);
        assert!(manager.cancel(&execution_id));

        let mut result = None;
        for _ in 0..100 {
            result = manager.get_execution_result(&execution_id);
            if result.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(result.unwrap().error_kind, Some(ToolErrorKind::Cancelled));
        assert_eq!(
            manager.get_execution(&execution_id).map(|e| e.state),
            Some(ToolState::Completed)
        );
        assert_eq!(manager.active_count(), 0);
    }

    #[tokio::test]
    async fn test_adaptive_suggestion_is_time_bounded() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let mut config = ExecutionConfig::default().with_poll_interval_ms(10);
        config.suggestion_timeout_seconds = 0.05;
        let manager = h
            .manager()
            .with_config(config)
            .with_adaptive(Arc::new(AdaptiveLoopService::new(Arc::new(
                MockOrchestrator::hanging(),
            ))));

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            manager.execute(ToolCall::from_json("zzzzzz", json!({}))),
        )
        .await
        .unwrap();
        assert_eq!(outcome.result.error_kind, Some(ToolErrorKind::NotFound));
        assert_eq!(
            outcome.result.error.as_deref(),
            Some("Tool 'zzzzzz' not found")
        );
    }

    #[tokio::test]
    async fn test_cancel_aborts_running_local_tool() {
        let h = Harness::new();
        let slow = SlowTool::new(Duration::from_millis(150));
        h.registry.register(Arc::new(slow.clone()));
        let manager = Arc::new(h.manager());

        let execution_id = manager.submit(
            ToolCall::from_json("slow", json!({})),
            ExecutionOptions::default(),
        );
        for _ in 0..100 {
            if manager.get_execution(&execution_id).map(|e| e.state) == Some(ToolState::Executing) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(manager.cancel(&execution_id));

        let mut result = None;
        for _ in 0..100 {
            result = manager.get_execution_result(&execution_id);
            if result.is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let result = result.unwrap();
        assert_eq!(result.error_kind, Some(ToolErrorKind::Cancelled));
        assert!(result.error.unwrap().contains("cancelled by request"));

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(slow.finished_count(), 0);
        assert_eq!(h.resources.current_usage().allocation_count, 0);
    }

    #[tokio::test]
    async fn test_completed_records_are_bounded() {
        let h = Harness::new();
        h.registry.register(Arc::new(EchoTool::new()));
        let manager = h.manager().with_config(
            ExecutionConfig::default()
                .with_poll_interval_ms(10)
                .with_completed_retention(2),
        );

        let mut ids = Vec::new();
        for i in 0..4 {
            let outcome = manager
                .execute(ToolCall::from_json("echo", json!({"message": format!("m{i}")})))
                .await;
            ids.push(outcome.execution_id);
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        assert_eq!(manager.executions().len(), 2);
        assert!(manager.get_execution(&ids[0]).is_none());
        assert!(manager.get_execution(&ids[1]).is_none());
        assert!(manager.get_execution(&ids[3]).is_some());
        assert_eq!(manager.retain_completed(0), 2);
        assert!(manager.executions().is_empty());
    }
}
