//! MCP server bridge using rmcp
//!
//! This module implements the MCP protocol handlers on top of a
//! [`ServerInstance`]: list requests read the registry, call/read/get requests
//! begin an invocation and drive it to its single result.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rmcp::{
    model::*,
    service::{RequestContext, RoleServer},
    ErrorData as McpError, ServerHandler,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tokio::sync::Notify;

use crate::invocation::{PendingInvocation, Progress, ProgressReceiver};
use crate::server::{CapabilityDescriptor, CapabilityError, CapabilityKind, ServerInstance};
use crate::types::{CapabilityOutput, Message, MessageContent, Role};

// =============================================================================
// Descriptor conversion
// =============================================================================

fn descriptor_to_tool(descriptor: &CapabilityDescriptor) -> Tool {
    let schema = match serde_json::to_value(descriptor.input_schema()) {
        Ok(Value::Object(obj)) => obj,
        _ => serde_json::Map::from_iter([("type".to_string(), json!("object"))]),
    };
    Tool::new(
        descriptor.identifier.clone(),
        descriptor.description.clone(),
        Arc::new(schema),
    )
}

/// rmcp model types whose optional fields vary between protocol revisions
/// are built from their wire JSON
fn wire<T: DeserializeOwned>(value: Value) -> Result<T, McpError> {
    serde_json::from_value(value).map_err(|e| McpError::internal_error(e.to_string(), None))
}

fn descriptor_to_resource(descriptor: &CapabilityDescriptor) -> Result<Resource, McpError> {
    wire(json!({
        "uri": descriptor.identifier,
        "name": descriptor.identifier,
        "description": descriptor.description,
    }))
}

fn descriptor_to_resource_template(descriptor: &CapabilityDescriptor) -> Result<ResourceTemplate, McpError> {
    wire(json!({
        "uriTemplate": descriptor.identifier,
        "name": descriptor.identifier,
        "description": descriptor.description,
    }))
}

fn descriptor_to_prompt(descriptor: &CapabilityDescriptor) -> Result<Prompt, McpError> {
    let arguments: Vec<Value> = descriptor
        .arguments
        .iter()
        .map(|argument| {
            json!({
                "name": argument.name,
                "description": argument.description,
                "required": argument.required,
            })
        })
        .collect();

    wire(json!({
        "name": descriptor.identifier,
        "description": descriptor.description,
        "arguments": arguments,
    }))
}

// =============================================================================
// Output conversion
// =============================================================================

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => serde_json::to_string_pretty(other).unwrap_or_default(),
    }
}

/// Content blocks of a tool result
pub(crate) fn output_to_content(output: &CapabilityOutput) -> Vec<Content> {
    match output {
        CapabilityOutput::Scalar(value) | CapabilityOutput::Structured(value) => {
            vec![Content::text(value_to_text(value))]
        }
        CapabilityOutput::Image(image) => vec![Content::image(image.to_base64(), image.media_type.clone())],
        CapabilityOutput::Messages(messages) => messages
            .iter()
            .map(|message| match &message.content {
                MessageContent::Text(text) => Content::text(text.clone()),
                MessageContent::Image(image) => Content::image(image.to_base64(), image.media_type.clone()),
            })
            .collect(),
    }
}

/// Wire JSON of one resource contents entry
pub(crate) fn output_to_resource_json(uri: &str, output: &CapabilityOutput) -> Value {
    match output {
        CapabilityOutput::Image(image) => json!({
            "uri": uri,
            "mimeType": image.media_type,
            "blob": image.to_base64(),
        }),
        CapabilityOutput::Scalar(value) | CapabilityOutput::Structured(value) => json!({
            "uri": uri,
            "mimeType": output.mime_type(),
            "text": value_to_text(value),
        }),
        CapabilityOutput::Messages(messages) => json!({
            "uri": uri,
            "mimeType": output.mime_type(),
            "text": value_to_text(&Value::Array(messages.iter().map(message_to_json).collect())),
        }),
    }
}

/// Wire JSON of one prompt message
pub(crate) fn message_to_json(message: &Message) -> Value {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let content = match &message.content {
        MessageContent::Text(text) => json!({"type": "text", "text": text}),
        MessageContent::Image(image) => json!({
            "type": "image",
            "data": image.to_base64(),
            "mimeType": image.media_type,
        }),
    };
    json!({"role": role, "content": content})
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert CapabilityError to McpError
///
/// Only the message crosses the boundary.
fn capability_to_mcp_error(e: CapabilityError) -> McpError {
    match e {
        CapabilityError::NotFound {
            kind: CapabilityKind::Resource,
            identifier,
        } => McpError::resource_not_found(format!("Unknown resource: {}", identifier), None),
        CapabilityError::NotFound { kind, identifier } => {
            McpError::invalid_params(format!("Unknown {}: {}", kind, identifier), None)
        }
        e if e.is_caller_error() => McpError::invalid_params(e.to_string(), None),
        e => McpError::internal_error(e.to_string(), None),
    }
}

// =============================================================================
// In-flight tracking
// =============================================================================

/// Number of invocations the bridge is currently driving
///
/// Shared by every clone of a bridge, so a transport can wait for running
/// requests to finish before it tears the session down.
#[derive(Clone, Default)]
pub struct InFlight {
    inner: Arc<InFlightInner>,
}

#[derive(Default)]
struct InFlightInner {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    pub(crate) fn enter(&self) -> InFlightGuard {
        self.inner.count.fetch_add(1, Ordering::SeqCst);
        InFlightGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Resolves once no invocation is running
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            // Register before checking so a guard dropped in between still wakes us
            notified.as_mut().enable();
            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }
}

pub(crate) struct InFlightGuard {
    inner: Arc<InFlightInner>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.inner.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.inner.idle.notify_waiters();
        }
    }
}

// =============================================================================
// Capgraph MCP Bridge
// =============================================================================

/// MCP handler that bridges to a server instance
#[derive(Clone)]
pub struct CapgraphMcpBridge {
    server: Arc<ServerInstance>,
    in_flight: InFlight,
}

impl CapgraphMcpBridge {
    pub fn new(server: Arc<ServerInstance>) -> Self {
        Self {
            server,
            in_flight: InFlight::default(),
        }
    }

    pub fn in_flight(&self) -> &InFlight {
        &self.in_flight
    }

    /// Run an invocation, forwarding its progress reports as notifications
    ///
    /// Every report queued before completion is sent before this returns, so
    /// the caller sees progress strictly before the result.
    async fn drive(
        &self,
        mut pending: PendingInvocation,
        ctx: &RequestContext<RoleServer>,
    ) -> Result<CapabilityOutput, CapabilityError> {
        let _running = self.in_flight.enter();
        let progress_token = ctx.meta.get_progress_token();
        let mut progress = pending.take_progress();

        let ct = ctx.ct.clone();
        let run = pending.run_until(async move { ct.cancelled().await });
        tokio::pin!(run);

        let result = loop {
            tokio::select! {
                biased;
                Some(report) = next_report(&mut progress) => {
                    notify_progress(ctx, progress_token.as_ref(), report).await;
                }
                result = &mut run => break result,
            }
        };

        if let Some(receiver) = progress.as_mut() {
            for report in receiver.drain() {
                notify_progress(ctx, progress_token.as_ref(), report).await;
            }
        }

        result
    }
}

async fn next_report(progress: &mut Option<ProgressReceiver>) -> Option<Progress> {
    match progress {
        Some(receiver) => receiver.recv().await,
        None => std::future::pending().await,
    }
}

async fn notify_progress(ctx: &RequestContext<RoleServer>, token: Option<&ProgressToken>, report: Progress) {
    // Only send progress if client provided token
    let Some(token) = token else {
        return;
    };
    let sent = ctx
        .peer
        .notify_progress(ProgressNotificationParam {
            progress_token: token.clone(),
            progress: report.completed,
            total: Some(report.total),
            message: report.message,
        })
        .await;
    if let Err(e) = sent {
        tracing::debug!("Dropping progress notification: {}", e);
    }
}

impl ServerHandler for CapgraphMcpBridge {
    fn get_info(&self) -> ServerInfo {
        let dependencies = self.server.dependencies();
        let mut instructions = format!(
            "{} - tools, resources and prompts defined by a workflow graph.",
            self.server.name()
        );
        if !dependencies.is_empty() {
            instructions.push_str(&format!(" Dependencies: {}.", dependencies.join(", ")));
        }

        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .enable_prompts()
                .enable_logging()
                .build(),
            server_info: Implementation {
                name: self.server.name().to_string(),
                ..Implementation::from_build_env()
            },
            instructions: Some(instructions),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools: Vec<Tool> = self
            .server
            .registry()
            .tools()
            .iter()
            .map(|descriptor| descriptor_to_tool(descriptor))
            .collect();

        tracing::debug!("Listing {} tools", tools.len());

        Ok(ListToolsResult {
            tools,
            next_cursor: None,
            meta: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        ctx: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request.arguments.unwrap_or_default();
        tracing::debug!("Calling tool: {} with args: {:?}", request.name, arguments);

        let pending = self
            .server
            .begin_invocation(CapabilityKind::Tool, &request.name, arguments)
            .map_err(capability_to_mcp_error)?;

        match self.drive(pending, &ctx).await {
            Ok(output) => Ok(CallToolResult::success(output_to_content(&output))),
            Err(e) if e.is_caller_error() => Err(capability_to_mcp_error(e)),
            // Execution failures are reported to the model, not as protocol errors
            Err(e) => Ok(CallToolResult::error(vec![Content::text(e.to_string())])),
        }
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources = self
            .server
            .registry()
            .resources()
            .iter()
            .map(|descriptor| descriptor_to_resource(descriptor))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
            meta: None,
        })
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        let resource_templates = self
            .server
            .registry()
            .resource_templates()
            .iter()
            .map(|descriptor| descriptor_to_resource_template(descriptor))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListResourceTemplatesResult {
            resource_templates,
            next_cursor: None,
            meta: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        ctx: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let uri = request.uri.to_string();
        tracing::debug!("Reading resource: {}", uri);

        let pending = self
            .server
            .begin_invocation(CapabilityKind::Resource, &uri, Default::default())
            .map_err(capability_to_mcp_error)?;
        let output = self.drive(pending, &ctx).await.map_err(capability_to_mcp_error)?;

        wire(json!({ "contents": [output_to_resource_json(&uri, &output)] }))
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _ctx: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        let prompts = self
            .server
            .registry()
            .prompts()
            .iter()
            .map(|descriptor| descriptor_to_prompt(descriptor))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(ListPromptsResult {
            prompts,
            next_cursor: None,
            meta: None,
        })
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        ctx: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        let arguments = request.arguments.unwrap_or_default();
        tracing::debug!("Getting prompt: {} with args: {:?}", request.name, arguments);

        let pending = self
            .server
            .begin_invocation(CapabilityKind::Prompt, &request.name, arguments)
            .map_err(capability_to_mcp_error)?;
        let description = pending.context().capability().description.clone();
        let output = self.drive(pending, &ctx).await.map_err(capability_to_mcp_error)?;

        let messages: Vec<Value> = match &output {
            CapabilityOutput::Messages(messages) => messages.iter().map(message_to_json).collect(),
            // A prompt answered with a plain value becomes a single user message
            other => vec![json!({
                "role": "user",
                "content": {"type": "text", "text": other.as_value().map(value_to_text).unwrap_or_default()},
            })],
        };

        wire(json!({
            "description": description,
            "messages": messages,
        }))
    }
}
