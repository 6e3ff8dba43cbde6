use std::sync::Arc;

use serde_json::{Map, Value};

use super::descriptor::{CapabilityDescriptor, CapabilityKind};
use super::errors::CapabilityError;
use super::handler::CapabilityHandler;
use super::lifecycle::Lifespan;
use super::registry::CapabilityRegistry;
use crate::invocation::{adapter, InvocationPath, PendingInvocation};
use crate::types::CapabilityOutput;

/// A named capability host
///
/// Built mutably (register capabilities, attach a lifespan), then run. Once
/// running it is shared behind an `Arc` and its registry is read-only.
/// Nothing is global: several instances can live in one process.
pub struct ServerInstance {
    name: String,
    dependencies: Vec<String>,
    registry: Arc<CapabilityRegistry>,
    pub(crate) lifespan: Option<Arc<dyn Lifespan>>,
}

impl ServerInstance {
    /// Name used when an empty one is given
    pub const DEFAULT_NAME: &'static str = "capgraph-mcp-server";

    /// Create a server; duplicate dependencies are dropped, order is kept
    pub fn create<I, S>(name: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut name = name.into();
        if name.trim().is_empty() {
            name = Self::DEFAULT_NAME.to_string();
        }

        let mut deduped: Vec<String> = Vec::new();
        for dependency in dependencies {
            let dependency = dependency.into();
            if !deduped.contains(&dependency) {
                deduped.push(dependency);
            }
        }

        tracing::info!(server = %name, "Created MCP server");
        if !deduped.is_empty() {
            tracing::info!(server = %name, dependencies = %deduped.join(", "), "With dependencies");
        }

        Self {
            name,
            dependencies: deduped,
            registry: Arc::new(CapabilityRegistry::new()),
            lifespan: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    /// Register a start node's capability and the logic downstream of it
    pub fn register<H: CapabilityHandler>(
        &mut self,
        descriptor: CapabilityDescriptor,
        handler: H,
    ) -> Result<(), CapabilityError> {
        self.register_shared(descriptor, Arc::new(handler))
    }

    /// Register with a handler that is already shared
    pub fn register_shared(
        &mut self,
        descriptor: CapabilityDescriptor,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Result<(), CapabilityError> {
        // Unique until the server is shared, so this does not copy
        let registry = Arc::make_mut(&mut self.registry);
        let descriptor = registry.register(descriptor, handler)?;
        tracing::info!(
            server = %self.name,
            kind = %descriptor.kind,
            identifier = %descriptor.identifier,
            "Registered capability"
        );
        Ok(())
    }

    /// Install startup/shutdown hooks, replacing any previous ones
    pub fn attach_lifespan<L: Lifespan>(&mut self, lifespan: L) {
        self.lifespan = Some(Arc::new(lifespan));
        tracing::info!(server = %self.name, "Configured server lifespan");
    }

    /// Resolve a capability and build a fresh context for one request
    ///
    /// For resources `identifier` is the concrete URI being read; its
    /// placeholder bindings become arguments.
    pub fn begin_invocation(
        &self,
        kind: CapabilityKind,
        identifier: &str,
        raw_arguments: Map<String, Value>,
    ) -> Result<PendingInvocation, CapabilityError> {
        let resolved = self.registry.lookup(kind, identifier)?;
        adapter::begin_invocation(
            resolved,
            raw_arguments,
            self.registry.clone(),
            InvocationPath::root(identifier),
        )
    }

    /// Begin and run an invocation without observing progress
    pub async fn invoke(
        &self,
        kind: CapabilityKind,
        identifier: &str,
        raw_arguments: Map<String, Value>,
    ) -> Result<CapabilityOutput, CapabilityError> {
        self.begin_invocation(kind, identifier, raw_arguments)?.run().await
    }
}

impl std::fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerInstance")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("capabilities", &self.registry.len())
            .field("lifespan", &self.lifespan.is_some())
            .finish()
    }
}
