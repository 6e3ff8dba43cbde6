//! Entry adapter - binds an incoming request to a capability's downstream logic
//!
//! `begin_invocation` validates the raw arguments and builds a fresh
//! context; nothing downstream runs if validation fails. The returned
//! `PendingInvocation` is then driven to completion, at which point exactly
//! one result has been produced or the invocation has failed.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::{Map, Value};

use super::context::{InvocationContext, ProgressReceiver};
use super::path::InvocationPath;
use crate::server::{CapabilityDescriptor, CapabilityError, CapabilityHandler, CapabilityRegistry, Resolved};
use crate::types::CapabilityOutput;

/// Validate raw arguments against a descriptor's schema
///
/// Unknown keys are rejected, required arguments must be present, supplied
/// values must match the declared type, and declared defaults are filled in
/// for omitted optional arguments.
pub fn validate_arguments(
    descriptor: &CapabilityDescriptor,
    raw: Map<String, Value>,
) -> Result<Map<String, Value>, CapabilityError> {
    if let Some(unknown) = raw.keys().find(|name| descriptor.argument(name).is_none()) {
        return Err(CapabilityError::UnknownArgument {
            capability: descriptor.identifier.clone(),
            name: unknown.clone(),
        });
    }

    let mut arguments = raw;
    for spec in &descriptor.arguments {
        match arguments.get(&spec.name) {
            Some(value) if !spec.ty.accepts(value) => {
                return Err(CapabilityError::InvalidArgument {
                    capability: descriptor.identifier.clone(),
                    name: spec.name.clone(),
                    reason: format!("expected {}, got {}", spec.ty, json_type_name(value)),
                });
            }
            Some(_) => {}
            None if spec.required => {
                return Err(CapabilityError::MissingArgument {
                    capability: descriptor.identifier.clone(),
                    name: spec.name.clone(),
                });
            }
            None => {
                if let Some(default) = &spec.default {
                    arguments.insert(spec.name.clone(), default.clone());
                }
            }
        }
    }

    Ok(arguments)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Build the context for a resolved capability
///
/// Placeholder bindings of a resource take part in validation like any
/// other argument.
pub(crate) fn begin_invocation(
    resolved: Resolved,
    raw_arguments: Map<String, Value>,
    registry: Arc<CapabilityRegistry>,
    path: InvocationPath,
) -> Result<PendingInvocation, CapabilityError> {
    let Resolved {
        descriptor,
        handler,
        bindings,
    } = resolved;

    let mut raw = raw_arguments;
    raw.extend(bindings);
    let arguments = validate_arguments(&descriptor, raw)?;

    let (context, progress) = InvocationContext::new(descriptor, arguments, registry, path);
    tracing::debug!(
        invocation = %context.id(),
        kind = %context.kind(),
        capability = %context.path(),
        "Invocation started"
    );

    Ok(PendingInvocation {
        context,
        handler,
        progress: Some(progress),
    })
}

/// An invocation whose context exists but whose downstream logic has not run
pub struct PendingInvocation {
    context: InvocationContext,
    handler: Arc<dyn CapabilityHandler>,
    progress: Option<ProgressReceiver>,
}

impl PendingInvocation {
    pub fn context(&self) -> &InvocationContext {
        &self.context
    }

    /// Take the progress receiver to observe reports while the invocation runs
    ///
    /// If it is never taken, reports are discarded.
    pub fn take_progress(&mut self) -> Option<ProgressReceiver> {
        self.progress.take()
    }

    /// Run the downstream logic and return its single result
    pub async fn run(self) -> Result<CapabilityOutput, CapabilityError> {
        self.run_until(std::future::pending()).await
    }

    /// Like [`run`](Self::run), but gives up when `cancelled` resolves first
    ///
    /// On cancellation the context is marked cancelled, so any later result
    /// writes from still-running branches are dropped.
    pub async fn run_until<C>(self, cancelled: C) -> Result<CapabilityOutput, CapabilityError>
    where
        C: Future<Output = ()> + Send,
    {
        let PendingInvocation {
            context, handler, ..
        } = self;
        let capability = context.capability().identifier.clone();

        // A panic downstream fails this invocation only
        let execution = AssertUnwindSafe(handler.execute(context.clone())).catch_unwind();

        let outcome = tokio::select! {
            biased;
            outcome = execution => outcome.unwrap_or_else(|panic| {
                Err(anyhow::anyhow!("panicked: {}", panic_message(panic.as_ref())))
            }),
            _ = cancelled => {
                context.cancel();
                tracing::debug!(invocation = %context.id(), capability = %context.path(), "Invocation cancelled");
                return Err(CapabilityError::Cancelled { capability });
            }
        };

        let elapsed_ms = (chrono::Utc::now() - context.started_at()).num_milliseconds();

        if let Err(error) = outcome {
            tracing::debug!(
                invocation = %context.id(),
                capability = %context.path(),
                elapsed_ms,
                error = %format!("{:#}", error),
                "Invocation failed"
            );
            return Err(match error.downcast::<CapabilityError>() {
                Ok(capability_error) => capability_error,
                Err(other) => CapabilityError::CapabilityExecution {
                    capability,
                    message: format!("{:#}", other),
                },
            });
        }

        match context.take_result() {
            Some(output) => {
                tracing::debug!(invocation = %context.id(), capability = %context.path(), elapsed_ms, "Invocation completed");
                Ok(output)
            }
            None => Err(CapabilityError::CapabilityExecution {
                capability,
                message: "no result produced".to_string(),
            }),
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}
