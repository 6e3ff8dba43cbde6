//! Result setters - the terminal actions of a downstream path

use super::context::InvocationContext;
use crate::server::{CapabilityError, CapabilityKind};
use crate::types::{CapabilityOutput, Message};

fn set_result(
    ctx: &InvocationContext,
    attempted: CapabilityKind,
    output: CapabilityOutput,
) -> Result<(), CapabilityError> {
    if ctx.kind() != attempted {
        return Err(CapabilityError::KindMismatch {
            capability: ctx.capability().identifier.clone(),
            kind: ctx.kind(),
            attempted,
        });
    }
    ctx.complete(output)
}

/// Set the value a tool invocation returns
pub fn set_tool_result(ctx: &InvocationContext, value: impl Into<CapabilityOutput>) -> Result<(), CapabilityError> {
    set_result(ctx, CapabilityKind::Tool, value.into())
}

/// Set the contents a resource read returns
pub fn set_resource_result(ctx: &InvocationContext, value: impl Into<CapabilityOutput>) -> Result<(), CapabilityError> {
    set_result(ctx, CapabilityKind::Resource, value.into())
}

/// Set the messages a prompt returns
pub fn set_prompt_result(ctx: &InvocationContext, messages: Vec<Message>) -> Result<(), CapabilityError> {
    set_result(ctx, CapabilityKind::Prompt, CapabilityOutput::Messages(messages))
}
