//! Primitives downstream logic uses besides the result setters
//!
//! Argument lookup, progress reporting, re-entrant resource reads and
//! message construction. All of them take the invocation context
//! explicitly.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::adapter::begin_invocation;
use super::context::{InvocationContext, Progress};
use crate::server::{CapabilityError, CapabilityKind};
use crate::types::{CapabilityOutput, Image, Message, MessageContent, Role};

/// Resource reads may nest at most this deep
pub const MAX_NESTING_DEPTH: usize = 16;

/// Value of a supplied (or defaulted) argument
///
/// Fails with `MissingArgument` when the caller did not supply it and the
/// schema declares no default.
pub fn get_argument<'a>(ctx: &'a InvocationContext, name: &str) -> Result<&'a Value, CapabilityError> {
    ctx.arguments()
        .get(name)
        .ok_or_else(|| CapabilityError::MissingArgument {
            capability: ctx.capability().identifier.clone(),
            name: name.to_string(),
        })
}

/// Value of an argument, or `default` when it was not supplied
///
/// The name must still be declared by the capability, so a misspelled lookup
/// fails with `UnknownArgument` instead of quietly yielding the default.
pub fn get_argument_or(ctx: &InvocationContext, name: &str, default: Value) -> Result<Value, CapabilityError> {
    if ctx.capability().argument(name).is_none() {
        return Err(CapabilityError::UnknownArgument {
            capability: ctx.capability().identifier.clone(),
            name: name.to_string(),
        });
    }
    Ok(ctx.arguments().get(name).cloned().unwrap_or(default))
}

/// Argument deserialized into `T`
pub fn get_typed_argument<T: DeserializeOwned>(ctx: &InvocationContext, name: &str) -> Result<T, CapabilityError> {
    let value = get_argument(ctx, name)?;
    serde_json::from_value(value.clone()).map_err(|e| CapabilityError::InvalidArgument {
        capability: ctx.capability().identifier.clone(),
        name: name.to_string(),
        reason: e.to_string(),
    })
}

/// Append a progress report; does not block and does not affect completion
pub fn report_progress(ctx: &InvocationContext, completed: f64, total: f64) {
    ctx.push_progress(Progress {
        completed,
        total,
        message: None,
    });
}

/// Append a progress report carrying a human-readable message
pub fn report_progress_with_message(ctx: &InvocationContext, completed: f64, total: f64, message: impl Into<String>) {
    let message = message.into();
    tracing::info!(invocation = %ctx.id(), capability = %ctx.path(), "{}", message);
    ctx.push_progress(Progress {
        completed,
        total,
        message: Some(message),
    });
}

/// Read another resource from inside a running invocation
///
/// The nested read gets its own context; its result is returned here and
/// never touches `ctx`'s result slot.
pub async fn read_resource(ctx: &InvocationContext, uri: &str) -> Result<CapabilityOutput, CapabilityError> {
    let path = ctx.path().extend(uri);
    if path.depth() > MAX_NESTING_DEPTH {
        return Err(CapabilityError::RecursionLimit {
            path: path.to_string(),
            limit: MAX_NESTING_DEPTH,
        });
    }

    let registry = ctx.registry().clone();
    let resolved = registry.lookup(CapabilityKind::Resource, uri)?;
    let pending = begin_invocation(resolved, Default::default(), registry, path)?;
    pending.run().await
}

/// Load an image file; `format` overrides the extension (fallback `png`)
pub async fn create_image(path: impl AsRef<std::path::Path>, format: Option<&str>) -> std::io::Result<Image> {
    Image::from_path(path, format).await
}

pub fn create_message(role: Role, content: impl Into<MessageContent>) -> Message {
    Message {
        role,
        content: content.into(),
    }
}

/// Concatenate messages into a prompt result, keeping their order
pub fn create_message_list(messages: impl IntoIterator<Item = Message>) -> Vec<Message> {
    messages.into_iter().collect()
}

/// Build a message by rendering a mustache template with the invocation's
/// arguments, e.g. `"Hello {{name}}"`
pub fn render_message(ctx: &InvocationContext, role: Role, template: &str) -> Result<Message, CapabilityError> {
    let invalid = |reason: String| CapabilityError::InvalidTemplate {
        template: template.to_string(),
        reason,
    };

    let compiled = mustache::compile_str(template).map_err(|e| invalid(e.to_string()))?;
    let data = Value::Object(ctx.arguments().clone());
    let mut output = Vec::new();
    compiled
        .render(&mut output, &data)
        .map_err(|e| invalid(e.to_string()))?;
    let rendered = String::from_utf8(output).map_err(|e| invalid(e.to_string()))?;

    Ok(create_message(role, rendered))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::context::tests::context_for;
    use crate::server::{ArgumentSpec, ArgumentType, CapabilityDescriptor};
    use serde_json::json;

    fn add_context(args: Value) -> InvocationContext {
        let descriptor = CapabilityDescriptor::tool("add", "")
            .with_argument(ArgumentSpec::required("a", ArgumentType::Number))
            .with_argument(ArgumentSpec::optional("b", ArgumentType::Number));
        context_for(descriptor, args).0
    }

    #[test]
    fn test_get_argument_present_and_absent() {
        let ctx = add_context(json!({"a": 2}));
        assert_eq!(get_argument(&ctx, "a").unwrap(), &json!(2));

        let err = get_argument(&ctx, "b").unwrap_err();
        assert_eq!(err.to_string(), "missing argument 'b' for add");
        assert_eq!(get_argument_or(&ctx, "b", json!(0)).unwrap(), json!(0));
        assert_eq!(get_argument_or(&ctx, "a", json!(0)).unwrap(), json!(2));
    }

    #[test]
    fn test_get_argument_or_rejects_undeclared_names() {
        let ctx = add_context(json!({"a": 2}));
        let err = get_argument_or(&ctx, "bb", json!(0)).unwrap_err();
        assert!(matches!(
            err,
            CapabilityError::UnknownArgument { ref capability, ref name } if capability == "add" && name == "bb"
        ));
    }

    #[test]
    fn test_typed_argument() {
        let ctx = add_context(json!({"a": 2.5}));
        let a: f64 = get_typed_argument(&ctx, "a").unwrap();
        assert_eq!(a, 2.5);

        let err = get_typed_argument::<String>(&ctx, "a").unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidArgument { .. }));
    }

    #[test]
    fn test_message_list_keeps_order() {
        let messages = create_message_list([
            create_message(Role::User, "Hello"),
            create_message(Role::Assistant, "Hi there"),
        ]);
        assert_eq!(messages[0], Message::user("Hello"));
        assert_eq!(messages[1], Message::assistant("Hi there"));
        assert!(create_message_list(Vec::new()).is_empty());
    }

    #[test]
    fn test_render_message_uses_arguments() {
        let descriptor = CapabilityDescriptor::prompt("greeting", "")
            .with_argument(ArgumentSpec::required("name", ArgumentType::String));
        let (ctx, _progress) = context_for(descriptor, json!({"name": "Ada"}));

        let message = render_message(&ctx, Role::User, "Hello {{name}}!").unwrap();
        assert_eq!(message.text(), Some("Hello Ada!"));
        assert_eq!(message.role, Role::User);
    }

    #[test]
    fn test_render_message_rejects_broken_template() {
        let (ctx, _progress) = context_for(CapabilityDescriptor::prompt("p", ""), json!({}));
        let err = render_message(&ctx, Role::User, "Hello {{#items}}never closed").unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidTemplate { .. }));
    }

    #[test]
    fn test_progress_message_is_queued() {
        let (ctx, mut progress) = context_for(CapabilityDescriptor::tool("t", ""), json!({}));
        report_progress_with_message(&ctx, 1.0, 4.0, "warming up");
        report_progress(&ctx, 2.0, 4.0);

        let reports = progress.drain();
        assert_eq!(reports[0].message.as_deref(), Some("warming up"));
        assert_eq!(reports[1].message, None);
    }
}
