//! Demo graph - a server instance with a few sample capabilities
//!
//! Used by the binary so it serves something out of the box, and by the
//! integration tests.

use serde_json::{json, Value};

use crate::invocation::{
    create_message_list, get_argument, get_typed_argument, read_resource, render_message,
    report_progress_with_message, set_prompt_result, set_resource_result, set_tool_result,
    InvocationContext,
};
use crate::server::{ArgumentSpec, ArgumentType, CapabilityDescriptor, CapabilityError, ServerInstance};
use crate::types::{CapabilityOutput, Role};

/// Build a server with the demo capabilities registered
///
/// - tool `add`: sum of `a` and `b`
/// - tool `countdown`: counts down `from`, reporting progress on every step
/// - prompt `greeting`: a short user/assistant exchange
/// - resource `config://app`: static settings
/// - resource `users://{id}/profile`: a user profile
/// - resource `users://{id}/card`: one-line card, built by reading the profile
pub fn build_demo_server<I, S>(name: &str, dependencies: I) -> Result<ServerInstance, CapabilityError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut server = ServerInstance::create(name, dependencies);

    server.register(
        CapabilityDescriptor::tool("add", "Add two numbers")
            .with_argument(ArgumentSpec::required("a", ArgumentType::Number))
            .with_argument(ArgumentSpec::required("b", ArgumentType::Number)),
        |ctx: InvocationContext| async move {
            let a = get_argument(&ctx, "a")?;
            let b = get_argument(&ctx, "b")?;
            let sum = match (a.as_i64(), b.as_i64()) {
                (Some(a), Some(b)) => match a.checked_add(b) {
                    Some(sum) => json!(sum),
                    None => json!(a as f64 + b as f64),
                },
                _ => json!(a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default()),
            };
            set_tool_result(&ctx, sum)?;
            anyhow::Ok(())
        },
    )?;

    server.register(
        CapabilityDescriptor::tool("countdown", "Count down to zero, reporting progress").with_argument(
            ArgumentSpec::optional("from", ArgumentType::Integer)
                .with_default(json!(3))
                .with_description("Starting number"),
        ),
        |ctx: InvocationContext| async move {
            let from: u64 = get_typed_argument(&ctx, "from")?;
            for step in 1..=from {
                report_progress_with_message(&ctx, step as f64, from as f64, format!("{} left", from - step));
                tokio::task::yield_now().await;
            }
            set_tool_result(&ctx, "liftoff")?;
            anyhow::Ok(())
        },
    )?;

    server.register(
        CapabilityDescriptor::prompt("greeting", "A friendly opening exchange").with_argument(
            ArgumentSpec::optional("name", ArgumentType::String)
                .with_default(json!("there"))
                .with_description("Who the assistant greets"),
        ),
        |ctx: InvocationContext| async move {
            let messages = create_message_list([
                render_message(&ctx, Role::User, "Hello")?,
                render_message(&ctx, Role::Assistant, "Hi {{name}}")?,
            ]);
            set_prompt_result(&ctx, messages)?;
            anyhow::Ok(())
        },
    )?;

    server.register(
        CapabilityDescriptor::resource("config://app", "Application settings"),
        |ctx: InvocationContext| async move {
            set_resource_result(
                &ctx,
                json!({
                    "version": env!("CARGO_PKG_VERSION"),
                    "debug": false,
                }),
            )?;
            anyhow::Ok(())
        },
    )?;

    server.register(
        CapabilityDescriptor::resource("users://{id}/profile", "A user's profile"),
        |ctx: InvocationContext| async move {
            let id: String = get_typed_argument(&ctx, "id")?;
            set_resource_result(
                &ctx,
                json!({
                    "id": id,
                    "name": format!("User {}", id),
                }),
            )?;
            anyhow::Ok(())
        },
    )?;

    server.register(
        CapabilityDescriptor::resource("users://{id}/card", "A user's profile as one line of text"),
        |ctx: InvocationContext| async move {
            let id: String = get_typed_argument(&ctx, "id")?;
            let profile = read_resource(&ctx, &format!("users://{}/profile", id)).await?;
            let name = match &profile {
                CapabilityOutput::Structured(Value::Object(fields)) => {
                    fields.get("name").and_then(Value::as_str).unwrap_or("unknown").to_string()
                }
                _ => "unknown".to_string(),
            };
            set_resource_result(&ctx, format!("{} (#{})", name, id))?;
            anyhow::Ok(())
        },
    )?;

    Ok(server)
}
