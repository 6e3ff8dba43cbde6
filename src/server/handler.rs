//! The graph-engine boundary
//!
//! Whatever sits downstream of a start node is opaque to the adapter. The
//! adapter asks for exactly one thing: "run the logic attached to this start
//! node with this context in scope". Everything the logic may do in return
//! goes through the context it is handed.

use std::future::Future;

use async_trait::async_trait;

use crate::invocation::InvocationContext;

/// Downstream logic attached to a start node
///
/// Implementations read arguments, report progress and set the result via
/// the functions in [`crate::invocation`]. Returning `Err` fails the
/// invocation; returning `Ok` without setting a result fails it too.
///
/// Async closures taking an [`InvocationContext`] implement this trait:
///
/// ```ignore
/// server.register(descriptor, |ctx: InvocationContext| async move {
///     let a: f64 = get_typed_argument(&ctx, "a")?;
///     set_tool_result(&ctx, a * 2.0)?;
///     Ok(())
/// })?;
/// ```
#[async_trait]
pub trait CapabilityHandler: Send + Sync + 'static {
    async fn execute(&self, ctx: InvocationContext) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> CapabilityHandler for F
where
    F: Fn(InvocationContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn execute(&self, ctx: InvocationContext) -> anyhow::Result<()> {
        (self)(ctx).await
    }
}
