//! Downstream branches
//!
//! A start node may fan out into several branches, of which typically only
//! one sets the result (the others log, branch on a condition, or do
//! nothing). [`Branches`] runs them one after another in a single thread of
//! control and stops as soon as the context is completed.

use std::sync::Arc;

use async_trait::async_trait;

use crate::invocation::InvocationContext;
use crate::server::CapabilityHandler;

#[derive(Clone, Default)]
pub struct Branches {
    branches: Vec<Arc<dyn CapabilityHandler>>,
}

impl Branches {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a branch; branches run in the order they were added
    pub fn then<H: CapabilityHandler>(mut self, branch: H) -> Self {
        self.branches.push(Arc::new(branch));
        self
    }

    pub fn len(&self) -> usize {
        self.branches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.branches.is_empty()
    }
}

#[async_trait]
impl CapabilityHandler for Branches {
    async fn execute(&self, ctx: InvocationContext) -> anyhow::Result<()> {
        for (index, branch) in self.branches.iter().enumerate() {
            if ctx.is_completed() || ctx.is_cancelled() {
                tracing::debug!(
                    invocation = %ctx.id(),
                    skipped = self.branches.len() - index,
                    "Context settled, skipping remaining branches"
                );
                break;
            }
            branch.execute(ctx.clone()).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invocation::{get_argument, set_tool_result};
    use crate::server::{ArgumentSpec, ArgumentType, CapabilityDescriptor, CapabilityKind, ServerInstance};
    use serde_json::{json, Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_first_completing_branch_wins() {
        let later_runs = Arc::new(AtomicUsize::new(0));
        let counter = later_runs.clone();

        let branches = Branches::new()
            .then(|ctx: InvocationContext| async move {
                // Condition branch: only answers for positive input
                if get_argument(&ctx, "n")?.as_i64().unwrap_or(0) > 0 {
                    set_tool_result(&ctx, "positive")?;
                }
                anyhow::Ok(())
            })
            .then(|ctx: InvocationContext| async move {
                set_tool_result(&ctx, "not positive")?;
                anyhow::Ok(())
            })
            .then(move |_ctx: InvocationContext| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    anyhow::Ok(())
                }
            });
        assert_eq!(branches.len(), 3);

        let mut server = ServerInstance::create("flow", Vec::<String>::new());
        let descriptor = CapabilityDescriptor::tool("sign", "")
            .with_argument(ArgumentSpec::required("n", ArgumentType::Integer));
        server.register(descriptor, branches).unwrap();

        let positive = server
            .invoke(CapabilityKind::Tool, "sign", args(json!({"n": 3})))
            .await
            .unwrap();
        assert_eq!(positive.as_value(), Some(&json!("positive")));

        let negative = server
            .invoke(CapabilityKind::Tool, "sign", args(json!({"n": -3})))
            .await
            .unwrap();
        assert_eq!(negative.as_value(), Some(&json!("not positive")));

        assert_eq!(later_runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_branch_error_stops_the_chain() {
        let branches = Branches::new()
            .then(|_ctx: InvocationContext| async move {
                Err::<(), _>(anyhow::anyhow!("lookup failed"))
            })
            .then(|ctx: InvocationContext| async move {
                set_tool_result(&ctx, 1)?;
                anyhow::Ok(())
            });

        let mut server = ServerInstance::create("flow", Vec::<String>::new());
        server
            .register(CapabilityDescriptor::tool("fragile", ""), branches)
            .unwrap();

        let err = server
            .invoke(CapabilityKind::Tool, "fragile", Map::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "fragile failed: lookup failed");
    }

    #[tokio::test]
    async fn test_empty_branches_produce_no_result() {
        let mut server = ServerInstance::create("flow", Vec::<String>::new());
        server
            .register(CapabilityDescriptor::tool("empty", ""), Branches::new())
            .unwrap();

        let err = server.invoke(CapabilityKind::Tool, "empty", Map::new()).await.unwrap_err();
        assert_eq!(err.to_string(), "empty failed: no result produced");
    }
}
