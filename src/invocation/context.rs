//! Per-invocation context
//!
//! One context is created for every incoming request and handed to the
//! downstream logic explicitly. It carries three things with separate
//! channels: the validated arguments (read-only), the progress sink
//! (append-only, fire-and-forget) and the result slot (written at most once).

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use super::path::InvocationPath;
use crate::server::{CapabilityDescriptor, CapabilityError, CapabilityKind, CapabilityRegistry};
use crate::types::CapabilityOutput;

/// A progress report from downstream logic
#[derive(Debug, Clone, PartialEq)]
pub struct Progress {
    pub completed: f64,
    pub total: f64,
    pub message: Option<String>,
}

/// Receiving end of a context's progress sink
///
/// Reports arrive in the order they were appended.
pub struct ProgressReceiver {
    rx: mpsc::UnboundedReceiver<Progress>,
}

impl ProgressReceiver {
    /// Wait for the next report; `None` once every sender is gone
    pub async fn recv(&mut self) -> Option<Progress> {
        self.rx.recv().await
    }

    /// Next report if one is already queued
    pub fn try_recv(&mut self) -> Option<Progress> {
        self.rx.try_recv().ok()
    }

    /// Everything queued right now
    pub fn drain(&mut self) -> Vec<Progress> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub fn into_stream(self) -> UnboundedReceiverStream<Progress> {
        UnboundedReceiverStream::new(self.rx)
    }
}

#[derive(Debug)]
enum SlotState {
    Pending,
    Completed(CapabilityOutput),
    /// Completed, and the adapter has taken the value for the response
    Delivered,
    Cancelled,
}

struct ContextInner {
    id: Uuid,
    capability: Arc<CapabilityDescriptor>,
    arguments: Map<String, Value>,
    progress: mpsc::UnboundedSender<Progress>,
    slot: Mutex<SlotState>,
    path: InvocationPath,
    registry: Arc<CapabilityRegistry>,
    started_at: DateTime<Utc>,
}

/// Handle to the context of one in-flight invocation
///
/// Cloning the handle does not create a new context: clones share the same
/// arguments, progress sink and result slot.
#[derive(Clone)]
pub struct InvocationContext {
    inner: Arc<ContextInner>,
}

impl InvocationContext {
    pub(crate) fn new(
        capability: Arc<CapabilityDescriptor>,
        arguments: Map<String, Value>,
        registry: Arc<CapabilityRegistry>,
        path: InvocationPath,
    ) -> (Self, ProgressReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        let context = Self {
            inner: Arc::new(ContextInner {
                id: Uuid::new_v4(),
                capability,
                arguments,
                progress: tx,
                slot: Mutex::new(SlotState::Pending),
                path,
                registry,
                started_at: Utc::now(),
            }),
        };
        (context, ProgressReceiver { rx })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn capability(&self) -> &CapabilityDescriptor {
        &self.inner.capability
    }

    pub fn kind(&self) -> CapabilityKind {
        self.inner.capability.kind
    }

    /// Validated arguments, defaults included
    pub fn arguments(&self) -> &Map<String, Value> {
        &self.inner.arguments
    }

    pub fn path(&self) -> &InvocationPath {
        &self.inner.path
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at
    }

    /// True once a result has been set
    pub fn is_completed(&self) -> bool {
        matches!(*self.slot(), SlotState::Completed(_) | SlotState::Delivered)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(*self.slot(), SlotState::Cancelled)
    }

    /// The result set so far, if it has not been delivered yet
    pub fn result(&self) -> Option<CapabilityOutput> {
        match &*self.slot() {
            SlotState::Completed(output) => Some(output.clone()),
            _ => None,
        }
    }

    pub(crate) fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.inner.registry
    }

    /// Queue a progress report; never blocks
    pub(crate) fn push_progress(&self, progress: Progress) {
        // The receiver is gone once the caller stopped listening
        let _ = self.inner.progress.send(progress);
    }

    /// Store the result; at most once
    ///
    /// Writes after cancellation are dropped without error.
    pub(crate) fn complete(&self, output: CapabilityOutput) -> Result<(), CapabilityError> {
        let mut slot = self.slot();
        match *slot {
            SlotState::Pending => {
                *slot = SlotState::Completed(output);
                tracing::debug!(
                    invocation = %self.inner.id,
                    capability = %self.inner.path,
                    "Result set"
                );
                Ok(())
            }
            SlotState::Cancelled => {
                tracing::debug!(
                    invocation = %self.inner.id,
                    capability = %self.inner.path,
                    "Dropping result written after cancellation"
                );
                Ok(())
            }
            SlotState::Completed(_) | SlotState::Delivered => Err(CapabilityError::AlreadyCompleted {
                capability: self.inner.capability.identifier.clone(),
            }),
        }
    }

    /// Mark the invocation cancelled unless a result is already set
    pub(crate) fn cancel(&self) {
        let mut slot = self.slot();
        if matches!(*slot, SlotState::Pending) {
            *slot = SlotState::Cancelled;
        }
    }

    /// Hand the result over for the response
    pub(crate) fn take_result(&self) -> Option<CapabilityOutput> {
        let mut slot = self.slot();
        match std::mem::replace(&mut *slot, SlotState::Delivered) {
            SlotState::Completed(output) => Some(output),
            other => {
                *slot = other;
                None
            }
        }
    }

    fn slot(&self) -> MutexGuard<'_, SlotState> {
        self.inner.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for InvocationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationContext")
            .field("id", &self.inner.id)
            .field("path", &self.inner.path)
            .field("arguments", &self.inner.arguments)
            .field("slot", &*self.slot())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn context_for(descriptor: CapabilityDescriptor, arguments: Value) -> (InvocationContext, ProgressReceiver) {
        let path = InvocationPath::root(descriptor.identifier.clone());
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        InvocationContext::new(
            Arc::new(descriptor),
            arguments,
            Arc::new(CapabilityRegistry::new()),
            path,
        )
    }

    #[test]
    fn test_result_is_set_once() {
        let (ctx, _progress) = context_for(CapabilityDescriptor::tool("add", ""), json!({}));
        assert!(!ctx.is_completed());

        ctx.complete(CapabilityOutput::from(5)).unwrap();
        assert!(ctx.is_completed());

        let err = ctx.complete(CapabilityOutput::from(6)).unwrap_err();
        assert!(matches!(err, CapabilityError::AlreadyCompleted { .. }));
        assert_eq!(ctx.result(), Some(CapabilityOutput::from(5)));
    }

    #[test]
    fn test_delivered_result_stays_completed() {
        let (ctx, _progress) = context_for(CapabilityDescriptor::tool("add", ""), json!({}));
        ctx.complete(CapabilityOutput::from(5)).unwrap();

        assert_eq!(ctx.take_result(), Some(CapabilityOutput::from(5)));
        assert!(ctx.is_completed());
        assert!(ctx.take_result().is_none());
        assert!(ctx.complete(CapabilityOutput::from(1)).is_err());
    }

    #[test]
    fn test_writes_after_cancel_are_dropped() {
        let (ctx, _progress) = context_for(CapabilityDescriptor::tool("slow", ""), json!({}));
        ctx.cancel();

        assert!(ctx.complete(CapabilityOutput::from("late")).is_ok());
        assert!(ctx.is_cancelled());
        assert!(!ctx.is_completed());
        assert!(ctx.take_result().is_none());
    }

    #[test]
    fn test_cancel_after_completion_keeps_result() {
        let (ctx, _progress) = context_for(CapabilityDescriptor::tool("fast", ""), json!({}));
        ctx.complete(CapabilityOutput::from(1)).unwrap();
        ctx.cancel();
        assert!(ctx.is_completed());
        assert!(!ctx.is_cancelled());
    }

    #[test]
    fn test_progress_keeps_order() {
        let (ctx, mut progress) = context_for(CapabilityDescriptor::tool("count", ""), json!({}));
        for i in 1..=3 {
            ctx.push_progress(Progress {
                completed: i as f64,
                total: 3.0,
                message: None,
            });
        }
        let seen: Vec<f64> = progress.drain().into_iter().map(|p| p.completed).collect();
        assert_eq!(seen, vec![1.0, 2.0, 3.0]);
    }

    #[tokio::test]
    async fn test_progress_as_stream_ends_with_the_context() {
        use futures::StreamExt;

        let (ctx, progress) = context_for(CapabilityDescriptor::tool("count", ""), json!({}));
        ctx.push_progress(Progress {
            completed: 1.0,
            total: 2.0,
            message: Some("half way".to_string()),
        });
        drop(ctx);

        let reports: Vec<Progress> = progress.into_stream().collect().await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].message.as_deref(), Some("half way"));
    }

    #[test]
    fn test_clones_share_the_slot() {
        let (ctx, _progress) = context_for(CapabilityDescriptor::tool("add", ""), json!({}));
        let branch = ctx.clone();
        branch.complete(CapabilityOutput::from(5)).unwrap();
        assert!(ctx.is_completed());
        assert_eq!(ctx.id(), branch.id());
    }
}
