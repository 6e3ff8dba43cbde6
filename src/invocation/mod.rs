//! Invocation layer
//!
//! Everything that happens between "a request for capability X arrived" and
//! "its single result is ready":
//!
//! - [`adapter`] - validates arguments, builds the context, drives the handler
//! - [`context`] - the per-invocation scope (arguments, progress, result slot)
//! - [`result`] - the result setters that complete a context
//! - [`helpers`] - argument lookup, progress, nested reads, messages

pub mod adapter;
pub mod context;
pub mod helpers;
pub mod path;
pub mod result;

pub use adapter::{validate_arguments, PendingInvocation};
pub use context::{InvocationContext, Progress, ProgressReceiver};
pub use helpers::{
    create_image, create_message, create_message_list, get_argument, get_argument_or, get_typed_argument,
    read_resource, render_message, report_progress, report_progress_with_message, MAX_NESTING_DEPTH,
};
pub use path::InvocationPath;
pub use result::{set_prompt_result, set_resource_result, set_tool_result};
