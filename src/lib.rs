pub mod builder;
pub mod config;
pub mod flow;
pub mod invocation;
pub mod mcp_bridge;
pub mod server;
pub mod transport;
pub mod types;

// Re-export commonly used items
pub use builder::build_demo_server;
pub use flow::Branches;
pub use invocation::{
    create_image, create_message, create_message_list, get_argument, get_argument_or, get_typed_argument,
    read_resource, render_message, report_progress, report_progress_with_message, set_prompt_result,
    set_resource_result, set_tool_result, InvocationContext, PendingInvocation,
};
pub use mcp_bridge::CapgraphMcpBridge;
pub use server::{
    lifespan, ArgumentSpec, ArgumentType, CapabilityDescriptor, CapabilityError, CapabilityHandler,
    CapabilityKind, Lifespan, ServerError, ServerInstance,
};
pub use transport::{serve_stream, HttpTransport, StdioTransport, Transport};
pub use types::{CapabilityOutput, Image, Message, MessageContent, Role};
