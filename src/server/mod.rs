//! Server instance and capability registry
//!
//! A [`ServerInstance`] owns a [`CapabilityRegistry`] mapping
//! `(kind, identifier)` to a descriptor and the downstream logic
//! ([`CapabilityHandler`]) that answers it. Registration happens while the
//! instance is built; once it runs, lookups are lock-free reads.

pub mod descriptor;
pub mod errors;
pub mod handler;
pub mod instance;
pub mod lifecycle;
pub mod registry;
pub mod uri_template;

pub use descriptor::{ArgumentSpec, ArgumentType, CapabilityDescriptor, CapabilityKind};
pub use errors::{CapabilityError, ServerError};
pub use handler::CapabilityHandler;
pub use instance::ServerInstance;
pub use lifecycle::{lifespan, shutdown_signal, FnLifespan, Lifespan};
pub use registry::{CapabilityRegistry, Registration, Resolved};
pub use uri_template::UriTemplate;
