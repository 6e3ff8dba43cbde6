//! Capability registry - one table per capability kind
//!
//! Populated while the server is being built, then shared behind an `Arc`
//! and only read. Tools and prompts are looked up by exact name; resources
//! by URI template match, preferring the template with the fewest
//! placeholders.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};

use super::descriptor::{ArgumentSpec, ArgumentType, CapabilityDescriptor, CapabilityKind};
use super::errors::CapabilityError;
use super::handler::CapabilityHandler;
use super::uri_template::UriTemplate;

/// A descriptor paired with the handler that runs its downstream logic
#[derive(Clone)]
pub struct Registration {
    pub descriptor: Arc<CapabilityDescriptor>,
    pub handler: Arc<dyn CapabilityHandler>,
}

/// The outcome of a successful lookup
#[derive(Clone)]
pub struct Resolved {
    pub descriptor: Arc<CapabilityDescriptor>,
    pub handler: Arc<dyn CapabilityHandler>,
    /// Placeholder bindings (resources only; empty otherwise)
    pub bindings: Map<String, Value>,
}

#[derive(Clone)]
struct ResourceEntry {
    template: UriTemplate,
    registration: Registration,
}

/// Registry of tools, resources and prompts
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    tools: HashMap<String, Registration>,
    prompts: HashMap<String, Registration>,
    /// Registration order is the tie-breaker between equally specific templates
    resources: Vec<ResourceEntry>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a capability
    ///
    /// Fails with `DuplicateCapability` if the kind/identifier pair is taken;
    /// the existing registration is left untouched. Resource descriptors that
    /// declare no arguments get one required string argument per placeholder.
    pub fn register(
        &mut self,
        descriptor: CapabilityDescriptor,
        handler: Arc<dyn CapabilityHandler>,
    ) -> Result<Arc<CapabilityDescriptor>, CapabilityError> {
        if self.contains(descriptor.kind, &descriptor.identifier) {
            return Err(CapabilityError::DuplicateCapability {
                kind: descriptor.kind,
                identifier: descriptor.identifier,
            });
        }

        match descriptor.kind {
            CapabilityKind::Tool | CapabilityKind::Prompt => {
                let descriptor = Arc::new(descriptor);
                let registration = Registration {
                    descriptor: descriptor.clone(),
                    handler,
                };
                let table = if descriptor.kind == CapabilityKind::Tool {
                    &mut self.tools
                } else {
                    &mut self.prompts
                };
                table.insert(descriptor.identifier.clone(), registration);
                Ok(descriptor)
            }
            CapabilityKind::Resource => {
                let template = UriTemplate::parse(&descriptor.identifier)?;
                let mut descriptor = descriptor;
                if descriptor.arguments.is_empty() {
                    descriptor.arguments = template
                        .placeholders()
                        .map(|name| ArgumentSpec::required(name, ArgumentType::String))
                        .collect();
                } else {
                    check_resource_arguments(&template, &descriptor)?;
                }
                let descriptor = Arc::new(descriptor);
                self.resources.push(ResourceEntry {
                    template,
                    registration: Registration {
                        descriptor: descriptor.clone(),
                        handler,
                    },
                });
                Ok(descriptor)
            }
        }
    }

    pub fn contains(&self, kind: CapabilityKind, identifier: &str) -> bool {
        match kind {
            CapabilityKind::Tool => self.tools.contains_key(identifier),
            CapabilityKind::Prompt => self.prompts.contains_key(identifier),
            CapabilityKind::Resource => self
                .resources
                .iter()
                .any(|entry| entry.template.as_str() == identifier),
        }
    }

    /// Resolve a capability for an incoming request
    pub fn lookup(&self, kind: CapabilityKind, identifier: &str) -> Result<Resolved, CapabilityError> {
        let not_found = || CapabilityError::NotFound {
            kind,
            identifier: identifier.to_string(),
        };

        let (registration, bindings) = match kind {
            CapabilityKind::Tool => (self.tools.get(identifier).ok_or_else(not_found)?, Map::new()),
            CapabilityKind::Prompt => (self.prompts.get(identifier).ok_or_else(not_found)?, Map::new()),
            CapabilityKind::Resource => {
                let mut best: Option<(&ResourceEntry, Map<String, Value>)> = None;
                for entry in &self.resources {
                    let Some(bindings) = entry.template.matches(identifier) else {
                        continue;
                    };
                    let more_specific = best.as_ref().map_or(true, |(current, _)| {
                        entry.template.placeholder_count() < current.template.placeholder_count()
                    });
                    if more_specific {
                        best = Some((entry, bindings));
                    }
                }
                let (entry, bindings) = best.ok_or_else(not_found)?;
                (&entry.registration, bindings)
            }
        };

        Ok(Resolved {
            descriptor: registration.descriptor.clone(),
            handler: registration.handler.clone(),
            bindings,
        })
    }

    /// Registered tools, sorted by name
    pub fn tools(&self) -> Vec<Arc<CapabilityDescriptor>> {
        sorted(self.tools.values().map(|r| r.descriptor.clone()).collect())
    }

    /// Registered prompts, sorted by name
    pub fn prompts(&self) -> Vec<Arc<CapabilityDescriptor>> {
        sorted(self.prompts.values().map(|r| r.descriptor.clone()).collect())
    }

    /// Resources with a concrete URI, sorted by URI
    pub fn resources(&self) -> Vec<Arc<CapabilityDescriptor>> {
        self.resources_where(|template| !template.is_templated())
    }

    /// Resources with a templated URI, sorted by template
    pub fn resource_templates(&self) -> Vec<Arc<CapabilityDescriptor>> {
        self.resources_where(UriTemplate::is_templated)
    }

    pub fn len(&self) -> usize {
        self.tools.len() + self.prompts.len() + self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn resources_where(&self, keep: impl Fn(&UriTemplate) -> bool) -> Vec<Arc<CapabilityDescriptor>> {
        sorted(
            self.resources
                .iter()
                .filter(|entry| keep(&entry.template))
                .map(|entry| entry.registration.descriptor.clone())
                .collect(),
        )
    }
}

fn sorted(mut descriptors: Vec<Arc<CapabilityDescriptor>>) -> Vec<Arc<CapabilityDescriptor>> {
    descriptors.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    descriptors
}

/// A read only supplies what the URI binds, so declared arguments must line up
/// with the template: every placeholder is a string-compatible argument and
/// every required argument is a placeholder.
fn check_resource_arguments(template: &UriTemplate, descriptor: &CapabilityDescriptor) -> Result<(), CapabilityError> {
    let invalid = |reason: String| CapabilityError::InvalidTemplate {
        template: template.as_str().to_string(),
        reason,
    };

    for placeholder in template.placeholders() {
        match descriptor.argument(placeholder) {
            Some(spec) if matches!(spec.ty, ArgumentType::String | ArgumentType::Any) => {}
            Some(_) => {
                return Err(invalid(format!("placeholder '{}' needs a string argument", placeholder)));
            }
            None => return Err(invalid(format!("placeholder '{}' has no declared argument", placeholder))),
        }
    }

    if let Some(unbound) = descriptor
        .arguments
        .iter()
        .find(|spec| spec.required && !template.placeholders().any(|name| name == spec.name))
    {
        return Err(invalid(format!("argument '{}' is not bound by the template", unbound.name)));
    }

    Ok(())
}
