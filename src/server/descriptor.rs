//! Capability descriptors - what a start node declares about itself

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// The three kinds of capability a server can host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityKind {
    Tool,
    Resource,
    Prompt,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CapabilityKind::Tool => "tool",
            CapabilityKind::Resource => "resource",
            CapabilityKind::Prompt => "prompt",
        };
        f.write_str(name)
    }
}

/// Declared type of an argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
    /// Accepts any JSON value, including null
    Any,
}

impl ArgumentType {
    /// Whether a JSON value is acceptable for this type
    pub fn accepts(&self, value: &Value) -> bool {
        match self {
            ArgumentType::String => value.is_string(),
            ArgumentType::Number => value.is_number(),
            ArgumentType::Integer => value.is_i64() || value.is_u64(),
            ArgumentType::Boolean => value.is_boolean(),
            ArgumentType::Object => value.is_object(),
            ArgumentType::Array => value.is_array(),
            ArgumentType::Any => true,
        }
    }

    /// JSON Schema `type` keyword, if the type constrains one
    pub fn json_type(&self) -> Option<&'static str> {
        match self {
            ArgumentType::String => Some("string"),
            ArgumentType::Number => Some("number"),
            ArgumentType::Integer => Some("integer"),
            ArgumentType::Boolean => Some("boolean"),
            ArgumentType::Object => Some("object"),
            ArgumentType::Array => Some("array"),
            ArgumentType::Any => None,
        }
    }
}

impl fmt::Display for ArgumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.json_type().unwrap_or("any"))
    }
}

/// One entry of a capability's argument schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: ArgumentType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Filled in when the caller omits the argument
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ArgumentSpec {
    pub fn required(name: impl Into<String>, ty: ArgumentType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            description: None,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: ArgumentType) -> Self {
        Self {
            required: false,
            ..Self::required(name, ty)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Declare a default; an argument with a default is never required
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self.required = false;
        self
    }
}

/// Everything a start node declares about the capability it begins
///
/// Immutable once registered; the registry hands out `Arc`s to it and every
/// invocation context points back at the descriptor it was created for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub kind: CapabilityKind,
    /// Tool or prompt name, or resource URI (possibly templated)
    pub identifier: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentSpec>,
}

impl CapabilityDescriptor {
    pub fn new(kind: CapabilityKind, identifier: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind,
            identifier: identifier.into(),
            description: description.into(),
            arguments: Vec::new(),
        }
    }

    pub fn tool(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(CapabilityKind::Tool, name, description)
    }

    /// A resource addressed by a URI, e.g. `users://{user_id}/profile`
    pub fn resource(uri: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(CapabilityKind::Resource, uri, description)
    }

    pub fn prompt(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(CapabilityKind::Prompt, name, description)
    }

    pub fn with_argument(mut self, argument: ArgumentSpec) -> Self {
        self.arguments.push(argument);
        self
    }

    pub fn argument(&self, name: &str) -> Option<&ArgumentSpec> {
        self.arguments.iter().find(|a| a.name == name)
    }

    /// JSON Schema for the arguments, as advertised in `tools/list`
    ///
    /// MCP requires `"type": "object"` at the root, so an empty argument list
    /// still yields an object schema.
    pub fn input_schema(&self) -> schemars::Schema {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for argument in &self.arguments {
            let mut property = Map::new();
            if let Some(ty) = argument.ty.json_type() {
                property.insert("type".to_string(), json!(ty));
            }
            if let Some(description) = &argument.description {
                property.insert("description".to_string(), json!(description));
            }
            if let Some(default) = &argument.default {
                property.insert("default".to_string(), default.clone());
            }
            properties.insert(argument.name.clone(), Value::Object(property));

            if argument.required {
                required.push(json!(argument.name));
            }
        }

        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), Value::Object(properties));
        if !required.is_empty() {
            schema.insert("required".to_string(), Value::Array(required));
        }
        schema.into()
    }
}
