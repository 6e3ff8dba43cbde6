//! Resource URI templates
//!
//! A template is split on `/` into segments. A segment is either literal or a
//! single `{name}` placeholder binding exactly one non-empty segment of the
//! incoming URI. `users://{user_id}/profile` splits the same way as a path:
//! `["users:", "", "{user_id}", "profile"]`.

use std::fmt;

use serde_json::{Map, Value};

use super::errors::CapabilityError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(String),
}

/// A parsed resource URI template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl UriTemplate {
    /// Parse a template, rejecting malformed placeholders
    pub fn parse(raw: &str) -> Result<Self, CapabilityError> {
        let invalid = |reason: &str| CapabilityError::InvalidTemplate {
            template: raw.to_string(),
            reason: reason.to_string(),
        };

        let mut segments = Vec::new();
        let mut names: Vec<&str> = Vec::new();

        for part in raw.split('/') {
            let opens = part.matches('{').count();
            let closes = part.matches('}').count();

            if opens == 0 && closes == 0 {
                segments.push(Segment::Literal(part.to_string()));
                continue;
            }

            let name = part
                .strip_prefix('{')
                .and_then(|rest| rest.strip_suffix('}'))
                .filter(|_| opens == 1 && closes == 1)
                .ok_or_else(|| invalid("placeholders must span a whole segment, like {name}"))?;

            if name.is_empty() {
                return Err(invalid("empty placeholder name"));
            }
            if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(invalid("placeholder names may only contain letters, digits and '_'"));
            }
            if names.contains(&name) {
                return Err(invalid("duplicate placeholder name"));
            }
            names.push(name);
            segments.push(Segment::Placeholder(name.to_string()));
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Number of placeholder segments; fewer means more specific
    pub fn placeholder_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Placeholder(_)))
            .count()
    }

    pub fn is_templated(&self) -> bool {
        self.placeholder_count() > 0
    }

    /// Placeholder names in template order
    pub fn placeholders(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(name) => Some(name.as_str()),
            Segment::Literal(_) => None,
        })
    }

    /// Match a concrete URI, returning the placeholder bindings
    ///
    /// Returns `None` when the segment counts differ, a literal segment
    /// differs, or a placeholder would bind an empty segment.
    pub fn matches(&self, uri: &str) -> Option<Map<String, Value>> {
        let parts: Vec<&str> = uri.split('/').collect();
        if parts.len() != self.segments.len() {
            return None;
        }

        let mut bindings = Map::new();
        for (segment, part) in self.segments.iter().zip(parts) {
            match segment {
                Segment::Literal(literal) if literal == part => {}
                Segment::Literal(_) => return None,
                Segment::Placeholder(_) if part.is_empty() => return None,
                Segment::Placeholder(name) => {
                    bindings.insert(name.clone(), Value::String(part.to_string()));
                }
            }
        }
        Some(bindings)
    }
}

impl fmt::Display for UriTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
