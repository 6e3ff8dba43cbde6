use std::fmt;

/// Tracks nesting through re-entrant resource reads
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InvocationPath {
    /// Identifiers in call order
    /// Example: ["describe_user"], ["users://{id}/card", "users://7/profile"]
    segments: Vec<String>,
}

impl InvocationPath {
    pub fn root(identifier: impl Into<String>) -> Self {
        Self {
            segments: vec![identifier.into()],
        }
    }

    pub fn extend(&self, identifier: impl Into<String>) -> Self {
        let mut path = self.clone();
        path.segments.push(identifier.into());
        path
    }

    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            None
        } else {
            Some(Self {
                segments: self.segments[..self.segments.len() - 1].to_vec(),
            })
        }
    }
}

impl fmt::Display for InvocationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join(" -> "))
    }
}
