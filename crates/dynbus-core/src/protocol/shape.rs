//! Constructor Specs: one level of a remote type's shape.
//!
//! Specs link through `parent` into a single-inheritance chain that ends at a
//! sentinel root (`Object`, `TypedArray`) or at an empty parent.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Parent names that terminate a chain walk without being fetched.
pub const SENTINEL_ROOTS: [&str; 2] = ["Object", "TypedArray"];

pub fn is_sentinel(name: &str) -> bool {
    name.is_empty() || SENTINEL_ROOTS.contains(&name)
}

/// What kind of member a name resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberKind {
    Property,
    Method,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstructorSpec {
    pub name: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub properties: BTreeSet<String>,
    #[serde(default)]
    pub methods: BTreeSet<String>,
}

impl ConstructorSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            properties: BTreeSet::new(),
            methods: BTreeSet::new(),
        }
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_properties<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_methods<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.methods.extend(names.into_iter().map(Into::into));
        self
    }

    /// Properties win over methods when a name is declared as both.
    pub fn lookup(&self, member: &str) -> Option<MemberKind> {
        if self.properties.contains(member) {
            Some(MemberKind::Property)
        } else if self.methods.contains(member) {
            Some(MemberKind::Method)
        } else {
            None
        }
    }

    /// Next level to visit, if the chain continues.
    pub fn next_level(&self) -> Option<&str> {
        self.parent.as_deref().filter(|p| !is_sentinel(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_stops_at_sentinels() {
        let spec = ConstructorSpec::new("Float32Array").with_parent("TypedArray");
        assert_eq!(spec.next_level(), None);
        let spec = ConstructorSpec::new("A").with_parent("B");
        assert_eq!(spec.next_level(), Some("B"));
        let spec = ConstructorSpec::new("B").with_parent("");
        assert_eq!(spec.next_level(), None);
    }

    #[test]
    fn property_checked_before_method() {
        let spec = ConstructorSpec::new("X")
            .with_properties(["canvas"])
            .with_methods(["canvas", "clear"]);
        assert_eq!(spec.lookup("canvas"), Some(MemberKind::Property));
        assert_eq!(spec.lookup("clear"), Some(MemberKind::Method));
        assert_eq!(spec.lookup("nope"), None);
    }
}
