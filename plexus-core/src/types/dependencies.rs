//! Dependency records collected while functions are built.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::types::ComponentGroup;

/// Components a function requested from the builder while it was built.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionDependencies {
    /// Other functions, including those fetched as tools
    pub functions: BTreeSet<String>,
    /// LLM names
    pub llms: BTreeSet<String>,
    /// Embedder names
    pub embedders: BTreeSet<String>,
    /// Memory client names
    pub memory_clients: BTreeSet<String>,
    /// Retriever names
    pub retrievers: BTreeSet<String>,
}

impl FunctionDependencies {
    /// Record a dependency on `name` in `group`.
    pub fn add(&mut self, group: ComponentGroup, name: impl Into<String>) {
        let name = name.into();
        match group {
            ComponentGroup::Functions => self.functions.insert(name),
            ComponentGroup::Llms => self.llms.insert(name),
            ComponentGroup::Embedders => self.embedders.insert(name),
            ComponentGroup::Memory => self.memory_clients.insert(name),
            ComponentGroup::Retrievers => self.retrievers.insert(name),
        };
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
            && self.llms.is_empty()
            && self.embedders.is_empty()
            && self.memory_clients.is_empty()
            && self.retrievers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_deduplicates() {
        let mut deps = FunctionDependencies::default();
        assert!(deps.is_empty());
        deps.add(ComponentGroup::Llms, "llm1");
        deps.add(ComponentGroup::Llms, "llm1");
        deps.add(ComponentGroup::Functions, "search");
        assert_eq!(deps.llms.len(), 1);
        assert!(deps.functions.contains("search"));
        assert!(!deps.is_empty());
    }
}
