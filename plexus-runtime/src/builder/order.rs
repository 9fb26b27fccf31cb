//! Build order of named components.

use petgraph::{
    algo::toposort,
    graph::{DiGraph, NodeIndex},
};
use std::collections::HashMap;
use tracing::debug;

use plexus_core::{
    ConfigHandle, PlexusError, Result, WorkflowConfig,
    types::{ComponentGroup, ComponentRef},
};

/// One named component scheduled for building.
#[derive(Debug, Clone)]
pub struct BuildStep {
    /// Group and name of the component
    pub component: ComponentRef,
    /// Its configuration
    pub config: ConfigHandle,
}

const GROUPS: [ComponentGroup; 5] = [
    ComponentGroup::Llms,
    ComponentGroup::Embedders,
    ComponentGroup::Memory,
    ComponentGroup::Retrievers,
    ComponentGroup::Functions,
];

/// Order every named component so that each one comes after all components
/// it references.
///
/// References to undefined components and reference cycles are rejected
/// before anything is built.
pub fn build_order(config: &WorkflowConfig) -> Result<Vec<BuildStep>> {
    let mut graph: DiGraph<BuildStep, ()> = DiGraph::new();
    let mut nodes: HashMap<ComponentRef, NodeIndex> = HashMap::new();

    for group in GROUPS {
        for (name, config) in config.group(group) {
            let component = ComponentRef::new(group, name.clone());
            let index = graph.add_node(BuildStep {
                component: component.clone(),
                config: config.clone(),
            });
            nodes.insert(component, index);
        }
    }

    let mut edges = Vec::new();
    for index in graph.node_indices() {
        let step = &graph[index];
        for dependency in step.config.component_refs() {
            let Some(&dependency_index) = nodes.get(&dependency) else {
                return Err(PlexusError::not_found(format!(
                    "{} `{}` references {} `{}`, which is not defined in `{}`",
                    step.component.group.singular(),
                    step.component.name,
                    dependency.group.singular(),
                    dependency.name,
                    dependency.group
                )));
            };
            edges.push((dependency_index, index));
        }
    }
    for (from, to) in edges {
        graph.add_edge(from, to, ());
    }

    if let Some(workflow) = &config.workflow {
        for dependency in workflow.component_refs() {
            if !nodes.contains_key(&dependency) {
                return Err(PlexusError::not_found(format!(
                    "The workflow references {} `{}`, which is not defined in `{}`",
                    dependency.group.singular(),
                    dependency.name,
                    dependency.group
                )));
            }
        }
    }

    let sorted = toposort(&graph, None).map_err(|cycle| {
        let component = &graph[cycle.node_id()].component;
        PlexusError::configuration_cycle(format!(
            "{} `{}` is part of a reference cycle",
            component.group.singular(),
            component.name
        ))
    })?;

    let order: Vec<BuildStep> = sorted.into_iter().map(|index| graph[index].clone()).collect();
    debug!(
        "Build order: {}",
        order
            .iter()
            .map(|step| step.component.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use plexus_core::{
        TypedConfig,
        types::{FunctionRef, LlmRef},
    };
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct NodeConfig {
        #[serde(default)]
        functions: Vec<FunctionRef>,
        #[serde(default)]
        llm: Option<LlmRef>,
    }

    impl TypedConfig for NodeConfig {
        const TYPE_NAME: &'static str = "node";

        fn component_refs(&self) -> Vec<ComponentRef> {
            self.functions
                .iter()
                .map(FunctionRef::component_ref)
                .chain(self.llm.iter().map(LlmRef::component_ref))
                .collect()
        }
    }

    fn node(functions: &[&str], llm: Option<&str>) -> NodeConfig {
        NodeConfig {
            functions: functions.iter().map(|name| FunctionRef::from(*name)).collect(),
            llm: llm.map(LlmRef::from),
        }
    }

    fn position(order: &[BuildStep], name: &str) -> usize {
        order
            .iter()
            .position(|step| step.component.name == name)
            .unwrap()
    }

    #[test]
    fn test_dependencies_come_first_for_every_permutation() {
        let entries = [
            ("a", node(&[], None)),
            ("b", node(&["a"], None)),
            ("c", node(&["b", "a"], Some("llm1"))),
        ];
        let permutations = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];

        for permutation in permutations {
            let mut config = WorkflowConfig::new().with_llm("llm1", node(&[], None));
            for index in permutation {
                let (name, entry) = &entries[index];
                config = config.with_function(*name, entry.clone());
            }
            let order = build_order(&config).unwrap();
            assert_eq!(order.len(), 4);
            assert!(position(&order, "a") < position(&order, "b"));
            assert!(position(&order, "b") < position(&order, "c"));
            assert!(position(&order, "llm1") < position(&order, "c"));
        }
    }

    #[test]
    fn test_cycle_rejected() {
        let config = WorkflowConfig::new()
            .with_function("a", node(&["b"], None))
            .with_function("b", node(&["a"], None));
        let err = build_order(&config).unwrap_err();
        assert!(matches!(err, PlexusError::ConfigurationCycle { .. }));
    }

    #[test]
    fn test_undefined_reference_rejected() {
        let config = WorkflowConfig::new().with_function("a", node(&[], Some("missing")));
        let err = build_order(&config).unwrap_err();
        assert!(matches!(err, PlexusError::NotFound { .. }));
        assert!(err.to_string().contains("missing"));
    }

    #[test]
    fn test_workflow_references_checked() {
        let config = WorkflowConfig::new().with_workflow(node(&["ghost"], None));
        assert!(build_order(&config).is_err());
    }
}
