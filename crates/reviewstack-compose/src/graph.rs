//! ResourceGraph: "must exist first" edges between declared resources and
//! the deterministic creation order derived from them.
//!
//! Besides catalog resources, the graph holds the nodes composition adds:
//! one execution role and one policy per grantee, and one node per event
//! source binding. A grantee waits for its role and policy; a policy waits
//! for the role it attaches to and every resource it names.

use std::collections::{BTreeMap, BTreeSet};

use reviewstack_core::{ResourceCatalog, ResourceId};

use crate::binding::BindingSet;
use crate::error::{ComposeError, ComposeResult};
use crate::ledger::PermissionLedger;
use crate::unit::ComputeUnit;

/// Node of the execution role assumed by `grantee`.
pub fn role_node(grantee: &ResourceId) -> ResourceId {
    ResourceId::new(format!("{grantee}ServiceRole"))
}

/// Node of the policy document attached to `grantee`'s role.
pub fn policy_node(grantee: &ResourceId) -> ResourceId {
    ResourceId::new(format!("{grantee}ServiceRolePolicy"))
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceGraph {
    /// node → nodes it depends on
    dependencies: BTreeMap<ResourceId, BTreeSet<ResourceId>>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the full graph of one composition.
    pub fn build<'a>(
        catalog: &ResourceCatalog,
        ledger: &PermissionLedger,
        bindings: &BindingSet,
        units: impl IntoIterator<Item = &'a ComputeUnit>,
    ) -> Self {
        let mut graph = Self::new();

        for descriptor in catalog.iter() {
            graph.add_node(descriptor.id());
            for dep in &descriptor.depends_on {
                graph.add_edge(descriptor.id(), dep);
            }
        }

        for grantee in ledger.grantees() {
            let role = role_node(grantee);
            let policy = policy_node(grantee);
            graph.add_edge(&policy, &role);
            graph.add_edge(grantee, &role);
            graph.add_edge(grantee, &policy);
            for grant in ledger.grants_of(grantee) {
                // External services are not provisioned, so nothing to wait for.
                if catalog.contains(&grant.resource) {
                    graph.add_edge(&policy, &grant.resource);
                }
            }
        }

        for unit in units {
            for value in unit.environment.values() {
                if let Some(source) = value.source() {
                    graph.add_edge(&unit.handle.id, source);
                }
            }
        }

        for binding in bindings.iter() {
            let node = binding.node_id();
            graph.add_edge(&node, &binding.producer);
            graph.add_edge(&node, &binding.consumer);
            if ledger.grants_of(&binding.consumer).next().is_some() {
                graph.add_edge(&node, &policy_node(&binding.consumer));
            }
        }

        graph
    }

    pub fn add_node(&mut self, id: &ResourceId) {
        self.dependencies.entry(id.clone()).or_default();
    }

    /// Record that `node` must be created after `depends_on`.
    pub fn add_edge(&mut self, node: &ResourceId, depends_on: &ResourceId) {
        self.add_node(depends_on);
        self.dependencies
            .entry(node.clone())
            .or_default()
            .insert(depends_on.clone());
    }

    pub fn dependencies(&self, id: &ResourceId) -> Option<&BTreeSet<ResourceId>> {
        self.dependencies.get(id)
    }

    pub fn len(&self) -> usize {
        self.dependencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dependencies.is_empty()
    }

    /// Topological order with every node after its dependencies. Among
    /// nodes that are ready at the same time the smallest id goes first.
    pub fn creation_order(&self) -> ComposeResult<Vec<ResourceId>> {
        let mut dependents: BTreeMap<&ResourceId, Vec<&ResourceId>> = BTreeMap::new();
        let mut pending: BTreeMap<&ResourceId, usize> = BTreeMap::new();
        for (node, deps) in &self.dependencies {
            pending.insert(node, deps.len());
            for dep in deps {
                dependents.entry(dep).or_default().push(node);
            }
        }

        let mut ready: BTreeSet<&ResourceId> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut order = Vec::with_capacity(self.dependencies.len());

        while let Some(node) = ready.pop_first() {
            order.push(node.clone());
            for dependent in dependents.get(node).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if order.len() < self.dependencies.len() {
            let placed: BTreeSet<&ResourceId> = order.iter().collect();
            let remaining: BTreeSet<&ResourceId> = self
                .dependencies
                .keys()
                .filter(|id| !placed.contains(id))
                .collect();
            return Err(ComposeError::DependencyCycle {
                path: self.find_cycle(&remaining),
            });
        }
        Ok(order)
    }

    /// Every node left over by Kahn's algorithm still waits on another
    /// leftover node, so walking first dependencies must revisit a node.
    fn find_cycle(&self, remaining: &BTreeSet<&ResourceId>) -> Vec<ResourceId> {
        let Some(&start) = remaining.first() else {
            return Vec::new();
        };
        let mut path: Vec<&ResourceId> = vec![start];
        let mut seen: BTreeMap<&ResourceId, usize> = BTreeMap::from([(start, 0)]);
        let mut current = start;
        loop {
            let next = self
                .dependencies
                .get(current)
                .and_then(|deps| deps.iter().find(|d| remaining.contains(d)));
            let Some(next) = next else {
                return path.into_iter().cloned().collect();
            };
            if let Some(&index) = seen.get(next) {
                let mut cycle: Vec<ResourceId> =
                    path[index..].iter().map(|id| (*id).clone()).collect();
                cycle.push(next.clone());
                return cycle;
            }
            seen.insert(next, path.len());
            path.push(next);
            current = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ResourceId {
        ResourceId::new(s)
    }

    fn position(order: &[ResourceId], node: &str) -> usize {
        order.iter().position(|n| n.as_str() == node).unwrap()
    }

    #[test]
    fn dependencies_come_first() {
        let mut graph = ResourceGraph::new();
        graph.add_edge(&id("Function"), &id("Layer"));
        graph.add_edge(&id("Api"), &id("Function"));
        graph.add_edge(&id("Plan"), &id("Api"));
        graph.add_edge(&id("Plan"), &id("Key"));

        let order = graph.creation_order().unwrap();
        assert_eq!(order.len(), 5);
        assert!(position(&order, "Layer") < position(&order, "Function"));
        assert!(position(&order, "Function") < position(&order, "Api"));
        assert!(position(&order, "Api") < position(&order, "Plan"));
        assert!(position(&order, "Key") < position(&order, "Plan"));
    }

    #[test]
    fn ties_break_by_id() {
        let mut graph = ResourceGraph::new();
        graph.add_node(&id("b"));
        graph.add_node(&id("c"));
        graph.add_node(&id("a"));
        assert_eq!(graph.creation_order().unwrap(), vec![id("a"), id("b"), id("c")]);
    }

    #[test]
    fn cycle_reports_closed_path() {
        let mut graph = ResourceGraph::new();
        graph.add_edge(&id("A"), &id("B"));
        graph.add_edge(&id("B"), &id("C"));
        graph.add_edge(&id("C"), &id("A"));
        graph.add_edge(&id("D"), &id("A"));

        let err = graph.creation_order().unwrap_err();
        match err {
            ComposeError::DependencyCycle { path } => {
                assert_eq!(path, vec![id("A"), id("B"), id("C"), id("A")]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}
