use std::collections::{HashMap, HashSet};

use crate::error::ProvisionerError;
use crate::manifest::{Manifest, ResourceSpec};

/// Explicit dependency graph over the manifest's specs.
///
/// Read-only once built. Node indices follow manifest order.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    specs: Vec<ResourceSpec>,
    /// `dependencies[i]` = nodes that must succeed before node `i` starts.
    dependencies: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Build and check the graph: unique names, known edge endpoints, no
    /// self-edges, no cycles.
    pub fn build(manifest: &Manifest) -> Result<Self, ProvisionerError> {
        let mut index: HashMap<&str, usize> = HashMap::with_capacity(manifest.specs.len());
        for (i, spec) in manifest.specs.iter().enumerate() {
            if index.insert(spec.name.as_str(), i).is_some() {
                return Err(ProvisionerError::InvalidPlan(format!(
                    "resource name {:?} is declared twice",
                    spec.name
                )));
            }
        }

        let mut dependencies: Vec<Vec<usize>> = vec![Vec::new(); manifest.specs.len()];
        for edge in &manifest.edges {
            let lookup = |name: &str| {
                index.get(name).copied().ok_or_else(|| {
                    ProvisionerError::InvalidPlan(format!("edge references unknown resource {name:?}"))
                })
            };
            let dependent = lookup(&edge.dependent)?;
            let dependency = lookup(&edge.dependency)?;
            if dependent == dependency {
                return Err(ProvisionerError::InvalidPlan(format!(
                    "{:?} cannot depend on itself",
                    edge.dependent
                )));
            }
            if !dependencies[dependent].contains(&dependency) {
                dependencies[dependent].push(dependency);
            }
        }

        let graph = Self {
            specs: manifest.specs.clone(),
            dependencies,
        };
        let order = graph.topological_order();
        if order.len() != graph.len() {
            let placed: HashSet<usize> = order.into_iter().collect();
            let stuck: Vec<&str> = (0..graph.len())
                .filter(|i| !placed.contains(i))
                .map(|i| graph.specs[i].name.as_str())
                .collect();
            return Err(ProvisionerError::InvalidPlan(format!(
                "dependency cycle among {}",
                stuck.join(", ")
            )));
        }

        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn spec(&self, idx: usize) -> &ResourceSpec {
        &self.specs[idx]
    }

    pub fn specs(&self) -> &[ResourceSpec] {
        &self.specs
    }

    pub fn dependencies(&self, idx: usize) -> &[usize] {
        &self.dependencies[idx]
    }

    /// Kahn's algorithm; ties broken by manifest order. Nodes on a cycle
    /// are left out.
    pub fn topological_order(&self) -> Vec<usize> {
        let mut remaining: Vec<usize> = self.dependencies.iter().map(Vec::len).collect();
        let mut done = vec![false; self.len()];
        let mut order = Vec::with_capacity(self.len());

        loop {
            let Some(next) = (0..self.len()).find(|&i| !done[i] && remaining[i] == 0) else {
                break;
            };
            done[next] = true;
            order.push(next);
            for (i, deps) in self.dependencies.iter().enumerate() {
                if deps.contains(&next) {
                    remaining[i] -= 1;
                }
            }
        }

        order
    }
}
