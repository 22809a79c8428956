//! Stack dependency graph
//!
//! An edge `a -> b` means that a parameter of `b` references an output of `a`, so `a` has to be
//! processed first. References to stacks that are not part of the configuration are assumed to be
//! satisfied already and do not create edges.
use crate::config::StackConfig;
use crate::error::{Error, Result};
use indexmap::IndexMap;
use std::collections::{BTreeMap, BTreeSet, HashMap};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// All managed stacks
    nodes: BTreeSet<String>,
    /// Adjacency list: stack -> stacks depending on it
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    pub fn from_stacks(stacks: &IndexMap<String, StackConfig>) -> Result<Self> {
        let mut graph = Self {
            nodes: stacks.keys().cloned().collect(),
            edges: BTreeMap::new(),
        };

        for (name, stack) in stacks {
            for reference in stack.stack_references()? {
                if !graph.nodes.contains(&reference.stack) {
                    tracing::debug!(
                        stack = %name,
                        referent = %reference.stack,
                        "reference to unmanaged stack"
                    );
                    continue;
                }

                graph.add_edge(&reference.stack, name);
            }
        }

        Ok(graph)
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        self.edges
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
    }

    /// Stacks `name` depends on
    pub fn dependencies(&self, name: &str) -> Vec<&str> {
        self.edges
            .iter()
            .filter(|(_, dependents)| dependents.contains(name))
            .map(|(from, _)| from.as_str())
            .collect()
    }

    fn in_degrees(&self) -> HashMap<&str, usize> {
        let mut in_degree: HashMap<&str, usize> =
            self.nodes.iter().map(|node| (node.as_str(), 0)).collect();

        for dependents in self.edges.values() {
            for dependent in dependents {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree += 1;
                }
            }
        }

        in_degree
    }

    /// Processing order; among stacks that are ready at the same time the name decides
    pub fn order(&self) -> Result<Vec<String>> {
        // Kahn's algorithm with a sorted ready set
        let mut in_degree = self.in_degrees();
        let mut ready: BTreeSet<&str> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        let mut result = Vec::with_capacity(self.nodes.len());

        while let Some(node) = ready.pop_first() {
            result.push(node.to_string());

            for dependent in self.edges.get(node).into_iter().flatten() {
                if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent.as_str());
                    }
                }
            }
        }

        if result.len() != self.nodes.len() {
            return Err(self.unresolvable());
        }

        tracing::debug!(?result, "stack order");
        Ok(result)
    }

    /// Groups of stacks that can be processed concurrently, in processing order
    pub fn waves(&self) -> Result<Vec<Vec<String>>> {
        let mut in_degree = self.in_degrees();
        let mut current: Vec<&str> = self
            .nodes
            .iter()
            .map(String::as_str)
            .filter(|node| in_degree[node] == 0)
            .collect();
        let mut waves = vec![];
        let mut processed = 0;

        while !current.is_empty() {
            let mut next = BTreeSet::new();
            for node in &current {
                for dependent in self.edges.get(*node).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.insert(dependent.as_str());
                        }
                    }
                }
            }

            processed += current.len();
            waves.push(current.iter().map(|node| node.to_string()).collect());
            current = next.into_iter().collect();
        }

        if processed != self.nodes.len() {
            return Err(self.unresolvable());
        }

        tracing::debug!(?waves, "stack waves");
        Ok(waves)
    }

    fn unresolvable(&self) -> Error {
        match self.find_cycle() {
            Some(cycle) => Error::CyclicDependency {
                description: cycle.join(" -> "),
            },
            None => Error::InvalidDependencyGraph(
                "no topological order exists but no cycle was found".to_string(),
            ),
        }
    }

    /// One cycle as a closed path (`a -> b -> a`), found with a three-color depth first search
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Color {
            White,
            Gray,
            Black,
        }

        fn visit<'a>(
            graph: &'a DependencyGraph,
            node: &'a str,
            colors: &mut HashMap<&'a str, Color>,
            path: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            colors.insert(node, Color::Gray);
            path.push(node);

            for next in graph.edges.get(node).into_iter().flatten() {
                match colors.get(next.as_str()).copied().unwrap_or(Color::White) {
                    Color::Gray => {
                        let start = path.iter().position(|n| *n == next.as_str())?;
                        let mut cycle: Vec<String> =
                            path[start..].iter().map(|n| n.to_string()).collect();
                        cycle.push(next.clone());
                        return Some(cycle);
                    }
                    Color::White => {
                        if let Some(cycle) = visit(graph, next, colors, path) {
                            return Some(cycle);
                        }
                    }
                    Color::Black => {}
                }
            }

            path.pop();
            colors.insert(node, Color::Black);
            None
        }

        let mut colors: HashMap<&str, Color> = HashMap::new();
        for node in &self.nodes {
            if colors.get(node.as_str()).copied().unwrap_or(Color::White) != Color::White {
                continue;
            }

            let mut path = vec![];
            if let Some(cycle) = visit(self, node, &mut colors, &mut path) {
                return Some(cycle);
            }
        }

        None
    }
}
