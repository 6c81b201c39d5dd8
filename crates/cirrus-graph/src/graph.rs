//! Stack graph and dependency resolution using `petgraph`.
//!
//! Edges are derived from the references held in node attributes. The
//! resolver orders nodes so that every node follows the nodes it
//! references; nodes without a constraint between them keep their
//! declaration order so synthesis output is reproducible.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

use cirrus_common::error::{CirrusError, Result};
use cirrus_common::types::ResourceId;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::Serialize;

use crate::node::{OutputValue, ResourceNode};
use crate::value::{Reference, Value};

/// Dependency edge: attribute `attribute` of `from` equals output
/// `output_attribute` of `to`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Edge {
    /// Referring node.
    pub from: ResourceId,
    /// Dotted attribute path on the referring node.
    pub attribute: String,
    /// Referenced node.
    pub to: ResourceId,
    /// Output of the referenced node.
    pub output_attribute: String,
}

/// All resource nodes declared for one named stack.
#[derive(Debug, Clone)]
pub struct StackGraph {
    name: String,
    nodes: Vec<ResourceNode>,
    index: HashMap<ResourceId, usize>,
    grants: BTreeMap<ResourceId, BTreeSet<ResourceId>>,
}

impl StackGraph {
    /// Creates an empty graph for stack `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            index: HashMap::new(),
            grants: BTreeMap::new(),
        }
    }

    /// Returns the stack name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers a node, returning a reference to the stored node.
    ///
    /// # Errors
    ///
    /// Returns `CirrusError::Validation` if the id is already taken.
    pub fn add(&mut self, node: ResourceNode) -> Result<&ResourceNode> {
        if self.index.contains_key(node.id()) {
            return Err(CirrusError::validation(
                node.id().as_str(),
                "id",
                format!("duplicate resource id in stack \"{}\"", self.name),
            ));
        }
        let position = self.nodes.len();
        let _ = self.index.insert(node.id().clone(), position);
        self.nodes.push(node);
        Ok(&self.nodes[position])
    }

    /// Allows `consumer` to reference the sensitive outputs of `secret`.
    pub fn grant(&mut self, secret: &ResourceId, consumer: &ResourceId) {
        let _ = self
            .grants
            .entry(secret.clone())
            .or_default()
            .insert(consumer.clone());
    }

    /// Returns whether `consumer` may read the sensitive outputs of `secret`.
    #[must_use]
    pub fn is_granted(&self, secret: &ResourceId, consumer: &ResourceId) -> bool {
        self.grants
            .get(secret)
            .is_some_and(|consumers| consumers.contains(consumer))
    }

    /// Looks up a node by id.
    #[must_use]
    pub fn node(&self, id: &ResourceId) -> Option<&ResourceNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Looks up a node by its string id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ResourceNode> {
        self.nodes.iter().find(|n| n.id().as_str() == id)
    }

    /// Returns all nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    /// Returns the number of declared nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns `true` if no node is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every dependency edge, grouped by referring node in declaration order.
    #[must_use]
    pub fn edges(&self) -> Vec<Edge> {
        self.nodes
            .iter()
            .flat_map(|node| {
                node.references()
                    .into_iter()
                    .map(|(attribute, reference)| Edge {
                        from: node.id().clone(),
                        attribute,
                        to: reference.target.clone(),
                        output_attribute: reference.output.clone(),
                    })
            })
            .collect()
    }

    /// Ids of the nodes `id` references directly, in declaration order.
    #[must_use]
    pub fn dependencies_of(&self, id: &ResourceId) -> Vec<ResourceId> {
        let Some(node) = self.node(id) else {
            return Vec::new();
        };
        let targets: BTreeSet<usize> = node
            .references()
            .into_iter()
            .filter_map(|(_, r)| self.index.get(&r.target).copied())
            .collect();
        targets
            .into_iter()
            .map(|i| self.nodes[i].id().clone())
            .collect()
    }

    /// Returns a topological ordering of the nodes.
    ///
    /// The graph is validated first. Ties are broken by declaration order.
    ///
    /// # Errors
    ///
    /// Returns `CirrusError::Validation` for dangling or malformed
    /// references and `CirrusError::Cycle` naming the nodes of every cycle.
    pub fn resolve_order(&self) -> Result<Vec<ResourceId>> {
        crate::validator::validate(self)?;
        let graph = self.dependency_graph();

        let mut in_degree: Vec<usize> = graph
            .node_indices()
            .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
            .collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|&(_, &d)| d == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(i)) = ready.pop() {
            order.push(self.nodes[i].id().clone());
            for next in graph.neighbors_directed(NodeIndex::new(i), Direction::Outgoing) {
                let j = next.index();
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }

        if order.len() < self.nodes.len() {
            let nodes = self.cycle_members(&graph);
            tracing::warn!(stack = %self.name, cycle = ?nodes, "dependency cycle detected");
            return Err(CirrusError::Cycle { nodes });
        }
        Ok(order)
    }

    /// Orders the graph and populates every node's outputs.
    ///
    /// Outputs mirrored from fully resolvable attributes become
    /// [`OutputValue::Known`]; everything else stays deferred until the
    /// provisioning engine applies the node.
    ///
    /// # Errors
    ///
    /// Same as [`StackGraph::resolve_order`].
    pub fn resolve(&mut self) -> Result<Vec<ResourceId>> {
        let order = self.resolve_order()?;
        for id in &order {
            let i = self.index[id];
            let outputs = self.compute_outputs(&self.nodes[i]);
            self.nodes[i].set_outputs(outputs);
        }
        tracing::info!(stack = %self.name, nodes = order.len(), "graph resolved");
        Ok(order)
    }

    /// Whether `reference` points at a sensitive output.
    #[must_use]
    pub fn is_sensitive(&self, reference: &Reference) -> bool {
        self.node(&reference.target)
            .and_then(|n| n.kind().output(&reference.output))
            .is_some_and(|spec| spec.sensitive)
    }

    /// Dotted attribute paths of `node` that carry a sensitive reference,
    /// such as `environment.variables.DB_PASSWORD`.
    #[must_use]
    pub fn sensitive_attributes(&self, node: &ResourceNode) -> Vec<String> {
        let paths: BTreeSet<String> = node
            .references()
            .into_iter()
            .filter(|(_, r)| self.is_sensitive(r))
            .map(|(path, _)| path)
            .collect();
        paths.into_iter().collect()
    }

    fn compute_outputs(&self, node: &ResourceNode) -> BTreeMap<String, OutputValue> {
        let lookup = |reference: &Reference| -> Option<Value> {
            match self.node(&reference.target)?.outputs().get(&reference.output)? {
                OutputValue::Known(value) => Some(value.clone()),
                OutputValue::Deferred { .. } => None,
            }
        };

        node.kind()
            .outputs()
            .iter()
            .map(|spec| {
                let known = if spec.sensitive {
                    None
                } else {
                    spec.mirrors
                        .and_then(|attr| node.attribute(attr))
                        .and_then(|value| value.resolve(&lookup))
                };
                let value = known.map_or(
                    OutputValue::Deferred {
                        sensitive: spec.sensitive,
                    },
                    OutputValue::Known,
                );
                (spec.name.to_owned(), value)
            })
            .collect()
    }

    /// Builds the petgraph view: node `i` is the `i`-th declared node and
    /// edges run from a dependency to its dependent.
    fn dependency_graph(&self) -> DiGraph<(), ()> {
        let mut graph = DiGraph::with_capacity(self.nodes.len(), 0);
        for _ in &self.nodes {
            let _ = graph.add_node(());
        }
        for (from, node) in self.nodes.iter().enumerate() {
            for (_, reference) in node.references() {
                if let Some(&to) = self.index.get(&reference.target) {
                    let _ = graph.update_edge(NodeIndex::new(to), NodeIndex::new(from), ());
                }
            }
        }
        graph
    }

    fn cycle_members(&self, graph: &DiGraph<(), ()>) -> Vec<String> {
        let mut members: Vec<usize> = petgraph::algo::tarjan_scc(graph)
            .into_iter()
            .filter(|scc| scc.len() > 1 || graph.contains_edge(scc[0], scc[0]))
            .flatten()
            .map(NodeIndex::index)
            .collect();
        members.sort_unstable();
        members
            .into_iter()
            .map(|i| self.nodes[i].id().to_string())
            .collect()
    }
}
