//! Read-only adjacency view over a [`Workflow`]'s nodes and edges.
//!
//! Node storage order is not execution order; the view indexes nodes by id
//! and keeps each node's outgoing edges in their stored order.

use std::collections::HashMap;

use super::Workflow;
use super::edge::{Branch, WorkflowEdge};
use super::node::{NodeId, NodeKind, WorkflowNode};
use super::trigger::TriggerData;
use crate::error::GraphError;

/// Indexed view of a workflow graph.
#[derive(Debug)]
pub struct WorkflowGraph<'a> {
    nodes: HashMap<&'a NodeId, &'a WorkflowNode>,
    outgoing: HashMap<&'a NodeId, Vec<&'a WorkflowEdge>>,
}

impl<'a> WorkflowGraph<'a> {
    /// Index a workflow, rejecting structurally broken edges.
    ///
    /// # Errors
    ///
    /// - [`GraphError::DanglingEdge`] when an edge endpoint is not a node
    /// - [`GraphError::UnreachableBranch`] when a branch-tagged edge leaves a
    ///   node that is not a condition
    pub fn new(workflow: &'a Workflow) -> Result<Self, GraphError> {
        let nodes: HashMap<_, _> = workflow.nodes.iter().map(|n| (&n.id, n)).collect();
        let mut outgoing: HashMap<&NodeId, Vec<&WorkflowEdge>> = HashMap::new();

        for edge in &workflow.edges {
            let Some(source) = nodes.get(&edge.source) else {
                return Err(GraphError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: edge.source.to_string(),
                });
            };
            if !nodes.contains_key(&edge.target) {
                return Err(GraphError::DanglingEdge {
                    edge_id: edge.id.clone(),
                    node_id: edge.target.to_string(),
                });
            }
            if edge.branch.is_some() && source.kind() != NodeKind::Condition {
                return Err(GraphError::UnreachableBranch {
                    edge_id: edge.id.clone(),
                });
            }
            outgoing.entry(&edge.source).or_default().push(edge);
        }

        Ok(Self { nodes, outgoing })
    }

    #[must_use]
    pub fn node(&self, id: &NodeId) -> Option<&'a WorkflowNode> {
        self.nodes.get(id).copied()
    }

    /// All outgoing edges of a node, in stored order.
    #[must_use]
    pub fn outgoing(&self, id: &NodeId) -> &[&'a WorkflowEdge] {
        self.outgoing.get(id).map_or(&[], Vec::as_slice)
    }

    /// Edges tagged with `branch` leaving a condition node.
    ///
    /// Untagged edges out of a condition are never taken.
    #[must_use]
    pub fn branch_edges(&self, id: &NodeId, branch: Branch) -> Vec<&'a WorkflowEdge> {
        self.outgoing(id)
            .iter()
            .copied()
            .filter(|edge| edge.branch == Some(branch))
            .collect()
    }

    /// Resolve the trigger node an execution starts from.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownTrigger`] when `id` is absent or is not
    /// a trigger node.
    pub fn trigger(&self, id: &NodeId) -> Result<(&'a WorkflowNode, &'a TriggerData), GraphError> {
        self.node(id)
            .and_then(|node| node.as_trigger().map(|data| (node, data)))
            .ok_or_else(|| GraphError::UnknownTrigger {
                node_id: id.to_string(),
            })
    }

    /// Reject any cycle reachable from `start`, following every edge.
    ///
    /// Diamond joins (a node reachable along two paths) are accepted.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CycleDetected`] naming the first node found
    /// on the cycle.
    pub fn check_acyclic_from(&self, start: &NodeId) -> Result<(), GraphError> {
        #[derive(Clone, Copy, PartialEq, Eq)]
        enum Mark {
            OnStack,
            Done,
        }

        let mut marks: HashMap<&NodeId, Mark> = HashMap::new();
        // (node, index of the next outgoing edge to explore)
        let mut stack: Vec<(&NodeId, usize)> = Vec::new();

        let Some(start) = self.nodes.get_key_value(start).map(|(k, _)| *k) else {
            return Ok(());
        };
        marks.insert(start, Mark::OnStack);
        stack.push((start, 0));

        while let Some(top) = stack.len().checked_sub(1) {
            let (node, next) = stack[top];
            let Some(edge) = self.outgoing(node).get(next) else {
                marks.insert(node, Mark::Done);
                stack.pop();
                continue;
            };
            stack[top].1 += 1;
            let target: &NodeId = &edge.target;
            match marks.get(target) {
                Some(Mark::OnStack) => {
                    return Err(GraphError::CycleDetected {
                        node_id: target.to_string(),
                    });
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(target, Mark::OnStack);
                    stack.push((target, 0));
                }
            }
        }

        Ok(())
    }
}
