//! Directed dependency graph with reference-count culling.
//!
//! The graph stores plain connectivity: nodes are registered by the frame
//! graph for every pass and every versioned resource observation, and
//! edges record `from -> to` dependencies. Culling removes every node from
//! which no target (sink) node is reachable, by sweeping reference counts
//! backward from the sinks.

use std::fmt;

use crate::error::FrameGraphError;

/// Handle to a node in the dependency graph.
///
/// `NodeId` is `Copy` and cheap to pass around. It is only valid within
/// the graph that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

impl NodeId {
    fn new(index: usize) -> Self {
        Self(index as u32)
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to an edge in the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(u32);

impl EdgeId {
    fn new(index: usize) -> Self {
        Self(index as u32)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// A directed edge between two nodes.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Edge {
    pub(crate) from: NodeId,
    pub(crate) to: NodeId,
}

#[derive(Debug)]
struct NodeRecord {
    /// Diagnostic label, shown in the graphviz dump.
    label: String,
    /// Number of non-culled consumers, computed during cull.
    refcount: u32,
    /// Target nodes are never culled and anchor the live subgraph.
    target: bool,
    culled: bool,
}

/// The dependency graph of one frame.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<NodeRecord>,
    /// Edge list; per-node edge sets are recovered by filtering.
    edges: Vec<Edge>,
    /// Set once [`cull`](Self::cull) has run.
    culled: bool,
}

impl DependencyGraph {
    /// Create a new empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node with a diagnostic label.
    pub fn register_node(&mut self, label: impl Into<String>) -> NodeId {
        let id = NodeId::new(self.nodes.len());
        self.nodes.push(NodeRecord {
            label: label.into(),
            refcount: 0,
            target: false,
            culled: false,
        });
        id
    }

    /// Mark a node as a culling root; it will never be removed.
    pub fn make_target(&mut self, node: NodeId) {
        self.nodes[node.index()].target = true;
    }

    /// Check if a node is marked as a culling root.
    pub fn is_target(&self, node: NodeId) -> bool {
        self.nodes[node.index()].target
    }

    /// Insert a directed edge `from -> to`.
    ///
    /// Fails with [`FrameGraphError::GraphAlreadyCulled`] if called after
    /// [`cull`](Self::cull); the graph cannot grow once reference counts
    /// are resolved.
    pub fn link(&mut self, from: NodeId, to: NodeId) -> Result<EdgeId, FrameGraphError> {
        if self.culled {
            return Err(FrameGraphError::GraphAlreadyCulled);
        }
        let id = EdgeId::new(self.edges.len());
        self.edges.push(Edge { from, to });
        Ok(id)
    }

    pub(crate) fn edge(&self, edge: EdgeId) -> Edge {
        self.edges[edge.index()]
    }

    /// Iterate the edges arriving at `node`.
    pub fn incoming_edges(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(move |(_, edge)| edge.to == node)
            .map(|(index, _)| EdgeId::new(index))
    }

    /// Iterate the edges leaving `node`.
    pub fn outgoing_edges(&self, node: NodeId) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter(move |(_, edge)| edge.from == node)
            .map(|(index, _)| EdgeId::new(index))
    }

    /// Remove every node from which no target node is reachable.
    ///
    /// Each node's reference count is the number of its outgoing edges.
    /// Nodes with a zero count and no target bias seed a sweep that
    /// decrements their predecessors, removing whole dead chains in one
    /// fixed-point pass. Execution order is unaffected; culling only marks
    /// nodes.
    pub fn cull(&mut self) {
        for edge in &self.edges {
            self.nodes[edge.from.index()].refcount += 1;
        }

        let mut stack: Vec<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.refcount == 0 && !node.target)
            .map(|(index, _)| NodeId::new(index))
            .collect();

        while let Some(node) = stack.pop() {
            self.nodes[node.index()].culled = true;
            for index in 0..self.edges.len() {
                let edge = self.edges[index];
                if edge.to != node {
                    continue;
                }
                let from = &mut self.nodes[edge.from.index()];
                from.refcount -= 1;
                if from.refcount == 0 && !from.target && !from.culled {
                    stack.push(edge.from);
                }
            }
        }

        self.culled = true;
    }

    /// Check if a node was removed by culling.
    pub fn is_culled(&self, node: NodeId) -> bool {
        self.nodes[node.index()].culled
    }

    /// Check if both endpoints of an edge survived culling.
    pub fn is_edge_valid(&self, edge: EdgeId) -> bool {
        let edge = self.edges[edge.index()];
        !self.is_culled(edge.from) && !self.is_culled(edge.to)
    }

    /// Number of registered nodes.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of registered edges.
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Write a graphviz digraph of the current graph state to `out`.
    ///
    /// The format is diagnostic only: live nodes are filled, targets
    /// highlighted, culled nodes grayed out, and invalid edges dashed.
    pub fn export_graphviz(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        writeln!(out, "digraph \"framegraph\" {{")?;
        writeln!(out, "  rankdir = LR")?;
        writeln!(out, "  node [fontname=\"helvetica\", fontsize=10]")?;
        for (index, node) in self.nodes.iter().enumerate() {
            let fillcolor = if node.culled {
                "gray"
            } else if node.target {
                "gold"
            } else {
                "skyblue"
            };
            writeln!(
                out,
                "  \"N{}\" [label=\"{}\\nrefs: {}\", style=filled, fillcolor={}]",
                index, node.label, node.refcount, fillcolor
            )?;
        }
        for (index, edge) in self.edges.iter().enumerate() {
            let style = if self.is_edge_valid(EdgeId::new(index)) {
                "solid"
            } else {
                "dashed"
            };
            writeln!(
                out,
                "  \"N{}\" -> \"N{}\" [style={}]",
                edge.from.index(),
                edge.to.index(),
                style
            )?;
        }
        writeln!(out, "}}")
    }

    /// Remove all nodes and edges and clear the culled state.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.culled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(graph: &mut DependencyGraph, from: NodeId, to: NodeId) -> EdgeId {
        graph.link(from, to).unwrap()
    }

    #[test]
    fn test_cull_dead_chain() {
        // a -> b -> c, nothing marked target: everything dies.
        let mut graph = DependencyGraph::new();
        let a = graph.register_node("a");
        let b = graph.register_node("b");
        let c = graph.register_node("c");
        link(&mut graph, a, b);
        link(&mut graph, b, c);

        graph.cull();

        assert!(graph.is_culled(a));
        assert!(graph.is_culled(b));
        assert!(graph.is_culled(c));
    }

    #[test]
    fn test_target_anchors_chain() {
        let mut graph = DependencyGraph::new();
        let a = graph.register_node("a");
        let b = graph.register_node("b");
        let c = graph.register_node("c");
        link(&mut graph, a, b);
        link(&mut graph, b, c);
        graph.make_target(c);

        graph.cull();

        assert!(!graph.is_culled(a));
        assert!(!graph.is_culled(b));
        assert!(!graph.is_culled(c));
    }

    #[test]
    fn test_cull_dead_branch() {
        // a feeds both the live sink and a dead branch; only the branch dies.
        let mut graph = DependencyGraph::new();
        let a = graph.register_node("a");
        let sink = graph.register_node("sink");
        let dead = graph.register_node("dead");
        let dead_tail = graph.register_node("dead_tail");
        link(&mut graph, a, sink);
        link(&mut graph, a, dead);
        link(&mut graph, dead, dead_tail);
        graph.make_target(sink);

        graph.cull();

        assert!(!graph.is_culled(a));
        assert!(!graph.is_culled(sink));
        assert!(graph.is_culled(dead));
        assert!(graph.is_culled(dead_tail));
    }

    #[test]
    fn test_edge_validity_follows_culling() {
        let mut graph = DependencyGraph::new();
        let a = graph.register_node("a");
        let live = graph.register_node("live");
        let dead = graph.register_node("dead");
        let to_live = link(&mut graph, a, live);
        let to_dead = link(&mut graph, a, dead);
        graph.make_target(live);

        graph.cull();

        assert!(graph.is_edge_valid(to_live));
        assert!(!graph.is_edge_valid(to_dead));
    }

    #[test]
    fn test_link_after_cull_rejected() {
        let mut graph = DependencyGraph::new();
        let a = graph.register_node("a");
        let b = graph.register_node("b");
        graph.cull();

        assert_eq!(graph.link(a, b), Err(FrameGraphError::GraphAlreadyCulled));
    }

    #[test]
    fn test_clear_resets_culled_state() {
        let mut graph = DependencyGraph::new();
        let a = graph.register_node("a");
        let b = graph.register_node("b");
        graph.cull();
        graph.clear();

        let a2 = graph.register_node("a");
        let b2 = graph.register_node("b");
        assert!(graph.link(a2, b2).is_ok());
        assert_eq!(graph.node_count(), 2);
        let _ = (a, b);
    }

    #[test]
    fn test_export_graphviz_shape() {
        let mut graph = DependencyGraph::new();
        let a = graph.register_node("pass_a");
        let b = graph.register_node("color v0");
        link(&mut graph, a, b);
        graph.make_target(b);
        graph.cull();

        let mut dump = String::new();
        graph.export_graphviz(&mut dump).unwrap();
        assert!(dump.starts_with("digraph"));
        assert!(dump.contains("pass_a"));
        assert!(dump.contains("color v0"));
        assert!(dump.contains("\"N0\" -> \"N1\""));
    }
}
