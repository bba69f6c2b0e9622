//! Versioned resource observations in the dependency graph.

use crate::error::FrameGraphError;
use crate::graph::{DependencyGraph, EdgeId, NodeId};
use crate::handle::FrameGraphHandle;
use crate::resource::VirtualResource;

/// One graph node per (resource slot, version).
///
/// A node records the single writer edge that produced its version (none
/// for the initial state) and the reader edges consuming it. Writing to an
/// already-written resource allocates a fresh node rather than a second
/// writer edge; see the write-aliasing discipline on
/// [`Builder::write`](crate::Builder::write).
#[derive(Debug)]
pub(crate) struct ResourceNode {
    handle: FrameGraphHandle,
    node_id: NodeId,
    writer: Option<EdgeId>,
    readers: Vec<EdgeId>,
    /// Containing resource's node, for sub-resources.
    parent: Option<u32>,
}

impl ResourceNode {
    pub(crate) fn new(handle: FrameGraphHandle, node_id: NodeId) -> Self {
        Self {
            handle,
            node_id,
            writer: None,
            readers: Vec::new(),
            parent: None,
        }
    }

    pub(crate) fn handle(&self) -> FrameGraphHandle {
        self.handle
    }

    pub(crate) fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Record the single incoming writer edge.
    ///
    /// A second writer for the same version is a builder bug (a write
    /// without versioning) and is rejected.
    pub(crate) fn set_writer(&mut self, edge: EdgeId, name: &str) -> Result<(), FrameGraphError> {
        if self.writer.is_some() {
            return Err(FrameGraphError::DoubleWriter(format!(
                "resource \"{}\" version {} already has a writer",
                name, self.handle.version
            )));
        }
        self.writer = Some(edge);
        Ok(())
    }

    pub(crate) fn add_reader(&mut self, edge: EdgeId) {
        self.readers.push(edge);
    }

    pub(crate) fn has_writer(&self) -> bool {
        self.writer.is_some()
    }

    pub(crate) fn writer(&self) -> Option<EdgeId> {
        self.writer
    }

    /// Link this node to the node of its containing resource.
    pub(crate) fn set_parent(&mut self, parent_nid: u32) {
        self.parent = Some(parent_nid);
    }

    pub(crate) fn parent(&self) -> Option<u32> {
        self.parent
    }

    /// Check if any reader edge survived culling.
    pub(crate) fn has_valid_readers(&self, graph: &DependencyGraph) -> bool {
        self.readers.iter().any(|&edge| graph.is_edge_valid(edge))
    }

    /// Delegate usage aggregation to the backing resource with this node's
    /// cached edge set.
    pub(crate) fn resolve_resource_usage(
        &self,
        graph: &DependencyGraph,
        resource: &mut dyn VirtualResource,
    ) {
        resource.resolve_usage(graph, &self.readers, self.writer);
    }
}
