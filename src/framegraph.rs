//! The frame graph: declaration, compilation, and execution of one frame.

use std::fmt;

use crate::backend::{DriverApi, RenderTargetHandle, ResourceAllocator, TextureHandle};
use crate::builder::Builder;
use crate::error::FrameGraphError;
use crate::graph::{DependencyGraph, NodeId};
use crate::handle::{FrameGraphHandle, FrameGraphId};
use crate::pass::{PassNode, RenderPassNode};
use crate::resource::{
    downcast_resource, downcast_resource_mut, FrameGraphResourceType, ImportedRenderTarget,
    ImportedRenderTargetDescriptor, Resource, VirtualResource,
};
use crate::resource_node::ResourceNode;
use crate::resources::FrameGraphResources;
use crate::texture::{Texture, TextureDescriptor, TextureSubResourceDescriptor, TextureUsage};

/// Maps a handle's slot index to the current resource record and resource
/// node. A write rebinds `nid` to the freshly-versioned node; `rid` never
/// changes for the frame.
#[derive(Debug, Clone, Copy)]
struct ResourceSlot {
    rid: u32,
    nid: u32,
}

/// What a dependency-graph node stands for.
#[derive(Debug, Clone, Copy)]
enum NodeOwner {
    Pass(u32),
    Resource(u32),
}

/// A declarative, single-frame rendering scheduler.
///
/// Each frame, passes and the virtual resources they read and write are
/// declared through [`add_pass`](Self::add_pass) and the per-pass
/// [`Builder`]. [`compile`](Self::compile) culls passes whose outputs are
/// never consumed and computes resource lifetimes;
/// [`execute`](Self::execute) runs the surviving passes in declaration
/// order, allocating each resource just before its first pass and
/// releasing it right after its last. `execute` ends by resetting the
/// graph: nothing persists across frames unless imported.
#[derive(Default)]
pub struct FrameGraph {
    graph: DependencyGraph,
    slots: Vec<ResourceSlot>,
    resources: Vec<Box<dyn VirtualResource>>,
    resource_nodes: Vec<ResourceNode>,
    pass_nodes: Vec<PassNode>,
    /// Owner of each dependency-graph node, parallel to registration order.
    node_owners: Vec<NodeOwner>,
    compiled: bool,
}

impl FrameGraph {
    /// Create an empty frame graph.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Setup
    // ========================================================================

    /// Declare a pass.
    ///
    /// `setup` runs synchronously against a [`Builder`], declaring the
    /// resources the pass reads and writes; whatever it returns (typically
    /// a struct of handles) is passed to `execute` when the pass runs, and
    /// returned to the caller. `execute` runs once during
    /// [`execute`](Self::execute) if the pass survives culling.
    pub fn add_pass<Data, Setup, Execute>(
        &mut self,
        name: &str,
        setup: Setup,
        execute: Execute,
    ) -> Data
    where
        Data: Clone + 'static,
        Setup: FnOnce(&mut Builder<'_>) -> Data,
        Execute: FnOnce(&Data, &FrameGraphResources<'_>, &mut dyn DriverApi) + 'static,
    {
        let pass_index = self.pass_nodes.len() as u32;
        let node_id = self.register_graph_node(name, NodeOwner::Pass(pass_index));
        self.pass_nodes
            .push(PassNode::Render(RenderPassNode::new(name, node_id)));

        let mut builder = Builder::new(self, pass_index);
        let data = setup(&mut builder);

        let captured = data.clone();
        self.pass_nodes[pass_index as usize]
            .as_render_mut()
            .expect("pass node just created")
            .set_executor(Box::new(move |resources, driver| {
                execute(&captured, resources, driver)
            }));
        data
    }

    /// Declare a present pass: a sink with no executor, never culled.
    pub fn add_present_pass<Setup>(&mut self, setup: Setup)
    where
        Setup: FnOnce(&mut Builder<'_>),
    {
        let pass_index = self.pass_nodes.len() as u32;
        let node_id = self.register_graph_node("present", NodeOwner::Pass(pass_index));
        self.pass_nodes.push(PassNode::present(node_id));

        let mut builder = Builder::new(self, pass_index);
        setup(&mut builder);
        self.graph.make_target(node_id);
    }

    /// Create a virtual resource of kind `R`.
    pub fn create<R: FrameGraphResourceType>(
        &mut self,
        name: &str,
        descriptor: R::Descriptor,
    ) -> FrameGraphId<R> {
        let handle = self.add_resource(Box::new(Resource::<R>::new(name, descriptor)), name);
        FrameGraphId::new(handle)
    }

    /// Create a sub-resource aliasing part of `parent`.
    ///
    /// The sub-resource shares the parent's concrete backing; its usage is
    /// folded into the parent's during compile.
    pub fn create_subresource<R: FrameGraphResourceType>(
        &mut self,
        parent: FrameGraphId<R>,
        name: &str,
        sub_descriptor: R::SubResourceDescriptor,
    ) -> FrameGraphId<R> {
        if !self.assert_valid(parent.handle()) {
            return FrameGraphId::uninitialized();
        }
        let parent_slot = self.slots[parent.handle().index as usize];
        let descriptor = downcast_resource::<R>(self.resources[parent_slot.rid as usize].as_ref())
            .map(|resource| resource.descriptor.clone())
            .unwrap_or_default();

        let resource = Box::new(Resource::<R>::new_sub(
            parent_slot.rid,
            name,
            descriptor,
            sub_descriptor,
        ));
        let handle = self.add_resource(resource, name);
        let nid = self.slots[handle.index as usize].nid;
        self.resource_nodes[nid as usize].set_parent(parent_slot.nid);
        FrameGraphId::new(handle)
    }

    /// Import an externally-owned texture.
    ///
    /// The graph never creates or destroys it, and any declared usage must
    /// be a subset of `usage`.
    pub fn import_texture(
        &mut self,
        name: &str,
        descriptor: TextureDescriptor,
        usage: TextureUsage,
        backing: TextureHandle,
    ) -> FrameGraphId<Texture> {
        let resource = Box::new(Resource::<Texture>::imported(
            name,
            descriptor,
            usage,
            Texture {
                handle: Some(backing),
            },
        ));
        FrameGraphId::new(self.add_resource(resource, name))
    }

    /// Import an externally-owned render target.
    ///
    /// Passes that declare the returned texture as a render target reuse
    /// the imported backend target instead of allocating one.
    pub fn import_render_target(
        &mut self,
        name: &str,
        descriptor: ImportedRenderTargetDescriptor,
        target: RenderTargetHandle,
    ) -> FrameGraphId<Texture> {
        let resource = Box::new(ImportedRenderTarget::new(name, descriptor, target));
        FrameGraphId::new(self.add_resource(resource, name))
    }

    /// Check that a handle is initialized and observes its resource's
    /// current version.
    pub fn is_valid(&self, handle: FrameGraphHandle) -> bool {
        if !handle.is_initialized() {
            return false;
        }
        let Some(slot) = self.slots.get(handle.index as usize) else {
            return false;
        };
        handle.version == self.resources[slot.rid as usize].version()
    }

    // ========================================================================
    // Compile
    // ========================================================================

    /// Cull dead passes and resolve resource lifetimes and usage.
    ///
    /// After this, every live resource knows the first and last pass that
    /// touches it and the union of usage bits across its live edges.
    pub fn compile(&mut self) -> &mut Self {
        self.graph.cull();

        let FrameGraph {
            graph,
            slots,
            resources,
            resource_nodes,
            pass_nodes,
            node_owners,
            ..
        } = self;

        // Lifetimes: every live pass widens the window of each resource an
        // incident edge touches. Outgoing edges count even when the written
        // node was culled: the pass still performs the write. Sub-resources
        // pull their whole parent chain along so the shared backing exists
        // before any of them needs it.
        for (index, pass) in pass_nodes.iter_mut().enumerate() {
            if graph.is_culled(pass.node_id()) {
                continue;
            }

            let mut touched: Vec<u32> = Vec::new();
            for edge in graph.incoming_edges(pass.node_id()) {
                debug_assert!(graph.is_edge_valid(edge), "incoming edge of a live pass");
                let from = graph.edge(edge).from;
                if let NodeOwner::Resource(nid) = node_owners[from.index()] {
                    let node = &resource_nodes[nid as usize];
                    touched.push(slots[node.handle().index as usize].rid);
                }
            }
            for edge in graph.outgoing_edges(pass.node_id()) {
                let to = graph.edge(edge).to;
                if let NodeOwner::Resource(nid) = node_owners[to.index()] {
                    let node = &resource_nodes[nid as usize];
                    touched.push(slots[node.handle().index as usize].rid);
                }
            }

            for mut rid in touched {
                loop {
                    let resource = &mut resources[rid as usize];
                    resource.needed_by_pass(index as u32);
                    match resource.parent() {
                        Some(parent) => rid = parent,
                        None => break,
                    }
                }
            }

            pass.resolve(graph, resource_nodes);
        }

        // Usage, phase 1: every node folds its own edges into its resource.
        for node in resource_nodes.iter() {
            let rid = slots[node.handle().index as usize].rid;
            node.resolve_resource_usage(graph, resources[rid as usize].as_mut());
        }

        // Usage, phase 2: sub-resources lift their bits into their parents.
        // Parents precede children in storage, so one descending sweep
        // propagates transitively to the root.
        for rid in (0..resources.len()).rev() {
            if let Some(parent) = resources[rid].parent() {
                let (head, tail) = resources.split_at_mut(rid);
                head[parent as usize].merge_child_usage(tail[0].as_ref());
            }
        }

        self.compiled = true;

        if log::log_enabled!(log::Level::Trace) {
            for resource in &self.resources {
                if resource.first().is_some() {
                    log::trace!(
                        "resource \"{}\" alive over passes {:?}..{:?}, {} refs{}",
                        resource.name(),
                        resource.first(),
                        resource.last(),
                        resource.refcount(),
                        if resource.is_imported() { ", imported" } else { "" }
                    );
                }
            }
            let mut dump = String::new();
            if self.graph.export_graphviz(&mut dump).is_ok() {
                log::trace!("frame graph after compile:\n{dump}");
            }
        }

        self
    }

    // ========================================================================
    // Execute
    // ========================================================================

    /// Run every surviving pass in declaration order, then reset.
    ///
    /// For each live pass: resources whose first use is this pass are
    /// devirtualized, the executor runs against a [`FrameGraphResources`]
    /// view, and resources last used by this pass are destroyed. The whole
    /// frame and each pass are bracketed with driver group markers, and
    /// the GPU is kicked once at the end.
    pub fn execute(&mut self, driver: &mut dyn DriverApi, allocator: &mut dyn ResourceAllocator) {
        debug_assert!(self.compiled, "execute called before compile");

        driver.push_group_marker("FrameGraph");

        let mut pass_nodes = std::mem::take(&mut self.pass_nodes);
        for (index, pass) in pass_nodes.iter_mut().enumerate() {
            if self.graph.is_culled(pass.node_id()) {
                continue;
            }
            let index = index as u32;

            driver.push_group_marker(pass.name());
            log::trace!("executing pass \"{}\"", pass.name());

            // Storage order puts parents before sub-resources, so a
            // sub-resource always finds its parent's backing in place.
            for rid in 0..self.resources.len() {
                if self.resources[rid].first() != Some(index) {
                    continue;
                }
                match self.resources[rid].parent() {
                    None => self.resources[rid].devirtualize(allocator),
                    Some(parent) => {
                        let (head, tail) = self.resources.split_at_mut(rid);
                        tail[0].devirtualize_from(head[parent as usize].as_ref());
                    }
                }
            }

            pass.devirtualize_targets(&*self, allocator);

            if let Some(executor) = pass.take_executor() {
                let resources = FrameGraphResources::new(&*self, pass);
                executor(&resources, driver);
            }

            pass.destroy_targets(allocator);

            for resource in &mut self.resources {
                if resource.last() == Some(index) {
                    resource.destroy(allocator);
                }
            }

            driver.pop_group_marker();
        }
        self.pass_nodes = pass_nodes;

        driver.flush();
        driver.pop_group_marker();
        self.reset();
    }

    /// Write a graphviz digraph of the dependency graph to `out`.
    pub fn export_graphviz(&self, out: &mut dyn fmt::Write) -> fmt::Result {
        self.graph.export_graphviz(out)
    }

    /// Drop all frame state, in reverse creation order.
    fn reset(&mut self) {
        self.pass_nodes.clear();
        self.resource_nodes.clear();
        self.resources.clear();
        self.slots.clear();
        self.node_owners.clear();
        self.graph.clear();
        self.compiled = false;
    }

    // ========================================================================
    // Internals shared with Builder and the resources view
    // ========================================================================

    fn register_graph_node(&mut self, label: impl Into<String>, owner: NodeOwner) -> NodeId {
        let node_id = self.graph.register_node(label);
        debug_assert_eq!(node_id.index(), self.node_owners.len());
        self.node_owners.push(owner);
        node_id
    }

    fn add_resource(
        &mut self,
        resource: Box<dyn VirtualResource>,
        name: &str,
    ) -> FrameGraphHandle {
        let handle = FrameGraphHandle::new(self.slots.len() as u16);
        let rid = self.resources.len() as u32;
        let nid = self.resource_nodes.len() as u32;
        self.slots.push(ResourceSlot { rid, nid });
        self.resources.push(resource);

        let node_id = self.register_graph_node(format!("{name} v0"), NodeOwner::Resource(nid));
        self.resource_nodes.push(ResourceNode::new(handle, node_id));
        handle
    }

    /// Non-fatal handle validation: logs and reports instead of panicking.
    pub(crate) fn assert_valid(&self, handle: FrameGraphHandle) -> bool {
        if self.is_valid(handle) {
            return true;
        }
        log::error!(
            "{}",
            FrameGraphError::InvalidHandle {
                index: handle.index,
                version: handle.version,
            }
        );
        false
    }

    pub(crate) fn graph_mut(&mut self) -> &mut DependencyGraph {
        &mut self.graph
    }

    pub(crate) fn pass_node(&self, pass: u32) -> &PassNode {
        &self.pass_nodes[pass as usize]
    }

    pub(crate) fn pass_node_mut(&mut self, pass: u32) -> &mut PassNode {
        &mut self.pass_nodes[pass as usize]
    }

    /// Current resource node index of a slot.
    pub(crate) fn current_nid(&self, handle: FrameGraphHandle) -> u32 {
        self.slots[handle.index as usize].nid
    }

    pub(crate) fn resource_node(&self, nid: u32) -> &ResourceNode {
        &self.resource_nodes[nid as usize]
    }

    pub(crate) fn resource_by_handle(&self, handle: FrameGraphHandle) -> &dyn VirtualResource {
        assert!(
            (handle.index as usize) < self.slots.len(),
            "{}",
            FrameGraphError::UnknownResource(handle.index)
        );
        let slot = self.slots[handle.index as usize];
        self.resources[slot.rid as usize].as_ref()
    }

    /// Record a read of `handle` by pass `pass`.
    pub(crate) fn read_impl<R: FrameGraphResourceType>(
        &mut self,
        pass: u32,
        handle: FrameGraphHandle,
        usage: R::Usage,
    ) -> Result<FrameGraphHandle, FrameGraphError> {
        if !self.is_valid(handle) {
            return Err(FrameGraphError::InvalidHandle {
                index: handle.index,
                version: handle.version,
            });
        }

        let slot = self.slots[handle.index as usize];
        let FrameGraph {
            graph,
            resources,
            resource_nodes,
            pass_nodes,
            ..
        } = self;
        let resource = downcast_resource_mut::<R>(resources[slot.rid as usize].as_mut())
            .ok_or(FrameGraphError::UnknownResource(handle.index))?;
        let node = &mut resource_nodes[slot.nid as usize];
        let pass_id = pass_nodes[pass as usize].node_id();

        resource.connect_read(graph, node, pass_id, usage)?;
        Ok(handle)
    }

    /// Record a write of `handle` by pass `pass`.
    ///
    /// If the current resource node already has a writer, the version is
    /// bumped and a fresh node allocated: the slot's `nid` rebinds while
    /// `rid` stays put, so successive writes alias the same backing without
    /// write-after-write ambiguity. The overwriting pass also records a
    /// read of the previous version, keeping the chain of writers
    /// reachable from whoever consumes the final version.
    pub(crate) fn write_impl<R: FrameGraphResourceType>(
        &mut self,
        pass: u32,
        handle: FrameGraphHandle,
        usage: R::Usage,
    ) -> Result<FrameGraphHandle, FrameGraphError> {
        if !self.is_valid(handle) {
            return Err(FrameGraphError::InvalidHandle {
                index: handle.index,
                version: handle.version,
            });
        }

        let slot = self.slots[handle.index as usize];
        let mut handle = handle;
        let mut nid = slot.nid;

        let bumped = self.resource_nodes[slot.nid as usize].has_writer();
        if bumped {
            handle.version += 1;
            nid = self.resource_nodes.len() as u32;

            let name = self.resources[slot.rid as usize].name().to_string();
            let node_id = self.register_graph_node(
                format!("{} v{}", name, handle.version),
                NodeOwner::Resource(nid),
            );
            let mut node = ResourceNode::new(handle, node_id);
            if let Some(parent) = self.resource_nodes[slot.nid as usize].parent() {
                node.set_parent(parent);
            }
            self.resource_nodes.push(node);

            self.slots[handle.index as usize].nid = nid;
            self.resources[slot.rid as usize].set_version(handle.version);
        }

        let FrameGraph {
            graph,
            resources,
            resource_nodes,
            pass_nodes,
            ..
        } = self;
        let resource = downcast_resource_mut::<R>(resources[slot.rid as usize].as_mut())
            .ok_or(FrameGraphError::UnknownResource(handle.index))?;
        let pass_id = pass_nodes[pass as usize].node_id();

        if bumped {
            // overwriting depends on the previous version's contents
            let previous = &mut resource_nodes[slot.nid as usize];
            resource.connect_read(graph, previous, pass_id, usage)?;
        }

        let node = &mut resource_nodes[nid as usize];
        resource.connect_write(graph, node, pass_id, usage)?;
        Ok(handle)
    }

    // Texture-backed lookups used when devirtualizing render targets.

    pub(crate) fn texture_backing(&self, handle: FrameGraphHandle) -> Option<TextureHandle> {
        downcast_resource::<Texture>(self.resource_by_handle(handle))
            .and_then(|resource| resource.resource.as_ref())
            .and_then(|texture| texture.handle)
    }

    pub(crate) fn texture_descriptor(&self, handle: FrameGraphHandle) -> Option<&TextureDescriptor> {
        downcast_resource::<Texture>(self.resource_by_handle(handle))
            .map(|resource| &resource.descriptor)
    }

    pub(crate) fn texture_sub_descriptor(
        &self,
        handle: FrameGraphHandle,
    ) -> Option<TextureSubResourceDescriptor> {
        downcast_resource::<Texture>(self.resource_by_handle(handle))
            .map(|resource| resource.sub_descriptor)
    }

    pub(crate) fn imported_render_target(
        &self,
        handle: FrameGraphHandle,
    ) -> Option<&ImportedRenderTarget> {
        self.resource_by_handle(handle).as_imported_render_target()
    }
}
