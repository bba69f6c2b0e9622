//! Virtual resources and their typed backing model.
//!
//! A virtual resource is known to the graph before any GPU object exists.
//! [`Resource<R>`] carries the typed descriptor/usage bundle for a resource
//! kind `R` and is erased behind the [`VirtualResource`] trait for storage.
//! The concrete backing is created just before the first pass that needs it
//! (devirtualization) and released right after the last one.

use std::any::Any;

use crate::backend::{RenderTargetHandle, ResourceAllocator};
use crate::error::FrameGraphError;
use crate::graph::{DependencyGraph, EdgeId, NodeId};
use crate::handle::Version;
use crate::resource_node::ResourceNode;
use crate::texture::{Texture, TextureDescriptor, TextureUsage};

/// Usage bitset contract for a resource kind.
///
/// Implemented by `bitflags`-style types; the graph only needs union and
/// subset tests.
pub trait ResourceUsage:
    Copy
    + Default
    + PartialEq
    + std::fmt::Debug
    + std::ops::BitOr<Output = Self>
    + std::ops::BitOrAssign
    + 'static
{
    /// Check that every bit of `other` is present in `self`.
    fn contains_all(&self, other: Self) -> bool;
}

/// The parameter bundle describing a resource kind.
///
/// A kind supplies its creation descriptor, the descriptor selecting a
/// sub-resource, its usage bitset, and how to create/destroy the concrete
/// backing through the injected allocator. See [`Texture`](crate::Texture)
/// for the built-in kind.
pub trait FrameGraphResourceType: Clone + 'static {
    /// Parameters for creating the backing object.
    type Descriptor: Clone + std::fmt::Debug + Default + 'static;
    /// Parameters selecting a part of a parent resource.
    type SubResourceDescriptor: Clone + std::fmt::Debug + Default + 'static;
    /// Usage bitset aggregated across live edges.
    type Usage: ResourceUsage;

    /// Create the concrete backing.
    fn create(
        allocator: &mut dyn ResourceAllocator,
        name: &str,
        descriptor: &Self::Descriptor,
        usage: Self::Usage,
    ) -> Self;

    /// Destroy the concrete backing.
    fn destroy(&mut self, allocator: &mut dyn ResourceAllocator);
}

/// Erased per-resource state driven by the frame graph.
///
/// One implementor exists per resource kind; the frame graph stores
/// resources as `Box<dyn VirtualResource>` and recovers the typed view
/// with [`downcast_resource`].
pub(crate) trait VirtualResource {
    fn name(&self) -> &str;

    fn version(&self) -> Version;
    fn set_version(&mut self, version: Version);

    /// Index of the containing resource, `None` for roots.
    fn parent(&self) -> Option<u32>;

    fn is_imported(&self) -> bool;

    /// Earliest live pass touching this resource, set during compile.
    fn first(&self) -> Option<u32>;
    /// Latest live pass touching this resource, set during compile.
    fn last(&self) -> Option<u32>;

    fn refcount(&self) -> u32;

    /// Record that `pass` uses this resource, widening its lifetime.
    fn needed_by_pass(&mut self, pass: u32);

    /// OR the usage of every valid incident edge into the resource.
    ///
    /// Reader edges count only when both endpoints survived culling. The
    /// writer edge counts whenever the writing pass survived, even if the
    /// written node did not: a live pass still performs its write.
    fn resolve_usage(&mut self, graph: &DependencyGraph, readers: &[EdgeId], writer: Option<EdgeId>);

    /// OR a sub-resource's resolved usage into this (parent) resource.
    fn merge_child_usage(&mut self, child: &dyn VirtualResource);

    /// Create the concrete backing. No-op for imported resources.
    fn devirtualize(&mut self, allocator: &mut dyn ResourceAllocator);

    /// Adopt the backing of an already-devirtualized parent.
    fn devirtualize_from(&mut self, parent: &dyn VirtualResource);

    /// Release the concrete backing. No-op for imported resources and
    /// sub-resources.
    fn destroy(&mut self, allocator: &mut dyn ResourceAllocator);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn as_imported_render_target(&self) -> Option<&ImportedRenderTarget> {
        None
    }
}

/// Typed state of a virtual resource of kind `R`.
pub(crate) struct Resource<R: FrameGraphResourceType> {
    name: String,
    parent: Option<u32>,
    version: Version,
    refcount: u32,
    first: Option<u32>,
    last: Option<u32>,
    imported: bool,
    pub(crate) descriptor: R::Descriptor,
    pub(crate) sub_descriptor: R::SubResourceDescriptor,
    /// Aggregated usage; for imported resources this starts as the declared
    /// capability set and connects are validated against it.
    pub(crate) usage: R::Usage,
    /// Concrete backing, valid only between devirtualize and destroy.
    pub(crate) resource: Option<R>,
    /// Usage payload of every edge this resource issued, across versions.
    edges: Vec<(EdgeId, R::Usage)>,
}

impl<R: FrameGraphResourceType> Resource<R> {
    /// A root resource created and destroyed by the graph.
    pub(crate) fn new(name: impl Into<String>, descriptor: R::Descriptor) -> Self {
        Self {
            name: name.into(),
            parent: None,
            version: 0,
            refcount: 0,
            first: None,
            last: None,
            imported: false,
            descriptor,
            sub_descriptor: Default::default(),
            usage: Default::default(),
            resource: None,
            edges: Vec::new(),
        }
    }

    /// A sub-resource aliasing part of `parent`; shares its backing.
    pub(crate) fn new_sub(
        parent: u32,
        name: impl Into<String>,
        descriptor: R::Descriptor,
        sub_descriptor: R::SubResourceDescriptor,
    ) -> Self {
        Self {
            parent: Some(parent),
            sub_descriptor,
            ..Self::new(name, descriptor)
        }
    }

    /// An externally-owned resource; never created or destroyed by the
    /// graph, and connects are validated against `usage`.
    pub(crate) fn imported(
        name: impl Into<String>,
        descriptor: R::Descriptor,
        usage: R::Usage,
        resource: R,
    ) -> Self {
        Self {
            imported: true,
            usage,
            resource: Some(resource),
            ..Self::new(name, descriptor)
        }
    }

    /// Record a read: an edge from the resource node to the pass.
    pub(crate) fn connect_read(
        &mut self,
        graph: &mut DependencyGraph,
        node: &mut ResourceNode,
        pass: NodeId,
        usage: R::Usage,
    ) -> Result<EdgeId, FrameGraphError> {
        self.check_imported_usage(usage)?;
        let edge = graph.link(node.node_id(), pass)?;
        self.edges.push((edge, usage));
        node.add_reader(edge);
        Ok(edge)
    }

    /// Record a write: the single incoming edge of the resource node.
    pub(crate) fn connect_write(
        &mut self,
        graph: &mut DependencyGraph,
        node: &mut ResourceNode,
        pass: NodeId,
        usage: R::Usage,
    ) -> Result<EdgeId, FrameGraphError> {
        self.check_imported_usage(usage)?;
        let edge = graph.link(pass, node.node_id())?;
        self.edges.push((edge, usage));
        node.set_writer(edge, &self.name)?;
        Ok(edge)
    }

    fn check_imported_usage(&self, usage: R::Usage) -> Result<(), FrameGraphError> {
        if self.imported && !self.usage.contains_all(usage) {
            return Err(FrameGraphError::IncompatibleUsage(format!(
                "requested usage {:?} not available on imported resource \"{}\" with usage {:?}",
                usage, self.name, self.usage
            )));
        }
        Ok(())
    }

    fn edge_usage(&self, edge: EdgeId) -> R::Usage {
        self.edges
            .iter()
            .find(|(id, _)| *id == edge)
            .map(|(_, usage)| *usage)
            .unwrap_or_default()
    }
}

impl<R: FrameGraphResourceType> VirtualResource for Resource<R> {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn parent(&self) -> Option<u32> {
        self.parent
    }

    fn is_imported(&self) -> bool {
        self.imported
    }

    fn first(&self) -> Option<u32> {
        self.first
    }

    fn last(&self) -> Option<u32> {
        self.last
    }

    fn refcount(&self) -> u32 {
        self.refcount
    }

    fn needed_by_pass(&mut self, pass: u32) {
        if self.first.is_none() {
            self.first = Some(pass);
        }
        self.last = Some(pass);
        self.refcount += 1;
    }

    fn resolve_usage(
        &mut self,
        graph: &DependencyGraph,
        readers: &[EdgeId],
        writer: Option<EdgeId>,
    ) {
        for &edge in readers {
            if graph.is_edge_valid(edge) {
                let usage = self.edge_usage(edge);
                self.usage |= usage;
            }
        }
        if let Some(edge) = writer
            && !graph.is_culled(graph.edge(edge).from)
        {
            let usage = self.edge_usage(edge);
            self.usage |= usage;
        }
    }

    fn merge_child_usage(&mut self, child: &dyn VirtualResource) {
        if let Some(child) = child.as_any().downcast_ref::<Resource<R>>() {
            self.usage |= child.usage;
        }
    }

    fn devirtualize(&mut self, allocator: &mut dyn ResourceAllocator) {
        if self.imported {
            return;
        }
        debug_assert!(
            self.parent.is_none(),
            "sub-resource \"{}\" devirtualized as a root",
            self.name
        );
        self.resource = Some(R::create(allocator, &self.name, &self.descriptor, self.usage));
    }

    fn devirtualize_from(&mut self, parent: &dyn VirtualResource) {
        if let Some(parent) = downcast_resource::<R>(parent) {
            self.resource.clone_from(&parent.resource);
        }
    }

    fn destroy(&mut self, allocator: &mut dyn ResourceAllocator) {
        if self.imported || self.parent.is_some() {
            return;
        }
        if let Some(mut resource) = self.resource.take() {
            resource.destroy(allocator);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Recover the typed view of an erased resource.
///
/// Falls through to the texture base of an imported render target, so a
/// `FrameGraphId<Texture>` works uniformly across both.
pub(crate) fn downcast_resource<R: FrameGraphResourceType>(
    resource: &dyn VirtualResource,
) -> Option<&Resource<R>> {
    if let Some(resource) = resource.as_any().downcast_ref::<Resource<R>>() {
        return Some(resource);
    }
    resource
        .as_imported_render_target()
        .and_then(|imported| (&imported.base as &dyn Any).downcast_ref::<Resource<R>>())
}

/// Mutable variant of [`downcast_resource`].
pub(crate) fn downcast_resource_mut<R: FrameGraphResourceType>(
    resource: &mut dyn VirtualResource,
) -> Option<&mut Resource<R>> {
    // Two-step to appease the borrow checker: probe first, then downcast.
    if resource.as_any().downcast_ref::<Resource<R>>().is_some() {
        return resource.as_any_mut().downcast_mut::<Resource<R>>();
    }
    if resource.as_any().downcast_ref::<ImportedRenderTarget>().is_some() {
        return resource
            .as_any_mut()
            .downcast_mut::<ImportedRenderTarget>()
            .and_then(|imported| (&mut imported.base as &mut dyn Any).downcast_mut::<Resource<R>>());
    }
    None
}

/// Descriptor of an externally-owned render target being imported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ImportedRenderTargetDescriptor {
    /// Pixel area of the target.
    pub viewport: crate::backend::Viewport,
    /// Which attachments the target carries.
    pub attachments: crate::backend::TargetBufferFlags,
    /// MSAA sample count.
    pub samples: u8,
}

impl ImportedRenderTargetDescriptor {
    fn capabilities(&self) -> TextureUsage {
        use crate::backend::TargetBufferFlags as Tbf;
        let mut usage = TextureUsage::empty();
        if self.attachments.intersects(Tbf::ALL_COLOR) {
            usage |= TextureUsage::COLOR_ATTACHMENT;
        }
        if self.attachments.contains(Tbf::DEPTH) {
            usage |= TextureUsage::DEPTH_ATTACHMENT;
        }
        if self.attachments.contains(Tbf::STENCIL) {
            usage |= TextureUsage::STENCIL_ATTACHMENT;
        }
        usage
    }
}

/// An imported render target: a texture-kind resource that additionally
/// carries the backend target handle, reused verbatim by any pass that
/// declares it as a render target.
pub(crate) struct ImportedRenderTarget {
    pub(crate) base: Resource<Texture>,
    pub(crate) target: RenderTargetHandle,
    pub(crate) descriptor: ImportedRenderTargetDescriptor,
}

impl ImportedRenderTarget {
    pub(crate) fn new(
        name: impl Into<String>,
        descriptor: ImportedRenderTargetDescriptor,
        target: RenderTargetHandle,
    ) -> Self {
        let texture_descriptor = TextureDescriptor {
            width: descriptor.viewport.width,
            height: descriptor.viewport.height,
            ..Default::default()
        };
        Self {
            base: Resource::imported(
                name,
                texture_descriptor,
                descriptor.capabilities(),
                Texture::default(),
            ),
            target,
            descriptor,
        }
    }
}

impl VirtualResource for ImportedRenderTarget {
    fn name(&self) -> &str {
        self.base.name()
    }

    fn version(&self) -> Version {
        self.base.version()
    }

    fn set_version(&mut self, version: Version) {
        self.base.set_version(version);
    }

    fn parent(&self) -> Option<u32> {
        self.base.parent()
    }

    fn is_imported(&self) -> bool {
        true
    }

    fn first(&self) -> Option<u32> {
        self.base.first()
    }

    fn last(&self) -> Option<u32> {
        self.base.last()
    }

    fn refcount(&self) -> u32 {
        self.base.refcount()
    }

    fn needed_by_pass(&mut self, pass: u32) {
        self.base.needed_by_pass(pass);
    }

    fn resolve_usage(
        &mut self,
        graph: &DependencyGraph,
        readers: &[EdgeId],
        writer: Option<EdgeId>,
    ) {
        self.base.resolve_usage(graph, readers, writer);
    }

    fn merge_child_usage(&mut self, child: &dyn VirtualResource) {
        self.base.merge_child_usage(child);
    }

    fn devirtualize(&mut self, _allocator: &mut dyn ResourceAllocator) {}

    fn devirtualize_from(&mut self, _parent: &dyn VirtualResource) {}

    fn destroy(&mut self, _allocator: &mut dyn ResourceAllocator) {}

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn as_imported_render_target(&self) -> Option<&ImportedRenderTarget> {
        Some(self)
    }
}
