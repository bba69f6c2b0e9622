//! Pass nodes: declared units of GPU work.

use crate::backend::{
    AttachmentRef, DriverApi, RenderPassParams, RenderTargetCreateInfo, RenderTargetHandle,
    ResourceAllocator, TargetBufferFlags, Viewport,
};
use crate::framegraph::FrameGraph;
use crate::graph::{DependencyGraph, NodeId};
use crate::handle::FrameGraphId;
use crate::resource_node::ResourceNode;
use crate::resources::FrameGraphResources;
use crate::texture::Texture;

/// Maximum number of color attachments on a render target.
pub const MAX_COLOR_ATTACHMENTS: usize = 6;

/// Color attachments plus depth and stencil.
pub(crate) const ATTACHMENT_COUNT: usize = MAX_COLOR_ATTACHMENTS + 2;

pub(crate) const DEPTH_SLOT: usize = MAX_COLOR_ATTACHMENTS;
pub(crate) const STENCIL_SLOT: usize = MAX_COLOR_ATTACHMENTS + 1;

/// The target-buffer flag for an attachment slot.
pub(crate) fn slot_flag(slot: usize) -> TargetBufferFlags {
    match slot {
        DEPTH_SLOT => TargetBufferFlags::DEPTH,
        STENCIL_SLOT => TargetBufferFlags::STENCIL,
        _ => TargetBufferFlags::color(slot),
    }
}

/// The attachments of a declared render target.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderTargetAttachments {
    /// Color attachments, slot by slot.
    pub color: [Option<FrameGraphId<Texture>>; MAX_COLOR_ATTACHMENTS],
    /// Depth attachment.
    pub depth: Option<FrameGraphId<Texture>>,
    /// Stencil attachment.
    pub stencil: Option<FrameGraphId<Texture>>,
}

impl RenderTargetAttachments {
    /// Attachments with a single color target.
    pub fn from_color(color: FrameGraphId<Texture>) -> Self {
        let mut attachments = Self::default();
        attachments.color[0] = Some(color);
        attachments
    }

    pub(crate) fn slot(&self, slot: usize) -> Option<FrameGraphId<Texture>> {
        match slot {
            DEPTH_SLOT => self.depth,
            STENCIL_SLOT => self.stencil,
            _ => self.color[slot],
        }
    }

    pub(crate) fn set_slot(&mut self, slot: usize, id: FrameGraphId<Texture>) {
        match slot {
            DEPTH_SLOT => self.depth = Some(id),
            STENCIL_SLOT => self.stencil = Some(id),
            _ => self.color[slot] = Some(id),
        }
    }
}

/// Declaration of a render target for one pass.
#[derive(Debug, Clone, Default)]
pub struct RenderTargetDescriptor {
    /// The virtual textures attached to the target.
    pub attachments: RenderTargetAttachments,
    /// Rendered area; derived from the attachments when left empty.
    pub viewport: Viewport,
    /// Clear color applied to cleared attachments.
    pub clear_color: [f32; 4],
    /// Attachments cleared on entry to the pass.
    pub clear_flags: TargetBufferFlags,
    /// MSAA sample count.
    pub samples: u8,
}

impl RenderTargetDescriptor {
    /// A descriptor with a single color attachment.
    pub fn from_color(color: FrameGraphId<Texture>) -> Self {
        Self {
            attachments: RenderTargetAttachments::from_color(color),
            ..Default::default()
        }
    }

    /// Set the depth attachment.
    pub fn with_depth(mut self, depth: FrameGraphId<Texture>) -> Self {
        self.attachments.depth = Some(depth);
        self
    }

    /// Set the attachments cleared on entry.
    pub fn with_clear_flags(mut self, flags: TargetBufferFlags) -> Self {
        self.clear_flags = flags;
        self
    }

    /// Set the viewport explicitly.
    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }
}

/// Resolved backend state of a declared render target.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RenderTargetBackend {
    pub(crate) target: Option<RenderTargetHandle>,
    pub(crate) params: RenderPassParams,
}

/// Per-pass record of one declared render target.
pub(crate) struct RenderTargetData {
    pub(crate) name: String,
    pub(crate) descriptor: RenderTargetDescriptor,
    /// True when an attachment resolves to an imported render target; the
    /// imported backend target is reused instead of allocating one.
    pub(crate) imported: bool,
    pub(crate) imported_target: Option<RenderTargetHandle>,
    /// Which attachment slots are populated.
    pub(crate) target_flags: TargetBufferFlags,
    /// Post-write handles, slot by slot; returned to the setup callback.
    pub(crate) attachment_info: [Option<FrameGraphId<Texture>>; ATTACHMENT_COUNT],
    /// Resource nodes observed before the pass writes, slot by slot.
    pub(crate) incoming: [Option<u32>; ATTACHMENT_COUNT],
    /// Resource nodes produced by the pass writes, slot by slot.
    pub(crate) outgoing: [Option<u32>; ATTACHMENT_COUNT],
    pub(crate) backend: RenderTargetBackend,
}

impl RenderTargetData {
    pub(crate) fn new(name: impl Into<String>, descriptor: RenderTargetDescriptor) -> Self {
        Self {
            name: name.into(),
            descriptor,
            imported: false,
            imported_target: None,
            target_flags: TargetBufferFlags::empty(),
            attachment_info: [None; ATTACHMENT_COUNT],
            incoming: [None; ATTACHMENT_COUNT],
            outgoing: [None; ATTACHMENT_COUNT],
            backend: RenderTargetBackend::default(),
        }
    }

    /// Compute clear/discard flags from the live edge set.
    ///
    /// An attachment's prior contents can be dropped on entry when no
    /// earlier pass produced them, and on exit when no live pass reads
    /// them. Imported targets never discard; their contents are externally
    /// owned.
    fn resolve(&mut self, graph: &DependencyGraph, nodes: &[ResourceNode], pass_node: NodeId) {
        let mut discard_start = TargetBufferFlags::empty();
        let mut discard_end = TargetBufferFlags::empty();

        for slot in 0..ATTACHMENT_COUNT {
            if self.attachment_info[slot].is_none() {
                continue;
            }
            let flag = slot_flag(slot);
            self.target_flags |= flag;

            // The pass's own write does not count as prior content: when an
            // attachment was never written before, the write lands on the
            // incoming node itself.
            let has_producer = self.incoming[slot].is_some_and(|nid| {
                nodes[nid as usize]
                    .writer()
                    .is_some_and(|edge| graph.edge(edge).from != pass_node)
            });
            if !has_producer {
                discard_start |= flag;
            }
            if let Some(nid) = self.outgoing[slot]
                && !nodes[nid as usize].has_valid_readers(graph)
            {
                discard_end |= flag;
            }
        }

        if self.imported {
            discard_start = TargetBufferFlags::empty();
            discard_end = TargetBufferFlags::empty();
        }

        self.backend.params.clear_color = self.descriptor.clear_color;
        self.backend.params.clear = self.descriptor.clear_flags & self.target_flags;
        self.backend.params.discard_start = discard_start;
        self.backend.params.discard_end = discard_end;
    }

    /// Allocate the backend target, or adopt the imported one.
    fn devirtualize(&mut self, fg: &FrameGraph, allocator: &mut dyn ResourceAllocator) {
        let mut info = RenderTargetCreateInfo {
            samples: self.descriptor.samples.max(1),
            ..Default::default()
        };

        for slot in 0..ATTACHMENT_COUNT {
            let Some(id) = self.attachment_info[slot] else {
                continue;
            };
            let Some(texture) = fg.texture_backing(id.handle()) else {
                continue;
            };
            let sub = fg.texture_sub_descriptor(id.handle()).unwrap_or_default();
            let attachment = AttachmentRef {
                texture,
                mip_level: sub.mip_level,
                layer: sub.layer,
            };
            match slot {
                DEPTH_SLOT => info.depth = Some(attachment),
                STENCIL_SLOT => info.stencil = Some(attachment),
                _ => info.color[slot] = Some(attachment),
            }

            if info.width == 0
                && let Some(descriptor) = fg.texture_descriptor(id.handle())
            {
                info.width = descriptor.width;
                info.height = descriptor.height;
            }
        }

        let viewport = if self.descriptor.viewport.is_empty() {
            Viewport::new(info.width, info.height)
        } else {
            self.descriptor.viewport
        };
        self.backend.params.viewport = viewport;

        self.backend.target = if self.imported {
            self.imported_target
        } else {
            Some(allocator.create_render_target(&self.name, &info))
        };
    }

    fn destroy(&mut self, allocator: &mut dyn ResourceAllocator) {
        if self.imported {
            self.backend.target = None;
            return;
        }
        if let Some(target) = self.backend.target.take() {
            allocator.destroy_render_target(target);
        }
    }
}

/// The executor callback of a render pass.
pub(crate) type PassExecutor =
    Box<dyn FnOnce(&FrameGraphResources<'_>, &mut dyn DriverApi)>;

/// A pass declared with a user executor and optional render targets.
pub(crate) struct RenderPassNode {
    name: String,
    node_id: NodeId,
    executor: Option<PassExecutor>,
    render_targets: Vec<RenderTargetData>,
}

impl RenderPassNode {
    pub(crate) fn new(name: impl Into<String>, node_id: NodeId) -> Self {
        Self {
            name: name.into(),
            node_id,
            executor: None,
            render_targets: Vec::new(),
        }
    }

    /// Install the user executor once setup has produced its data.
    pub(crate) fn set_executor(&mut self, executor: PassExecutor) {
        self.executor = Some(executor);
    }

    pub(crate) fn add_render_target(&mut self, data: RenderTargetData) -> u32 {
        let id = self.render_targets.len() as u32;
        self.render_targets.push(data);
        id
    }

    pub(crate) fn render_target(&self, id: u32) -> Option<&RenderTargetData> {
        self.render_targets.get(id as usize)
    }
}

/// A sink pass anchoring the live subgraph; has no executor.
pub(crate) struct PresentPassNode {
    node_id: NodeId,
}

/// A node in the pass list: either a user render pass or a present sink.
pub(crate) enum PassNode {
    Render(RenderPassNode),
    Present(PresentPassNode),
}

impl PassNode {
    pub(crate) fn present(node_id: NodeId) -> Self {
        Self::Present(PresentPassNode { node_id })
    }

    pub(crate) fn name(&self) -> &str {
        match self {
            Self::Render(pass) => &pass.name,
            Self::Present(_) => "present",
        }
    }

    pub(crate) fn node_id(&self) -> NodeId {
        match self {
            Self::Render(pass) => pass.node_id,
            Self::Present(pass) => pass.node_id,
        }
    }

    pub(crate) fn as_render_mut(&mut self) -> Option<&mut RenderPassNode> {
        if let Self::Render(pass) = self {
            Some(pass)
        } else {
            None
        }
    }

    pub(crate) fn render_target(&self, id: u32) -> Option<&RenderTargetData> {
        match self {
            Self::Render(pass) => pass.render_target(id),
            Self::Present(_) => None,
        }
    }

    /// Resolve render target flags once culling has settled.
    pub(crate) fn resolve(&mut self, graph: &DependencyGraph, nodes: &[ResourceNode]) {
        if let Self::Render(pass) = self {
            let pass_node = pass.node_id;
            for target in &mut pass.render_targets {
                target.resolve(graph, nodes, pass_node);
            }
        }
    }

    /// Allocate backend targets for the declared render targets.
    pub(crate) fn devirtualize_targets(
        &mut self,
        fg: &FrameGraph,
        allocator: &mut dyn ResourceAllocator,
    ) {
        if let Self::Render(pass) = self {
            for target in &mut pass.render_targets {
                target.devirtualize(fg, allocator);
            }
        }
    }

    /// Release backend targets created by this pass.
    pub(crate) fn destroy_targets(&mut self, allocator: &mut dyn ResourceAllocator) {
        if let Self::Render(pass) = self {
            for target in &mut pass.render_targets {
                target.destroy(allocator);
            }
        }
    }

    /// Take the user executor, if any. Present passes have none.
    pub(crate) fn take_executor(&mut self) -> Option<PassExecutor> {
        match self {
            Self::Render(pass) => pass.executor.take(),
            Self::Present(_) => None,
        }
    }
}
