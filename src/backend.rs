//! Injected backend interfaces.
//!
//! The frame graph never talks to a GPU directly. It drives two traits
//! supplied by the embedder: [`DriverApi`], an opaque command sink, and
//! [`ResourceAllocator`], which creates and destroys the concrete backing
//! objects. Both are mutated only from the thread executing the graph.

use bitflags::bitflags;

use crate::texture::{TextureDescriptor, TextureUsage};

/// Handle to a GPU texture owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(u64);

impl TextureHandle {
    /// Create a handle from a backend identifier.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the backend identifier.
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Handle to a GPU render target owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetHandle(u64);

impl RenderTargetHandle {
    /// Create a handle from a backend identifier.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the backend identifier.
    pub fn id(&self) -> u64 {
        self.0
    }
}

bitflags! {
    /// Flags selecting the buffers of a render target.
    ///
    /// Used to express which attachments a pass clears on entry and which
    /// it can discard on entry/exit because no live pass produced or
    /// consumes their contents.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TargetBufferFlags: u32 {
        /// First color attachment.
        const COLOR0 = 1 << 0;
        /// Second color attachment.
        const COLOR1 = 1 << 1;
        /// Third color attachment.
        const COLOR2 = 1 << 2;
        /// Fourth color attachment.
        const COLOR3 = 1 << 3;
        /// Fifth color attachment.
        const COLOR4 = 1 << 4;
        /// Sixth color attachment.
        const COLOR5 = 1 << 5;
        /// Depth attachment.
        const DEPTH = 1 << 6;
        /// Stencil attachment.
        const STENCIL = 1 << 7;
    }
}

impl TargetBufferFlags {
    /// All color attachments.
    pub const ALL_COLOR: Self = Self::COLOR0
        .union(Self::COLOR1)
        .union(Self::COLOR2)
        .union(Self::COLOR3)
        .union(Self::COLOR4)
        .union(Self::COLOR5);

    /// Flag for the color attachment at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not a valid color attachment index.
    pub fn color(index: usize) -> Self {
        assert!(
            index < crate::pass::MAX_COLOR_ATTACHMENTS,
            "color attachment index out of range: {index}"
        );
        Self::from_bits_truncate(1 << index)
    }
}

impl Default for TargetBufferFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// A render target viewport in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Viewport {
    /// Left edge.
    pub left: u32,
    /// Bottom edge.
    pub bottom: u32,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Viewport {
    /// Create a viewport spanning `width` x `height` at the origin.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            bottom: 0,
            width,
            height,
        }
    }

    /// Check if this viewport has zero area.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Parameters handed to the backend when beginning a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RenderPassParams {
    /// Area of the target affected by the pass.
    pub viewport: Viewport,
    /// Clear color applied to cleared color attachments.
    pub clear_color: [f32; 4],
    /// Attachments cleared on entry.
    pub clear: TargetBufferFlags,
    /// Attachments whose prior contents can be dropped on entry.
    pub discard_start: TargetBufferFlags,
    /// Attachments whose contents can be dropped on exit.
    pub discard_end: TargetBufferFlags,
}

/// Attachment reference for backend render target creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttachmentRef {
    /// Backing texture of the attachment.
    pub texture: TextureHandle,
    /// Mip level rendered to.
    pub mip_level: u32,
    /// Array layer rendered to.
    pub layer: u32,
}

/// Description of a concrete render target to allocate.
#[derive(Debug, Clone, Default)]
pub struct RenderTargetCreateInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// MSAA sample count.
    pub samples: u8,
    /// Color attachments, slot by slot.
    pub color: [Option<AttachmentRef>; crate::pass::MAX_COLOR_ATTACHMENTS],
    /// Depth attachment.
    pub depth: Option<AttachmentRef>,
    /// Stencil attachment.
    pub stencil: Option<AttachmentRef>,
}

/// Opaque GPU command sink.
///
/// The frame graph brackets the frame and each live pass with group
/// markers and kicks the GPU once at the end of the frame. Everything else
/// going through the driver is issued by pass executors.
pub trait DriverApi {
    /// Open a named debug group.
    fn push_group_marker(&mut self, name: &str);

    /// Close the innermost debug group.
    fn pop_group_marker(&mut self);

    /// Submit pending work to the GPU.
    fn flush(&mut self);
}

/// Creates and destroys concrete GPU resources.
///
/// Implementations may cache allocations by descriptor and usage. Only the
/// root of a sub-resource chain calls create/destroy; sub-resources share
/// the root's backing.
pub trait ResourceAllocator {
    /// Allocate a texture.
    fn create_texture(
        &mut self,
        name: &str,
        descriptor: &TextureDescriptor,
        usage: TextureUsage,
    ) -> TextureHandle;

    /// Release a texture.
    fn destroy_texture(&mut self, handle: TextureHandle);

    /// Allocate a render target from already-allocated attachments.
    fn create_render_target(&mut self, name: &str, info: &RenderTargetCreateInfo)
    -> RenderTargetHandle;

    /// Release a render target. The attachments themselves are not released.
    fn destroy_render_target(&mut self, handle: RenderTargetHandle);
}
