//! The built-in texture resource kind.
//!
//! [`Texture`] is the resource type used by render target attachments and
//! by most graph-managed resources. Custom resource kinds implement
//! [`FrameGraphResourceType`](crate::resource::FrameGraphResourceType) the
//! same way this module does.

use bitflags::bitflags;

use crate::backend::{ResourceAllocator, TextureHandle};
use crate::resource::{FrameGraphResourceType, ResourceUsage};

/// Texture format enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    /// 8-bit RGBA, unsigned normalized.
    #[default]
    Rgba8Unorm,
    /// 8-bit RGBA, unsigned normalized, sRGB.
    Rgba8UnormSrgb,
    /// 16-bit float RGBA.
    Rgba16Float,
    /// 32-bit float RGBA.
    Rgba32Float,
    /// 32-bit float depth.
    Depth32Float,
    /// 24-bit depth with 8-bit stencil.
    Depth24PlusStencil8,
    /// Single-channel 32-bit float.
    R32Float,
}

impl TextureFormat {
    /// Check if this is a depth or depth/stencil format.
    pub fn is_depth(&self) -> bool {
        matches!(self, Self::Depth32Float | Self::Depth24PlusStencil8)
    }

    /// Check if this format carries a stencil aspect.
    pub fn has_stencil(&self) -> bool {
        matches!(self, Self::Depth24PlusStencil8)
    }
}

bitflags! {
    /// Usage flags for textures.
    ///
    /// The frame graph aggregates these across every live edge touching a
    /// resource; the union is what the allocation is created with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TextureUsage: u32 {
        /// Texture can be copied from.
        const COPY_SRC = 1 << 0;
        /// Texture can be copied to.
        const COPY_DST = 1 << 1;
        /// Texture can be sampled in a shader.
        const SAMPLEABLE = 1 << 2;
        /// Texture can be read/written as a storage image.
        const STORAGE = 1 << 3;
        /// Texture can be bound as a color attachment.
        const COLOR_ATTACHMENT = 1 << 4;
        /// Texture can be bound as a depth attachment.
        const DEPTH_ATTACHMENT = 1 << 5;
        /// Texture can be bound as a stencil attachment.
        const STENCIL_ATTACHMENT = 1 << 6;
    }
}

impl Default for TextureUsage {
    fn default() -> Self {
        Self::empty()
    }
}

impl ResourceUsage for TextureUsage {
    fn contains_all(&self, other: Self) -> bool {
        self.contains(other)
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TextureDescriptor {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth or array layer count.
    pub depth: u32,
    /// Mip level count.
    pub mip_levels: u32,
    /// Sample count for multisampling.
    pub sample_count: u32,
    /// Texture format.
    pub format: TextureFormat,
}

impl TextureDescriptor {
    /// Create a new 2D texture descriptor.
    pub fn new_2d(width: u32, height: u32, format: TextureFormat) -> Self {
        Self {
            width,
            height,
            depth: 1,
            mip_levels: 1,
            sample_count: 1,
            format,
        }
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, count: u32) -> Self {
        self.mip_levels = count;
        self
    }

    /// Set the sample count for multisampling.
    pub fn with_sample_count(mut self, count: u32) -> Self {
        self.sample_count = count;
        self
    }

    /// Set the depth or array layer count.
    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }
}

impl Default for TextureDescriptor {
    fn default() -> Self {
        Self {
            width: 1,
            height: 1,
            depth: 1,
            mip_levels: 1,
            sample_count: 1,
            format: TextureFormat::default(),
        }
    }
}

/// Descriptor selecting part of a texture as a sub-resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TextureSubResourceDescriptor {
    /// Mip level aliased by the sub-resource.
    pub mip_level: u32,
    /// Array layer aliased by the sub-resource.
    pub layer: u32,
}

impl TextureSubResourceDescriptor {
    /// Select a single mip level.
    pub fn mip(mip_level: u32) -> Self {
        Self {
            mip_level,
            layer: 0,
        }
    }
}

/// The concrete texture backing, valid between devirtualize and destroy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Texture {
    /// Backend handle, `None` while the resource is still virtual.
    pub handle: Option<TextureHandle>,
}

impl FrameGraphResourceType for Texture {
    type Descriptor = TextureDescriptor;
    type SubResourceDescriptor = TextureSubResourceDescriptor;
    type Usage = TextureUsage;

    fn create(
        allocator: &mut dyn ResourceAllocator,
        name: &str,
        descriptor: &Self::Descriptor,
        usage: Self::Usage,
    ) -> Self {
        Self {
            handle: Some(allocator.create_texture(name, descriptor, usage)),
        }
    }

    fn destroy(&mut self, allocator: &mut dyn ResourceAllocator) {
        if let Some(handle) = self.handle.take() {
            allocator.destroy_texture(handle);
        }
    }
}
