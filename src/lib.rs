//! # Frame Graph
//!
//! A declarative, single-frame rendering scheduler.
//!
//! Each frame, application code declares a set of rendering passes and the
//! virtual resources they read and write. The graph compiles this
//! declaration into a culled, ordered execution plan:
//!
//! - Passes whose outputs are never consumed are dropped, unless marked as
//!   side-effecting or declared as present passes.
//! - Concrete GPU resources are allocated just before their first use and
//!   released immediately after their last use.
//! - Each surviving pass executor is invoked with resolved, devirtualized
//!   resource handles.
//!
//! The GPU itself stays behind two injected interfaces: [`DriverApi`] (an
//! opaque command sink) and [`ResourceAllocator`] (creates and destroys
//! backings). Nothing persists across [`FrameGraph::execute`] unless
//! imported.
//!
//! # Example
//!
//! ```
//! use framegraph::{
//!     DriverApi, FrameGraph, RenderTargetCreateInfo, RenderTargetHandle, ResourceAllocator,
//!     Texture, TextureDescriptor, TextureFormat, TextureHandle, TextureUsage,
//! };
//!
//! struct NullDriver;
//!
//! impl DriverApi for NullDriver {
//!     fn push_group_marker(&mut self, _name: &str) {}
//!     fn pop_group_marker(&mut self) {}
//!     fn flush(&mut self) {}
//! }
//!
//! struct CountingAllocator {
//!     created: u32,
//! }
//!
//! impl ResourceAllocator for CountingAllocator {
//!     fn create_texture(
//!         &mut self,
//!         _name: &str,
//!         _descriptor: &TextureDescriptor,
//!         _usage: TextureUsage,
//!     ) -> TextureHandle {
//!         self.created += 1;
//!         TextureHandle::new(self.created as u64)
//!     }
//!
//!     fn destroy_texture(&mut self, _handle: TextureHandle) {}
//!
//!     fn create_render_target(
//!         &mut self,
//!         _name: &str,
//!         _info: &RenderTargetCreateInfo,
//!     ) -> RenderTargetHandle {
//!         RenderTargetHandle::new(1)
//!     }
//!
//!     fn destroy_render_target(&mut self, _handle: RenderTargetHandle) {}
//! }
//!
//! let mut fg = FrameGraph::new();
//!
//! let color = fg.add_pass(
//!     "color",
//!     |builder| {
//!         let descriptor = TextureDescriptor::new_2d(1280, 720, TextureFormat::Rgba8Unorm);
//!         let color = builder.create::<Texture>("color", descriptor);
//!         builder.write(color, TextureUsage::COLOR_ATTACHMENT)
//!     },
//!     |_color, _resources, _driver| {
//!         // record GPU work against the devirtualized resources
//!     },
//! );
//!
//! fg.add_present_pass(|builder| {
//!     builder.read(color, TextureUsage::COLOR_ATTACHMENT);
//! });
//!
//! let mut driver = NullDriver;
//! let mut allocator = CountingAllocator { created: 0 };
//! fg.compile().execute(&mut driver, &mut allocator);
//! assert_eq!(allocator.created, 1);
//! ```

mod backend;
mod builder;
mod error;
mod framegraph;
mod graph;
mod handle;
mod pass;
mod resource;
mod resource_node;
mod resources;
mod texture;

pub use backend::{
    AttachmentRef, DriverApi, RenderPassParams, RenderTargetCreateInfo, RenderTargetHandle,
    ResourceAllocator, TargetBufferFlags, TextureHandle, Viewport,
};
pub use builder::Builder;
pub use error::FrameGraphError;
pub use framegraph::FrameGraph;
pub use graph::{DependencyGraph, EdgeId, NodeId};
pub use handle::{FrameGraphHandle, FrameGraphId, Version};
pub use pass::{MAX_COLOR_ATTACHMENTS, RenderTargetAttachments, RenderTargetDescriptor};
pub use resource::{FrameGraphResourceType, ImportedRenderTargetDescriptor, ResourceUsage};
pub use resources::{FrameGraphResources, RenderPassInfo};
pub use texture::{
    Texture, TextureDescriptor, TextureFormat, TextureSubResourceDescriptor, TextureUsage,
};
