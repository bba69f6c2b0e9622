//! The per-pass view handed to executors.

use crate::backend::{RenderPassParams, RenderTargetHandle};
use crate::framegraph::FrameGraph;
use crate::handle::FrameGraphId;
use crate::pass::PassNode;
use crate::resource::{FrameGraphResourceType, downcast_resource};

/// Backend target and parameters for one declared render target.
#[derive(Debug, Clone, Copy)]
pub struct RenderPassInfo {
    /// The concrete render target to bind.
    pub target: RenderTargetHandle,
    /// Parameters for beginning the render pass.
    pub params: RenderPassParams,
}

/// Read-only access to devirtualized resources during pass execution.
///
/// Resolves the handles captured at setup time to concrete backings,
/// descriptors, and aggregated usage. Valid only for the duration of the
/// executor call.
pub struct FrameGraphResources<'a> {
    fg: &'a FrameGraph,
    pass: &'a PassNode,
}

impl<'a> FrameGraphResources<'a> {
    pub(crate) fn new(fg: &'a FrameGraph, pass: &'a PassNode) -> Self {
        Self { fg, pass }
    }

    /// Name of the pass being executed.
    pub fn pass_name(&self) -> &str {
        self.pass.name()
    }

    /// The concrete resource behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not of kind `R` or the resource is not
    /// devirtualized (the pass never declared it).
    pub fn get<R: FrameGraphResourceType>(&self, id: FrameGraphId<R>) -> &R {
        let erased = self.fg.resource_by_handle(id.handle());
        let resource = downcast_resource::<R>(erased)
            .unwrap_or_else(|| panic!("resource \"{}\" is not of the requested kind", erased.name()));
        resource.resource.as_ref().unwrap_or_else(|| {
            panic!(
                "resource \"{}\" accessed outside its devirtualized window",
                erased.name()
            )
        })
    }

    /// The creation descriptor of the resource behind `id`.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not of kind `R`.
    pub fn descriptor<R: FrameGraphResourceType>(&self, id: FrameGraphId<R>) -> &R::Descriptor {
        let erased = self.fg.resource_by_handle(id.handle());
        let resource = downcast_resource::<R>(erased)
            .unwrap_or_else(|| panic!("resource \"{}\" is not of the requested kind", erased.name()));
        &resource.descriptor
    }

    /// The sub-resource descriptor of the resource behind `id`.
    ///
    /// Returns the default descriptor for root resources.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not of kind `R`.
    pub fn sub_resource_descriptor<R: FrameGraphResourceType>(
        &self,
        id: FrameGraphId<R>,
    ) -> &R::SubResourceDescriptor {
        let erased = self.fg.resource_by_handle(id.handle());
        let resource = downcast_resource::<R>(erased)
            .unwrap_or_else(|| panic!("resource \"{}\" is not of the requested kind", erased.name()));
        &resource.sub_descriptor
    }

    /// The aggregated usage the resource behind `id` was allocated with.
    ///
    /// # Panics
    ///
    /// Panics if the handle is not of kind `R`.
    pub fn usage<R: FrameGraphResourceType>(&self, id: FrameGraphId<R>) -> R::Usage {
        let erased = self.fg.resource_by_handle(id.handle());
        let resource = downcast_resource::<R>(erased)
            .unwrap_or_else(|| panic!("resource \"{}\" is not of the requested kind", erased.name()));
        resource.usage
    }

    /// The resolved render pass info for a render target declared with
    /// [`Builder::use_as_render_target`](crate::Builder::use_as_render_target).
    ///
    /// # Panics
    ///
    /// Panics if `id` does not name a render target of this pass.
    pub fn render_pass_info(&self, id: u32) -> RenderPassInfo {
        let data = self
            .pass
            .render_target(id)
            .unwrap_or_else(|| panic!("pass \"{}\" has no render target {}", self.pass_name(), id));
        RenderPassInfo {
            target: data
                .backend
                .target
                .unwrap_or_else(|| panic!("render target \"{}\" not devirtualized", data.name)),
            params: data.backend.params,
        }
    }
}
