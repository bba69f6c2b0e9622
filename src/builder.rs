//! Per-pass declaration API.

use crate::framegraph::FrameGraph;
use crate::handle::{FrameGraphHandle, FrameGraphId};
use crate::pass::{
    ATTACHMENT_COUNT, DEPTH_SLOT, RenderTargetAttachments, RenderTargetData,
    RenderTargetDescriptor, STENCIL_SLOT,
};
use crate::resource::FrameGraphResourceType;
use crate::texture::{Texture, TextureUsage};

/// Declares what one pass creates, reads, and writes.
///
/// Handed to the setup callback of
/// [`FrameGraph::add_pass`](crate::FrameGraph::add_pass). All failures are
/// non-fatal: the offending declaration is logged, dropped, and an
/// uninitialized handle returned; the rest of the graph still compiles.
pub struct Builder<'a> {
    fg: &'a mut FrameGraph,
    pass: u32,
}

impl<'a> Builder<'a> {
    pub(crate) fn new(fg: &'a mut FrameGraph, pass: u32) -> Self {
        Self { fg, pass }
    }

    /// Create a virtual resource of kind `R`.
    pub fn create<R: FrameGraphResourceType>(
        &mut self,
        name: &str,
        descriptor: R::Descriptor,
    ) -> FrameGraphId<R> {
        self.fg.create(name, descriptor)
    }

    /// Create a sub-resource aliasing part of `parent`.
    pub fn create_subresource<R: FrameGraphResourceType>(
        &mut self,
        parent: FrameGraphId<R>,
        name: &str,
        sub_descriptor: R::SubResourceDescriptor,
    ) -> FrameGraphId<R> {
        self.fg.create_subresource(parent, name, sub_descriptor)
    }

    /// Declare that this pass reads `id` with the given usage.
    pub fn read<R: FrameGraphResourceType>(
        &mut self,
        id: FrameGraphId<R>,
        usage: R::Usage,
    ) -> FrameGraphId<R> {
        match self.fg.read_impl::<R>(self.pass, id.handle(), usage) {
            Ok(handle) => FrameGraphId::new(handle),
            Err(error) => {
                log::error!("read dropped: {error}");
                FrameGraphId::uninitialized()
            }
        }
    }

    /// Declare that this pass writes `id` with the given usage.
    ///
    /// Writing an already-written resource bumps its version and returns a
    /// handle to the new version; the old handle becomes stale. The
    /// underlying backing is shared across versions.
    pub fn write<R: FrameGraphResourceType>(
        &mut self,
        id: FrameGraphId<R>,
        usage: R::Usage,
    ) -> FrameGraphId<R> {
        match self.fg.write_impl::<R>(self.pass, id.handle(), usage) {
            Ok(handle) => FrameGraphId::new(handle),
            Err(error) => {
                log::error!("write dropped: {error}");
                FrameGraphId::uninitialized()
            }
        }
    }

    /// Protect this pass from culling even if nothing consumes its outputs.
    pub fn side_effect(&mut self) {
        let node_id = self.fg.pass_node(self.pass).node_id();
        self.fg.graph_mut().make_target(node_id);
    }

    /// Diagnostic name of the resource behind `handle`.
    ///
    /// # Panics
    ///
    /// Panics if the handle's slot is out of range.
    pub fn name_of(&self, handle: FrameGraphHandle) -> &str {
        self.fg.resource_by_handle(handle).name()
    }

    /// Declare a render target for this pass.
    ///
    /// Every populated attachment is written by the pass (and read first,
    /// when a previous pass produced its contents), so the returned
    /// attachment set carries post-write handles. The returned id fetches
    /// the resolved [`RenderPassInfo`](crate::RenderPassInfo) from the
    /// executor's resources view.
    ///
    /// # Panics
    ///
    /// Panics if called from a present pass setup.
    pub fn use_as_render_target(
        &mut self,
        name: &str,
        descriptor: RenderTargetDescriptor,
    ) -> (RenderTargetAttachments, u32) {
        let declared = descriptor.attachments;
        let mut data = RenderTargetData::new(name, descriptor);
        let mut attachments = RenderTargetAttachments::default();

        for slot in 0..ATTACHMENT_COUNT {
            let Some(id) = declared.slot(slot) else {
                continue;
            };
            let usage = match slot {
                DEPTH_SLOT => TextureUsage::DEPTH_ATTACHMENT,
                STENCIL_SLOT => TextureUsage::STENCIL_ATTACHMENT,
                _ => TextureUsage::COLOR_ATTACHMENT,
            };

            let handle = id.handle();
            if !self.fg.assert_valid(handle) {
                continue;
            }

            if let Some(imported) = self.fg.imported_render_target(handle) {
                data.imported = true;
                data.imported_target = Some(imported.target);
                if data.descriptor.viewport.is_empty() {
                    data.descriptor.viewport = imported.descriptor.viewport;
                }
            }

            // Only read contents a previous pass actually produced;
            // otherwise the attachment starts undefined and is discarded
            // or cleared on entry.
            let incoming_nid = self.fg.current_nid(handle);
            if self.fg.resource_node(incoming_nid).has_writer() {
                if let Err(error) = self.fg.read_impl::<Texture>(self.pass, handle, usage) {
                    log::error!("render target attachment dropped: {error}");
                    continue;
                }
            }
            data.incoming[slot] = Some(incoming_nid);

            match self.fg.write_impl::<Texture>(self.pass, handle, usage) {
                Ok(written) => {
                    data.outgoing[slot] = Some(self.fg.current_nid(written));
                    let written = FrameGraphId::<Texture>::new(written);
                    data.attachment_info[slot] = Some(written);
                    attachments.set_slot(slot, written);
                }
                Err(error) => log::error!("render target attachment dropped: {error}"),
            }
        }

        let id = self
            .fg
            .pass_node_mut(self.pass)
            .as_render_mut()
            .expect("render target declared on a present pass")
            .add_render_target(data);
        (attachments, id)
    }

    /// Declare a single-color render target, updating `color` to the
    /// post-write handle.
    ///
    /// # Panics
    ///
    /// Panics if `color` was never bound to a resource, or if called from
    /// a present pass setup.
    pub fn use_as_render_target_color(&mut self, color: &mut FrameGraphId<Texture>) -> u32 {
        let name = self.name_of(color.handle()).to_string();
        let (attachments, id) =
            self.use_as_render_target(&name, RenderTargetDescriptor::from_color(*color));
        if let Some(written) = attachments.color[0] {
            *color = written;
        }
        id
    }
}
