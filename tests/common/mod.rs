//! Shared mocks for frame graph integration tests.
//!
//! The driver, the allocator, and pass executors all append to one ordered
//! event log, so tests can assert how creates, executor invocations, and
//! destroys interleave.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use framegraph::{
    DriverApi, RenderTargetCreateInfo, RenderTargetHandle, ResourceAllocator, TextureDescriptor,
    TextureFormat, TextureHandle, TextureUsage,
};

/// One observable action performed through the mocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    CreateTexture(String),
    DestroyTexture(String),
    CreateRenderTarget(String),
    DestroyRenderTarget(String),
    PushMarker(String),
    PopMarker,
    Flush,
    /// Recorded by pass executors.
    Execute(String),
}

pub type EventLog = Rc<RefCell<Vec<Event>>>;

pub fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

/// Push an executor event onto the log.
pub fn record_execute(events: &EventLog, name: &str) {
    events.borrow_mut().push(Event::Execute(name.to_string()));
}

/// A 16x16 RGBA texture descriptor.
pub fn small_color_descriptor() -> TextureDescriptor {
    TextureDescriptor::new_2d(16, 16, TextureFormat::Rgba8Unorm)
}

pub struct MockDriver {
    pub events: EventLog,
}

impl MockDriver {
    pub fn new(events: EventLog) -> Self {
        Self { events }
    }
}

impl DriverApi for MockDriver {
    fn push_group_marker(&mut self, name: &str) {
        self.events
            .borrow_mut()
            .push(Event::PushMarker(name.to_string()));
    }

    fn pop_group_marker(&mut self) {
        self.events.borrow_mut().push(Event::PopMarker);
    }

    fn flush(&mut self) {
        self.events.borrow_mut().push(Event::Flush);
    }
}

/// Allocator that hands out sequential handles and remembers what it made.
pub struct MockAllocator {
    pub events: EventLog,
    next_id: u64,
    live_textures: HashMap<u64, String>,
    live_targets: HashMap<u64, String>,
    /// Usage each texture was created with, by name.
    pub created_usage: HashMap<String, TextureUsage>,
}

impl MockAllocator {
    pub fn new(events: EventLog) -> Self {
        Self {
            events,
            next_id: 0,
            live_textures: HashMap::new(),
            live_targets: HashMap::new(),
            created_usage: HashMap::new(),
        }
    }

    /// Check that every allocation was released.
    pub fn is_balanced(&self) -> bool {
        self.live_textures.is_empty() && self.live_targets.is_empty()
    }
}

impl ResourceAllocator for MockAllocator {
    fn create_texture(
        &mut self,
        name: &str,
        _descriptor: &TextureDescriptor,
        usage: TextureUsage,
    ) -> TextureHandle {
        self.next_id += 1;
        self.live_textures.insert(self.next_id, name.to_string());
        self.created_usage.insert(name.to_string(), usage);
        self.events
            .borrow_mut()
            .push(Event::CreateTexture(name.to_string()));
        TextureHandle::new(self.next_id)
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        let name = self
            .live_textures
            .remove(&handle.id())
            .expect("texture destroyed twice or never created");
        self.events.borrow_mut().push(Event::DestroyTexture(name));
    }

    fn create_render_target(
        &mut self,
        name: &str,
        _info: &RenderTargetCreateInfo,
    ) -> RenderTargetHandle {
        self.next_id += 1;
        self.live_targets.insert(self.next_id, name.to_string());
        self.events
            .borrow_mut()
            .push(Event::CreateRenderTarget(name.to_string()));
        RenderTargetHandle::new(self.next_id)
    }

    fn destroy_render_target(&mut self, handle: RenderTargetHandle) {
        let name = self
            .live_targets
            .remove(&handle.id())
            .expect("render target destroyed twice or never created");
        self.events
            .borrow_mut()
            .push(Event::DestroyRenderTarget(name));
    }
}

/// Index of the first event equal to `event`.
///
/// # Panics
///
/// Panics if the event never happened.
pub fn position(events: &EventLog, event: &Event) -> usize {
    events
        .borrow()
        .iter()
        .position(|e| e == event)
        .unwrap_or_else(|| panic!("event {event:?} not found"))
}

/// Number of occurrences of `event`.
pub fn count(events: &EventLog, event: &Event) -> usize {
    events.borrow().iter().filter(|e| *e == event).count()
}
