//! End-to-end frame graph tests.
//!
//! Each test declares a small graph against mock driver/allocator objects
//! and asserts the observable event order: culling decisions, resource
//! create/destroy interleaving, marker bracketing, and usage aggregation.

mod common;

use rstest::rstest;

use common::{
    Event, MockAllocator, MockDriver, count, event_log, position, record_execute,
    small_color_descriptor,
};
use framegraph::{
    FrameGraph, FrameGraphId, ImportedRenderTargetDescriptor, RenderTargetDescriptor,
    RenderTargetHandle, TargetBufferFlags, Texture, TextureHandle, TextureSubResourceDescriptor,
    TextureUsage, Viewport,
};

/// A pass whose outputs nobody consumes disappears: its executor never
/// runs and its resources are never allocated.
#[test]
fn test_unused_pass_is_culled() {
    let events = event_log();
    let mut fg = FrameGraph::new();

    let log = events.clone();
    fg.add_pass(
        "a",
        |builder| {
            let x = builder.create::<Texture>("x", small_color_descriptor());
            builder.write(x, TextureUsage::COLOR_ATTACHMENT)
        },
        move |_, _, _| record_execute(&log, "a"),
    );

    let log = events.clone();
    let y = fg.add_pass(
        "b",
        |builder| {
            let y = builder.create::<Texture>("y", small_color_descriptor());
            builder.write(y, TextureUsage::COLOR_ATTACHMENT)
        },
        move |_, _, _| record_execute(&log, "b"),
    );

    fg.add_present_pass(|builder| {
        builder.read(y, TextureUsage::COLOR_ATTACHMENT);
    });

    let mut driver = MockDriver::new(events.clone());
    let mut allocator = MockAllocator::new(events.clone());
    fg.compile().execute(&mut driver, &mut allocator);

    assert_eq!(count(&events, &Event::Execute("a".into())), 0);
    assert_eq!(count(&events, &Event::Execute("b".into())), 1);
    assert_eq!(count(&events, &Event::CreateTexture("x".into())), 0);
    assert_eq!(count(&events, &Event::CreateTexture("y".into())), 1);
    assert_eq!(count(&events, &Event::DestroyTexture("y".into())), 1);
    assert!(allocator.is_balanced());
}

/// Successive writes alias one backing: the slot index never changes, each
/// overwrite bumps the version, and only the latest handle stays valid.
#[test]
fn test_write_aliasing_versions() {
    let events = event_log();
    let mut fg = FrameGraph::new();

    let x0 = fg.create::<Texture>("x", small_color_descriptor());

    let log = events.clone();
    let xa = fg.add_pass(
        "a",
        |builder| builder.write(x0, TextureUsage::COLOR_ATTACHMENT),
        move |_, _, _| record_execute(&log, "a"),
    );
    let log = events.clone();
    let xb = fg.add_pass(
        "b",
        |builder| builder.write(xa, TextureUsage::COLOR_ATTACHMENT),
        move |_, _, _| record_execute(&log, "b"),
    );

    fg.add_present_pass(|builder| {
        builder.read(xb, TextureUsage::COLOR_ATTACHMENT);
    });

    // The first write of a fresh resource keeps v0; the overwrite bumps.
    assert_eq!(xa.version(), 0);
    assert_eq!(xb.version(), 1);
    assert_eq!(x0.handle().index, xb.handle().index);
    assert!(fg.is_valid(xb.handle()));
    assert!(!fg.is_valid(xa.handle()));

    let mut driver = MockDriver::new(events.clone());
    let mut allocator = MockAllocator::new(events.clone());
    fg.compile().execute(&mut driver, &mut allocator);

    // Both writers run, in declaration order, over one allocation.
    let a = position(&events, &Event::Execute("a".into()));
    let b = position(&events, &Event::Execute("b".into()));
    assert!(a < b);
    assert_eq!(count(&events, &Event::CreateTexture("x".into())), 1);
    assert_eq!(count(&events, &Event::DestroyTexture("x".into())), 1);
    assert!(allocator.is_balanced());
}

/// Reading a sub-resource lifts its usage into the parent, which owns the
/// single backing allocation.
#[test]
fn test_subresource_usage_lifted_to_parent() {
    let events = event_log();
    let mut fg = FrameGraph::new();

    let t = fg.create::<Texture>(
        "t",
        small_color_descriptor().with_mip_levels(4),
    );
    let s = fg.create_subresource(t, "t[mip1]", TextureSubResourceDescriptor::mip(1));

    let log = events.clone();
    fg.add_pass(
        "p",
        |builder| {
            builder.side_effect();
            builder.read(s, TextureUsage::SAMPLEABLE)
        },
        move |s, resources, _| {
            record_execute(&log, "p");
            assert_eq!(resources.usage(*s), TextureUsage::SAMPLEABLE);
            assert_eq!(resources.sub_resource_descriptor(*s).mip_level, 1);
            // the sub-resource shares the parent's backing
            assert!(resources.get(*s).handle.is_some());
        },
    );

    let mut driver = MockDriver::new(events.clone());
    let mut allocator = MockAllocator::new(events.clone());
    fg.compile().execute(&mut driver, &mut allocator);

    assert_eq!(count(&events, &Event::Execute("p".into())), 1);
    // only the parent allocates, and it carries the lifted usage
    assert_eq!(count(&events, &Event::CreateTexture("t".into())), 1);
    assert_eq!(count(&events, &Event::CreateTexture("t[mip1]".into())), 0);
    assert!(allocator.created_usage["t"].contains(TextureUsage::SAMPLEABLE));
    assert!(allocator.is_balanced());
}

/// Declaring a usage outside an imported resource's capabilities drops the
/// edge without failing the rest of the graph.
#[test]
fn test_imported_usage_violation_is_nonfatal() {
    let events = event_log();
    let mut fg = FrameGraph::new();

    let rt = fg.import_render_target(
        "rt",
        ImportedRenderTargetDescriptor {
            viewport: Viewport::new(800, 600),
            attachments: TargetBufferFlags::COLOR0,
            samples: 1,
        },
        RenderTargetHandle::new(7),
    );

    let log = events.clone();
    fg.add_pass(
        "p",
        |builder| {
            builder.side_effect();
            let read = builder.read(rt, TextureUsage::SAMPLEABLE);
            assert!(!read.is_initialized());
        },
        move |_, _, _| record_execute(&log, "p"),
    );

    let mut driver = MockDriver::new(events.clone());
    let mut allocator = MockAllocator::new(events.clone());
    fg.compile().execute(&mut driver, &mut allocator);

    // the graph still compiled and ran, and nothing touched the import
    assert_eq!(count(&events, &Event::Execute("p".into())), 1);
    assert_eq!(count(&events, &Event::DestroyRenderTarget("rt".into())), 0);
    assert_eq!(count(&events, &Event::CreateTexture("rt".into())), 0);
    assert!(allocator.is_balanced());
}

/// A declared render target is allocated after its attachments and
/// released right after the executor, inside the attachment lifetime.
#[test]
fn test_render_target_lifetime() {
    let events = event_log();
    let mut fg = FrameGraph::new();

    let log = events.clone();
    fg.add_pass(
        "p",
        |builder| {
            builder.side_effect();
            let c = builder.create::<Texture>("c", small_color_descriptor());
            let (attachments, id) =
                builder.use_as_render_target("c_target", RenderTargetDescriptor::from_color(c));
            (attachments.color[0].unwrap(), id)
        },
        move |(c, id), resources, _| {
            record_execute(&log, "p");
            let info = resources.render_pass_info(*id);
            assert_eq!(info.params.viewport, Viewport::new(16, 16));
            // never written before this pass: contents start undefined
            assert!(info.params.discard_start.contains(TargetBufferFlags::COLOR0));
            assert!(resources.get(*c).handle.is_some());
        },
    );

    let mut driver = MockDriver::new(events.clone());
    let mut allocator = MockAllocator::new(events.clone());
    fg.compile().execute(&mut driver, &mut allocator);

    let create_c = position(&events, &Event::CreateTexture("c".into()));
    let create_rt = position(&events, &Event::CreateRenderTarget("c_target".into()));
    let execute = position(&events, &Event::Execute("p".into()));
    let destroy_rt = position(&events, &Event::DestroyRenderTarget("c_target".into()));
    let destroy_c = position(&events, &Event::DestroyTexture("c".into()));
    assert!(create_c < create_rt);
    assert!(create_rt < execute);
    assert!(execute < destroy_rt);
    assert!(destroy_rt < destroy_c);
    assert!(allocator.is_balanced());
}

/// Diamond: one producer feeding two consumers stays alive until the later
/// consumer, and its usage is the union across all live edges.
#[test]
fn test_diamond_lifetimes() {
    let events = event_log();
    let mut fg = FrameGraph::new();

    let log = events.clone();
    let x = fg.add_pass(
        "a",
        |builder| {
            let x = builder.create::<Texture>("x", small_color_descriptor());
            builder.write(x, TextureUsage::COLOR_ATTACHMENT)
        },
        move |_, _, _| record_execute(&log, "a"),
    );

    let log = events.clone();
    let y = fg.add_pass(
        "b",
        |builder| {
            builder.read(x, TextureUsage::SAMPLEABLE);
            let y = builder.create::<Texture>("y", small_color_descriptor());
            builder.write(y, TextureUsage::COLOR_ATTACHMENT)
        },
        move |_, _, _| record_execute(&log, "b"),
    );

    let log = events.clone();
    let z = fg.add_pass(
        "c",
        |builder| {
            builder.read(x, TextureUsage::SAMPLEABLE);
            let z = builder.create::<Texture>("z", small_color_descriptor());
            builder.write(z, TextureUsage::COLOR_ATTACHMENT)
        },
        move |_, _, _| record_execute(&log, "c"),
    );

    fg.add_present_pass(|builder| {
        builder.read(y, TextureUsage::COLOR_ATTACHMENT);
        builder.read(z, TextureUsage::COLOR_ATTACHMENT);
    });

    let mut driver = MockDriver::new(events.clone());
    let mut allocator = MockAllocator::new(events.clone());
    fg.compile().execute(&mut driver, &mut allocator);

    for name in ["a", "b", "c"] {
        assert_eq!(count(&events, &Event::Execute(name.into())), 1, "pass {name}");
    }

    // x is created by a and lives until c, the later of its two readers
    let create_x = position(&events, &Event::CreateTexture("x".into()));
    let destroy_x = position(&events, &Event::DestroyTexture("x".into()));
    let a = position(&events, &Event::Execute("a".into()));
    let b = position(&events, &Event::Execute("b".into()));
    let c = position(&events, &Event::Execute("c".into()));
    assert!(create_x < a);
    assert!(a < b && b < c);
    assert!(c < destroy_x);

    assert_eq!(
        allocator.created_usage["x"],
        TextureUsage::COLOR_ATTACHMENT | TextureUsage::SAMPLEABLE
    );
    assert!(allocator.is_balanced());
}

/// Every non-imported live resource sees exactly one create and one
/// destroy; imported resources see neither.
#[test]
fn test_allocator_balance_with_import() {
    let events = event_log();
    let mut fg = FrameGraph::new();

    let external = fg.import_texture(
        "external",
        small_color_descriptor(),
        TextureUsage::SAMPLEABLE,
        TextureHandle::new(99),
    );

    let out = fg.add_pass(
        "p",
        |builder| {
            builder.read(external, TextureUsage::SAMPLEABLE);
            let out = builder.create::<Texture>("out", small_color_descriptor());
            builder.write(out, TextureUsage::COLOR_ATTACHMENT)
        },
        move |_, resources, _| {
            assert_eq!(resources.pass_name(), "p");
            // imported backing resolves to the external handle
            assert_eq!(resources.get(external).handle, Some(TextureHandle::new(99)));
        },
    );

    fg.add_present_pass(|builder| {
        builder.read(out, TextureUsage::COLOR_ATTACHMENT);
    });

    let mut driver = MockDriver::new(events.clone());
    let mut allocator = MockAllocator::new(events.clone());
    fg.compile().execute(&mut driver, &mut allocator);

    assert_eq!(count(&events, &Event::CreateTexture("out".into())), 1);
    assert_eq!(count(&events, &Event::DestroyTexture("out".into())), 1);
    assert_eq!(count(&events, &Event::CreateTexture("external".into())), 0);
    assert_eq!(count(&events, &Event::DestroyTexture("external".into())), 0);
    assert!(allocator.is_balanced());
}

/// The frame and every live pass are bracketed with group markers, and the
/// GPU is kicked once before the frame marker closes.
#[test]
fn test_group_marker_bracketing() {
    let events = event_log();
    let mut fg = FrameGraph::new();

    let log = events.clone();
    let y = fg.add_pass(
        "lit",
        |builder| {
            let y = builder.create::<Texture>("y", small_color_descriptor());
            builder.write(y, TextureUsage::COLOR_ATTACHMENT)
        },
        move |_, _, _| record_execute(&log, "lit"),
    );
    fg.add_pass(
        "dead",
        |builder| {
            let d = builder.create::<Texture>("d", small_color_descriptor());
            builder.write(d, TextureUsage::COLOR_ATTACHMENT)
        },
        |_, _, _| panic!("culled pass executed"),
    );
    fg.add_present_pass(|builder| {
        builder.read(y, TextureUsage::COLOR_ATTACHMENT);
    });

    let mut driver = MockDriver::new(events.clone());
    let mut allocator = MockAllocator::new(events.clone());
    fg.compile().execute(&mut driver, &mut allocator);

    let log = events.borrow();
    assert_eq!(log.first(), Some(&Event::PushMarker("FrameGraph".into())));
    assert_eq!(log.last(), Some(&Event::PopMarker));
    assert_eq!(log[log.len() - 2], Event::Flush);
    drop(log);

    assert_eq!(count(&events, &Event::PushMarker("lit".into())), 1);
    assert_eq!(count(&events, &Event::PushMarker("present".into())), 1);
    assert_eq!(count(&events, &Event::PushMarker("dead".into())), 0);
    // one pop per pushed marker
    let pushes = events
        .borrow()
        .iter()
        .filter(|e| matches!(e, Event::PushMarker(_)))
        .count();
    assert_eq!(count(&events, &Event::PopMarker), pushes);
}

/// A pass with no consumed outputs survives only when it declares a side
/// effect.
#[rstest]
#[case::anchored(true)]
#[case::unanchored(false)]
fn test_side_effect_controls_culling(#[case] side_effect: bool) {
    let events = event_log();
    let mut fg = FrameGraph::new();

    let log = events.clone();
    fg.add_pass(
        "standalone",
        |builder| {
            if side_effect {
                builder.side_effect();
            }
            let x = builder.create::<Texture>("x", small_color_descriptor());
            builder.write(x, TextureUsage::COLOR_ATTACHMENT)
        },
        move |_, _, _| record_execute(&log, "standalone"),
    );

    let mut driver = MockDriver::new(events.clone());
    let mut allocator = MockAllocator::new(events.clone());
    fg.compile().execute(&mut driver, &mut allocator);

    let expected = if side_effect { 1 } else { 0 };
    assert_eq!(count(&events, &Event::Execute("standalone".into())), expected);
    assert_eq!(count(&events, &Event::CreateTexture("x".into())), expected);
    assert!(allocator.is_balanced());
}

/// Rebuilding an identical graph after a frame produces the same culling
/// decisions, lifetimes, and event order.
#[test]
fn test_rebuild_is_idempotent() {
    fn build_and_run(fg: &mut FrameGraph, events: &common::EventLog) {
        let log = events.clone();
        fg.add_pass(
            "dead",
            |builder| {
                let d = builder.create::<Texture>("d", small_color_descriptor());
                builder.write(d, TextureUsage::COLOR_ATTACHMENT)
            },
            move |_, _, _| record_execute(&log, "dead"),
        );
        let log = events.clone();
        let y = fg.add_pass(
            "live",
            |builder| {
                let y = builder.create::<Texture>("y", small_color_descriptor());
                builder.write(y, TextureUsage::COLOR_ATTACHMENT)
            },
            move |_, _, _| record_execute(&log, "live"),
        );
        fg.add_present_pass(|builder| {
            builder.read(y, TextureUsage::COLOR_ATTACHMENT);
        });

        let mut driver = MockDriver::new(events.clone());
        let mut allocator = MockAllocator::new(events.clone());
        fg.compile().execute(&mut driver, &mut allocator);
        assert!(allocator.is_balanced());
    }

    let mut fg = FrameGraph::new();
    let first = event_log();
    build_and_run(&mut fg, &first);
    let second = event_log();
    build_and_run(&mut fg, &second);

    assert_eq!(*first.borrow(), *second.borrow());
}

/// Declaring an imported render target reuses the imported backend target
/// instead of allocating one.
#[test]
fn test_imported_render_target_reused() {
    let events = event_log();
    let mut fg = FrameGraph::new();

    let backbuffer = fg.import_render_target(
        "backbuffer",
        ImportedRenderTargetDescriptor {
            viewport: Viewport::new(1920, 1080),
            attachments: TargetBufferFlags::COLOR0,
            samples: 1,
        },
        RenderTargetHandle::new(7),
    );

    let log = events.clone();
    fg.add_pass(
        "blit",
        |builder| {
            builder.side_effect();
            let mut color: FrameGraphId<Texture> = backbuffer;
            builder.use_as_render_target_color(&mut color)
        },
        move |id, resources, _| {
            record_execute(&log, "blit");
            let info = resources.render_pass_info(*id);
            assert_eq!(info.target, RenderTargetHandle::new(7));
            assert_eq!(info.params.viewport, Viewport::new(1920, 1080));
            // externally owned contents are never discarded
            assert!(info.params.discard_start.is_empty());
            assert!(info.params.discard_end.is_empty());
        },
    );

    let mut driver = MockDriver::new(events.clone());
    let mut allocator = MockAllocator::new(events.clone());
    fg.compile().execute(&mut driver, &mut allocator);

    assert_eq!(count(&events, &Event::Execute("blit".into())), 1);
    assert_eq!(count(&events, &Event::CreateRenderTarget("backbuffer".into())), 0);
    assert_eq!(count(&events, &Event::DestroyRenderTarget("backbuffer".into())), 0);
    assert!(allocator.is_balanced());
}
