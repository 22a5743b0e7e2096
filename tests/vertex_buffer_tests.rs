//! Streaming vertex buffer tests
//!
//! Tests for:
//! - Writes through the render context landing at the reported base address
//! - Persistent ring wrap-around guarded by fences across frames
//! - Fence timeouts that abandon a single write
//! - Quad emulation with base-vertex indexed draws
//! - Clipped draws and the scissor rectangles they produce

use glam::{IVec2, Vec2};
use glpipe::renderer::core::device::DrawMode;
use glpipe::renderer::core::headless::DrawCall;
use glpipe::renderer::resources::{GLVertex2D, Primitive, WriteStrategy};
use glpipe::renderer::settings::PersistentBufferPolicy;
use glpipe::{GlError, HeadlessDevice, PlatformInterface, Rect, RenderContext, RenderSettings, ShaderTraits};

// ============================================================================
// Helper
// ============================================================================

fn context_with(device: HeadlessDevice, settings: RenderSettings) -> RenderContext<HeadlessDevice> {
    let _ = env_logger::builder().is_test(true).try_init();
    RenderContext::new(device, settings, PlatformInterface::Egl, IVec2::new(256, 256)).expect("headless context")
}

fn map_range_context() -> RenderContext<HeadlessDevice> {
    let mut settings = RenderSettings::default();
    settings.persistent_buffers = PersistentBufferPolicy::Disable;
    context_with(HeadlessDevice::new(), settings)
}

/// A persistent ring of 1 KiB, small enough to wrap after four 256-byte frames.
fn small_ring_context() -> RenderContext<HeadlessDevice> {
    let mut settings = RenderSettings::default();
    settings.persistent_buffers = PersistentBufferPolicy::Force;
    settings.ring.min_persistent_size = 1024;
    context_with(HeadlessDevice::new(), settings)
}

/// Runs one frame that streams `size` bytes of `fill` and returns the
/// offset the write landed at.
fn stream_frame(cx: &mut RenderContext<HeadlessDevice>, size: usize, fill: u8) -> usize {
    cx.begin_frame();
    let offset = {
        let mut stream = cx.streaming_buffer();
        stream.map(size).expect("ring write").fill(fill);
        stream.unmap().expect("unmap");
        stream.buffer().base_address()
    };
    cx.end_frame();
    offset
}

fn quad(x: f32, y: f32, size: f32) -> [GLVertex2D; 4] {
    let corner = |px: f32, py: f32, u: f32, v: f32| GLVertex2D {
        position: Vec2::new(px, py),
        texcoord: Vec2::new(u, v),
    };
    [
        corner(x, y, 0.0, 1.0),
        corner(x + size, y, 1.0, 1.0),
        corner(x + size, y + size, 1.0, 0.0),
        corner(x, y + size, 0.0, 0.0),
    ]
}

// ============================================================================
// Mapped Ranges
// ============================================================================

#[test]
fn map_range_writes_land_at_base_address() {
    let mut cx = map_range_context();
    assert_eq!(cx.vertex_buffer().strategy(), WriteStrategy::MapRange);

    let (handle, first, second) = {
        let mut stream = cx.streaming_buffer();
        stream.set_data(&[7u8; 64]).unwrap();
        let first = stream.buffer().base_address();
        stream.set_data(&[9u8; 32]).unwrap();
        let second = stream.buffer().base_address();
        (stream.buffer().handle().unwrap(), first, second)
    };
    assert_eq!(first, 0);
    assert!(second >= first + 64);

    let contents = cx.device().buffer_contents(handle).unwrap();
    assert!(contents[first..first + 64].iter().all(|&b| b == 7));
    assert!(contents[second..second + 32].iter().all(|&b| b == 9));
    assert_eq!(cx.device().stats().buffer_maps, 2);
}

#[test]
fn unmap_without_map_is_an_error() {
    let mut cx = map_range_context();
    let mut stream = cx.streaming_buffer();
    assert!(matches!(stream.unmap(), Err(GlError::NotMapped)));
}

// ============================================================================
// Persistent Ring
// ============================================================================

#[test]
fn ring_wraps_and_waits_for_the_oldest_frame() {
    let mut cx = small_ring_context();
    assert_eq!(cx.vertex_buffer().strategy(), WriteStrategy::Persistent);

    let offsets: Vec<usize> = (0..4).map(|i| stream_frame(&mut cx, 256, i as u8 + 1)).collect();
    assert_eq!(offsets, [0, 256, 512, 768]);
    assert_eq!(cx.vertex_buffer().capacity(), 1024);
    assert_eq!(cx.vertex_buffer().fences().len(), 4);
    assert_eq!(cx.device().stats().fence_waits, 0);

    // the GPU never caught up, so reusing the head of the ring must stall
    let wrapped = stream_frame(&mut cx, 256, 0xAA);
    assert_eq!(wrapped, 0);
    assert_eq!(cx.device().stats().fence_waits, 1);

    let handle = cx.vertex_buffer().handle().unwrap();
    let contents = cx.device().buffer_contents(handle).unwrap();
    assert!(contents[..256].iter().all(|&b| b == 0xAA));
    assert!(contents[256..512].iter().all(|&b| b == 2));
}

#[test]
fn completed_frames_free_the_ring_without_stalling() {
    let mut cx = small_ring_context();
    for i in 0..4 {
        stream_frame(&mut cx, 256, i);
    }
    cx.device_mut().complete_gpu_work();

    assert_eq!(stream_frame(&mut cx, 256, 0x55), 0);
    assert_eq!(cx.device().stats().fence_waits, 0);
    // reaping keeps the newest fence
    assert!(!cx.vertex_buffer().fences().is_empty());
}

#[test]
fn hung_gpu_abandons_only_the_write() {
    let mut cx = small_ring_context();
    for i in 0..4 {
        stream_frame(&mut cx, 256, i);
    }

    cx.device_mut().set_hang(true);
    cx.begin_frame();
    {
        let mut stream = cx.streaming_buffer();
        assert!(matches!(stream.map(256), Err(GlError::FenceWaitTimeout { .. })));
        assert!(matches!(stream.unmap(), Err(GlError::NotMapped)));
    }
    cx.end_frame();
    assert_eq!(cx.device().stats().fence_timeouts, 1);

    cx.device_mut().set_hang(false);
    let offset = stream_frame(&mut cx, 256, 0x11);
    assert_eq!(offset, 0);
}

// ============================================================================
// Drawing
// ============================================================================

#[test]
fn quads_draw_as_indexed_triangles() {
    let mut cx = context_with(HeadlessDevice::new(), RenderSettings::default());
    cx.push_shader(ShaderTraits::MAP_TEXTURE).unwrap();
    {
        let mut stream = cx.streaming_buffer();
        let mut vertices = Vec::new();
        vertices.extend_from_slice(&quad(0.0, 0.0, 16.0));
        vertices.extend_from_slice(&quad(32.0, 0.0, 16.0));
        stream.set_vertices(&vertices).unwrap();
        stream.render(Primitive::Quads, None).unwrap();
    }
    cx.pop_shader().unwrap();

    let draws: &[DrawCall] = cx.device().draws();
    assert_eq!(draws.len(), 1);
    assert_eq!(draws[0].mode, DrawMode::Triangles);
    assert_eq!(draws[0].count, 12);
    assert_eq!(draws[0].base_vertex, Some(0));
    assert_eq!(draws[0].scissor, None);
    assert!(cx.index_buffer().capacity() >= 2);
}

#[test]
fn quads_need_base_vertex_draws() {
    let info = glpipe::renderer::core::device::ContextInfo {
        vendor: "Intel".into(),
        renderer: "Mesa Intel(R) HD Graphics 4000 (IVB GT2)".into(),
        version: "3.0 Mesa 21.0.0".into(),
        glsl_version: "1.30".into(),
        extensions: ["GL_ARB_map_buffer_range"].iter().map(|s| (*s).to_string()).collect(),
    };
    let mut cx = context_with(HeadlessDevice::with_info(info), RenderSettings::default());
    let mut stream = cx.streaming_buffer();
    stream.set_vertices(&quad(0.0, 0.0, 8.0)).unwrap();
    assert!(matches!(stream.render(Primitive::Quads, None), Err(GlError::Unsupported(_))));
    stream
        .render(Primitive::TriangleFan, None)
        .expect("fans need no indices");
}

#[test]
fn clipped_draws_use_bottom_up_scissors() {
    let mut cx = context_with(HeadlessDevice::new(), RenderSettings::default());
    cx.push_shader(ShaderTraits::UNIFORM_COLOR).unwrap();
    let region = [Rect::new(10, 20, 30, 40), Rect::new(0, 0, 5, 5)];
    {
        let mut stream = cx.streaming_buffer();
        stream.set_vertices(&quad(0.0, 0.0, 64.0)).unwrap();
        stream.render(Primitive::TriangleFan, Some(&region)).unwrap();
        // clipping is scoped to the clipped draw
        stream.render(Primitive::TriangleFan, None).unwrap();
    }
    cx.pop_shader().unwrap();

    let scissors: Vec<_> = cx.device().draws().iter().map(|d| d.scissor).collect();
    assert_eq!(scissors, [Some([10, 196, 30, 40]), Some([0, 251, 5, 5]), None]);
    assert!(cx.device().draws().iter().all(|d| d.mode == DrawMode::TriangleFan));
}

#[test]
fn draw_subrange_keeps_first_vertex() {
    let mut cx = context_with(HeadlessDevice::new(), RenderSettings::default());
    {
        let mut stream = cx.streaming_buffer();
        let mut vertices = Vec::new();
        vertices.extend_from_slice(&quad(0.0, 0.0, 4.0));
        vertices.extend_from_slice(&quad(8.0, 8.0, 4.0));
        stream.set_vertices(&vertices).unwrap();
        stream.draw(Primitive::TriangleFan, 4, 4, None).unwrap();
    }
    let draw = &cx.device().draws()[0];
    assert_eq!((draw.first, draw.count), (4, 4));
    assert_eq!(draw.vertex_buffer, cx.vertex_buffer().handle());
}
