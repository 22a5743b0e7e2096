//! Platform detection tests
//!
//! Tests for:
//! - Driver and chip-class classification from context strings
//! - Software rasterizer, limited-NPOT and virtual-machine edge cases
//! - Feature flags derived from versions and extensions
//! - Write strategy selection that depends on the detected driver

use glpipe::platform::capabilities::{Capabilities, CompositingType, GlFeatures, NpotSupport, PlatformInterface};
use glpipe::platform::driver::{ChipClass, Driver};
use glpipe::platform::version::Version;
use glpipe::renderer::core::device::{BufferUsage, ContextInfo};
use glpipe::renderer::resources::WriteStrategy;
use glpipe::renderer::settings::{PersistentBufferPolicy, RenderSettings};
use glpipe::HeadlessDevice;

// ============================================================================
// Helper
// ============================================================================

fn context(vendor: &str, renderer: &str, version: &str, extensions: &[&str]) -> ContextInfo {
    ContextInfo {
        vendor: vendor.into(),
        renderer: renderer.into(),
        version: version.into(),
        glsl_version: "1.30".into(),
        extensions: extensions.iter().map(|s| (*s).to_string()).collect(),
    }
}

fn detect(vendor: &str, renderer: &str, version: &str, extensions: &[&str]) -> Capabilities {
    Capabilities::detect(&context(vendor, renderer, version, extensions), PlatformInterface::Glx)
}

// ============================================================================
// Software Rasterizers
// ============================================================================

#[test]
fn softpipe_disables_glsl() {
    let caps = detect("VMware, Inc.", "softpipe", "3.3 (Core Profile) Mesa 23.3.5", &[]);
    assert_eq!(caps.driver, Driver::Softpipe);
    assert!(!caps.supports_glsl);
    assert_eq!(caps.recommended_compositor, CompositingType::Software);
    assert!(!caps.meets_minimum_requirements());
}

#[test]
fn llvmpipe_keeps_glsl() {
    let caps = detect("Mesa", "llvmpipe (LLVM 17.0.6, 256 bits)", "4.5 (Core Profile) Mesa 24.0.5", &[]);
    assert_eq!(caps.driver, Driver::Llvmpipe);
    assert!(caps.supports_glsl);
    assert!(!caps.limited_glsl);
    assert_eq!(caps.recommended_compositor, CompositingType::OpenGl);
    assert_eq!(caps.mesa_version, Version::new(24, 0, 5));
    assert!(caps.is_mesa_driver());
}

// ============================================================================
// Limited Hardware
// ============================================================================

#[test]
fn r500_on_r300g_has_limited_npot() {
    let caps = detect("X.Org R300 Project", "Gallium 0.4 on ATI RV515", "2.1 Mesa 10.1.3", &[]);
    assert_eq!(caps.driver, Driver::R300G);
    assert_eq!(caps.chip_class, ChipClass::R500);
    assert_eq!(caps.npot, NpotSupport::Limited);
    assert!(caps.limited_glsl);
    assert_eq!(caps.recommended_compositor, CompositingType::None);
}

#[test]
fn pre_nv40_proprietary_loses_glsl() {
    let caps = detect("NVIDIA Corporation", "GeForce FX 5200/AGP/SSE2", "2.1.2 NVIDIA 173.14.39", &[]);
    assert_eq!(caps.chip_class, ChipClass::NV30);
    assert!(!caps.supports_glsl);
    assert_eq!(caps.npot, NpotSupport::Limited);
    assert!(caps.prefer_buffer_sub_data);
    assert_eq!(caps.driver_version(), Version::new(173, 14, 39));
}

// ============================================================================
// Virtual Machines
// ============================================================================

#[test]
fn virtual_machines_force_opengl_compositing() {
    let vmware = detect("VMware, Inc.", "SVGA3D; build: RELEASE;  LLVM;", "4.1 (Core Profile) Mesa 23.2.1", &[]);
    assert_eq!(vmware.driver, Driver::VMware);
    assert!(vmware.virtual_machine);
    assert_eq!(vmware.recommended_compositor, CompositingType::OpenGl);

    let virgl = detect("Red Hat", "virgl", "4.3 (Core Profile) Mesa 24.0.0", &[]);
    assert_eq!(virgl.driver, Driver::Virgl);
    assert!(virgl.virtual_machine);
}

#[test]
fn virtual_machine_avoids_persistent_ring_unless_forced() {
    let caps = detect(
        "Red Hat",
        "virgl",
        "4.3 (Core Profile) Mesa 24.0.0",
        &["GL_ARB_buffer_storage", "GL_ARB_sync"],
    );
    let mut settings = RenderSettings::default();
    assert_eq!(WriteStrategy::select(&caps, &settings, BufferUsage::Stream), WriteStrategy::MapRange);

    settings.persistent_buffers = PersistentBufferPolicy::Force;
    assert_eq!(WriteStrategy::select(&caps, &settings, BufferUsage::Stream), WriteStrategy::Persistent);
    // only streaming buffers use the ring
    assert_eq!(WriteStrategy::select(&caps, &settings, BufferUsage::Static), WriteStrategy::MapRange);
}

// ============================================================================
// Feature Flags
// ============================================================================

#[test]
fn headless_profiles_meet_minimum_requirements() {
    let desktop = Capabilities::detect(&HeadlessDevice::desktop_info(), PlatformInterface::Egl);
    assert!(desktop.meets_minimum_requirements());
    assert!(desktop.supports(GlFeatures::BUFFER_STORAGE | GlFeatures::SYNC_FENCES | GlFeatures::INDEXED_QUADS));
    assert!(desktop.loose_binding);

    let gles = Capabilities::detect(&HeadlessDevice::gles_info(), PlatformInterface::Egl);
    assert!(gles.is_gles);
    assert!(gles.meets_minimum_requirements());
    assert!(gles.supports(GlFeatures::ARGB32_TEXTURES));
    assert!(gles.supports(GlFeatures::INDEXED_QUADS));
}

#[test]
fn legacy_desktop_without_extensions() {
    let caps = detect("Intel Open Source Technology Center", "Mesa DRI Intel(R) 945GM", "1.4 Mesa 10.0", &[]);
    assert_eq!(caps.driver, Driver::Intel);
    assert!(!caps.supports(GlFeatures::MAP_BUFFER_RANGE));
    assert!(!caps.supports(GlFeatures::SYNC_FENCES));
    assert_eq!(caps.npot, NpotSupport::None);
    assert_eq!(
        WriteStrategy::select(&caps, &RenderSettings::default(), BufferUsage::Stream),
        WriteStrategy::BufferData
    );
}

#[test]
fn desktop_blits_need_gl3_or_an_extension() {
    let plain = detect("Mesa", "Mesa DRI Intel(R) G45", "2.1 Mesa 10.0", &[]);
    assert!(!plain.supports(GlFeatures::BLITS));
    assert!(!plain.meets_minimum_requirements());

    let blit_ext = detect("Mesa", "Mesa DRI Intel(R) G45", "2.1 Mesa 10.0", &["GL_EXT_framebuffer_blit"]);
    assert!(blit_ext.supports(GlFeatures::BLITS));
    let fbo_ext = detect("Mesa", "Mesa DRI Intel(R) G45", "2.1 Mesa 10.0", &["GL_ARB_framebuffer_object"]);
    assert!(fbo_ext.supports(GlFeatures::BLITS));

    let gl3 = detect("Mesa", "Mesa DRI Intel(R) Ivybridge Desktop", "3.0 Mesa 10.0", &[]);
    assert!(gl3.supports(GlFeatures::BLITS));
}
