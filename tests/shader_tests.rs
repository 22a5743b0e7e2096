//! Shader pipeline tests
//!
//! Tests for:
//! - Program caching by trait bitmask
//! - Bind stack balance through the render context and the scoped guard
//! - Compile failures and the captured driver log
//! - Dialect selection on desktop and GLES contexts
//! - Support checks on contexts that cannot run the pipeline

use std::rc::Rc;

use glam::{IVec2, Mat4, Vec4};
use glpipe::renderer::core::device::{ContextInfo, ShaderStage, UniformValue};
use glpipe::renderer::pipeline::ProgramState;
use glpipe::{GlError, HeadlessDevice, PlatformInterface, RenderContext, RenderSettings, ShaderTraits, UniformSlot};

// ============================================================================
// Helper
// ============================================================================

fn context_with(device: HeadlessDevice) -> RenderContext<HeadlessDevice> {
    let _ = env_logger::builder().is_test(true).try_init();
    RenderContext::new(device, RenderSettings::default(), PlatformInterface::Egl, IVec2::new(256, 256))
        .expect("headless context")
}

fn context() -> RenderContext<HeadlessDevice> {
    context_with(HeadlessDevice::new())
}

// ============================================================================
// Caching
// ============================================================================

#[test]
fn equal_traits_return_the_same_program() {
    let mut cx = context();
    let traits = ShaderTraits::MAP_TEXTURE | ShaderTraits::MODULATE;
    let a = cx.shader(traits).unwrap();
    let b = cx.shader(traits).unwrap();
    assert!(Rc::ptr_eq(&a, &b));
    assert!(a.is_valid());

    let other = cx.shader(ShaderTraits::MAP_TEXTURE).unwrap();
    assert!(!Rc::ptr_eq(&a, &other));
    assert_eq!(cx.shader_manager().cached_count(), 2);
}

#[test]
fn custom_sources_are_cached_by_content() {
    let mut cx = context();
    let fragment = "#version 140\nuniform vec4 tint;\nout vec4 fragColor;\nvoid main() { fragColor = tint; }\n";
    let a = cx.custom_shader(ShaderTraits::empty(), "", fragment).unwrap();
    let b = cx.custom_shader(ShaderTraits::empty(), "", fragment).unwrap();
    assert!(Rc::ptr_eq(&a, &b));

    cx.push_program(Rc::clone(&a));
    assert!(a.set_uniform_by_name(cx.device_mut(), "tint", Vec4::new(1.0, 0.0, 0.0, 1.0)));
    assert_eq!(
        cx.device().uniform_value(a.handle(), "tint"),
        Some(UniformValue::Vec4(Vec4::new(1.0, 0.0, 0.0, 1.0)))
    );
    cx.pop_shader().unwrap();
}

// ============================================================================
// Bind Stack
// ============================================================================

#[test]
fn push_pop_restores_previous_program() {
    let mut cx = context();
    let outer = cx.push_shader(ShaderTraits::UNIFORM_COLOR).unwrap();

    let first = cx.shader(ShaderTraits::MAP_TEXTURE | ShaderTraits::MODULATE).unwrap();
    let again = cx.shader(ShaderTraits::MAP_TEXTURE | ShaderTraits::MODULATE).unwrap();
    assert!(Rc::ptr_eq(&first, &again));

    cx.push_program(Rc::clone(&first));
    cx.push_shader(ShaderTraits::MAP_TEXTURE | ShaderTraits::ADJUST_SATURATION)
        .unwrap();
    assert_ne!(cx.device().current_program(), Some(first.handle()));

    cx.pop_shader().unwrap();
    assert_eq!(cx.device().current_program(), Some(first.handle()));
    cx.pop_shader().unwrap();
    assert_eq!(cx.device().current_program(), Some(outer.handle()));
    assert!(Rc::ptr_eq(cx.bound_shader().unwrap(), &outer));

    cx.pop_shader().unwrap();
    assert_eq!(cx.device().current_program(), None);
    assert!(matches!(cx.pop_shader(), Err(GlError::ShaderStackUnderflow)));
}

#[test]
fn guard_sets_uniforms_and_unbinds() {
    let mut cx = context();
    let handle = {
        let mut binding = cx.bind_shader(ShaderTraits::MAP_TEXTURE).unwrap();
        assert!(binding.set_uniform(UniformSlot::ModelViewProjectionMatrix, Mat4::IDENTITY));
        assert!(!binding.set_uniform(UniformSlot::Saturation, 0.5));
        binding.program().handle()
    };
    assert_eq!(cx.device().current_program(), None);
    assert_eq!(
        cx.device().uniform_value(handle, "modelViewProjectionMatrix"),
        Some(UniformValue::Mat4(Mat4::IDENTITY))
    );
}

// ============================================================================
// Failures
// ============================================================================

#[test]
fn compile_failure_keeps_driver_log() {
    let mut cx = context();
    let program = cx
        .load_shader_from_code("#version 140\nvoid main() {}\n", "#version 140\n#error broken\n")
        .unwrap();
    assert_eq!(program.state(), ProgramState::Invalid);
    assert!(program.info_log().contains("#error"), "{}", program.info_log());
    assert!(!program.set_uniform(cx.device_mut(), UniformSlot::GeometryColor, Vec4::ONE));
}

#[test]
fn software_rasterizer_is_unsupported() {
    let info = ContextInfo {
        vendor: "VMware, Inc.".into(),
        renderer: "softpipe".into(),
        version: "3.3 (Core Profile) Mesa 23.3.5".into(),
        glsl_version: "3.30".into(),
        extensions: Default::default(),
    };
    let mut cx = context_with(HeadlessDevice::with_info(info));
    assert!(matches!(cx.check_supported(), Err(GlError::Unsupported(_))));
}

#[test]
fn capable_context_passes_support_check() {
    let mut cx = context();
    cx.check_supported().unwrap();
    let mut gles = context_with(HeadlessDevice::with_info(HeadlessDevice::gles_info()));
    gles.check_supported().unwrap();
}

// ============================================================================
// Dialects
// ============================================================================

#[test]
fn gles_programs_use_es_header() {
    let mut cx = context_with(HeadlessDevice::with_info(HeadlessDevice::gles_info()));
    let program = cx.shader(ShaderTraits::MAP_TEXTURE).unwrap();
    let stages = &cx.device().program(program.handle()).unwrap().stages;
    let fragment = stages
        .iter()
        .find(|(stage, _)| *stage == ShaderStage::Fragment)
        .map(|(_, source)| source.as_str())
        .unwrap();
    assert!(fragment.starts_with("#version 300 es"), "{fragment}");
    assert!(fragment.contains("precision"));
}
