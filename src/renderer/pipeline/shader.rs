//! Shader Program
//!
//! A [`ShaderProgram`] wraps one GPU program object together with its
//! compile/link state and a lazily resolved table of uniform locations.
//!
//! ```text
//!   Unlinked ──load()──► (stage fails) ──────────────► Invalid
//!      │                                                  ▲
//!      └──load()/link()──► link ok ──► Valid    link fails┘
//! ```
//!
//! Both terminal states are permanent; a failed program keeps the driver log
//! in [`info_log`](ShaderProgram::info_log).

use std::cell::{OnceCell, RefCell};

use bitflags::bitflags;
use glam::{Mat3, Mat4, Vec2, Vec4};
use rustc_hash::FxHashMap;

use super::shader_gen::GlslDialect;
use crate::errors::Result;
use crate::renderer::core::device::{GraphicsDevice, ProgramHandle, ShaderStage, UniformLocation, UniformValue};
use crate::renderer::core::release::{GpuResource, ReleaseQueue};

/// Vertex attribute index of `position`.
pub const POSITION_ATTRIBUTE: u32 = 0;
/// Vertex attribute index of `texcoord`.
pub const TEXCOORD_ATTRIBUTE: u32 = 1;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ProgramFlags: u32 {
        /// `load()` stops after compiling; the caller binds locations and
        /// calls `link()` itself.
        const EXPLICIT_LINKING = 1 << 0;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgramState {
    Unlinked,
    Valid,
    Invalid,
}

/// Well-known uniforms with a cached location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UniformSlot {
    TextureMatrix,
    ProjectionMatrix,
    ModelViewMatrix,
    ModelViewProjectionMatrix,
    Offset,
    ModulationConstant,
    Saturation,
    GeometryColor,
    TextureWidth,
    TextureHeight,
    SourceTransferFunction,
    DestinationTransferFunction,
    ColorimetryTransform,
}

impl UniformSlot {
    pub const COUNT: usize = 13;

    pub const ALL: [Self; Self::COUNT] = [
        Self::TextureMatrix,
        Self::ProjectionMatrix,
        Self::ModelViewMatrix,
        Self::ModelViewProjectionMatrix,
        Self::Offset,
        Self::ModulationConstant,
        Self::Saturation,
        Self::GeometryColor,
        Self::TextureWidth,
        Self::TextureHeight,
        Self::SourceTransferFunction,
        Self::DestinationTransferFunction,
        Self::ColorimetryTransform,
    ];

    /// GLSL identifier.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TextureMatrix => "textureMatrix",
            Self::ProjectionMatrix => "projection",
            Self::ModelViewMatrix => "modelview",
            Self::ModelViewProjectionMatrix => "modelViewProjectionMatrix",
            Self::Offset => "offset",
            Self::ModulationConstant => "modulation",
            Self::Saturation => "saturation",
            Self::GeometryColor => "geometryColor",
            Self::TextureWidth => "textureWidth",
            Self::TextureHeight => "textureHeight",
            Self::SourceTransferFunction => "sourceNamedTransferFunction",
            Self::DestinationTransferFunction => "destinationNamedTransferFunction",
            Self::ColorimetryTransform => "colorimetryTransform",
        }
    }
}

/// A GPU program and its uniform table.
pub struct ShaderProgram {
    handle: ProgramHandle,
    state: ProgramState,
    flags: ProgramFlags,
    info_log: String,
    slots: OnceCell<[Option<UniformLocation>; UniformSlot::COUNT]>,
    named: RefCell<FxHashMap<String, Option<UniformLocation>>>,
    release: ReleaseQueue,
}

impl std::fmt::Debug for ShaderProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderProgram")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl ShaderProgram {
    pub fn new(device: &mut dyn GraphicsDevice, release: ReleaseQueue, flags: ProgramFlags) -> Result<Self> {
        Ok(Self {
            handle: device.create_program()?,
            state: ProgramState::Unlinked,
            flags,
            info_log: String::new(),
            slots: OnceCell::new(),
            named: RefCell::new(FxHashMap::default()),
            release,
        })
    }

    #[inline]
    #[must_use]
    pub fn handle(&self) -> ProgramHandle {
        self.handle
    }

    #[inline]
    #[must_use]
    pub fn state(&self) -> ProgramState {
        self.state
    }

    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state == ProgramState::Valid
    }

    /// Compiler and linker output; empty when both were silent.
    #[must_use]
    pub fn info_log(&self) -> &str {
        &self.info_log
    }

    /// Compiles both stages and, unless linking is explicit, links.
    ///
    /// An empty source skips that stage. The first stage that fails to
    /// compile marks the program invalid and no link is attempted.
    pub fn load(&mut self, device: &mut dyn GraphicsDevice, dialect: &GlslDialect, vertex: &str, fragment: &str) -> bool {
        if self.state != ProgramState::Unlinked {
            return self.is_valid();
        }
        if !dialect.shaders_supported {
            log::error!("Shaders are not supported");
            self.fail("shaders are not supported by this context".into());
            return false;
        }

        for (stage, source) in [(ShaderStage::Vertex, vertex), (ShaderStage::Fragment, fragment)] {
            if source.is_empty() {
                continue;
            }
            let prepared = dialect.prepare_source(source);
            let outcome = device.compile_shader(self.handle, stage, &prepared);
            if !outcome.success {
                log::error!("Failed to compile {} shader:\n{}", stage.name(), outcome.log);
                self.fail(outcome.log);
                return false;
            }
            if !outcome.log.is_empty() {
                log::debug!("Shader compile log: {}", outcome.log);
                self.append_log(&outcome.log);
            }
        }

        if self.flags.contains(ProgramFlags::EXPLICIT_LINKING) {
            return true;
        }
        self.link(device)
    }

    pub fn bind_attribute_location(&self, device: &mut dyn GraphicsDevice, name: &str, index: u32) {
        device.bind_attrib_location(self.handle, index, name);
    }

    pub fn bind_frag_data_location(&self, device: &mut dyn GraphicsDevice, name: &str, index: u32) {
        device.bind_frag_data_location(self.handle, index, name);
    }

    /// Links a program loaded with [`ProgramFlags::EXPLICIT_LINKING`].
    pub fn link(&mut self, device: &mut dyn GraphicsDevice) -> bool {
        match self.state {
            ProgramState::Valid => return true,
            ProgramState::Invalid => return false,
            ProgramState::Unlinked => {}
        }

        let outcome = device.link_program(self.handle);
        if outcome.success {
            self.state = ProgramState::Valid;
            if !outcome.log.is_empty() {
                log::debug!("Shader link log: {}", outcome.log);
                self.append_log(&outcome.log);
            }
        } else {
            log::error!("Failed to link shader:\n{}", outcome.log);
            self.fail(outcome.log);
        }
        self.is_valid()
    }

    fn fail(&mut self, log: String) {
        self.state = ProgramState::Invalid;
        self.append_log(&log);
    }

    fn append_log(&mut self, log: &str) {
        if !self.info_log.is_empty() {
            self.info_log.push('\n');
        }
        self.info_log.push_str(log);
    }

    pub fn bind(&self, device: &mut dyn GraphicsDevice) {
        device.use_program(Some(self.handle));
    }

    pub fn unbind(&self, device: &mut dyn GraphicsDevice) {
        device.use_program(None);
    }

    // === Uniforms ===

    /// Location of a well-known uniform. The table is resolved once, on the
    /// first query after a successful link.
    pub fn uniform_location(&self, device: &mut dyn GraphicsDevice, slot: UniformSlot) -> Option<UniformLocation> {
        if !self.is_valid() {
            return None;
        }
        let table = self
            .slots
            .get_or_init(|| UniformSlot::ALL.map(|s| device.uniform_location(self.handle, s.name())));
        table[slot as usize]
    }

    pub fn uniform_location_by_name(&self, device: &mut dyn GraphicsDevice, name: &str) -> Option<UniformLocation> {
        if !self.is_valid() {
            return None;
        }
        if let Some(location) = self.named.borrow().get(name) {
            return *location;
        }
        let location = device.uniform_location(self.handle, name);
        self.named.borrow_mut().insert(name.to_string(), location);
        location
    }

    /// Sets a uniform on this program, which must be the bound one.
    /// Returns `false` if the program has no such uniform.
    pub fn set_uniform(&self, device: &mut dyn GraphicsDevice, slot: UniformSlot, value: impl Into<UniformValue>) -> bool {
        match self.uniform_location(device, slot) {
            Some(location) => {
                device.set_uniform(location, value.into());
                true
            }
            None => false,
        }
    }

    pub fn set_uniform_by_name(&self, device: &mut dyn GraphicsDevice, name: &str, value: impl Into<UniformValue>) -> bool {
        match self.uniform_location_by_name(device, name) {
            Some(location) => {
                device.set_uniform(location, value.into());
                true
            }
            None => false,
        }
    }
}

impl Drop for ShaderProgram {
    fn drop(&mut self) {
        self.release.push(GpuResource::Program(self.handle));
    }
}

impl From<i32> for UniformValue {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<f32> for UniformValue {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<Vec2> for UniformValue {
    fn from(v: Vec2) -> Self {
        Self::Vec2(v)
    }
}

impl From<Vec4> for UniformValue {
    fn from(v: Vec4) -> Self {
        Self::Vec4(v)
    }
}

impl From<Mat3> for UniformValue {
    fn from(v: Mat3) -> Self {
        Self::Mat3(v)
    }
}

impl From<Mat4> for UniformValue {
    fn from(v: Mat4) -> Self {
        Self::Mat4(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::Version;
    use crate::renderer::core::headless::HeadlessDevice;

    const VS: &str = "#version 140\nin vec4 position;\nuniform mat4 modelViewProjectionMatrix;\nvoid main() { gl_Position = modelViewProjectionMatrix * position; }\n";
    const FS: &str = "#version 140\nuniform vec4 modulation;\nout vec4 fragColor;\nvoid main() { fragColor = modulation; }\n";

    fn dialect() -> GlslDialect {
        GlslDialect {
            is_gles: false,
            glsl_version: Version::new(4, 60, 0),
            shaders_supported: true,
        }
    }

    #[test]
    fn compile_failure_is_permanent() {
        let mut dev = HeadlessDevice::new();
        let mut program = ShaderProgram::new(&mut dev, ReleaseQueue::new(), ProgramFlags::empty()).unwrap();

        assert!(!program.load(&mut dev, &dialect(), VS, "#error broken\n"));
        assert_eq!(program.state(), ProgramState::Invalid);
        assert!(program.info_log().contains("#error"));
        assert!(!program.link(&mut dev));
        assert!(!dev.program(program.handle()).unwrap().linked);
    }

    #[test]
    fn explicit_linking_defers_link() {
        let mut dev = HeadlessDevice::new();
        let mut program = ShaderProgram::new(&mut dev, ReleaseQueue::new(), ProgramFlags::EXPLICIT_LINKING).unwrap();

        assert!(program.load(&mut dev, &dialect(), VS, FS));
        assert_eq!(program.state(), ProgramState::Unlinked);
        program.bind_attribute_location(&mut dev, "position", POSITION_ATTRIBUTE);
        assert!(program.link(&mut dev));
        assert!(program.is_valid());

        let bindings = &dev.program(program.handle()).unwrap().attrib_bindings;
        assert_eq!(bindings, &vec![(POSITION_ATTRIBUTE, "position".to_string())]);
    }

    #[test]
    fn uniform_slots_resolve_after_link() {
        let mut dev = HeadlessDevice::new();
        let mut program = ShaderProgram::new(&mut dev, ReleaseQueue::new(), ProgramFlags::empty()).unwrap();
        assert!(program.load(&mut dev, &dialect(), VS, FS));

        assert!(program.uniform_location(&mut dev, UniformSlot::ModelViewProjectionMatrix).is_some());
        assert!(program.uniform_location(&mut dev, UniformSlot::Saturation).is_none());

        program.bind(&mut dev);
        assert!(program.set_uniform(&mut dev, UniformSlot::ModulationConstant, Vec4::new(0.5, 0.5, 0.5, 1.0)));
        assert!(!program.set_uniform(&mut dev, UniformSlot::Saturation, 0.3));
        assert_eq!(
            dev.uniform_value(program.handle(), "modulation"),
            Some(UniformValue::Vec4(Vec4::new(0.5, 0.5, 0.5, 1.0)))
        );
    }

    #[test]
    fn drop_queues_release() {
        let mut dev = HeadlessDevice::new();
        let queue = ReleaseQueue::new();
        let program = ShaderProgram::new(&mut dev, queue.clone(), ProgramFlags::empty()).unwrap();
        drop(program);
        assert_eq!(queue.drain(&mut dev), 1);
        assert_eq!(dev.program_count(), 0);
    }
}
