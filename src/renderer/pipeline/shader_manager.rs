//! Shader Manager
//!
//! Owns every generated [`ShaderProgram`] and the stack of bound programs.
//!
//! ## Program sources
//!
//! | Method | Cached | Source |
//! |--------|--------|--------|
//! | [`ShaderManager::shader`]                 | by traits              | generated |
//! | [`ShaderManager::custom_shader`]          | by xxh3-128 of sources | caller, generated for empty stages |
//! | [`ShaderManager::generate_custom_shader`] | no (caller owns)       | caller, generated for empty stages |
//! | [`ShaderManager::load_shader_from_code`]  | no (caller owns)       | caller |
//!
//! ## Bind stack
//!
//! `push_*` binds only when the new top differs from the bound program and
//! `pop_shader` rebinds only when the top changes, so balanced nesting never
//! issues redundant `glUseProgram` calls.

use std::rc::Rc;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use xxhash_rust::xxh3::xxh3_128;

use super::shader::{POSITION_ATTRIBUTE, ProgramFlags, ShaderProgram, TEXCOORD_ATTRIBUTE};
use super::shader_gen::{GlslDialect, ShaderGenerator, ShaderTraits};
use crate::errors::{GlError, Result};
use crate::renderer::core::device::GraphicsDevice;
use crate::renderer::core::release::ReleaseQueue;

pub struct ShaderManager {
    dialect: GlslDialect,
    release: ReleaseQueue,
    /// One program per trait combination.
    cache: FxHashMap<ShaderTraits, Rc<ShaderProgram>>,
    /// xxh3-128 of (traits, vertex, fragment) → program.
    custom_cache: FxHashMap<u128, Rc<ShaderProgram>>,
    bound: SmallVec<[Rc<ShaderProgram>; 4]>,
}

impl ShaderManager {
    #[must_use]
    pub fn new(dialect: GlslDialect, release: ReleaseQueue) -> Self {
        Self {
            dialect,
            release,
            cache: FxHashMap::default(),
            custom_cache: FxHashMap::default(),
            bound: SmallVec::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn dialect(&self) -> &GlslDialect {
        &self.dialect
    }

    /// The cached program for `traits`, generated on first request.
    ///
    /// A program that failed to build is cached too; check
    /// [`ShaderProgram::is_valid`].
    pub fn shader(&mut self, device: &mut dyn GraphicsDevice, traits: ShaderTraits) -> Result<Rc<ShaderProgram>> {
        if let Some(program) = self.cache.get(&traits) {
            return Ok(Rc::clone(program));
        }
        let program = Rc::new(self.generate_shader(device, traits)?);
        log::debug!(
            "Generated shader for {traits:?} (valid: {}, {} cached)",
            program.is_valid(),
            self.cache.len() + 1
        );
        self.cache.insert(traits, Rc::clone(&program));
        Ok(program)
    }

    /// Builds an uncached program for `traits`.
    pub fn generate_shader(&self, device: &mut dyn GraphicsDevice, traits: ShaderTraits) -> Result<ShaderProgram> {
        self.generate_custom_shader(device, traits, "", "")
    }

    /// Builds a program from caller sources. An empty stage is generated from
    /// `traits`.
    pub fn generate_custom_shader(
        &self,
        device: &mut dyn GraphicsDevice,
        traits: ShaderTraits,
        vertex: &str,
        fragment: &str,
    ) -> Result<ShaderProgram> {
        let vertex = if vertex.is_empty() {
            ShaderGenerator::vertex_source(traits, &self.dialect)?
        } else {
            vertex.to_string()
        };
        let fragment = if fragment.is_empty() {
            ShaderGenerator::fragment_source(traits, &self.dialect)?
        } else {
            fragment.to_string()
        };
        self.build(device, &vertex, &fragment)
    }

    /// Cached variant of [`generate_custom_shader`](Self::generate_custom_shader).
    pub fn custom_shader(
        &mut self,
        device: &mut dyn GraphicsDevice,
        traits: ShaderTraits,
        vertex: &str,
        fragment: &str,
    ) -> Result<Rc<ShaderProgram>> {
        let key = custom_key(traits, vertex, fragment);
        if let Some(program) = self.custom_cache.get(&key) {
            return Ok(Rc::clone(program));
        }
        let program = Rc::new(self.generate_custom_shader(device, traits, vertex, fragment)?);
        self.custom_cache.insert(key, Rc::clone(&program));
        Ok(program)
    }

    /// Builds a program from complete caller sources.
    pub fn load_shader_from_code(&self, device: &mut dyn GraphicsDevice, vertex: &str, fragment: &str) -> Result<ShaderProgram> {
        self.build(device, vertex, fragment)
    }

    fn build(&self, device: &mut dyn GraphicsDevice, vertex: &str, fragment: &str) -> Result<ShaderProgram> {
        let mut program = ShaderProgram::new(device, self.release.clone(), ProgramFlags::EXPLICIT_LINKING)?;
        if program.load(device, &self.dialect, vertex, fragment) {
            program.bind_attribute_location(device, "position", POSITION_ATTRIBUTE);
            program.bind_attribute_location(device, "texcoord", TEXCOORD_ATTRIBUTE);
            if !self.dialect.is_gles {
                program.bind_frag_data_location(device, "fragColor", 0);
            }
            program.link(device);
        }
        Ok(program)
    }

    // === Bind Stack ===

    #[must_use]
    pub fn bound_shader(&self) -> Option<&Rc<ShaderProgram>> {
        self.bound.last()
    }

    #[must_use]
    pub fn is_shader_bound(&self) -> bool {
        !self.bound.is_empty()
    }

    #[must_use]
    pub fn stack_depth(&self) -> usize {
        self.bound.len()
    }

    pub fn push_shader(&mut self, device: &mut dyn GraphicsDevice, traits: ShaderTraits) -> Result<Rc<ShaderProgram>> {
        let program = self.shader(device, traits)?;
        self.push_program(device, Rc::clone(&program));
        Ok(program)
    }

    pub fn push_program(&mut self, device: &mut dyn GraphicsDevice, program: Rc<ShaderProgram>) {
        if !self.bound.last().is_some_and(|top| Rc::ptr_eq(top, &program)) {
            program.bind(device);
        }
        self.bound.push(program);
    }

    pub fn pop_shader(&mut self, device: &mut dyn GraphicsDevice) -> Result<()> {
        let program = self.bound.pop().ok_or(GlError::ShaderStackUnderflow)?;
        match self.bound.last() {
            None => program.unbind(device),
            Some(top) if !Rc::ptr_eq(top, &program) => top.bind(device),
            Some(_) => {}
        }
        Ok(())
    }

    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cache.len() + self.custom_cache.len()
    }

    /// Unwinds the bind stack and drops every cached program. Handles land
    /// on the release queue.
    pub fn clear(&mut self, device: &mut dyn GraphicsDevice) {
        while self.pop_shader(device).is_ok() {}
        self.cache.clear();
        self.custom_cache.clear();
    }

    /// Replaces the dialect after the context was recreated. Cached programs
    /// belong to the old context and are discarded.
    pub fn reset(&mut self, dialect: GlslDialect) {
        self.bound.clear();
        self.cache.clear();
        self.custom_cache.clear();
        self.dialect = dialect;
    }
}

fn custom_key(traits: ShaderTraits, vertex: &str, fragment: &str) -> u128 {
    let mut bytes = Vec::with_capacity(4 + vertex.len() + fragment.len() + 1);
    bytes.extend_from_slice(&traits.bits().to_le_bytes());
    bytes.extend_from_slice(vertex.as_bytes());
    bytes.push(0);
    bytes.extend_from_slice(fragment.as_bytes());
    xxh3_128(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{Capabilities, PlatformInterface};
    use crate::renderer::core::headless::HeadlessDevice;

    fn manager(dev: &HeadlessDevice) -> ShaderManager {
        let caps = Capabilities::detect(dev.context_info(), PlatformInterface::Egl);
        ShaderManager::new(GlslDialect::from_capabilities(&caps), ReleaseQueue::new())
    }

    #[test]
    fn same_traits_share_a_program() {
        let mut dev = HeadlessDevice::new();
        let mut shaders = manager(&dev);
        let a = shaders.shader(&mut dev, ShaderTraits::MAP_TEXTURE).unwrap();
        let b = shaders.shader(&mut dev, ShaderTraits::MAP_TEXTURE).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert!(a.is_valid());
        assert_eq!(shaders.cached_count(), 1);
    }

    #[test]
    fn push_same_program_twice_binds_once() {
        let mut dev = HeadlessDevice::new();
        let mut shaders = manager(&dev);
        shaders.push_shader(&mut dev, ShaderTraits::UNIFORM_COLOR).unwrap();
        shaders.push_shader(&mut dev, ShaderTraits::UNIFORM_COLOR).unwrap();
        assert_eq!(dev.stats().program_binds, 1);

        shaders.pop_shader(&mut dev).unwrap();
        assert_eq!(dev.stats().program_binds, 1);
        shaders.pop_shader(&mut dev).unwrap();
        assert_eq!(dev.current_program(), None);
        assert!(matches!(shaders.pop_shader(&mut dev), Err(GlError::ShaderStackUnderflow)));
    }

    #[test]
    fn generated_programs_bind_fixed_locations() {
        let mut dev = HeadlessDevice::new();
        let mut shaders = manager(&dev);
        let program = shaders.shader(&mut dev, ShaderTraits::MAP_TEXTURE).unwrap();
        let record = dev.program(program.handle()).unwrap();
        assert!(record.attrib_bindings.contains(&(0, "position".to_string())));
        assert!(record.attrib_bindings.contains(&(1, "texcoord".to_string())));
        assert!(record.frag_bindings.contains(&(0, "fragColor".to_string())));
    }

    #[test]
    fn custom_sources_fill_empty_stages() {
        let mut dev = HeadlessDevice::new();
        let mut shaders = manager(&dev);
        let fragment = "#version 140\nuniform float opacity;\nout vec4 fragColor;\nvoid main() { fragColor = vec4(opacity); }\n";
        let a = shaders.custom_shader(&mut dev, ShaderTraits::MAP_TEXTURE, "", fragment).unwrap();
        let b = shaders.custom_shader(&mut dev, ShaderTraits::MAP_TEXTURE, "", fragment).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert!(a.uniform_location_by_name(&mut dev, "opacity").is_some());
        assert!(a.uniform_location_by_name(&mut dev, "modelViewProjectionMatrix").is_some());
    }

    #[test]
    fn clear_releases_programs() {
        let mut dev = HeadlessDevice::new();
        let queue = ReleaseQueue::new();
        let caps = Capabilities::detect(dev.context_info(), PlatformInterface::Egl);
        let mut shaders = ShaderManager::new(GlslDialect::from_capabilities(&caps), queue.clone());
        shaders.push_shader(&mut dev, ShaderTraits::MAP_TEXTURE).unwrap();
        shaders.shader(&mut dev, ShaderTraits::UNIFORM_COLOR).unwrap();

        shaders.clear(&mut dev);
        assert!(!shaders.is_shader_bound());
        assert_eq!(queue.drain(&mut dev), 2);
        assert_eq!(dev.program_count(), 0);
    }
}
