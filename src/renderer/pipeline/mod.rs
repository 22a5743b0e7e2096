//! Shader Pipeline
//!
//! - [`shader_gen`]: trait bitmask → GLSL source
//! - [`shader`]: program object, link state, uniform cache
//! - [`shader_manager`]: program cache and bind stack

pub mod shader;
pub mod shader_gen;
pub mod shader_manager;

pub use shader::{POSITION_ATTRIBUTE, ProgramFlags, ProgramState, ShaderProgram, TEXCOORD_ATTRIBUTE, UniformSlot};
pub use shader_gen::{GlslDialect, ShaderGenerator, ShaderTraits};
pub use shader_manager::ShaderManager;
