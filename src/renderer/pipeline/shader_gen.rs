//! Shader Code Generator
//!
//! Composes GLSL programs from a [`ShaderTraits`] bitmask. Each trait owns a
//! row in [`TRAIT_FRAGMENTS`] listing the uniforms it declares, the chunk it
//! includes and the statement it appends to `main()`; the two templates under
//! `shaders/` stitch the rows together for the active [`GlslDialect`].

use std::borrow::Cow;
use std::sync::OnceLock;

use bitflags::bitflags;
use minijinja::{Environment, Error, ErrorKind, syntax::SyntaxConfig};
use rust_embed::RustEmbed;
use serde::Serialize;

use crate::errors::Result;
use crate::platform::{Capabilities, NpotSupport, Version};

bitflags! {
    /// Orthogonal capabilities that together select one generated program.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
    pub struct ShaderTraits: u32 {
        /// Sample `sampler` at the interpolated texture coordinate.
        const MAP_TEXTURE          = 1 << 0;
        /// Flat `geometryColor`. Ignored when combined with `MAP_TEXTURE`.
        const UNIFORM_COLOR        = 1 << 1;
        /// Multiply the texel by `modulation`. Texture mapping only.
        const MODULATE             = 1 << 2;
        /// Blend the texel toward luminance by `saturation`. Texture mapping only.
        const ADJUST_SATURATION    = 1 << 3;
        /// Decode, convert primaries and re-encode.
        const TRANSFORM_COLORSPACE = 1 << 4;
    }
}

// ─── GLSL Dialect ─────────────────────────────────────────────────────────────

/// Language level the generated and prepared sources target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlslDialect {
    pub is_gles: bool,
    pub glsl_version: Version,
    /// GLSL and NPOT textures are both available.
    pub shaders_supported: bool,
}

impl GlslDialect {
    #[must_use]
    pub fn from_capabilities(caps: &Capabilities) -> Self {
        Self {
            is_gles: caps.is_gles,
            glsl_version: caps.glsl_version,
            shaders_supported: caps.supports_glsl && caps.npot != NpotSupport::None,
        }
    }

    /// `#version 140` on desktop, `#version 300 es` on GLES.
    #[must_use]
    pub fn is_core(&self) -> bool {
        let threshold = if self.is_gles {
            Version::new(3, 0, 0)
        } else {
            Version::new(1, 40, 0)
        };
        self.glsl_version >= threshold
    }

    fn header(&self) -> &'static str {
        match (self.is_core(), self.is_gles) {
            (true, false) => "#version 140\n",
            (true, true) => "#version 300 es\n",
            (false, _) => "",
        }
    }

    /// Adapts hand-written `#version 140` sources for GLES.
    ///
    /// GLSL ES 1.00 gets a default float precision; on GLSL ES 3.00 the
    /// version line is rewritten and the precision statement follows it.
    #[must_use]
    pub fn prepare_source(&self, source: &str) -> String {
        if !self.is_gles {
            return source.to_string();
        }
        if self.is_core() {
            source.replace("#version 140", "#version 300 es\n\nprecision highp float;\n")
        } else {
            format!("precision highp float;\n{source}")
        }
    }
}

// ─── Trait Table ──────────────────────────────────────────────────────────────

/// Source contribution of one [`ShaderTraits`] flag to the fragment stage.
#[derive(Debug, Clone, Copy)]
pub struct TraitFragment {
    pub traits: ShaderTraits,
    pub uniforms: &'static [Uniform],
    /// Chunk under `shaders/chunks/`.
    pub chunk: Option<&'static str>,
    /// Statement applied to `result` in `main()`.
    pub step: &'static str,
    /// Dropped unless the program samples a texture.
    pub texture_only: bool,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Uniform {
    pub ty: &'static str,
    pub name: &'static str,
}

/// Order matters: rows are applied top to bottom.
pub const TRAIT_FRAGMENTS: &[TraitFragment] = &[
    TraitFragment {
        traits: ShaderTraits::TRANSFORM_COLORSPACE,
        uniforms: &[
            Uniform {
                ty: "int",
                name: "sourceNamedTransferFunction",
            },
            Uniform {
                ty: "int",
                name: "destinationNamedTransferFunction",
            },
            Uniform {
                ty: "mat3",
                name: "colorimetryTransform",
            },
        ],
        chunk: Some("colorspace.glsl"),
        step: "result = transformColorspace(result);",
        texture_only: false,
    },
    TraitFragment {
        traits: ShaderTraits::MODULATE,
        uniforms: &[Uniform {
            ty: "vec4",
            name: "modulation",
        }],
        chunk: None,
        step: "result *= modulation;",
        texture_only: true,
    },
    TraitFragment {
        traits: ShaderTraits::ADJUST_SATURATION,
        uniforms: &[Uniform {
            ty: "float",
            name: "saturation",
        }],
        chunk: None,
        step: "result.rgb = mix(vec3(dot(result.rgb, vec3(0.2126, 0.7152, 0.0722))), result.rgb, saturation);",
        texture_only: true,
    },
];

// ─── Template Environment ─────────────────────────────────────────────────────

#[derive(RustEmbed)]
#[folder = "src/renderer/pipeline/shaders"]
struct ShaderAssets;

static SHADER_ENV: OnceLock<Environment<'static>> = OnceLock::new();

fn shader_env() -> Result<&'static Environment<'static>> {
    if let Some(env) = SHADER_ENV.get() {
        return Ok(env);
    }

    let mut env = Environment::new();
    let syntax = SyntaxConfig::builder()
        .block_delimiters("{$", "$}")
        .variable_delimiters("{{", "}}")
        .line_statement_prefix("$$")
        .build()?;

    env.set_syntax(syntax);
    env.set_trim_blocks(true);
    env.set_lstrip_blocks(true);
    env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
    env.set_loader(shader_loader);
    env.set_path_join_callback(|name, _parent| format!("chunks/{name}").into());

    Ok(SHADER_ENV.get_or_init(|| env))
}

fn shader_loader(name: &str) -> std::result::Result<Option<String>, Error> {
    let has_extension = std::path::Path::new(name)
        .extension()
        .is_some_and(|ext| ["vert", "frag", "glsl"].iter().any(|e| ext.eq_ignore_ascii_case(e)));
    let filename = if has_extension {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("{name}.glsl"))
    };

    // Pick up edits without a rebuild while developing.
    #[cfg(debug_assertions)]
    {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("src/renderer/pipeline/shaders")
            .join(filename.as_ref());
        if path.exists() {
            return match std::fs::read_to_string(&path) {
                Ok(source) => Ok(Some(source)),
                Err(e) => Err(Error::new(
                    ErrorKind::TemplateNotFound,
                    format!("Failed to read file: {e}"),
                )),
            };
        }
    }

    if let Some(file) = ShaderAssets::get(&filename)
        && let Ok(source) = std::str::from_utf8(file.data.as_ref())
    {
        return Ok(Some(source.to_string()));
    }

    Ok(None)
}

// ─── Generation ───────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct GlslContext<'a> {
    header: &'a str,
    gles: bool,
    attribute: &'a str,
    varying_in: &'a str,
    varying_out: &'a str,
    texture_lookup: &'a str,
    output: &'a str,
    map_texture: bool,
    uniform_color: bool,
    uniforms: Vec<Uniform>,
    chunks: Vec<&'static str>,
    steps: Vec<&'static str>,
}

impl<'a> GlslContext<'a> {
    fn new(traits: ShaderTraits, dialect: &'a GlslDialect) -> Self {
        let core = dialect.is_core();
        let map_texture = traits.contains(ShaderTraits::MAP_TEXTURE);
        let rows = TRAIT_FRAGMENTS
            .iter()
            .filter(|row| traits.contains(row.traits) && (map_texture || !row.texture_only));

        Self {
            header: dialect.header(),
            gles: dialect.is_gles,
            attribute: if core { "in" } else { "attribute" },
            varying_in: if core { "in" } else { "varying" },
            varying_out: if core { "out" } else { "varying" },
            texture_lookup: if core { "texture" } else { "texture2D" },
            output: if core { "fragColor" } else { "gl_FragColor" },
            map_texture,
            uniform_color: traits.contains(ShaderTraits::UNIFORM_COLOR),
            uniforms: rows.clone().flat_map(|row| row.uniforms.iter().copied()).collect(),
            chunks: rows.clone().filter_map(|row| row.chunk).collect(),
            steps: rows.map(|row| row.step).collect(),
        }
    }
}

pub struct ShaderGenerator;

impl ShaderGenerator {
    pub fn vertex_source(traits: ShaderTraits, dialect: &GlslDialect) -> Result<String> {
        Self::render("generated.vert", traits, dialect)
    }

    pub fn fragment_source(traits: ShaderTraits, dialect: &GlslDialect) -> Result<String> {
        Self::render("generated.frag", traits, dialect)
    }

    fn render(template_name: &str, traits: ShaderTraits, dialect: &GlslDialect) -> Result<String> {
        let env = shader_env()?;
        let template = env.get_template(template_name)?;
        let source = template.render(GlslContext::new(traits, dialect))?;
        log::trace!("Generated {template_name} for {traits:?}:\n{source}");
        Ok(source)
    }
}
