//! Capability Table
//!
//! [`Capabilities::detect`] turns the strings and extension set of a context
//! into the read-only table every other component consults: what the GPU can
//! do, how it prefers buffers to be updated, and whether compositing with GL
//! is advisable at all.
//!
//! Detection is a pure function of [`ContextInfo`]. Running it twice on the
//! same context yields the same table; after context loss it is simply run
//! again on the new context.

use std::fmt;

use bitflags::bitflags;

use super::driver::{self, ChipClass, Driver};
use super::version::Version;
use crate::renderer::core::device::ContextInfo;

/// Window-system binding the context was created through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PlatformInterface {
    #[default]
    Egl,
    Glx,
    /// Offscreen or unknown.
    None,
}

/// Non-power-of-two texture support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NpotSupport {
    None,
    /// Clamp-to-edge only, no mipmaps.
    Limited,
    Full,
}

/// What the compositor should use on this hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositingType {
    None,
    OpenGl,
    Software,
}

impl fmt::Display for CompositingType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::None => "none",
            Self::OpenGl => "OpenGL",
            Self::Software => "software",
        })
    }
}

bitflags! {
    /// Optional GL features the pipeline can take advantage of.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GlFeatures: u32 {
        const TEXTURE_STORAGE      = 1 << 0;
        const TEXTURE_SWIZZLE      = 1 << 1;
        const RG_TEXTURES          = 1 << 2;
        const TEXTURE_16BIT        = 1 << 3;
        /// BGRA8 textures (`GL_EXT_texture_format_BGRA8888` on GLES).
        const ARGB32_TEXTURES      = 1 << 4;
        const BLITS                = 1 << 5;
        const PACKED_DEPTH_STENCIL = 1 << 6;
        const GLES_DEPTH24         = 1 << 7;
        const MAP_BUFFER_RANGE     = 1 << 8;
        const BUFFER_STORAGE       = 1 << 9;
        const SYNC_FENCES          = 1 << 10;
        /// Base-vertex draws + buffer copies + map range.
        const INDEXED_QUADS        = 1 << 11;
        const PACK_INVERT          = 1 << 12;
        const UNPACK_SUBIMAGE      = 1 << 13;
        const PIXEL_UNPACK_BUFFER  = 1 << 14;
        const DEBUG_OUTPUT         = 1 << 15;
    }
}

/// Read-only description of the active context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capabilities {
    pub vendor: String,
    pub renderer: String,
    pub version_string: String,
    pub glsl_version_string: String,

    pub gl_version: Version,
    pub glsl_version: Version,
    pub mesa_version: Version,
    pub is_gles: bool,
    pub platform_interface: PlatformInterface,

    pub driver: Driver,
    pub chip_class: ChipClass,
    pub chipset: String,
    driver_version: Version,

    pub supports_glsl: bool,
    pub limited_glsl: bool,
    pub npot: NpotSupport,
    pub loose_binding: bool,
    pub prefer_buffer_sub_data: bool,
    pub virtual_machine: bool,
    pub recommended_compositor: CompositingType,
    pub features: GlFeatures,
}

impl Capabilities {
    /// Classifies the GPU and derives every capability flag.
    #[must_use]
    pub fn detect(info: &ContextInfo, platform_interface: PlatformInterface) -> Self {
        let is_gles = info.is_gles();
        let gl_version = Version::parse(&info.version);
        let glsl_version = Version::parse(&info.glsl_version);
        let mesa_version = Version::after_token(&info.version, "Mesa").unwrap_or_default();
        let ext = |name: &str| info.has_extension(name);
        let at_least = |major, minor| gl_version >= Version::new(major, minor, 0);

        let mut supports_glsl = is_gles
            || at_least(2, 0)
            || (ext("GL_ARB_shader_objects") && ext("GL_ARB_fragment_shader") && ext("GL_ARB_vertex_shader"));
        let mut texture_npot = is_gles || at_least(2, 0) || ext("GL_ARB_texture_non_power_of_two");
        let mut limited_npot = false;
        let mut limited_glsl = false;
        let mut loose_binding = false;
        let mut prefer_buffer_sub_data = false;
        let mut virtual_machine = false;
        let mut recommended = CompositingType::Software;

        let c = driver::classify(&info.vendor, &info.renderer, &info.version);
        let (drv, chip) = (c.driver, c.chip_class);

        if chip.is_radeon() {
            // R200 is only SM 1.4
            if chip < ChipClass::R300 {
                supports_glsl = false;
            }
            if chip < ChipClass::R600 {
                if drv == Driver::Catalyst {
                    texture_npot = false;
                } else if drv == Driver::R300G {
                    limited_npot = texture_npot;
                }
                limited_glsl = supports_glsl;
            }
            recommended = if chip < ChipClass::R600 {
                CompositingType::None
            } else {
                CompositingType::OpenGl
            };
            if drv == Driver::R600G || (drv == Driver::R600C && info.renderer.contains("DRI2")) {
                loose_binding = true;
            }
        }

        if chip.is_nvidia() {
            if drv == Driver::NVidia && chip < ChipClass::NV40 {
                // most likely software emulated
                supports_glsl = false;
            }
            if drv == Driver::NVidia {
                loose_binding = true;
                prefer_buffer_sub_data = true;
            }
            recommended = if chip < ChipClass::NV40 {
                CompositingType::None
            } else {
                CompositingType::OpenGl
            };
            limited_npot = texture_npot && chip < ChipClass::NV40;
            limited_glsl = supports_glsl && chip < ChipClass::G80;
        }

        if chip.is_intel() {
            if chip < ChipClass::I915 {
                supports_glsl = false;
            }
            limited_glsl = supports_glsl && chip < ChipClass::I965;
            loose_binding = false;
            recommended = if chip < ChipClass::I915 {
                CompositingType::None
            } else {
                CompositingType::OpenGl
            };
        }

        if chip.is_panfrost() {
            recommended = CompositingType::OpenGl;
        }
        if chip.is_lima() {
            recommended = CompositingType::OpenGl;
            supports_glsl = true;
        }
        // GL works on VideoCore, but software composition is faster.
        if chip.is_videocore4() || chip.is_videocore3d() {
            recommended = CompositingType::Software;
        }

        if mesa_version.is_valid() && platform_interface == PlatformInterface::Egl {
            loose_binding = true;
        }

        if drv.is_software() {
            if drv == Driver::Llvmpipe {
                recommended = CompositingType::OpenGl;
                limited_glsl = false;
                supports_glsl = true;
            } else {
                recommended = CompositingType::Software;
                limited_glsl = false;
                supports_glsl = false;
            }
        }

        if drv == Driver::Qualcomm {
            recommended = if chip == ChipClass::Adreno1XX {
                CompositingType::None
            } else {
                CompositingType::OpenGl
            };
        }

        if chip == ChipClass::UnknownChipClass && drv == Driver::Unknown {
            recommended = CompositingType::OpenGl;
            supports_glsl = true;
        }

        if drv.is_virtual_machine() {
            virtual_machine = true;
            recommended = CompositingType::OpenGl;
        }

        // A GLES context would not exist without shader support.
        if is_gles {
            supports_glsl = true;
            limited_glsl = false;
        }

        let npot = match (texture_npot, limited_npot) {
            (false, _) => NpotSupport::None,
            (true, true) => NpotSupport::Limited,
            (true, false) => NpotSupport::Full,
        };

        Self {
            vendor: info.vendor.clone(),
            renderer: info.renderer.clone(),
            version_string: info.version.clone(),
            glsl_version_string: info.glsl_version.clone(),
            gl_version,
            glsl_version,
            mesa_version,
            is_gles,
            platform_interface,
            driver: drv,
            chip_class: chip,
            chipset: c.chipset,
            driver_version: c.driver_version,
            supports_glsl,
            limited_glsl,
            npot,
            loose_binding,
            prefer_buffer_sub_data,
            virtual_machine,
            recommended_compositor: recommended,
            features: detect_features(info, is_gles, gl_version),
        }
    }

    #[inline]
    #[must_use]
    pub fn supports(&self, feature: GlFeatures) -> bool {
        self.features.contains(feature)
    }

    #[inline]
    #[must_use]
    pub fn is_mesa_driver(&self) -> bool {
        self.mesa_version.is_valid()
    }

    /// Mesa version for Mesa drivers, the vendor's own version otherwise.
    #[must_use]
    pub fn driver_version(&self) -> Version {
        if self.is_mesa_driver() {
            self.mesa_version
        } else {
            self.driver_version
        }
    }

    #[must_use]
    pub fn has_gl_version(&self, major: u32, minor: u32) -> bool {
        self.gl_version >= Version::new(major, minor, 0)
    }

    /// Minimum feature set the compositing pipeline needs. Shader compilation
    /// is checked separately by the render context.
    #[must_use]
    pub fn meets_minimum_requirements(&self) -> bool {
        self.supports_glsl
            && self.npot != NpotSupport::None
            && (self.is_gles || self.has_gl_version(3, 0) || self.supports(GlFeatures::BLITS))
            && self.supports(GlFeatures::UNPACK_SUBIMAGE)
    }

    /// Rows of the capability report as `(label, value)`.
    #[must_use]
    pub fn report(&self) -> Vec<(&'static str, String)> {
        let yes_no = |b: bool| if b { "yes" } else { "no" }.to_string();
        let mut rows = vec![
            ("OpenGL vendor string:", self.vendor.clone()),
            ("OpenGL renderer string:", self.renderer.clone()),
            ("OpenGL version string:", self.version_string.clone()),
        ];
        if self.supports_glsl {
            rows.push(("OpenGL shading language version string:", self.glsl_version_string.clone()));
        }
        rows.push(("Driver:", self.driver.to_string()));
        if !self.is_mesa_driver() {
            rows.push(("Driver version:", self.driver_version.to_string()));
        }
        rows.push(("GPU class:", self.chip_class.to_string()));
        rows.push(("OpenGL version:", self.gl_version.to_string()));
        if self.supports_glsl {
            rows.push(("GLSL version:", self.glsl_version.to_string()));
        }
        if self.is_mesa_driver() {
            rows.push(("Mesa version:", self.mesa_version.to_string()));
        }
        rows.push(("Requires strict binding:", yes_no(!self.loose_binding)));
        rows.push((
            "GLSL shaders:",
            match (self.supports_glsl, self.limited_glsl) {
                (false, _) => "no",
                (true, true) => "limited",
                (true, false) => "yes",
            }
            .to_string(),
        ));
        rows.push((
            "Texture NPOT support:",
            match self.npot {
                NpotSupport::None => "no",
                NpotSupport::Limited => "limited",
                NpotSupport::Full => "yes",
            }
            .to_string(),
        ));
        rows.push(("Virtual Machine:", yes_no(self.virtual_machine)));
        rows.push(("Recommended compositor:", self.recommended_compositor.to_string()));
        rows
    }

    /// Logs the capability report at `info` level.
    pub fn print_results(&self) {
        for (label, value) in self.report() {
            log::info!("{label:<40}{value}");
        }
    }
}

fn detect_features(info: &ContextInfo, is_gles: bool, gl: Version) -> GlFeatures {
    let ext = |name: &str| info.has_extension(name);
    let at_least = |major, minor| gl >= Version::new(major, minor, 0);
    let mut f = GlFeatures::empty();

    let map_range = at_least(3, 0) || ext("GL_EXT_map_buffer_range") || ext("GL_ARB_map_buffer_range");
    let indexed_quads = if is_gles {
        (at_least(3, 2) || ext("GL_OES_draw_elements_base_vertex") || ext("GL_EXT_draw_elements_base_vertex"))
            && at_least(3, 0)
            && map_range
    } else {
        (at_least(3, 2) || ext("GL_ARB_draw_elements_base_vertex"))
            && (at_least(3, 1) || ext("GL_ARB_copy_buffer"))
            && map_range
    };

    let table = [
        (
            GlFeatures::TEXTURE_STORAGE,
            if is_gles {
                at_least(3, 0) || ext("GL_EXT_texture_storage")
            } else {
                at_least(4, 2) || ext("GL_ARB_texture_storage")
            },
        ),
        (
            GlFeatures::TEXTURE_SWIZZLE,
            if is_gles {
                at_least(3, 0)
            } else {
                at_least(3, 3) || ext("GL_ARB_texture_swizzle")
            },
        ),
        (
            GlFeatures::RG_TEXTURES,
            at_least(3, 0) || ext("GL_ARB_texture_rg") || ext("GL_EXT_texture_rg"),
        ),
        (GlFeatures::TEXTURE_16BIT, !is_gles || ext("GL_EXT_texture_norm16")),
        (
            GlFeatures::ARGB32_TEXTURES,
            !is_gles || ext("GL_EXT_texture_format_BGRA8888"),
        ),
        (
            GlFeatures::BLITS,
            if is_gles {
                at_least(3, 0)
            } else {
                at_least(3, 0) || ext("GL_ARB_framebuffer_object") || ext("GL_EXT_framebuffer_blit")
            },
        ),
        (
            GlFeatures::PACKED_DEPTH_STENCIL,
            at_least(3, 0)
                || ext("GL_OES_packed_depth_stencil")
                || ext("GL_ARB_framebuffer_object")
                || ext("GL_EXT_packed_depth_stencil"),
        ),
        (GlFeatures::GLES_DEPTH24, is_gles && (at_least(3, 0) || ext("GL_OES_depth24"))),
        (GlFeatures::MAP_BUFFER_RANGE, map_range),
        (
            GlFeatures::BUFFER_STORAGE,
            (!is_gles && at_least(4, 4)) || ext("GL_ARB_buffer_storage") || ext("GL_EXT_buffer_storage"),
        ),
        (
            GlFeatures::SYNC_FENCES,
            (is_gles && at_least(3, 0)) || (!is_gles && at_least(3, 2)) || ext("GL_ARB_sync"),
        ),
        (GlFeatures::INDEXED_QUADS, indexed_quads),
        (GlFeatures::PACK_INVERT, ext("GL_MESA_pack_invert")),
        (
            GlFeatures::UNPACK_SUBIMAGE,
            !is_gles || at_least(3, 0) || ext("GL_EXT_unpack_subimage"),
        ),
        (
            GlFeatures::PIXEL_UNPACK_BUFFER,
            if is_gles {
                at_least(3, 0)
            } else {
                at_least(2, 1) || ext("GL_ARB_pixel_buffer_object")
            },
        ),
        (GlFeatures::DEBUG_OUTPUT, ext("GL_KHR_debug") || ext("GL_ARB_debug_output")),
    ];
    for (flag, supported) in table {
        f.set(flag, supported);
    }
    f
}
