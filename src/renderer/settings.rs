//! Render Settings
//!
//! Configuration consumed once when a [`RenderContext`](crate::RenderContext)
//! is created. Nothing in here is re-read afterwards; changing a setting means
//! recreating the context.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use glpipe::{RenderSettings, PersistentBufferPolicy};
//!
//! // Defaults with environment overrides applied
//! let settings = RenderSettings::from_env();
//!
//! // Explicit configuration for a test harness
//! let settings = RenderSettings {
//!     staging_upload: false,
//!     persistent_buffers: PersistentBufferPolicy::Disable,
//!     ..Default::default()
//! };
//! ```
//!
//! # Environment
//!
//! | Variable                     | Effect                                       |
//! |------------------------------|----------------------------------------------|
//! | `GLPIPE_NO_STAGING_UPLOAD=1` | disables pixel-unpack staging uploads        |
//! | `GLPIPE_PERSISTENT_VBO=1`    | forces the persistent ring (`0` disables it) |
//! | `GLPIPE_GL_DEBUG=1`          | forwards every driver debug message to `log` |

use std::time::Duration;

use crate::errors::{GlError, Result};

/// Environment variable disabling staging uploads.
pub const ENV_NO_STAGING_UPLOAD: &str = "GLPIPE_NO_STAGING_UPLOAD";
/// Environment variable controlling the persistent vertex ring.
pub const ENV_PERSISTENT_VBO: &str = "GLPIPE_PERSISTENT_VBO";
/// Environment variable enabling verbose driver debug output.
pub const ENV_GL_DEBUG: &str = "GLPIPE_GL_DEBUG";

// ---------------------------------------------------------------------------
// PersistentBufferPolicy
// ---------------------------------------------------------------------------

/// Whether the streaming vertex buffer may use a persistently mapped ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistentBufferPolicy {
    /// Use the ring when buffer storage and fences are available, except on
    /// drivers that prefer `glBufferSubData` and on virtual machines.
    #[default]
    Auto,
    /// Use the ring whenever buffer storage and fences are available.
    Force,
    /// Never use the ring.
    Disable,
}

// ---------------------------------------------------------------------------
// RingBufferTuning
// ---------------------------------------------------------------------------

/// Sizing constants of the streaming vertex buffer.
///
/// | Field                     | Meaning                                          | Default  |
/// |---------------------------|--------------------------------------------------|----------|
/// | `min_persistent_size`     | smallest persistent ring allocation              | 128 KiB  |
/// | `min_streaming_size`      | smallest non-persistent streaming allocation     | 32 KiB   |
/// | `frame_history`           | frames averaged for the reallocation heuristic   | 4        |
/// | `growth_factor`           | ring size as a multiple of the average frame     | 3        |
/// | `realloc_threshold_div`   | reallocate once average > capacity / divisor     | 2        |
/// | `alignment`               | cursor alignment after each write                | 8        |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingBufferTuning {
    pub min_persistent_size: usize,
    pub min_streaming_size: usize,
    pub frame_history: usize,
    pub growth_factor: usize,
    pub realloc_threshold_div: usize,
    pub alignment: usize,
}

impl Default for RingBufferTuning {
    fn default() -> Self {
        Self {
            min_persistent_size: 128 * 1024,
            min_streaming_size: 32 * 1024,
            frame_history: 4,
            growth_factor: 3,
            realloc_threshold_div: 2,
            alignment: 8,
        }
    }
}

impl RingBufferTuning {
    /// Rounds `value` up to the configured alignment.
    #[inline]
    #[must_use]
    pub fn align(&self, value: usize) -> usize {
        let a = self.alignment.max(1);
        value.div_ceil(a) * a
    }
}

// ---------------------------------------------------------------------------
// RenderSettings
// ---------------------------------------------------------------------------

/// Global configuration for the pipeline layer.
///
/// # Fields
///
/// | Field                | Description                                  | Default  |
/// |----------------------|----------------------------------------------|----------|
/// | `staging_upload`     | upload textures through a pixel-unpack buffer | `true`  |
/// | `persistent_buffers` | persistent ring policy                       | `Auto`   |
/// | `debug_output`       | forward all driver debug messages            | `false`  |
/// | `fence_timeout`      | bound on the single blocking wait            | 1 s      |
/// | `ring`               | streaming buffer sizing                      | defaults |
#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub staging_upload: bool,
    pub persistent_buffers: PersistentBufferPolicy,
    pub debug_output: bool,
    pub fence_timeout: Duration,
    pub ring: RingBufferTuning,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            staging_upload: true,
            persistent_buffers: PersistentBufferPolicy::Auto,
            debug_output: false,
            fence_timeout: Duration::from_secs(1),
            ring: RingBufferTuning::default(),
        }
    }
}

impl RenderSettings {
    /// Defaults overlaid with the `GLPIPE_*` environment variables.
    ///
    /// Malformed values are logged and ignored; the remaining variables
    /// still apply.
    #[must_use]
    pub fn from_env() -> Self {
        let mut settings = Self::default();
        // Each malformed variable has already been reported.
        let _ = settings.apply_overrides(|name| std::env::var(name).ok());
        settings
    }

    /// Applies overrides from an arbitrary variable source.
    ///
    /// Every variable is parsed on its own: a malformed one is logged and
    /// leaves its field untouched without blocking the others. Returns the
    /// first such error after all variables have been applied.
    ///
    /// Split out from [`from_env`](Self::from_env) so the parsing can be
    /// exercised without touching the process environment.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let mut first_error = None;
        let mut flag = |name: &'static str| -> Option<bool> {
            let value = lookup(name)?;
            match parse_flag(name, &value) {
                Ok(flag) => Some(flag),
                Err(e) => {
                    log::warn!("{e}; ignoring {name}");
                    first_error.get_or_insert(e);
                    None
                }
            }
        };

        if let Some(no_staging) = flag(ENV_NO_STAGING_UPLOAD) {
            self.staging_upload = !no_staging;
        }
        if let Some(persistent) = flag(ENV_PERSISTENT_VBO) {
            self.persistent_buffers = if persistent {
                PersistentBufferPolicy::Force
            } else {
                PersistentBufferPolicy::Disable
            };
        }
        if let Some(debug) = flag(ENV_GL_DEBUG) {
            self.debug_output = debug;
        }

        first_error.map_or(Ok(()), Err)
    }

    /// Fence timeout in nanoseconds, saturating.
    #[inline]
    #[must_use]
    pub fn fence_timeout_ns(&self) -> u64 {
        u64::try_from(self.fence_timeout.as_nanos()).unwrap_or(u64::MAX)
    }
}

fn parse_flag(name: &'static str, value: &str) -> Result<bool> {
    match value.trim() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(GlError::InvalidSetting {
            name,
            value: other.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| {
            owned
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.clone())
        }
    }

    #[test]
    fn defaults() {
        let s = RenderSettings::default();
        assert!(s.staging_upload);
        assert_eq!(s.persistent_buffers, PersistentBufferPolicy::Auto);
        assert_eq!(s.fence_timeout_ns(), 1_000_000_000);
        assert_eq!(s.ring.min_persistent_size, 131_072);
    }

    #[test]
    fn overrides() {
        let mut s = RenderSettings::default();
        s.apply_overrides(vars(&[
            (ENV_NO_STAGING_UPLOAD, "1"),
            (ENV_PERSISTENT_VBO, "0"),
            (ENV_GL_DEBUG, "1"),
        ]))
        .unwrap();
        assert!(!s.staging_upload);
        assert_eq!(s.persistent_buffers, PersistentBufferPolicy::Disable);
        assert!(s.debug_output);

        s.apply_overrides(vars(&[(ENV_PERSISTENT_VBO, "1")])).unwrap();
        assert_eq!(s.persistent_buffers, PersistentBufferPolicy::Force);
    }

    #[test]
    fn malformed_value_is_rejected() {
        let mut s = RenderSettings::default();
        let err = s
            .apply_overrides(vars(&[(ENV_GL_DEBUG, "maybe")]))
            .unwrap_err();
        assert!(matches!(err, GlError::InvalidSetting { name: ENV_GL_DEBUG, .. }));
    }

    #[test]
    fn malformed_value_does_not_block_others() {
        let mut s = RenderSettings::default();
        let err = s
            .apply_overrides(vars(&[
                (ENV_NO_STAGING_UPLOAD, "maybe"),
                (ENV_PERSISTENT_VBO, "0"),
                (ENV_GL_DEBUG, "1"),
            ]))
            .unwrap_err();
        assert!(matches!(err, GlError::InvalidSetting { name: ENV_NO_STAGING_UPLOAD, .. }));
        assert!(s.staging_upload);
        assert_eq!(s.persistent_buffers, PersistentBufferPolicy::Disable);
        assert!(s.debug_output);
    }

    #[test]
    fn align_rounds_up() {
        let t = RingBufferTuning::default();
        assert_eq!(t.align(0), 0);
        assert_eq!(t.align(1), 8);
        assert_eq!(t.align(16), 16);
        assert_eq!(t.align(17), 24);
    }
}
