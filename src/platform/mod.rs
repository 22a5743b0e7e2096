//! Platform Detection
//!
//! Identifies the GL implementation and GPU generation behind a context and
//! derives the [`Capabilities`] table from them.
//!
//! - [`version`]: dotted version parsing
//! - [`driver`]: driver / chip-class tables
//! - [`capabilities`]: feature flags and hardware workarounds

pub mod capabilities;
pub mod driver;
pub mod version;

pub use capabilities::{Capabilities, CompositingType, GlFeatures, NpotSupport, PlatformInterface};
pub use driver::{ChipClass, Driver};
pub use version::Version;
