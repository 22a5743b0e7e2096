//! Coordinate Mapping
//!
//! Value types that translate between the compositor's logical space and a
//! render target's device pixels. Nothing here touches the GPU.

pub mod output_transform;
pub mod rect;
pub mod render_target;
pub mod render_viewport;

pub use output_transform::OutputTransform;
pub use rect::{Rect, RectF, Region};
pub use render_target::RenderTarget;
pub use render_viewport::RenderViewport;
