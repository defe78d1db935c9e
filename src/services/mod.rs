//! Pipeline stage services
//!
//! Each stage of the pipeline lives in its own service so it can be tested
//! without a segmentation backend.

pub mod compositor;
pub mod format;
pub mod resize;
pub mod size_guard;

pub use compositor::Compositor;
pub use format::OutputEncoder;
pub use resize::ImageResizer;
pub use size_guard::SizeGuard;
