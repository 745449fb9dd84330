//! Dashview Event Model
//!
//! Defines the data contracts shared by the export pipeline and its callers:
//! - **Clips:** recorded events split into per-camera clip groups
//! - **Layout:** slot geometry, crop margins, fit modes, camera mapping
//! - **Telemetry:** per-instant vehicle samples for the HUD
//! - **Export:** caller options (range, fps, speed, format, quality)
//!
//! Layout geometry is expressed in output-surface pixels.

pub mod clip;
pub mod export;
pub mod geometry;
pub mod layout;
pub mod telemetry;

pub use clip::*;
pub use export::*;
pub use geometry::*;
pub use layout::*;
pub use telemetry::*;
