//! Dashview Export Engine
//!
//! Synchronizes several dashcam camera streams, composites them into one
//! surface with labels and overlays, and encodes the result.
//!
//! # Pipeline Architecture
//!
//! ```text
//! SourceProvider ──┐
//!                  ├── ClipTimeline (absolute time <-> clip, intra)
//! clip durations ──┘         │
//!                            ├── PlaybackSynchronizer + StallLadder
//! tick driver / seeks ───────┘         │
//!                                      ├── Compositor (slots, labels,
//! LayoutProvider ──────────────────────┘   info bar, HUD, watermark)
//!                                                │
//!                       ┌────────────────────────┼───────────────────┐
//!                       ▼                        ▼                   ▼
//!                 LiveStrategy           BufferedStrategy   ImageSequenceStrategy
//!                       └────────────────────────┼───────────────────┘
//!                                                ▼
//!                                    Recorder (ffmpeg / memory)
//!                                                │
//!                                                ▼
//!                                          ExportOutput
//! ```

pub mod canvas;
pub mod compositor;
pub mod controller;
pub mod encoder;
pub mod naming;
pub mod progress;
pub mod providers;
pub mod resolver;
pub mod session;
pub mod single_camera;
pub mod stall;
pub mod sync;
pub mod text;

pub use controller::{ExportEngine, ExportOutcome, ExportOutput, ExportStatus};
pub use encoder::{Recorder, RecorderFactory, RecorderSpec};
pub use progress::{ExportPhase, ExportProgress, ProgressCallback};
pub use providers::*;
