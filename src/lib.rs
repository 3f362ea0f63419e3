//! Driftloop turns a single still image plus painted selection regions and
//! motion arrows into a seamlessly looping displacement animation.
//!
//! # Pipeline overview
//!
//! 1. **Select**: painted strokes/points -> binary [`SelectionMask`] (exact
//!    distance tests, then morphological erosion)
//! 2. **Sample**: user arrows + mask -> [`MotionField`] (distance-weighted,
//!    direction-normalized displacement, gated to the selection)
//! 3. **Synthesize**: cumulative chain of displaced keyframes with edge
//!    feathering ([`synthesize`] / [`SynthesisJob`])
//! 4. **Composite**: two phase-offset cycles through the keyframes,
//!    cross-faded so the loop has no visible seam ([`composite_frame`])
//! 5. **Export** (optional): stream frames to the system `ffmpeg` binary for
//!    MP4 output ([`FfmpegSink`])
//!
//! The key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Deterministic-by-default**: mask building, sampling and synthesis are
//!   pure and stable for a given input.
//! - **No blocking in the render path**: playback is cooperative, driven by a
//!   host [`TickScheduler`]; heavy synthesis can run in bounded steps.
//! - **Dense pixel scans**: per-pixel state lives in `y * width + x` indexed
//!   arrays, never hashed lookups.
#![forbid(unsafe_code)]

pub mod encode;
pub mod engine;
pub mod foundation;
pub mod keyframes;
pub mod motion;
pub mod playback;
pub mod render;
pub mod scene;
pub mod selection;

pub use encode::ffmpeg::{FfmpegSink, ensure_parent_dir, is_ffmpeg_on_path};
pub use encode::sink::{CollectingSink, SinkConfig, VideoSink};
pub use engine::{Engine, EngineConfig};
pub use foundation::core::{Canvas, Point, RasterBuffer, Vec2};
pub use foundation::error::{DriftloopError, DriftloopResult};
pub use keyframes::synth::{
    MAX_KEYFRAMES, MIN_KEYFRAMES, SynthesisJob, SynthesisOptions, clamp_keyframe_count, synthesize,
};
pub use motion::field::{FieldOptions, MotionField, MotionVector};
pub use playback::compositor::{
    Playback, PlaybackOptions, composite_frame, cycle_alpha, keyframe_index_for, loop_progress,
};
pub use playback::schedule::{ManualScheduler, TickId, TickScheduler};
pub use render::surface::{InMemorySurface, RasterSurface};
pub use scene::model::{Scene, decode_source};
pub use selection::mask::{MaskOptions, SELECTED, SelectionMask};
pub use selection::stroke::{RangePoint, RangeStroke};
