use kurbo::Point;

use crate::{
    encode::sink::{SinkConfig, VideoSink},
    foundation::{core::RasterBuffer, error::DriftloopResult},
    keyframes::synth::{self, SynthesisOptions, clamp_keyframe_count},
    motion::field::{FieldOptions, MotionField, MotionVector},
    playback::{
        compositor::{Playback, PlaybackOptions, composite_frame, loop_progress},
        schedule::TickScheduler,
    },
    render::surface::RasterSurface,
    selection::{
        mask::{self, MaskOptions, SelectionMask},
        stroke::{RangePoint, RangeStroke},
    },
};

/// Everything tunable about one effect instance. All empirical constants are
/// fields here rather than hard-coded, grouped by the stage that reads them.
#[derive(Clone, Copy, Debug, PartialEq, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub mask: MaskOptions,
    pub field: FieldOptions,
    pub synthesis: SynthesisOptions,
    pub playback: PlaybackOptions,
}

/// One effect instance over one source image.
///
/// The source buffer is held immutably for the engine's lifetime; it is the
/// sole ground truth for unselected pixels and for edge feathering. Strokes,
/// points and vectors are edited incrementally; the mask and keyframes are
/// regenerated lazily so a burst of edits costs one rebuild.
pub struct Engine {
    original: RasterBuffer,
    config: EngineConfig,
    strokes: Vec<RangeStroke>,
    points: Vec<RangePoint>,
    vectors: Vec<MotionVector>,
    mask: SelectionMask,
    keyframes: Vec<RasterBuffer>,
    dirty: bool,
    batching: bool,
    playback: Playback,
}

impl Engine {
    pub fn new(source: RasterBuffer, config: EngineConfig) -> Self {
        let mask = SelectionMask::empty(source.canvas());
        Self {
            original: source,
            config,
            strokes: Vec::new(),
            points: Vec::new(),
            vectors: Vec::new(),
            mask,
            keyframes: Vec::new(),
            dirty: true,
            batching: false,
            playback: Playback::Idle,
        }
    }

    /// Convenience constructor mirroring the common host call shape.
    pub fn with_params(
        source: RasterBuffer,
        max_displacement: f64,
        motion_blur: f64,
        core_brightening: bool,
    ) -> Self {
        let mut config = EngineConfig::default();
        config.field.max_displacement = max_displacement.max(0.0);
        config.synthesis.motion_blur = motion_blur.clamp(0.0, 1.0);
        config.playback.core_brightening = core_brightening;
        Self::new(source, config)
    }

    pub fn original(&self) -> &RasterBuffer {
        &self.original
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    /// Current selection mask. Reflects the last committed regeneration.
    pub fn selection_mask(&self) -> &SelectionMask {
        &self.mask
    }

    /// Current keyframe sequence. Reflects the last committed regeneration.
    pub fn keyframes(&self) -> &[RasterBuffer] {
        &self.keyframes
    }

    // ---- incremental editing -------------------------------------------

    pub fn add_motion_vector(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, strength: f64) {
        self.vectors.push(MotionVector::new(x1, y1, x2, y2, strength));
        self.dirty = true;
    }

    pub fn add_range_point(&mut self, x: f64, y: f64, radius: f64) {
        self.points.push(RangePoint::new(x, y, radius));
        self.dirty = true;
    }

    pub fn add_range_stroke(&mut self, points: Vec<Point>, radius: f64) {
        self.strokes.push(RangeStroke::new(points, radius));
        self.dirty = true;
    }

    /// Remove every stroke, point and vector whose geometry comes within
    /// `radius` of `(x, y)`.
    pub fn remove_at_point(&mut self, x: f64, y: f64, radius: f64) {
        let p = Point::new(x, y);
        let r = radius.max(0.0);
        let before = self.strokes.len() + self.points.len() + self.vectors.len();

        self.strokes
            .retain(|s| s.dist_sq(p) > (r + s.radius) * (r + s.radius));
        self.points.retain(|pt| (pt.center - p).hypot() > r + pt.radius);
        self.vectors.retain(|v| (v.origin - p).hypot() > r);

        if self.strokes.len() + self.points.len() + self.vectors.len() != before {
            self.dirty = true;
        }
    }

    pub fn clear(&mut self) {
        self.strokes.clear();
        self.points.clear();
        self.vectors.clear();
        self.dirty = true;
    }

    // ---- parameters -----------------------------------------------------

    pub fn set_max_displacement(&mut self, amount: f64) {
        self.config.field.max_displacement = amount.max(0.0);
        self.dirty = true;
    }

    pub fn set_motion_blur(&mut self, amount: f64) {
        self.config.synthesis.motion_blur = amount.clamp(0.0, 1.0);
        self.dirty = true;
    }

    pub fn set_reverse_direction(&mut self, reverse: bool) {
        self.config.field.reverse = reverse;
        self.dirty = true;
    }

    /// Compositing-only switch; does not require regeneration.
    pub fn set_core_brightening(&mut self, on: bool) {
        self.config.playback.core_brightening = on;
    }

    /// Out-of-range counts clamp to the supported range instead of erroring.
    pub fn set_num_keyframes(&mut self, requested: usize) {
        self.config.synthesis.num_keyframes = clamp_keyframe_count(requested);
        self.dirty = true;
    }

    // ---- batched regeneration ------------------------------------------

    /// Defer mask/keyframe regeneration until [`Engine::commit`].
    pub fn begin_batch(&mut self) {
        self.batching = true;
    }

    /// Apply every batched mutation exactly once. After this returns, the
    /// mask and all keyframes reflect the full batch; a render tick never
    /// observes a half-updated keyframe set because the sequence is swapped
    /// in whole.
    pub fn commit(&mut self) -> DriftloopResult<()> {
        self.batching = false;
        self.ensure_prepared()
    }

    fn ensure_prepared(&mut self) -> DriftloopResult<()> {
        if !self.dirty || self.batching {
            return Ok(());
        }
        let mask = mask::rebuild(
            self.original.canvas(),
            &self.strokes,
            &self.points,
            &self.config.mask,
        );
        let keyframes = {
            let field = MotionField::new(
                self.original.canvas(),
                &self.vectors,
                &mask,
                &self.config.field,
            );
            synth::synthesize(&self.original, &mask, &field, &self.config.synthesis)?
        };
        self.mask = mask;
        self.keyframes = keyframes;
        self.dirty = false;
        Ok(())
    }

    // ---- playback -------------------------------------------------------

    /// Start (or restart) looping playback. The first rendered frame is the
    /// pure original, so the animation always opens from full clarity.
    pub fn play(
        &mut self,
        now_ms: f64,
        speed: f64,
        scheduler: &mut dyn TickScheduler,
    ) -> DriftloopResult<()> {
        self.ensure_prepared()?;
        let speed = if speed > 0.0 { speed } else { 1.0 };
        if let Playback::Playing { pending, .. } = self.playback {
            scheduler.cancel_tick(pending);
        }
        self.playback = Playback::Playing {
            started_ms: now_ms,
            speed,
            pending: scheduler.request_tick(),
            first_tick: true,
        };
        Ok(())
    }

    /// Idempotent. Cancels the pending tick synchronously before returning,
    /// so no further frames are produced, and restores the plain source
    /// image to the surface.
    pub fn stop(
        &mut self,
        scheduler: &mut dyn TickScheduler,
        surface: &mut dyn RasterSurface,
    ) -> DriftloopResult<()> {
        match self.playback {
            Playback::Idle => Ok(()),
            Playback::Playing { pending, .. } => {
                scheduler.cancel_tick(pending);
                self.playback = Playback::Idle;
                surface.write_frame(&self.original)
            }
        }
    }

    /// One scheduled render tick. A tick that arrives while idle is a no-op.
    pub fn tick(
        &mut self,
        now_ms: f64,
        scheduler: &mut dyn TickScheduler,
        surface: &mut dyn RasterSurface,
    ) -> DriftloopResult<()> {
        let Playback::Playing {
            started_ms,
            speed,
            first_tick,
            ..
        } = self.playback
        else {
            return Ok(());
        };

        if first_tick {
            surface.write_frame(&self.original)?;
            self.playback = Playback::Playing {
                started_ms: now_ms,
                speed,
                pending: scheduler.request_tick(),
                first_tick: false,
            };
            return Ok(());
        }

        let progress = loop_progress(now_ms - started_ms, speed, &self.config.playback)?;
        let frame = composite_frame(&self.original, &self.keyframes, progress, &self.config.playback);
        surface.write_frame(&frame)?;
        self.playback = Playback::Playing {
            started_ms,
            speed,
            pending: scheduler.request_tick(),
            first_tick: false,
        };
        Ok(())
    }

    // ---- export ---------------------------------------------------------

    /// Render a `duration_secs`-long capture window through `sink` at `fps`
    /// and return the encoded blob. Out-of-range numeric parameters clamp.
    ///
    /// The capture starts at the loop origin — the loop is seamless, so the
    /// phase is arbitrary — and the play/stop state the engine had before
    /// the call is untouched afterwards, including when the sink fails.
    #[tracing::instrument(skip(self, sink))]
    pub fn export(
        &mut self,
        sink: &mut dyn VideoSink,
        fps: u32,
        duration_secs: f64,
    ) -> DriftloopResult<Vec<u8>> {
        self.ensure_prepared()?;
        let fps = fps.max(1);
        let duration_secs = duration_secs.max(0.0);
        let frame_count = ((duration_secs * f64::from(fps)).ceil() as u64).max(1);
        let speed = match self.playback {
            Playback::Playing { speed, .. } => speed,
            Playback::Idle => 1.0,
        };

        sink.begin(SinkConfig {
            width: self.original.width,
            height: self.original.height,
            fps,
        })?;

        for k in 0..frame_count {
            let ts = k as f64 / f64::from(fps);
            let progress = loop_progress(ts * 1000.0, speed, &self.config.playback)?;
            let frame = composite_frame(
                &self.original,
                &self.keyframes,
                progress,
                &self.config.playback,
            );
            sink.push_frame(ts, &frame)?;
        }

        sink.finish()
    }
}
