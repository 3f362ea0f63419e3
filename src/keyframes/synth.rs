use rayon::prelude::*;

use crate::{
    foundation::{
        core::RasterBuffer,
        error::{DriftloopError, DriftloopResult},
        math::lerp_rgba,
    },
    motion::field::MotionField,
    selection::mask::SelectionMask,
};

pub const MIN_KEYFRAMES: usize = 2;
pub const MAX_KEYFRAMES: usize = 60;

/// Clamp a requested keyframe count into the supported range. Out-of-range
/// requests are adjusted, never rejected.
pub fn clamp_keyframe_count(requested: usize) -> usize {
    requested.clamp(MIN_KEYFRAMES, MAX_KEYFRAMES)
}

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SynthesisOptions {
    pub num_keyframes: usize,
    /// Neighborhood radius for the selection-density feather sample.
    pub feather_radius: u32,
    /// Minimum feather strength at the painted boundary, so edge pixels are
    /// never perfectly static and never leave a frozen duplicate.
    pub feather_floor: f64,
    /// Displacement ramps in over this many early keyframes.
    pub ramp_frames: u32,
    /// 0..=1 trail softness: blends the displaced sample toward the previous
    /// frame's own pixel.
    pub motion_blur: f64,
    /// Row-parallel one-shot synthesis (export path). The interactive path
    /// uses [`SynthesisJob`] instead and stays on the caller's thread.
    pub parallel_rows: bool,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            num_keyframes: 12,
            feather_radius: 2,
            feather_floor: 0.25,
            ramp_frames: 3,
            motion_blur: 0.0,
            parallel_rows: false,
        }
    }
}

/// Per-frame share of the displacement budget. Each frame displaces the
/// previous one, so the chain accumulates to roughly `max_displacement`; the
/// earliest steps are eased in over `ramp_frames`.
fn step_intensity(frame: usize, count: usize, ramp_frames: u32) -> f64 {
    let budget = 1.0 / (count as f64 - 1.0);
    if ramp_frames == 0 {
        return budget;
    }
    budget * (frame as f64 / f64::from(ramp_frames)).min(1.0)
}

fn synth_row(
    original: &RasterBuffer,
    prev: &RasterBuffer,
    mask: &SelectionMask,
    field: &MotionField<'_>,
    opts: &SynthesisOptions,
    intensity: f64,
    y: u32,
    row: &mut [u8],
) {
    for x in 0..original.width {
        let base = original.pixel(x, y);
        let out = if !mask.is_selected(x, y) {
            // Unselected background always comes from the untouched original,
            // never the previous frame, so it cannot drift or accumulate
            // rounding error.
            base
        } else {
            let density = mask.local_density(x, y, opts.feather_radius);
            let feather = opts.feather_floor + (1.0 - opts.feather_floor) * density;
            let d = field.displacement_at(x, y, intensity);
            let (sx, sy) = prev.clamp_coord(f64::from(x) - d.x, f64::from(y) - d.y);
            let mut sampled = prev.pixel(sx, sy);
            if opts.motion_blur > 0.0 {
                sampled = lerp_rgba(sampled, prev.pixel(x, y), opts.motion_blur);
            }
            lerp_rgba(base, sampled, feather)
        };
        let i = x as usize * 4;
        row[i..i + 4].copy_from_slice(&out);
    }
}

fn synth_frame(
    original: &RasterBuffer,
    prev: &RasterBuffer,
    next: &mut RasterBuffer,
    mask: &SelectionMask,
    field: &MotionField<'_>,
    opts: &SynthesisOptions,
    intensity: f64,
) {
    let row_bytes = original.width as usize * 4;
    if opts.parallel_rows {
        next.data
            .par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(y, row)| {
                synth_row(original, prev, mask, field, opts, intensity, y as u32, row);
            });
    } else {
        for (y, row) in next.data.chunks_mut(row_bytes).enumerate() {
            synth_row(original, prev, mask, field, opts, intensity, y as u32, row);
        }
    }
}

fn check_dims(original: &RasterBuffer, mask: &SelectionMask) -> DriftloopResult<()> {
    if original.canvas() != mask.canvas() {
        return Err(DriftloopError::validation(
            "selection mask dimensions must match the source image",
        ));
    }
    Ok(())
}

/// Synthesize the full keyframe sequence in one call.
///
/// Frame 0 is a deep copy of the original; frame `i` is derived from frame
/// `i-1` only, which is what turns a fixed offset into a flowing trail.
#[tracing::instrument(skip_all, fields(frames = clamp_keyframe_count(opts.num_keyframes)))]
pub fn synthesize(
    original: &RasterBuffer,
    mask: &SelectionMask,
    field: &MotionField<'_>,
    opts: &SynthesisOptions,
) -> DriftloopResult<Vec<RasterBuffer>> {
    check_dims(original, mask)?;
    let count = clamp_keyframe_count(opts.num_keyframes);
    let mut frames = Vec::with_capacity(count);
    frames.push(original.clone());

    for i in 1..count {
        let intensity = step_intensity(i, count, opts.ramp_frames);
        let prev = &frames[i - 1];
        let mut next = RasterBuffer::filled(original.canvas(), [0, 0, 0, 0]);
        synth_frame(original, prev, &mut next, mask, field, opts, intensity);
        frames.push(next);
    }

    tracing::debug!(frames = frames.len(), "keyframes synthesized");
    Ok(frames)
}

/// Resumable, cooperative synthesis: a bounded number of rows per `step`
/// call, so a host driving it from a per-frame callback stays interactive.
/// Produces byte-identical output to [`synthesize`].
pub struct SynthesisJob<'a> {
    original: &'a RasterBuffer,
    mask: &'a SelectionMask,
    field: &'a MotionField<'a>,
    opts: SynthesisOptions,
    frames: Vec<RasterBuffer>,
    pending: Option<RasterBuffer>,
    next_row: u32,
    target: usize,
}

impl<'a> SynthesisJob<'a> {
    pub fn new(
        original: &'a RasterBuffer,
        mask: &'a SelectionMask,
        field: &'a MotionField<'a>,
        opts: SynthesisOptions,
    ) -> DriftloopResult<Self> {
        check_dims(original, mask)?;
        let target = clamp_keyframe_count(opts.num_keyframes);
        Ok(Self {
            original,
            mask,
            field,
            opts,
            frames: vec![original.clone()],
            pending: None,
            next_row: 0,
            target,
        })
    }

    pub fn is_done(&self) -> bool {
        self.frames.len() >= self.target && self.pending.is_none()
    }

    pub fn frames_completed(&self) -> usize {
        self.frames.len()
    }

    /// Advance by at most `max_rows` rows of work. Returns true once the
    /// whole sequence is complete.
    pub fn step(&mut self, max_rows: u32) -> bool {
        if self.is_done() {
            return true;
        }
        let mut budget = max_rows.max(1);
        let height = self.original.height;

        while budget > 0 && !self.is_done() {
            let mut frame = self
                .pending
                .take()
                .unwrap_or_else(|| RasterBuffer::filled(self.original.canvas(), [0, 0, 0, 0]));

            let index = self.frames.len();
            let intensity = step_intensity(index, self.target, self.opts.ramp_frames);
            let rows = budget.min(height - self.next_row);
            let row_bytes = self.original.width as usize * 4;
            let prev = &self.frames[index - 1];

            for y in self.next_row..self.next_row + rows {
                let start = y as usize * row_bytes;
                synth_row(
                    self.original,
                    prev,
                    self.mask,
                    self.field,
                    &self.opts,
                    intensity,
                    y,
                    &mut frame.data[start..start + row_bytes],
                );
            }

            self.next_row += rows;
            budget -= rows;
            if self.next_row == height {
                self.frames.push(frame);
                self.next_row = 0;
            } else {
                self.pending = Some(frame);
            }
        }

        self.is_done()
    }

    pub fn into_frames(self) -> DriftloopResult<Vec<RasterBuffer>> {
        if !self.is_done() {
            return Err(DriftloopError::validation(
                "synthesis job is not finished yet",
            ));
        }
        Ok(self.frames)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        foundation::core::Canvas,
        motion::field::{FieldOptions, MotionVector},
        selection::{
            mask::{self, MaskOptions},
            stroke::RangePoint,
        },
    };

    fn gradient_image(w: u32, h: u32) -> RasterBuffer {
        let mut buf = RasterBuffer::filled(Canvas::new(w, h).unwrap(), [0, 0, 0, 255]);
        for y in 0..h {
            for x in 0..w {
                buf.put_pixel(x, y, [(x * 13 % 256) as u8, (y * 29 % 256) as u8, 77, 255]);
            }
        }
        buf
    }

    fn field_opts() -> FieldOptions {
        FieldOptions {
            influence_fraction: 1.0,
            max_displacement: 4.0,
            ..FieldOptions::default()
        }
    }

    #[test]
    fn frame_zero_is_bit_identical_to_the_original() {
        let img = gradient_image(16, 16);
        let points = [RangePoint::new(8.0, 8.0, 5.0)];
        let mask = mask::rebuild(img.canvas(), &[], &points, &MaskOptions { erosion_passes: 0 });
        let vectors = [MotionVector::new(8.0, 8.0, 12.0, 8.0, 1.0)];
        let fo = field_opts();
        let field = MotionField::new(img.canvas(), &vectors, &mask, &fo);
        let frames = synthesize(&img, &mask, &field, &SynthesisOptions::default()).unwrap();
        assert_eq!(frames[0], img);
    }

    #[test]
    fn keyframe_count_is_clamped_to_supported_range() {
        assert_eq!(clamp_keyframe_count(1), 2);
        assert_eq!(clamp_keyframe_count(0), 2);
        assert_eq!(clamp_keyframe_count(12), 12);
        assert_eq!(clamp_keyframe_count(200), 60);

        let img = gradient_image(8, 8);
        let mask = SelectionMask::empty(img.canvas());
        let vectors = [];
        let fo = field_opts();
        let field = MotionField::new(img.canvas(), &vectors, &mask, &fo);
        for requested in [0usize, 1, 7, 200] {
            let opts = SynthesisOptions {
                num_keyframes: requested,
                ..SynthesisOptions::default()
            };
            let frames = synthesize(&img, &mask, &field, &opts).unwrap();
            assert_eq!(frames.len(), requested.clamp(2, 60));
        }
    }

    #[test]
    fn empty_mask_makes_every_frame_equal_the_original() {
        let img = gradient_image(12, 10);
        let mask = SelectionMask::empty(img.canvas());
        let vectors = [MotionVector::new(5.0, 5.0, 9.0, 5.0, 1.0)];
        let fo = field_opts();
        let field = MotionField::new(img.canvas(), &vectors, &mask, &fo);
        let frames = synthesize(&img, &mask, &field, &SynthesisOptions::default()).unwrap();
        for f in &frames {
            assert_eq!(*f, img);
        }
    }

    #[test]
    fn unselected_background_never_drifts() {
        let img = gradient_image(20, 20);
        let points = [RangePoint::new(6.0, 6.0, 4.0)];
        let mask = mask::rebuild(img.canvas(), &[], &points, &MaskOptions { erosion_passes: 0 });
        let vectors = [MotionVector::new(6.0, 6.0, 10.0, 6.0, 1.0)];
        let fo = field_opts();
        let field = MotionField::new(img.canvas(), &vectors, &mask, &fo);
        let frames = synthesize(&img, &mask, &field, &SynthesisOptions::default()).unwrap();
        for f in &frames {
            for y in 0..20 {
                for x in 0..20 {
                    if !mask.is_selected(x, y) {
                        assert_eq!(f.pixel(x, y), img.pixel(x, y), "({x},{y})");
                    }
                }
            }
        }
    }

    #[test]
    fn selected_interior_actually_moves() {
        let img = gradient_image(24, 24);
        let points = [RangePoint::new(12.0, 12.0, 7.0)];
        let mask = mask::rebuild(img.canvas(), &[], &points, &MaskOptions { erosion_passes: 0 });
        let vectors = [MotionVector::new(12.0, 12.0, 18.0, 12.0, 1.0)];
        let fo = FieldOptions {
            max_displacement: 8.0,
            ..field_opts()
        };
        let field = MotionField::new(img.canvas(), &vectors, &mask, &fo);
        let opts = SynthesisOptions {
            num_keyframes: 6,
            ramp_frames: 0,
            ..SynthesisOptions::default()
        };
        let frames = synthesize(&img, &mask, &field, &opts).unwrap();
        let last = frames.last().unwrap();
        assert_ne!(last.pixel(12, 12), img.pixel(12, 12));
    }

    #[test]
    fn chunked_job_matches_one_shot_synthesis() {
        let img = gradient_image(16, 12);
        let points = [RangePoint::new(8.0, 6.0, 4.0)];
        let mask = mask::rebuild(img.canvas(), &[], &points, &MaskOptions { erosion_passes: 0 });
        let vectors = [MotionVector::new(8.0, 6.0, 11.0, 8.0, 1.0)];
        let fo = field_opts();
        let field = MotionField::new(img.canvas(), &vectors, &mask, &fo);
        let opts = SynthesisOptions {
            num_keyframes: 5,
            ..SynthesisOptions::default()
        };

        let one_shot = synthesize(&img, &mask, &field, &opts).unwrap();

        let mut job = SynthesisJob::new(&img, &mask, &field, opts).unwrap();
        let mut steps = 0;
        while !job.step(3) {
            steps += 1;
            assert!(steps < 10_000, "job failed to converge");
        }
        let chunked = job.into_frames().unwrap();
        assert_eq!(chunked, one_shot);
    }

    #[test]
    fn unfinished_job_refuses_to_yield_frames() {
        let img = gradient_image(8, 8);
        let mask = SelectionMask::empty(img.canvas());
        let vectors = [];
        let fo = field_opts();
        let field = MotionField::new(img.canvas(), &vectors, &mask, &fo);
        let job = SynthesisJob::new(&img, &mask, &field, SynthesisOptions::default()).unwrap();
        assert!(job.into_frames().is_err());
    }
}
