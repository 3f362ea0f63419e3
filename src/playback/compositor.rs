use crate::foundation::{
    core::RasterBuffer,
    error::{DriftloopError, DriftloopResult},
    math::{lerp_u8, screen_u8},
};

/// Tunables for loop playback and dual-cycle compositing. The curve exponents
/// and ramps are tuned by inspection; they shape how smooth the loop looks,
/// not whether it is correct.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct PlaybackOptions {
    pub loop_duration_ms: f64,
    /// Cycle fade-in exponent over the first half of a cycle (< 1 rises fast).
    pub rise_exponent: f64,
    /// Cycle fade-out exponent over the second half (< 1 decays slowly).
    pub decay_exponent: f64,
    /// The earliest keyframes fade in over this many indices, instead of
    /// popping in as a near-duplicate of the original.
    pub opacity_ramp_frames: u32,
    /// Lower bound on the composite mix once displacement has begun, so the
    /// output is never indistinguishable from the plain original.
    pub visibility_floor: f64,
    /// Alternate screen-style blend for a punchier look.
    pub core_brightening: bool,
}

impl Default for PlaybackOptions {
    fn default() -> Self {
        Self {
            loop_duration_ms: 2400.0,
            rise_exponent: 0.55,
            decay_exponent: 0.8,
            opacity_ramp_frames: 3,
            visibility_floor: 0.35,
            core_brightening: false,
        }
    }
}

/// Fade alpha for one cycle at phase `t` in `[0, 1)`: a fast rise over the
/// first half, a slower decay over the second. Continuous at `t = 0.5` and
/// zero at both ends, which is what hides the loop seam once two cycles run
/// half a loop out of phase.
pub fn cycle_alpha(t: f64, opts: &PlaybackOptions) -> f64 {
    let t = t.rem_euclid(1.0);
    if t < 0.5 {
        (t / 0.5).powf(opts.rise_exponent)
    } else {
        (1.0 - (t - 0.5) / 0.5).powf(opts.decay_exponent)
    }
}

/// Nearest keyframe for a cycle phase, over `[1, count-1]`. Keyframe 0 is the
/// static reference and is never shown during cyclic playback.
pub fn keyframe_index_for(t: f64, count: usize) -> usize {
    debug_assert!(count >= 2);
    let t = t.rem_euclid(1.0);
    let span = (count - 2) as f64;
    1 + (t * span).round().min(span) as usize
}

fn index_ramp(index: usize, ramp_frames: u32) -> f64 {
    if ramp_frames == 0 {
        return 1.0;
    }
    (index as f64 / f64::from(ramp_frames)).min(1.0)
}

/// Composite one output frame at loop progress `t` in `[0, 1)`.
///
/// Two cycles half a loop out of phase each select their nearest keyframe;
/// their faded, index-ramped weights blend the two keyframes, and the result
/// is mixed over the plain original. With fewer than 2 keyframes this renders
/// the plain original (graceful no-op).
pub fn composite_frame(
    original: &RasterBuffer,
    keyframes: &[RasterBuffer],
    progress: f64,
    opts: &PlaybackOptions,
) -> RasterBuffer {
    if keyframes.len() < 2 {
        return original.clone();
    }

    let t1 = progress.rem_euclid(1.0);
    let t2 = (progress + 0.5).rem_euclid(1.0);
    let i1 = keyframe_index_for(t1, keyframes.len());
    let i2 = keyframe_index_for(t2, keyframes.len());
    let w1 = cycle_alpha(t1, opts) * index_ramp(i1, opts.opacity_ramp_frames);
    let w2 = cycle_alpha(t2, opts) * index_ramp(i2, opts.opacity_ramp_frames);
    let total = w1 + w2;
    if total <= f64::EPSILON {
        return original.clone();
    }

    let mix = total.clamp(opts.visibility_floor, 1.0);
    let kf1 = &keyframes[i1];
    let kf2 = &keyframes[i2];

    let mut out = original.clone();
    for (i, chunk) in out.data.chunks_exact_mut(4).enumerate() {
        let base = i * 4;
        for c in 0..4 {
            let a = f64::from(kf1.data[base + c]);
            let b = f64::from(kf2.data[base + c]);
            let blended = ((a * w1 + b * w2) / total).round().clamp(0.0, 255.0) as u8;
            chunk[c] = if opts.core_brightening {
                lerp_u8(chunk[c], screen_u8(chunk[c], blended), mix)
            } else {
                lerp_u8(chunk[c], blended, mix)
            };
        }
    }
    out
}

/// Playback state machine: `Idle -> Playing -> Idle`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Playback {
    Idle,
    Playing {
        /// Clock origin in host milliseconds; reset on the first tick so the
        /// loop always starts from the pure original frame.
        started_ms: f64,
        speed: f64,
        pending: crate::playback::schedule::TickId,
        first_tick: bool,
    },
}

impl Playback {
    pub fn is_playing(&self) -> bool {
        matches!(self, Playback::Playing { .. })
    }
}

/// Normalized loop progress for an elapsed wall-clock interval.
pub fn loop_progress(elapsed_ms: f64, speed: f64, opts: &PlaybackOptions) -> DriftloopResult<f64> {
    if !(opts.loop_duration_ms > 0.0) {
        return Err(DriftloopError::playback("loop duration must be > 0"));
    }
    Ok((elapsed_ms * speed / opts.loop_duration_ms).rem_euclid(1.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Canvas;

    fn buf(rgba: [u8; 4]) -> RasterBuffer {
        RasterBuffer::filled(Canvas::new(4, 4).unwrap(), rgba)
    }

    #[test]
    fn cycle_alpha_is_zero_at_both_ends_and_full_at_midpoint() {
        let opts = PlaybackOptions::default();
        assert_eq!(cycle_alpha(0.0, &opts), 0.0);
        assert!((cycle_alpha(0.5, &opts) - 1.0).abs() < 1e-12);
        assert!(cycle_alpha(0.999_999, &opts) < 1e-3);
    }

    #[test]
    fn cycle_alpha_is_continuous_at_the_half_point() {
        let opts = PlaybackOptions::default();
        let before = cycle_alpha(0.5 - 1e-9, &opts);
        let after = cycle_alpha(0.5 + 1e-9, &opts);
        assert!((before - after).abs() < 1e-6);
    }

    #[test]
    fn keyframe_index_never_selects_frame_zero() {
        for count in 2..=9usize {
            for step in 0..50 {
                let t = step as f64 / 50.0;
                let i = keyframe_index_for(t, count);
                assert!((1..count).contains(&i), "t={t} count={count} i={i}");
            }
        }
    }

    #[test]
    fn keyframe_index_covers_the_full_cycle_range() {
        assert_eq!(keyframe_index_for(0.0, 6), 1);
        assert_eq!(keyframe_index_for(0.999_999, 6), 5);
        // Two keyframes leave only index 1.
        assert_eq!(keyframe_index_for(0.7, 2), 1);
    }

    #[test]
    fn fewer_than_two_keyframes_render_the_plain_original() {
        let original = buf([10, 20, 30, 255]);
        let opts = PlaybackOptions::default();
        let out = composite_frame(&original, &[], 0.3, &opts);
        assert_eq!(out, original);
        let out = composite_frame(&original, std::slice::from_ref(&original), 0.3, &opts);
        assert_eq!(out, original);
    }

    #[test]
    fn loop_boundary_is_seamless() {
        let original = buf([100, 100, 100, 255]);
        // Six distinct keyframes; n-2 even so nearest-index mapping is stable
        // across the wrap.
        let keyframes: Vec<RasterBuffer> = (0..6u8).map(|i| buf([i * 30, 0, 0, 255])).collect();
        let opts = PlaybackOptions::default();
        let at_start = composite_frame(&original, &keyframes, 0.0, &opts);
        let at_end = composite_frame(&original, &keyframes, 1.0 - 1e-9, &opts);
        for (a, b) in at_start.data.iter().zip(&at_end.data) {
            assert!(a.abs_diff(*b) <= 1, "seam mismatch: {a} vs {b}");
        }
    }

    #[test]
    fn visibility_floor_keeps_displacement_visible() {
        let original = buf([0, 0, 0, 255]);
        let keyframes: Vec<RasterBuffer> = (0..4u8).map(|_| buf([200, 0, 0, 255])).collect();
        let opts = PlaybackOptions::default();
        // Quarter progress: cycle weights are mid-fade but the floor keeps the
        // composite clearly away from the original.
        let out = composite_frame(&original, &keyframes, 0.25, &opts);
        assert!(out.pixel(0, 0)[0] >= (200.0 * opts.visibility_floor) as u8 - 1);
    }

    #[test]
    fn core_brightening_never_darkens_the_original() {
        let original = buf([120, 120, 120, 255]);
        let keyframes: Vec<RasterBuffer> = (0..4u8).map(|i| buf([60 + i, 60, 60, 255])).collect();
        let opts = PlaybackOptions {
            core_brightening: true,
            ..PlaybackOptions::default()
        };
        let out = composite_frame(&original, &keyframes, 0.37, &opts);
        for (o, s) in original.data.iter().zip(&out.data) {
            assert!(s >= o);
        }
    }

    #[test]
    fn loop_progress_wraps_and_scales_with_speed() {
        let opts = PlaybackOptions {
            loop_duration_ms: 1000.0,
            ..PlaybackOptions::default()
        };
        assert_eq!(loop_progress(250.0, 1.0, &opts).unwrap(), 0.25);
        assert_eq!(loop_progress(1250.0, 1.0, &opts).unwrap(), 0.25);
        assert_eq!(loop_progress(250.0, 2.0, &opts).unwrap(), 0.5);
        let bad = PlaybackOptions {
            loop_duration_ms: 0.0,
            ..PlaybackOptions::default()
        };
        assert!(loop_progress(10.0, 1.0, &bad).is_err());
    }
}
