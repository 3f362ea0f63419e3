use kurbo::{Point, Vec2};

use crate::{foundation::core::Canvas, selection::mask::SelectionMask};

/// A user-drawn arrow: where it was anchored, which way it points, and how
/// strongly it should pull nearby pixels.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MotionVector {
    pub origin: Point,
    pub delta: Vec2,
    pub strength: f64,
}

impl MotionVector {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64, strength: f64) -> Self {
        Self {
            origin: Point::new(x1, y1),
            delta: Vec2::new(x2 - x1, y2 - y1),
            strength: strength.max(0.0),
        }
    }
}

/// Tunables for displacement sampling.
///
/// `influence_fraction` bounds each vector's reach to a fraction of the longer
/// canvas dimension; `falloff_exponent` is deliberately steep so a pixel
/// follows its nearest arrow rather than an ambiguous blend of distant,
/// conflicting ones.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct FieldOptions {
    pub max_displacement: f64,
    pub influence_fraction: f64,
    pub falloff_exponent: f64,
    pub reverse: bool,
}

impl Default for FieldOptions {
    fn default() -> Self {
        Self {
            max_displacement: 30.0,
            influence_fraction: 0.15,
            falloff_exponent: 3.5,
            reverse: false,
        }
    }
}

/// Displacement field over one canvas: user vectors gated by the selection
/// mask. Borrowed view; the engine rebuilds it cheaply per regeneration.
pub struct MotionField<'a> {
    canvas: Canvas,
    vectors: &'a [MotionVector],
    mask: &'a SelectionMask,
    opts: &'a FieldOptions,
}

impl<'a> MotionField<'a> {
    pub fn new(
        canvas: Canvas,
        vectors: &'a [MotionVector],
        mask: &'a SelectionMask,
        opts: &'a FieldOptions,
    ) -> Self {
        Self {
            canvas,
            vectors,
            mask,
            opts,
        }
    }

    pub fn influence_radius(&self) -> f64 {
        self.opts.influence_fraction * f64::from(self.canvas.longer_dim())
    }

    /// Weighted displacement at a pixel, scaled by the caller's per-frame
    /// `intensity` ramp.
    ///
    /// Pixels whose mask cell is not fully selected never move. Each in-range
    /// vector contributes its magnitude-normalized direction — the artist's
    /// intent is the direction of the drag, not its length — weighted by
    /// strength times `(1 - d/r)^falloff`. The weighted mean direction is
    /// scaled by `max_displacement * intensity * min(1, Σw)` so displacement
    /// decays to zero toward the influence boundary.
    pub fn displacement_at(&self, x: u32, y: u32, intensity: f64) -> Vec2 {
        if !self.mask.is_selected(x, y) {
            return Vec2::ZERO;
        }

        let radius = self.influence_radius();
        if radius <= 0.0 {
            return Vec2::ZERO;
        }

        let p = Point::new(f64::from(x), f64::from(y));
        let mut acc = Vec2::ZERO;
        let mut weight_sum = 0.0f64;

        for v in self.vectors {
            let dist = (v.origin - p).hypot();
            if dist > radius {
                continue;
            }
            let len = v.delta.hypot();
            if len <= f64::EPSILON {
                continue;
            }
            let w = (1.0 - dist / radius).powf(self.opts.falloff_exponent) * v.strength;
            if w <= 0.0 {
                continue;
            }
            acc += (v.delta / len) * w;
            weight_sum += w;
        }

        if weight_sum <= f64::EPSILON {
            return Vec2::ZERO;
        }

        let mean_dir = acc / weight_sum;
        let out = mean_dir * (self.opts.max_displacement * intensity * weight_sum.min(1.0));
        if self.opts.reverse { -out } else { out }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::{
        mask::{self, MaskOptions},
        stroke::RangePoint,
    };

    fn canvas(w: u32, h: u32) -> Canvas {
        Canvas::new(w, h).unwrap()
    }

    fn full_influence() -> FieldOptions {
        FieldOptions {
            influence_fraction: 1.0,
            ..FieldOptions::default()
        }
    }

    #[test]
    fn unselected_pixels_never_move() {
        let canvas = canvas(8, 8);
        let mask = SelectionMask::empty(canvas);
        let vectors = [MotionVector::new(4.0, 4.0, 6.0, 4.0, 1.0)];
        let opts = full_influence();
        let field = MotionField::new(canvas, &vectors, &mask, &opts);
        for y in 0..8 {
            for x in 0..8 {
                assert_eq!(field.displacement_at(x, y, 1.0), Vec2::ZERO);
            }
        }
    }

    #[test]
    fn selected_pixels_follow_the_arrow_direction() {
        // 4x4 image, one arrow (1,1)->(2,1), selection disc of radius 2 at
        // (1,1), no erosion so the tiny canvas keeps its selection.
        let canvas = canvas(4, 4);
        let points = [RangePoint::new(1.0, 1.0, 2.0)];
        let mask = mask::rebuild(canvas, &[], &points, &MaskOptions { erosion_passes: 0 });
        let vectors = [MotionVector::new(1.0, 1.0, 2.0, 1.0, 1.0)];
        let opts = full_influence();
        let field = MotionField::new(canvas, &vectors, &mask, &opts);

        for y in 0..4u32 {
            for x in 0..4u32 {
                let d = field.displacement_at(x, y, 1.0);
                let dist_sq = (f64::from(x) - 1.0).powi(2) + (f64::from(y) - 1.0).powi(2);
                if dist_sq > 4.0 {
                    assert_eq!(d, Vec2::ZERO, "({x},{y}) outside the disc");
                } else {
                    assert!(d.hypot() > 0.0, "({x},{y}) inside the disc");
                    let unit = d / d.hypot();
                    assert!((unit.x - 1.0).abs() < 1e-9);
                    assert!(unit.y.abs() < 1e-9);
                }
            }
        }
    }

    #[test]
    fn reverse_negates_displacement_everywhere() {
        let canvas = canvas(16, 16);
        let points = [RangePoint::new(8.0, 8.0, 5.0)];
        let mask = mask::rebuild(canvas, &[], &points, &MaskOptions { erosion_passes: 0 });
        let vectors = [
            MotionVector::new(6.0, 8.0, 9.0, 10.0, 1.0),
            MotionVector::new(10.0, 7.0, 7.0, 7.0, 0.5),
        ];
        let forward = full_influence();
        let reversed = FieldOptions {
            reverse: true,
            ..forward
        };
        let f = MotionField::new(canvas, &vectors, &mask, &forward);
        let r = MotionField::new(canvas, &vectors, &mask, &reversed);
        for y in 0..16 {
            for x in 0..16 {
                let a = f.displacement_at(x, y, 1.0);
                let b = r.displacement_at(x, y, 1.0);
                assert_eq!(a.x, -b.x);
                assert_eq!(a.y, -b.y);
            }
        }
    }

    #[test]
    fn out_of_range_vectors_contribute_nothing() {
        let canvas = canvas(100, 100);
        let points = [RangePoint::new(10.0, 10.0, 4.0)];
        let mask = mask::rebuild(canvas, &[], &points, &MaskOptions { erosion_passes: 0 });
        // Influence radius is 15 (0.15 * 100); the arrow sits 80+ px away.
        let vectors = [MotionVector::new(95.0, 95.0, 99.0, 95.0, 1.0)];
        let opts = FieldOptions::default();
        let field = MotionField::new(canvas, &vectors, &mask, &opts);
        assert_eq!(field.displacement_at(10, 10, 1.0), Vec2::ZERO);
    }

    #[test]
    fn degenerate_zero_length_arrow_is_ignored() {
        let canvas = canvas(8, 8);
        let points = [RangePoint::new(4.0, 4.0, 3.0)];
        let mask = mask::rebuild(canvas, &[], &points, &MaskOptions { erosion_passes: 0 });
        let vectors = [MotionVector::new(4.0, 4.0, 4.0, 4.0, 1.0)];
        let opts = full_influence();
        let field = MotionField::new(canvas, &vectors, &mask, &opts);
        assert_eq!(field.displacement_at(4, 4, 1.0), Vec2::ZERO);
    }

    #[test]
    fn closer_arrows_dominate_the_blend() {
        let canvas = canvas(32, 32);
        let points = [RangePoint::new(8.0, 16.0, 6.0)];
        let mask = mask::rebuild(canvas, &[], &points, &MaskOptions { erosion_passes: 0 });
        // Near arrow points +x, far arrow points -x with the same strength.
        let vectors = [
            MotionVector::new(9.0, 16.0, 12.0, 16.0, 1.0),
            MotionVector::new(30.0, 16.0, 27.0, 16.0, 1.0),
        ];
        let opts = full_influence();
        let field = MotionField::new(canvas, &vectors, &mask, &opts);
        let d = field.displacement_at(8, 16, 1.0);
        assert!(d.x > 0.0, "near +x arrow should win, got {d:?}");
    }
}
