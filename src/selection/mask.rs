use kurbo::Point;

use crate::{
    foundation::core::Canvas,
    selection::stroke::{RangePoint, RangeStroke},
};

/// Cell value for a selected pixel. Cells are exactly `0` or [`SELECTED`];
/// partial coverage is a rendering-time concern, never a mask-time one.
pub const SELECTED: u8 = 255;

/// Tunables for mask construction. The erosion pass count is empirical; it
/// strips ragged/aliased boundary pixels so only solidly painted interior
/// pixels participate in displacement.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct MaskOptions {
    pub erosion_passes: u32,
}

impl Default for MaskOptions {
    fn default() -> Self {
        Self { erosion_passes: 3 }
    }
}

/// Dense per-pixel selection flags, `y * width + x` indexed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SelectionMask {
    width: u32,
    height: u32,
    cells: Vec<u8>,
}

impl SelectionMask {
    pub fn empty(canvas: Canvas) -> Self {
        Self {
            width: canvas.width,
            height: canvas.height,
            cells: vec![0; canvas.pixel_count()],
        }
    }

    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    fn idx(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn value(&self, x: u32, y: u32) -> u8 {
        self.cells[self.idx(x, y)]
    }

    #[inline]
    pub fn is_selected(&self, x: u32, y: u32) -> bool {
        self.value(x, y) == SELECTED
    }

    pub fn selected_count(&self) -> usize {
        self.cells.iter().filter(|&&c| c == SELECTED).count()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|&c| c == 0)
    }

    /// True when every selected cell of `self` is also selected in `other`.
    pub fn is_subset_of(&self, other: &SelectionMask) -> bool {
        self.cells
            .iter()
            .zip(&other.cells)
            .all(|(&a, &b)| a != SELECTED || b == SELECTED)
    }

    /// Fraction of selected cells in the `(2r+1)²` neighborhood around
    /// `(x, y)`, clipped to the canvas. Drives edge feathering: deep interior
    /// pixels report ~1.0, boundary pixels report less.
    pub fn local_density(&self, x: u32, y: u32, radius: u32) -> f64 {
        let r = radius as i64;
        let (cx, cy) = (x as i64, y as i64);
        let mut total = 0u32;
        let mut selected = 0u32;
        for ny in (cy - r)..=(cy + r) {
            for nx in (cx - r)..=(cx + r) {
                if !self.canvas().contains(nx, ny) {
                    continue;
                }
                total += 1;
                if self.is_selected(nx as u32, ny as u32) {
                    selected += 1;
                }
            }
        }
        if total == 0 {
            return 0.0;
        }
        f64::from(selected) / f64::from(total)
    }

    /// One structural erosion pass: a selected cell survives only if all 8
    /// neighbors are selected. Neighbors outside the canvas count as
    /// unselected, so the selection also shrinks away from the border.
    fn erode_once(&mut self) {
        let prev = self.cells.clone();
        let w = self.width as i64;
        let h = self.height as i64;
        let at = |x: i64, y: i64| -> u8 {
            if x < 0 || y < 0 || x >= w || y >= h {
                return 0;
            }
            prev[(y * w + x) as usize]
        };
        for y in 0..h {
            for x in 0..w {
                let i = (y * w + x) as usize;
                if at(x, y) != SELECTED {
                    continue;
                }
                let mut keep = true;
                'scan: for dy in -1..=1 {
                    for dx in -1..=1 {
                        if dx == 0 && dy == 0 {
                            continue;
                        }
                        if at(x + dx, y + dy) != SELECTED {
                            keep = false;
                            break 'scan;
                        }
                    }
                }
                if !keep {
                    self.cells[i] = 0;
                }
            }
        }
    }

    pub fn erode(&mut self, passes: u32) {
        for _ in 0..passes {
            if self.is_empty() {
                return;
            }
            self.erode_once();
        }
    }
}

/// Rasterize painted strokes and points into a fresh binary mask, then erode.
///
/// Pure and total: out-of-canvas geometry is clipped before iteration, empty
/// input yields an all-zero mask.
#[tracing::instrument(skip_all, fields(strokes = strokes.len(), points = points.len()))]
pub fn rebuild(
    canvas: Canvas,
    strokes: &[RangeStroke],
    points: &[RangePoint],
    opts: &MaskOptions,
) -> SelectionMask {
    let mut mask = SelectionMask::empty(canvas);

    for stroke in strokes {
        let Some(bounds) = stroke.bounds() else {
            continue;
        };
        let r_sq = stroke.radius * stroke.radius;
        for (x, y) in clipped_pixels(canvas, bounds) {
            if stroke.dist_sq(Point::new(f64::from(x), f64::from(y))) <= r_sq {
                let i = mask.idx(x, y);
                mask.cells[i] = SELECTED;
            }
        }
    }

    for point in points {
        let r_sq = point.radius * point.radius;
        for (x, y) in clipped_pixels(canvas, point.bounds()) {
            let d = point.center - Point::new(f64::from(x), f64::from(y));
            if d.hypot2() <= r_sq {
                let i = mask.idx(x, y);
                mask.cells[i] = SELECTED;
            }
        }
    }

    mask.erode(opts.erosion_passes);
    tracing::debug!(selected = mask.selected_count(), "selection mask rebuilt");
    mask
}

/// Integer pixel coordinates inside `bounds` intersected with the canvas.
fn clipped_pixels(canvas: Canvas, bounds: kurbo::Rect) -> impl Iterator<Item = (u32, u32)> {
    let x0 = bounds.x0.floor().max(0.0) as u32;
    let y0 = bounds.y0.floor().max(0.0) as u32;
    let x1 = (bounds.x1.ceil().min(f64::from(canvas.width) - 1.0)).max(-1.0) as i64;
    let y1 = (bounds.y1.ceil().min(f64::from(canvas.height) - 1.0)).max(-1.0) as i64;
    (y0 as i64..=y1).flat_map(move |y| (x0 as i64..=x1).map(move |x| (x as u32, y as u32)))
}
