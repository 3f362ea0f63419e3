use crate::foundation::error::{DriftloopError, DriftloopResult};

pub use kurbo::{Point, Rect, Vec2};

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> DriftloopResult<Self> {
        if width == 0 || height == 0 {
            return Err(DriftloopError::validation(
                "Canvas width/height must be non-zero",
            ));
        }
        Ok(Self { width, height })
    }

    pub fn pixel_count(self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn longer_dim(self) -> u32 {
        self.width.max(self.height)
    }

    pub fn contains(self, x: i64, y: i64) -> bool {
        x >= 0 && y >= 0 && (x as u64) < u64::from(self.width) && (y as u64) < u64::from(self.height)
    }
}

/// Straight (non-premultiplied) RGBA8 pixel data, row-major, 4 bytes per pixel.
///
/// All per-pixel scans index with `y * width + x` into the dense byte vector;
/// there is no hashed or boxed per-pixel bookkeeping anywhere in the crate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RasterBuffer {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl RasterBuffer {
    pub fn from_rgba8(width: u32, height: u32, data: Vec<u8>) -> DriftloopResult<Self> {
        let canvas = Canvas::new(width, height)?;
        let expected = canvas
            .pixel_count()
            .checked_mul(4)
            .ok_or_else(|| DriftloopError::validation("raster buffer size overflow"))?;
        if data.len() != expected {
            return Err(DriftloopError::validation(format!(
                "raster data length {} does not match {}x{}x4",
                data.len(),
                width,
                height
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn filled(canvas: Canvas, rgba: [u8; 4]) -> Self {
        let mut data = Vec::with_capacity(canvas.pixel_count() * 4);
        for _ in 0..canvas.pixel_count() {
            data.extend_from_slice(&rgba);
        }
        Self {
            width: canvas.width,
            height: canvas.height,
            data,
        }
    }

    pub fn canvas(&self) -> Canvas {
        Canvas {
            width: self.width,
            height: self.height,
        }
    }

    #[inline]
    pub fn byte_index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * 4
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.byte_index(x, y);
        [
            self.data[i],
            self.data[i + 1],
            self.data[i + 2],
            self.data[i + 3],
        ]
    }

    #[inline]
    pub fn put_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        let i = self.byte_index(x, y);
        self.data[i..i + 4].copy_from_slice(&rgba);
    }

    /// Clamp a fractional sample coordinate to the nearest valid pixel.
    #[inline]
    pub fn clamp_coord(&self, x: f64, y: f64) -> (u32, u32) {
        let cx = x.round().clamp(0.0, f64::from(self.width - 1)) as u32;
        let cy = y.round().clamp(0.0, f64::from(self.height - 1)) as u32;
        (cx, cy)
    }
}
