use crate::foundation::{
    core::{Canvas, RasterBuffer},
    error::{DriftloopError, DriftloopResult},
};

/// Host-owned drawable surface. The engine only ever needs to write a full
/// frame and read the current frame back; capture for export is the host's
/// side of the contract.
pub trait RasterSurface {
    fn canvas(&self) -> Canvas;
    fn write_frame(&mut self, frame: &RasterBuffer) -> DriftloopResult<()>;
    fn read_frame(&self) -> DriftloopResult<RasterBuffer>;
}

/// In-memory surface for tests and offline rendering.
#[derive(Debug)]
pub struct InMemorySurface {
    frame: RasterBuffer,
    writes: u64,
}

impl InMemorySurface {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            frame: RasterBuffer::filled(canvas, [0, 0, 0, 255]),
            writes: 0,
        }
    }

    pub fn from_buffer(frame: RasterBuffer) -> Self {
        Self { frame, writes: 0 }
    }

    pub fn frame(&self) -> &RasterBuffer {
        &self.frame
    }

    pub fn write_count(&self) -> u64 {
        self.writes
    }
}

impl RasterSurface for InMemorySurface {
    fn canvas(&self) -> Canvas {
        self.frame.canvas()
    }

    fn write_frame(&mut self, frame: &RasterBuffer) -> DriftloopResult<()> {
        if frame.canvas() != self.frame.canvas() {
            return Err(DriftloopError::validation(format!(
                "frame size mismatch: got {}x{}, surface is {}x{}",
                frame.width, frame.height, self.frame.width, self.frame.height
            )));
        }
        self.frame = frame.clone();
        self.writes += 1;
        Ok(())
    }

    fn read_frame(&self) -> DriftloopResult<RasterBuffer> {
        Ok(self.frame.clone())
    }
}
