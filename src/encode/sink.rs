use crate::foundation::{
    core::RasterBuffer,
    error::{DriftloopError, DriftloopResult},
};

/// Configuration handed to a [`VideoSink`] when capture starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl SinkConfig {
    pub fn validate(&self) -> DriftloopResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(DriftloopError::validation(
                "sink width/height must be non-zero",
            ));
        }
        if self.fps == 0 {
            return Err(DriftloopError::validation("sink fps must be non-zero"));
        }
        Ok(())
    }
}

/// Capture/encode contract for the export path.
///
/// Ordering: `push_frame` is called with strictly increasing timestamps
/// within one `begin`/`finish` window. `finish` yields the encoded blob or
/// fails with an encode error.
pub trait VideoSink {
    fn begin(&mut self, cfg: SinkConfig) -> DriftloopResult<()>;
    fn push_frame(&mut self, ts_secs: f64, frame: &RasterBuffer) -> DriftloopResult<()>;
    fn finish(&mut self) -> DriftloopResult<Vec<u8>>;
}

/// In-memory sink for tests and debugging. The "blob" is the raw RGBA bytes
/// of every captured frame, concatenated in order.
#[derive(Debug, Default)]
pub struct CollectingSink {
    cfg: Option<SinkConfig>,
    frames: Vec<(f64, RasterBuffer)>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<SinkConfig> {
        self.cfg
    }

    pub fn frames(&self) -> &[(f64, RasterBuffer)] {
        &self.frames
    }

    /// Timestamps of the first and last captured frame, if any.
    pub fn capture_window(&self) -> Option<(f64, f64)> {
        let first = self.frames.first()?.0;
        let last = self.frames.last()?.0;
        Some((first, last))
    }
}

impl VideoSink for CollectingSink {
    fn begin(&mut self, cfg: SinkConfig) -> DriftloopResult<()> {
        cfg.validate()?;
        self.cfg = Some(cfg);
        self.frames.clear();
        Ok(())
    }

    fn push_frame(&mut self, ts_secs: f64, frame: &RasterBuffer) -> DriftloopResult<()> {
        let Some(cfg) = self.cfg else {
            return Err(DriftloopError::encode("push_frame before begin"));
        };
        if frame.width != cfg.width || frame.height != cfg.height {
            return Err(DriftloopError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, cfg.width, cfg.height
            )));
        }
        if let Some((_, last)) = self.capture_window()
            && ts_secs <= last
        {
            return Err(DriftloopError::encode(
                "push_frame timestamps must be strictly increasing",
            ));
        }
        self.frames.push((ts_secs, frame.clone()));
        Ok(())
    }

    fn finish(&mut self) -> DriftloopResult<Vec<u8>> {
        if self.cfg.is_none() {
            return Err(DriftloopError::encode("finish before begin"));
        }
        let mut blob = Vec::new();
        for (_, frame) in &self.frames {
            blob.extend_from_slice(&frame.data);
        }
        Ok(blob)
    }
}

/// Sink that fails on `finish`, for exercising export error recovery.
#[derive(Debug, Default)]
pub struct FailingSink {
    pub began: bool,
    pub pushed: usize,
}

impl VideoSink for FailingSink {
    fn begin(&mut self, cfg: SinkConfig) -> DriftloopResult<()> {
        cfg.validate()?;
        self.began = true;
        Ok(())
    }

    fn push_frame(&mut self, _ts_secs: f64, _frame: &RasterBuffer) -> DriftloopResult<()> {
        self.pushed += 1;
        Ok(())
    }

    fn finish(&mut self) -> DriftloopResult<Vec<u8>> {
        Err(DriftloopError::encode("simulated encoder failure"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::Canvas;

    fn frame() -> RasterBuffer {
        RasterBuffer::filled(Canvas::new(2, 2).unwrap(), [5, 6, 7, 255])
    }

    #[test]
    fn collecting_sink_concatenates_frames() {
        let mut sink = CollectingSink::new();
        sink.begin(SinkConfig {
            width: 2,
            height: 2,
            fps: 30,
        })
        .unwrap();
        sink.push_frame(0.0, &frame()).unwrap();
        sink.push_frame(1.0 / 30.0, &frame()).unwrap();
        let blob = sink.finish().unwrap();
        assert_eq!(blob.len(), 2 * 2 * 4 * 2);
        assert_eq!(sink.capture_window(), Some((0.0, 1.0 / 30.0)));
    }

    #[test]
    fn non_monotonic_timestamps_are_rejected() {
        let mut sink = CollectingSink::new();
        sink.begin(SinkConfig {
            width: 2,
            height: 2,
            fps: 30,
        })
        .unwrap();
        sink.push_frame(0.5, &frame()).unwrap();
        assert!(sink.push_frame(0.5, &frame()).is_err());
        assert!(sink.push_frame(0.1, &frame()).is_err());
    }

    #[test]
    fn push_before_begin_is_an_encode_error() {
        let mut sink = CollectingSink::new();
        assert!(matches!(
            sink.push_frame(0.0, &frame()),
            Err(DriftloopError::Encode(_))
        ));
    }

    #[test]
    fn config_validation_catches_bad_values() {
        assert!(
            SinkConfig {
                width: 0,
                height: 2,
                fps: 30
            }
            .validate()
            .is_err()
        );
        assert!(
            SinkConfig {
                width: 2,
                height: 2,
                fps: 0
            }
            .validate()
            .is_err()
        );
    }
}
