use std::{
    io::Write as _,
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
};

use crate::{
    encode::sink::{SinkConfig, VideoSink},
    foundation::{
        core::RasterBuffer,
        error::{DriftloopError, DriftloopResult},
    },
};

pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

pub fn ensure_parent_dir(path: &Path) -> DriftloopResult<()> {
    if let Some(parent) = path.parent() {
        use anyhow::Context as _;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}

fn validate_even_dims(cfg: SinkConfig) -> DriftloopResult<()> {
    cfg.validate()?;
    if !cfg.width.is_multiple_of(2) || !cfg.height.is_multiple_of(2) {
        // Default settings target yuv420p output for maximum compatibility.
        return Err(DriftloopError::validation(
            "export width/height must be even (required for yuv420p mp4 output)",
        ));
    }
    Ok(())
}

/// MP4 sink backed by the system `ffmpeg` binary, fed raw RGBA over stdin.
///
/// The system binary is used instead of `ffmpeg-next` to avoid native FFmpeg
/// dev header/lib requirements. `finish` reads the encoded file back as the
/// blob; with [`FfmpegSink::in_memory`] the intermediate file is deleted
/// afterwards.
pub struct FfmpegSink {
    out_path: PathBuf,
    keep_file: bool,
    state: Option<Encoding>,
    frame_counter: u64,
}

struct Encoding {
    cfg: SinkConfig,
    child: Child,
    stdin: Option<ChildStdin>,
}

impl FfmpegSink {
    /// Encode to `path` and keep the file; `finish` also returns its bytes.
    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self {
            out_path: path.into(),
            keep_file: true,
            state: None,
            frame_counter: 0,
        }
    }

    /// Encode to a temp file that is removed once the blob has been read.
    pub fn in_memory() -> Self {
        let path = std::env::temp_dir().join(format!("driftloop_export_{}.mp4", std::process::id()));
        Self {
            out_path: path,
            keep_file: false,
            state: None,
            frame_counter: 0,
        }
    }

    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    fn spawn(cfg: SinkConfig, out_path: &Path) -> DriftloopResult<Encoding> {
        if !is_ffmpeg_on_path() {
            return Err(DriftloopError::encode(
                "ffmpeg is required for MP4 export, but was not found on PATH",
            ));
        }

        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        cmd.args([
            "-y",
            "-loglevel",
            "error",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "-s",
            &format!("{}x{}", cfg.width, cfg.height),
            "-r",
            &cfg.fps.to_string(),
            "-i",
            "pipe:0",
            "-an",
            "-c:v",
            "libx264",
            "-pix_fmt",
            "yuv420p",
            "-movflags",
            "+faststart",
        ])
        .arg(out_path);

        let mut child = cmd.spawn().map_err(|e| {
            DriftloopError::encode(format!(
                "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
            ))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DriftloopError::encode("failed to open ffmpeg stdin (unexpected)"))?;

        Ok(Encoding {
            cfg,
            child,
            stdin: Some(stdin),
        })
    }
}

impl VideoSink for FfmpegSink {
    #[tracing::instrument(skip(self), fields(out = %self.out_path.display()))]
    fn begin(&mut self, cfg: SinkConfig) -> DriftloopResult<()> {
        validate_even_dims(cfg)?;
        if self.state.is_some() {
            return Err(DriftloopError::encode("encoder capture already started"));
        }
        ensure_parent_dir(&self.out_path)?;
        self.state = Some(Self::spawn(cfg, &self.out_path)?);
        self.frame_counter = 0;
        Ok(())
    }

    fn push_frame(&mut self, _ts_secs: f64, frame: &RasterBuffer) -> DriftloopResult<()> {
        let Some(enc) = self.state.as_mut() else {
            return Err(DriftloopError::encode("push_frame before begin"));
        };
        if frame.width != enc.cfg.width || frame.height != enc.cfg.height {
            return Err(DriftloopError::validation(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                frame.width, frame.height, enc.cfg.width, enc.cfg.height
            )));
        }
        let Some(stdin) = enc.stdin.as_mut() else {
            return Err(DriftloopError::encode("encoder is already finalized"));
        };
        stdin.write_all(&frame.data).map_err(|e| {
            DriftloopError::encode(format!("failed to write frame to ffmpeg stdin: {e}"))
        })?;
        self.frame_counter += 1;
        Ok(())
    }

    fn finish(&mut self) -> DriftloopResult<Vec<u8>> {
        let Some(mut enc) = self.state.take() else {
            return Err(DriftloopError::encode("finish before begin"));
        };
        drop(enc.stdin.take());

        let output = enc
            .child
            .wait_with_output()
            .map_err(|e| DriftloopError::encode(format!("failed to wait for ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DriftloopError::encode(format!(
                "ffmpeg exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        let blob = std::fs::read(&self.out_path).map_err(|e| {
            DriftloopError::encode(format!(
                "failed to read encoded output '{}': {e}",
                self.out_path.display()
            ))
        })?;
        if !self.keep_file {
            let _ = std::fs::remove_file(&self.out_path);
        }
        tracing::debug!(
            frames = self.frame_counter,
            bytes = blob.len(),
            "mp4 export finished"
        );
        Ok(blob)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn odd_dimensions_are_rejected_up_front() {
        assert!(
            validate_even_dims(SinkConfig {
                width: 11,
                height: 10,
                fps: 30
            })
            .is_err()
        );
        assert!(
            validate_even_dims(SinkConfig {
                width: 10,
                height: 10,
                fps: 30
            })
            .is_ok()
        );
    }

    #[test]
    fn push_and_finish_before_begin_fail() {
        let mut sink = FfmpegSink::in_memory();
        let frame = RasterBuffer::filled(
            crate::foundation::core::Canvas::new(2, 2).unwrap(),
            [0, 0, 0, 255],
        );
        assert!(sink.push_frame(0.0, &frame).is_err());
        assert!(sink.finish().is_err());
    }
}
