use std::{io::Read, path::PathBuf};

use anyhow::Context as _;

use crate::{
    engine::{Engine, EngineConfig},
    foundation::{core::RasterBuffer, error::DriftloopResult},
    motion::field::MotionVector,
    selection::stroke::{RangePoint, RangeStroke},
};

/// Serialized description of one effect project: the source still plus every
/// painted primitive and the engine tuning. This is what the CLI reads.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Scene {
    /// Path to the source image, resolved relative to the scene file's
    /// directory by the caller.
    pub source: PathBuf,
    #[serde(default)]
    pub strokes: Vec<RangeStroke>,
    #[serde(default)]
    pub points: Vec<RangePoint>,
    #[serde(default)]
    pub vectors: Vec<MotionVector>,
    #[serde(default)]
    pub config: EngineConfig,
}

impl Scene {
    pub fn from_json_str(json: &str) -> DriftloopResult<Self> {
        let scene: Scene = serde_json::from_str(json).context("parse scene JSON")?;
        Ok(scene)
    }

    pub fn from_json_reader(reader: impl Read) -> DriftloopResult<Self> {
        let scene: Scene = serde_json::from_reader(reader).context("parse scene JSON")?;
        Ok(scene)
    }

    /// Build a ready-to-render engine over an already-decoded source buffer.
    /// All primitives are applied as one batch and committed once.
    pub fn into_engine(self, source: RasterBuffer) -> DriftloopResult<Engine> {
        let mut engine = Engine::new(source, self.config);
        engine.begin_batch();
        for stroke in self.strokes {
            engine.add_range_stroke(stroke.points, stroke.radius);
        }
        for point in self.points {
            engine.add_range_point(point.center.x, point.center.y, point.radius);
        }
        for v in self.vectors {
            engine.add_motion_vector(
                v.origin.x,
                v.origin.y,
                v.origin.x + v.delta.x,
                v.origin.y + v.delta.y,
                v.strength,
            );
        }
        engine.commit()?;
        Ok(engine)
    }
}

/// Decode a source still into the engine's straight-RGBA raster format.
pub fn decode_source(bytes: &[u8]) -> DriftloopResult<RasterBuffer> {
    let dyn_img = image::load_from_memory(bytes).context("decode source image")?;
    let rgba = dyn_img.to_rgba8();
    let (width, height) = rgba.dimensions();
    RasterBuffer::from_rgba8(width, height, rgba.into_raw())
}
