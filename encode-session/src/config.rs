use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Largest look-ahead window the reference engine accepts.
pub const MAX_LOOKAHEAD_DEPTH: usize = 64;

/// Parameters interpreted by the step engine. The session itself only reads
/// the frame geometry to validate pushed frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub width: u32,
    pub height: u32,
    /// Maximum distance between two intra frames, 0 disables forced keyframes.
    pub keyframe_interval: u64,
    pub qp: u8,
    /// Mean absolute luma difference above which a frame starts a new scene.
    pub scene_cut_threshold: u32,
    /// 8x8 luma variance above which a transform block is split.
    pub split_threshold: u32,
    /// Emit a sequence header packet ahead of the first picture.
    pub sequence_headers: bool,
    /// Free-form engine parameters passed through untouched.
    pub params: BTreeMap<String, String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            width: 352,
            height: 288,
            keyframe_interval: 25,
            qp: 27,
            scene_cut_threshold: 40,
            split_threshold: 64,
            sequence_headers: true,
            params: BTreeMap::new(),
        }
    }
}

impl EngineSettings {
    /// Size in bytes of one planar 4:2:0 frame, `None` on overflow.
    pub fn frame_size(&self) -> Option<usize> {
        crate::frame::frame_size(self.width, self.height)
    }
}

/// Immutable configuration of one [`EncodeSession`](crate::session::EncodeSession).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Number of future frames the engine may hold back before finalizing a frame.
    pub lookahead_depth: usize,
    /// Bound on frames pushed but not yet consumed, `None` = unbounded.
    pub input_capacity: Option<usize>,
    /// Bound on packets produced but not yet retrieved, `None` = unbounded.
    pub output_capacity: Option<usize>,
    pub engine: EngineSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            lookahead_depth: 2,
            input_capacity: None,
            output_capacity: None,
            engine: EngineSettings::default(),
        }
    }
}

impl SessionConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            engine: EngineSettings {
                width,
                height,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    pub fn with_lookahead(mut self, depth: usize) -> Self {
        self.lookahead_depth = depth;
        self
    }

    pub fn with_input_capacity(mut self, capacity: usize) -> Self {
        self.input_capacity = Some(capacity);
        self
    }

    pub fn with_output_capacity(mut self, capacity: usize) -> Self {
        self.output_capacity = Some(capacity);
        self
    }

    pub fn with_keyframe_interval(mut self, frames: u64) -> Self {
        self.engine.keyframe_interval = frames;
        self
    }

    pub fn with_qp(mut self, qp: u8) -> Self {
        self.engine.qp = qp.min(51);
        self
    }

    pub fn with_sequence_headers(mut self, enabled: bool) -> Self {
        self.engine.sequence_headers = enabled;
        self
    }

    pub fn with_param(mut self, key: &str, value: &str) -> Self {
        self.engine.params.insert(key.to_string(), value.to_string());
        self
    }

    pub fn validate(&self) -> Result<()> {
        let e = &self.engine;
        if e.width == 0 || e.height == 0 {
            return Err(Error::Config(format!(
                "invalid frame size {}x{}",
                e.width, e.height
            )));
        }
        if e.width % 2 != 0 || e.height % 2 != 0 {
            return Err(Error::Config(format!(
                "4:2:0 input needs even dimensions, got {}x{}",
                e.width, e.height
            )));
        }
        if e.frame_size().is_none() {
            return Err(Error::Config(format!(
                "frame size {}x{} is too large",
                e.width, e.height
            )));
        }
        if self.lookahead_depth > MAX_LOOKAHEAD_DEPTH {
            return Err(Error::Config(format!(
                "lookahead depth {} exceeds maximum {}",
                self.lookahead_depth, MAX_LOOKAHEAD_DEPTH
            )));
        }
        if e.qp > 51 {
            return Err(Error::Config(format!("qp {} out of range 0-51", e.qp)));
        }
        if self.input_capacity == Some(0) || self.output_capacity == Some(0) {
            return Err(Error::Config("queue capacity must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Pretty JSON rendering, used to show the effective parameters.
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_default()
    }
}
