use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    config::{EngineSettings, SessionConfig},
    diagnostics::{Diagnostics, FRAME_TYPES, LOOKAHEAD, TB_SPLIT},
    error::Result,
    frame::Frame,
    packet::{EncodedUnit, FrameType},
    queue::InputQueue,
};

/// The transformation a session drives. Implementations take frames from the
/// front of the input queue and return the units they finalized, in order.
pub trait StepEngine {
    /// Advances the engine once. With `end_of_stream` set the engine must
    /// finalize at least one pending frame per call until nothing is left.
    fn step(
        &mut self,
        input: &mut InputQueue,
        end_of_stream: bool,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<EncodedUnit>>;

    /// Frames taken from the input queue that no unit represents yet.
    fn pending(&self) -> usize;

    /// Drops every pending frame, returning how many were dropped.
    fn discard(&mut self) -> usize;
}

const BLOCK: usize = 8;
/// Luma sampling stride used for scene-cut detection.
const SCENE_STRIDE: usize = 4;
const SEQUENCE_MAGIC: &[u8; 4] = b"SEQH";

struct Pending {
    frame: Frame,
    scene_cut: bool,
}

/// Fixed-size ring of pending frames, slot = consumption position % capacity.
struct ReorderRing {
    slots: Vec<Option<Pending>>,
    head: u64,
    len: usize,
}

impl ReorderRing {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: (0..capacity.max(1)).map(|_| None).collect(),
            head: 0,
            len: 0,
        }
    }

    fn slot(&self, pos: u64) -> usize {
        (pos % self.slots.len() as u64) as usize
    }

    fn is_full(&self) -> bool {
        self.len == self.slots.len()
    }

    fn len(&self) -> usize {
        self.len
    }

    fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn push(&mut self, pending: Pending) {
        debug_assert!(!self.is_full());
        let idx = self.slot(self.head + self.len as u64);
        self.slots[idx] = Some(pending);
        self.len += 1;
    }

    /// Entry `offset` positions behind the front.
    fn get(&self, offset: usize) -> Option<&Pending> {
        if offset >= self.len {
            return None;
        }
        self.slots[self.slot(self.head + offset as u64)].as_ref()
    }

    fn pop_front(&mut self) -> Option<Pending> {
        if self.len == 0 {
            return None;
        }
        let idx = self.slot(self.head);
        self.head += 1;
        self.len -= 1;
        self.slots[idx].take()
    }

    fn clear(&mut self) -> usize {
        let n = self.len;
        while self.pop_front().is_some() {}
        n
    }
}

/// Reference engine: a bounded look-ahead window deciding picture types.
///
/// A frame is finalized once `lookahead_depth` later frames sit behind it in
/// the window, or when end-of-stream has been signalled and the input queue is
/// empty. Each step refills the window once, so the work of one step is bounded
/// by the window size.
pub struct LookaheadEngine {
    settings: EngineSettings,
    depth: usize,
    ring: ReorderRing,
    scene_detection: bool,
    /// Last frame admitted into the window, compared against for scene cuts.
    last_admitted: Option<Frame>,
    /// Last finalized frame, the prediction reference for P pictures.
    reference: Option<Frame>,
    since_key: u64,
    header_sent: bool,
}

impl LookaheadEngine {
    pub fn new(config: &SessionConfig) -> Self {
        let settings = config.engine.clone();
        let mut scene_detection = true;
        for (key, value) in &settings.params {
            match key.as_str() {
                "scenecut" => scene_detection = !matches!(value.as_str(), "0" | "false" | "off"),
                _ => log::debug!("lookahead engine ignores parameter {}={}", key, value),
            }
        }
        Self {
            depth: config.lookahead_depth,
            ring: ReorderRing::with_capacity(config.lookahead_depth + 1),
            settings,
            scene_detection,
            last_admitted: None,
            reference: None,
            since_key: 0,
            header_sent: false,
        }
    }

    fn admit(&mut self, frame: Frame, diagnostics: &mut Diagnostics) {
        let scene_cut = match &self.last_admitted {
            Some(prev) if self.scene_detection => {
                mean_abs_diff(prev.luma(), frame.luma()) > self.settings.scene_cut_threshold
            }
            _ => false,
        };
        if scene_cut {
            log::debug!("scene cut detected at frame {}", frame.seq());
            diagnostics.increment(FRAME_TYPES, "scene-cut");
        }
        self.last_admitted = Some(frame.clone());
        self.ring.push(Pending { frame, scene_cut });
    }

    fn finalize(&mut self, diagnostics: &mut Diagnostics, units: &mut Vec<EncodedUnit>) {
        let Some(pending) = self.ring.pop_front() else {
            return;
        };
        // The ring now holds only frames following `pending`.
        if self.ring.len() < self.depth {
            diagnostics.increment(LOOKAHEAD, "flushed");
        }

        let interval = self.settings.keyframe_interval;
        let forced = interval > 0 && self.since_key >= interval;
        let cut_ahead = (0..self.ring.len()).any(|i| self.ring.get(i).is_some_and(|p| p.scene_cut));
        let intra = self.reference.is_none() || pending.scene_cut || (forced && !cut_ahead);
        if forced && cut_ahead && self.since_key == interval {
            diagnostics.increment(LOOKAHEAD, "deferred-keyframes");
        }

        let mut qp = self.settings.qp;
        if self.ring.get(0).is_some_and(|p| p.scene_cut) {
            qp = qp.saturating_add(2).min(51);
        }

        let frame = pending.frame;
        let frame_type = if intra {
            self.since_key = 1;
            FrameType::Intra
        } else {
            self.since_key += 1;
            FrameType::Predicted
        };
        diagnostics.increment(FRAME_TYPES, frame_type.as_str());
        count_block_splits(&frame, self.settings.split_threshold, diagnostics);

        if !self.header_sent {
            self.header_sent = true;
            if self.settings.sequence_headers {
                units.push(EncodedUnit::sequence_header(self.sequence_header()));
            }
        }

        let reference = match frame_type {
            FrameType::Intra => None,
            FrameType::Predicted => self.reference.as_ref(),
        };
        let payload = encode_picture(&frame, reference, frame_type, qp);
        log::trace!(
            "frame {} coded as {} qp {} ({} bytes)",
            frame.seq(),
            frame_type.as_str(),
            qp,
            payload.len()
        );
        units.push(EncodedUnit::picture(frame.seq(), frame_type, payload));
        self.reference = Some(frame);
    }

    fn sequence_header(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(14);
        buf.put_slice(SEQUENCE_MAGIC);
        buf.put_u32(self.settings.width);
        buf.put_u32(self.settings.height);
        buf.put_u8(self.depth as u8);
        buf.put_u8(self.settings.qp);
        buf.freeze()
    }
}

impl StepEngine for LookaheadEngine {
    fn step(
        &mut self,
        input: &mut InputQueue,
        end_of_stream: bool,
        diagnostics: &mut Diagnostics,
    ) -> Result<Vec<EncodedUnit>> {
        while !self.ring.is_full() {
            match input.pop() {
                Some(frame) => self.admit(frame, diagnostics),
                None => break,
            }
        }
        diagnostics.record_max(LOOKAHEAD, "max-buffered", self.ring.len() as u64);

        let flushing = end_of_stream && input.is_empty();
        let mut units = Vec::new();
        while self.ring.len() > self.depth || (flushing && !self.ring.is_empty()) {
            self.finalize(diagnostics, &mut units);
        }
        Ok(units)
    }

    fn pending(&self) -> usize {
        self.ring.len()
    }

    fn discard(&mut self) -> usize {
        self.ring.clear()
    }
}

/// Mean absolute difference over a sparse grid of luma samples.
fn mean_abs_diff(a: &[u8], b: &[u8]) -> u32 {
    let (sum, count) = a
        .iter()
        .zip(b)
        .step_by(SCENE_STRIDE)
        .fold((0u64, 0u64), |(sum, count), (&x, &y)| {
            (sum + x.abs_diff(y) as u64, count + 1)
        });
    if count == 0 { 0 } else { (sum / count) as u32 }
}

/// Classifies every complete 8x8 luma block as split / no-split.
fn count_block_splits(frame: &Frame, threshold: u32, diagnostics: &mut Diagnostics) {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let luma = frame.luma();
    for by in (0..height / BLOCK).map(|y| y * BLOCK) {
        for bx in (0..width / BLOCK).map(|x| x * BLOCK) {
            let (mut sum, mut sum_sq) = (0u64, 0u64);
            for row in luma[by * width..].chunks(width).take(BLOCK) {
                for &v in &row[bx..bx + BLOCK] {
                    sum += v as u64;
                    sum_sq += (v as u64) * (v as u64);
                }
            }
            let n = (BLOCK * BLOCK) as u64;
            let variance = (sum_sq * n - sum * sum) / (n * n);
            if variance == 0 {
                diagnostics.increment(TB_SPLIT, "zero-block");
            }
            if variance > threshold as u64 {
                diagnostics.increment(TB_SPLIT, "split");
            } else {
                diagnostics.increment(TB_SPLIT, "no-split");
            }
        }
    }
}

/// Picture payload: type, qp, sequence number, then the run-length coded
/// samples (or their difference to `reference` for predicted pictures).
fn encode_picture(frame: &Frame, reference: Option<&Frame>, frame_type: FrameType, qp: u8) -> Bytes {
    let data = frame.data();
    let mut buf = BytesMut::with_capacity(10 + data.len() / 4);
    buf.put_u8(frame_type.as_str().as_bytes()[0]);
    buf.put_u8(qp);
    buf.put_u64(frame.seq());
    match reference {
        Some(reference) => {
            let residual = data.iter().zip(reference.data().iter()).map(|(&a, &b)| a.wrapping_sub(b));
            run_length(residual, &mut buf);
        }
        None => run_length(data.iter().copied(), &mut buf),
    }
    buf.freeze()
}

fn run_length(samples: impl Iterator<Item = u8>, buf: &mut BytesMut) {
    let mut current: Option<(u8, u8)> = None;
    for v in samples {
        current = match current {
            Some((value, run)) if value == v && run < u8::MAX => Some((value, run + 1)),
            Some((value, run)) => {
                buf.put_u8(run);
                buf.put_u8(value);
                Some((v, 1))
            }
            None => Some((v, 1)),
        };
    }
    if let Some((value, run)) = current {
        buf.put_u8(run);
        buf.put_u8(value);
    }
}
