use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{
    config::SessionConfig,
    diagnostics::{Diagnostics, Report},
    engine::{LookaheadEngine, StepEngine},
    error::{Error, Result},
    frame::Frame,
    packet::Packet,
    queue::{InputQueue, OutputQueue},
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Frames may be pushed.
    Accepting,
    /// End-of-stream was signalled; steps flush what is buffered.
    Draining,
    /// Every pushed frame has been turned into packets.
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Accepting => "accepting",
            SessionState::Draining => "draining",
            SessionState::Terminated => "terminated",
        })
    }
}

/// Running totals of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_pushed: u64,
    pub packets_emitted: u64,
    pub packets_retrieved: u64,
    pub packets_released: u64,
    pub steps: u64,
    /// Steps taken after end-of-stream was signalled.
    pub drain_steps: u64,
}

/// What [`EncodeSession::teardown`] had to throw away.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Teardown {
    pub frames_discarded: usize,
    pub packets_discarded: usize,
    pub packets_unreleased: usize,
}

impl Teardown {
    pub fn is_clean(&self) -> bool {
        self.frames_discarded == 0 && self.packets_discarded == 0 && self.packets_unreleased == 0
    }
}

/// Push/step/drain state machine around a [`StepEngine`].
///
/// The caller pushes frames, calls [`step`](Self::step) and drains every
/// ready packet after each step. After [`push_end_of_stream`](Self::push_end_of_stream)
/// the caller keeps stepping and draining until [`is_terminated`](Self::is_terminated).
/// No operation blocks: a missing packet is reported as `None`.
pub struct EncodeSession<E: StepEngine = LookaheadEngine> {
    id: u64,
    config: SessionConfig,
    state: SessionState,
    input: InputQueue,
    engine: E,
    output: OutputQueue,
    diagnostics: Diagnostics,
    /// Production indices of packets retrieved but not yet released.
    outstanding: HashSet<u64>,
    next_packet: u64,
    last_seq: Option<u64>,
    stats: SessionStats,
}

impl EncodeSession<LookaheadEngine> {
    pub fn new(config: SessionConfig) -> Result<Self> {
        let engine = LookaheadEngine::new(&config);
        Self::with_engine(config, engine)
    }
}

impl<E: StepEngine> EncodeSession<E> {
    pub fn with_engine(config: SessionConfig, engine: E) -> Result<Self> {
        config.validate()?;
        let id = NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed);
        log::info!(
            "session {} created: {}x{}, lookahead {}, keyframe interval {}",
            id,
            config.engine.width,
            config.engine.height,
            config.lookahead_depth,
            config.engine.keyframe_interval
        );
        Ok(Self {
            id,
            input: InputQueue::new(config.input_capacity),
            output: OutputQueue::new(config.output_capacity),
            config,
            state: SessionState::Accepting,
            engine,
            diagnostics: Diagnostics::new(),
            outstanding: HashSet::new(),
            next_packet: 0,
            last_seq: None,
            stats: SessionStats::default(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn is_terminated(&self) -> bool {
        self.state == SessionState::Terminated
    }

    /// Frames pushed and not yet represented by a packet.
    pub fn buffered_frames(&self) -> usize {
        self.input.len() + self.engine.pending()
    }

    /// Packets ready for [`get_packet`](Self::get_packet).
    pub fn queued_packets(&self) -> usize {
        self.output.len()
    }

    /// Packets retrieved and not released yet.
    pub fn outstanding_packets(&self) -> usize {
        self.outstanding.len()
    }

    fn expect_state(&self, op: &'static str, expected: SessionState) -> Result<()> {
        if self.state != expected {
            return Err(Error::InvalidState {
                op,
                state: self.state,
            });
        }
        Ok(())
    }

    pub fn push_frame(&mut self, frame: Frame) -> Result<()> {
        self.expect_state("push_frame", SessionState::Accepting)?;
        let engine = &self.config.engine;
        if frame.width() != engine.width || frame.height() != engine.height {
            return Err(Error::invalid_argument(format!(
                "frame {} is {}x{}, session expects {}x{}",
                frame.seq(),
                frame.width(),
                frame.height(),
                engine.width,
                engine.height
            )));
        }
        if let Some(last) = self.last_seq {
            if frame.seq() <= last {
                return Err(Error::invalid_argument(format!(
                    "frame {} pushed after frame {}",
                    frame.seq(),
                    last
                )));
            }
        }
        let seq = frame.seq();
        log::trace!("session {} queued {}", self.id, frame);
        self.input.push(frame)?;
        self.last_seq = Some(seq);
        self.stats.frames_pushed += 1;
        Ok(())
    }

    /// Signals that no more frames follow. With nothing buffered the session
    /// terminates right away.
    pub fn push_end_of_stream(&mut self) -> Result<()> {
        self.expect_state("push_end_of_stream", SessionState::Accepting)?;
        self.state = SessionState::Draining;
        log::debug!(
            "session {} draining, {} frames buffered",
            self.id,
            self.buffered_frames()
        );
        self.terminate_if_flushed();
        Ok(())
    }

    /// Advances the engine once and returns how many packets it produced.
    pub fn step(&mut self) -> Result<usize> {
        if self.state == SessionState::Terminated {
            return Err(Error::InvalidState {
                op: "step",
                state: self.state,
            });
        }
        self.output.ensure_room()?;

        let draining = self.state == SessionState::Draining;
        let buffered = self.buffered_frames();
        let units = self
            .engine
            .step(&mut self.input, draining, &mut self.diagnostics)?;

        let produced = units.len();
        for unit in units {
            self.output.push(Packet::new(self.id, self.next_packet, unit));
            self.next_packet += 1;
        }
        self.stats.packets_emitted += produced as u64;
        self.stats.steps += 1;
        if draining {
            self.stats.drain_steps += 1;
        }
        log::trace!(
            "session {} step {}: {} packets, {} frames buffered",
            self.id,
            self.stats.steps,
            produced,
            self.buffered_frames()
        );

        if draining && self.buffered_frames() >= buffered {
            return Err(Error::Stalled { pending: buffered });
        }
        self.terminate_if_flushed();
        Ok(produced)
    }

    fn terminate_if_flushed(&mut self) {
        if self.state == SessionState::Draining && self.buffered_frames() == 0 {
            self.state = SessionState::Terminated;
            log::info!(
                "session {} terminated: {} frames, {} packets, {} steps ({} draining)",
                self.id,
                self.stats.frames_pushed,
                self.stats.packets_emitted,
                self.stats.steps,
                self.stats.drain_steps
            );
        }
    }

    /// Next ready packet in production order, `None` when nothing is ready.
    pub fn get_packet(&mut self) -> Option<Packet> {
        let packet = self.output.pop()?;
        self.outstanding.insert(packet.index());
        self.stats.packets_retrieved += 1;
        Some(packet)
    }

    pub fn release_packet(&mut self, packet: Packet) -> Result<()> {
        if packet.session() != self.id {
            return Err(Error::invalid_argument(format!(
                "packet {} belongs to another session",
                packet.index()
            )));
        }
        if !self.outstanding.remove(&packet.index()) {
            return Err(Error::invalid_argument(format!(
                "packet {} is not outstanding (never retrieved or already released)",
                packet.index()
            )));
        }
        self.stats.packets_released += 1;
        Ok(())
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.diagnostics
    }

    /// Statistics snapshot, see [`Diagnostics::report`].
    pub fn report(&self, section: Option<&str>) -> Report {
        self.diagnostics.report(section)
    }

    /// Discards everything the session still owns and leaves it terminated.
    pub fn teardown(&mut self) -> Teardown {
        let teardown = Teardown {
            frames_discarded: self.input.clear() + self.engine.discard(),
            packets_discarded: self.output.clear(),
            packets_unreleased: self.outstanding.len(),
        };
        self.outstanding.clear();
        self.state = SessionState::Terminated;
        if !teardown.is_clean() {
            log::warn!(
                "session {} torn down with {} frames, {} queued packets and {} unreleased packets",
                self.id,
                teardown.frames_discarded,
                teardown.packets_discarded,
                teardown.packets_unreleased
            );
        }
        teardown
    }
}

impl<E: StepEngine> Drop for EncodeSession<E> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
