use std::cell::Cell;
use std::rc::Rc;

use crate::config::SessionConfig;
use crate::diagnostics::{Diagnostics, FRAME_TYPES, TB_SPLIT};
use crate::engine::StepEngine;
use crate::error::{Error, ErrorKind};
use crate::frame::Frame;
use crate::packet::{EncodedUnit, FrameType, Packet, PacketKind};
use crate::queue::InputQueue;
use crate::session::{EncodeSession, SessionState, SessionStats};

fn config(depth: usize) -> SessionConfig {
    SessionConfig::new(16, 16)
        .with_lookahead(depth)
        .with_sequence_headers(false)
}

fn frame(seq: u64) -> anyhow::Result<Frame> {
    Ok(Frame::filled(seq, 16, 16, (seq * 7 % 256) as u8)?)
}

/// Retrieves and releases every ready packet, keeping a copy of each.
fn drain<E: StepEngine>(session: &mut EncodeSession<E>, out: &mut Vec<Packet>) -> anyhow::Result<()> {
    while let Some(packet) = session.get_packet() {
        out.push(packet.clone());
        session.release_packet(packet)?;
    }
    Ok(())
}

/// Signals end-of-stream and steps until the session terminates, returning
/// the number of steps taken.
fn flush<E: StepEngine>(session: &mut EncodeSession<E>, out: &mut Vec<Packet>) -> anyhow::Result<usize> {
    session.push_end_of_stream()?;
    let mut steps = 0;
    while !session.is_terminated() {
        session.step()?;
        steps += 1;
        drain(session, out)?;
    }
    drain(session, out)?;
    Ok(steps)
}

fn frame_seqs(packets: &[Packet]) -> Vec<u64> {
    packets.iter().filter_map(Packet::frame_seq).collect()
}

#[test]
fn test_every_frame_comes_out_once_in_order() -> anyhow::Result<()> {
    for depth in [0, 1, 2, 5] {
        for n in [0u64, 1, 3, 10] {
            let mut session = EncodeSession::new(config(depth))?;
            let mut packets = Vec::new();
            for seq in 0..n {
                session.push_frame(frame(seq)?)?;
                session.step()?;
                drain(&mut session, &mut packets)?;
            }
            flush(&mut session, &mut packets)?;

            assert_eq!(frame_seqs(&packets), (0..n).collect::<Vec<_>>(), "depth {depth}, {n} frames");
            assert!(packets.iter().all(|p| p.kind() == PacketKind::Picture));
            let indices: Vec<u64> = packets.iter().map(Packet::index).collect();
            assert_eq!(indices, (0..n).collect::<Vec<_>>());
            assert!(session.get_packet().is_none());

            let stats = session.stats();
            assert_eq!(stats.frames_pushed, n);
            assert_eq!(stats.packets_emitted, n);
            assert_eq!(stats.packets_released, n);
            assert_eq!(session.outstanding_packets(), 0);
        }
    }
    Ok(())
}

#[test]
fn test_flush_is_bounded() -> anyhow::Result<()> {
    for depth in 0..=4usize {
        for buffered in 0..=6u64 {
            let mut session = EncodeSession::new(config(depth))?;
            for seq in 0..buffered {
                session.push_frame(frame(seq)?)?;
            }
            let mut packets = Vec::new();
            let steps = flush(&mut session, &mut packets)?;
            assert!(
                steps <= depth + buffered as usize,
                "depth {depth}, {buffered} buffered: {steps} steps"
            );
            assert_eq!(packets.len() as u64, buffered);
        }
    }
    Ok(())
}

#[test]
fn test_end_of_stream_without_frames_terminates_immediately() -> anyhow::Result<()> {
    let mut session = EncodeSession::new(config(0))?;
    session.push_end_of_stream()?;
    assert!(session.is_terminated());
    assert!(session.get_packet().is_none());
    assert_eq!(session.step().unwrap_err().kind(), ErrorKind::InvalidState);
    Ok(())
}

#[test]
fn test_flush_of_five_frames_with_depth_two() -> anyhow::Result<()> {
    let mut session = EncodeSession::new(config(2))?;
    for seq in 0..5 {
        session.push_frame(frame(seq)?)?;
    }
    session.push_end_of_stream()?;
    assert_eq!(session.state(), SessionState::Draining);

    let mut packets = Vec::new();
    let mut steps = 0;
    while !session.is_terminated() {
        assert!(steps < 7, "flush did not finish within 7 steps");
        session.step()?;
        steps += 1;
        drain(&mut session, &mut packets)?;
    }
    assert_eq!(steps, 3);
    assert_eq!(frame_seqs(&packets), vec![0, 1, 2, 3, 4]);
    assert!(session.get_packet().is_none());
    assert!(session.get_packet().is_none());
    Ok(())
}

#[test]
fn test_operations_after_end_of_stream_are_rejected() -> anyhow::Result<()> {
    let mut session = EncodeSession::new(config(1))?;
    session.push_frame(frame(0)?)?;
    session.push_end_of_stream()?;

    let err = session.push_end_of_stream().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
    assert_eq!(err.to_string(), "push_end_of_stream is not valid while the session is draining");

    let err = session.push_frame(frame(1)?).unwrap_err();
    assert!(matches!(
        err,
        Error::InvalidState {
            op: "push_frame",
            state: SessionState::Draining
        }
    ));

    let mut packets = Vec::new();
    while !session.is_terminated() {
        session.step()?;
        drain(&mut session, &mut packets)?;
    }
    assert_eq!(frame_seqs(&packets), vec![0]);
    assert_eq!(session.push_frame(frame(2)?).unwrap_err().kind(), ErrorKind::InvalidState);
    assert_eq!(session.step().unwrap_err().kind(), ErrorKind::InvalidState);
    Ok(())
}

#[test]
fn test_packet_release_rules() -> anyhow::Result<()> {
    let mut session = EncodeSession::new(config(0))?;
    let mut other = EncodeSession::new(config(0))?;
    assert_ne!(session.id(), other.id());

    session.push_frame(frame(0)?)?;
    session.step()?;
    let packet = session.get_packet().expect("packet ready");
    let copy = packet.clone();
    assert_eq!(session.outstanding_packets(), 1);

    let err = other.release_packet(packet.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(session.outstanding_packets(), 1);

    session.release_packet(packet)?;
    assert_eq!(session.outstanding_packets(), 0);
    let err = session.release_packet(copy).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    assert_eq!(session.stats().packets_released, 1);
    Ok(())
}

#[test]
fn test_get_packet_on_empty_queue_changes_nothing() -> anyhow::Result<()> {
    let mut session = EncodeSession::new(config(2))?;
    for _ in 0..3 {
        assert!(session.get_packet().is_none());
    }
    assert_eq!(session.stats(), SessionStats::default());

    session.push_frame(frame(0)?)?;
    session.step()?;
    assert!(session.get_packet().is_none());
    assert_eq!(session.state(), SessionState::Accepting);
    assert_eq!(session.buffered_frames(), 1);
    Ok(())
}

#[test]
fn test_push_frame_validates_geometry_and_order() -> anyhow::Result<()> {
    let mut session = EncodeSession::new(config(1))?;
    let err = session.push_frame(Frame::filled(0, 32, 16, 0)?).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    session.push_frame(frame(3)?)?;
    assert_eq!(session.push_frame(frame(3)?).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert_eq!(session.push_frame(frame(2)?).unwrap_err().kind(), ErrorKind::InvalidArgument);
    // Gaps are allowed.
    session.push_frame(frame(5)?)?;
    assert_eq!(session.stats().frames_pushed, 2);

    let mut packets = Vec::new();
    flush(&mut session, &mut packets)?;
    assert_eq!(frame_seqs(&packets), vec![3, 5]);
    Ok(())
}

#[test]
fn test_invalid_config_is_rejected() {
    let err = EncodeSession::new(SessionConfig::new(15, 16)).err().expect("odd width");
    assert_eq!(err.kind(), ErrorKind::Config);
    let err = EncodeSession::new(SessionConfig::new(u32::MAX - 1, u32::MAX - 1))
        .err()
        .expect("oversized frames");
    assert_eq!(err.kind(), ErrorKind::Config);
}

#[test]
fn test_input_capacity() -> anyhow::Result<()> {
    let mut session = EncodeSession::new(config(0).with_input_capacity(2))?;
    session.push_frame(frame(0)?)?;
    session.push_frame(frame(1)?)?;
    let err = session.push_frame(frame(2)?).unwrap_err();
    assert!(matches!(
        err,
        Error::ResourceExhaustion {
            queue: "input",
            capacity: 2
        }
    ));
    // A rejected frame does not count as pushed, so the same seq can follow.
    assert_eq!(session.step()?, 1);
    session.push_frame(frame(2)?)?;

    let mut packets = Vec::new();
    flush(&mut session, &mut packets)?;
    assert_eq!(frame_seqs(&packets), vec![0, 1, 2]);
    Ok(())
}

#[test]
fn test_output_capacity() -> anyhow::Result<()> {
    let mut session = EncodeSession::new(config(0).with_output_capacity(1))?;
    session.push_frame(frame(0)?)?;
    assert_eq!(session.step()?, 1);
    session.push_frame(frame(1)?)?;

    let err = session.step().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ResourceExhaustion);
    // The failed step left the frame where it was.
    assert_eq!(session.buffered_frames(), 1);
    assert_eq!(session.stats().steps, 1);

    let mut packets = Vec::new();
    drain(&mut session, &mut packets)?;
    assert_eq!(session.step()?, 1);
    drain(&mut session, &mut packets)?;
    assert_eq!(frame_seqs(&packets), vec![0, 1]);
    Ok(())
}

#[test]
fn test_sequence_header_leads_output() -> anyhow::Result<()> {
    let mut session = EncodeSession::new(config(0).with_sequence_headers(true))?;
    session.push_frame(frame(0)?)?;
    assert_eq!(session.step()?, 2);

    let header = session.get_packet().expect("header");
    assert_eq!(header.kind(), PacketKind::SequenceHeader);
    assert_eq!(header.index(), 0);
    assert_eq!(header.frame_seq(), None);
    let picture = session.get_packet().expect("picture");
    assert_eq!(picture.frame_seq(), Some(0));
    assert!(picture.is_key());
    session.release_packet(header)?;
    session.release_packet(picture)?;
    Ok(())
}

#[test]
fn test_teardown_reports_what_was_dropped() -> anyhow::Result<()> {
    let mut session = EncodeSession::new(config(1))?;
    for seq in 0..3 {
        session.push_frame(frame(seq)?)?;
    }
    session.step()?;
    session.step()?;
    let retrieved = session.get_packet().expect("first packet");
    assert_eq!(retrieved.frame_seq(), Some(0));

    let teardown = session.teardown();
    assert_eq!(teardown.frames_discarded, 1);
    assert_eq!(teardown.packets_discarded, 1);
    assert_eq!(teardown.packets_unreleased, 1);
    assert!(!teardown.is_clean());

    assert!(session.is_terminated());
    assert!(session.get_packet().is_none());
    assert_eq!(session.release_packet(retrieved).unwrap_err().kind(), ErrorKind::InvalidArgument);
    assert!(session.teardown().is_clean());
    Ok(())
}

#[test]
fn test_diagnostics_report_after_flush() -> anyhow::Result<()> {
    let mut session = EncodeSession::new(config(1))?;
    for seq in 0..4 {
        session.push_frame(frame(seq)?)?;
    }
    flush(&mut session, &mut Vec::new())?;

    let report = session.report(Some(TB_SPLIT));
    assert_eq!(report.sections.len(), 1);
    assert!(report.to_string().starts_with("[TB-SPLIT]\n"));
    // 16x16 luma = four 8x8 blocks per frame.
    assert_eq!(session.diagnostics().counter(TB_SPLIT, "no-split"), 16);
    assert_eq!(session.diagnostics().counter(FRAME_TYPES, FrameType::Intra.as_str()), 1);
    assert!(session.report(Some("unknown")).is_empty());
    Ok(())
}

/// Emits two units per frame, one frame per step, and counts discards.
struct PairEngine {
    discards: Rc<Cell<usize>>,
}

impl StepEngine for PairEngine {
    fn step(
        &mut self,
        input: &mut InputQueue,
        _end_of_stream: bool,
        _diagnostics: &mut Diagnostics,
    ) -> crate::error::Result<Vec<EncodedUnit>> {
        Ok(match input.pop() {
            Some(frame) => vec![
                EncodedUnit::picture(frame.seq(), FrameType::Intra, vec![0u8]),
                EncodedUnit::picture(frame.seq(), FrameType::Predicted, vec![1u8]),
            ],
            None => Vec::new(),
        })
    }

    fn pending(&self) -> usize {
        0
    }

    fn discard(&mut self) -> usize {
        self.discards.set(self.discards.get() + 1);
        0
    }
}

#[test]
fn test_bursts_keep_order_and_may_overshoot_output_bound() -> anyhow::Result<()> {
    let discards = Rc::new(Cell::new(0));
    let engine = PairEngine {
        discards: discards.clone(),
    };
    let mut session = EncodeSession::with_engine(config(0).with_output_capacity(1), engine)?;
    for seq in 0..3 {
        session.push_frame(frame(seq)?)?;
    }

    assert_eq!(session.step()?, 2);
    assert_eq!(session.queued_packets(), 2);
    assert_eq!(session.step().unwrap_err().kind(), ErrorKind::ResourceExhaustion);

    let mut packets = Vec::new();
    drain(&mut session, &mut packets)?;
    let steps = flush(&mut session, &mut packets)?;
    assert_eq!(steps, 2);
    assert_eq!(frame_seqs(&packets), vec![0, 0, 1, 1, 2, 2]);
    let indices: Vec<u64> = packets.iter().map(Packet::index).collect();
    assert_eq!(indices, (0..6).collect::<Vec<_>>());

    drop(session);
    assert_eq!(discards.get(), 1);
    Ok(())
}

/// Never takes a frame from its input.
struct StuckEngine;

impl StepEngine for StuckEngine {
    fn step(
        &mut self,
        _input: &mut InputQueue,
        _end_of_stream: bool,
        _diagnostics: &mut Diagnostics,
    ) -> crate::error::Result<Vec<EncodedUnit>> {
        Ok(Vec::new())
    }

    fn pending(&self) -> usize {
        0
    }

    fn discard(&mut self) -> usize {
        0
    }
}

#[test]
fn test_stuck_engine_is_reported_while_draining() -> anyhow::Result<()> {
    let mut session = EncodeSession::with_engine(config(0), StuckEngine)?;
    session.push_frame(frame(0)?)?;
    // Holding frames back is fine while accepting.
    assert_eq!(session.step()?, 0);

    session.push_end_of_stream()?;
    let err = session.step().unwrap_err();
    assert!(matches!(err, Error::Stalled { pending: 1 }));
    assert_eq!(session.state(), SessionState::Draining);
    assert_eq!(session.teardown().frames_discarded, 1);
    Ok(())
}
