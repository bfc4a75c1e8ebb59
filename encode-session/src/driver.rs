use anyhow::Context;
use serde::Serialize;

use crate::{
    engine::StepEngine, session::EncodeSession, sink::PacketSink, source::FrameSource,
};

/// Totals of one [`run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub frames_pushed: u64,
    pub packets_written: u64,
    pub bytes_written: u64,
    pub steps: u64,
}

/// Moves every ready packet from the session into the sink.
fn drain<E: StepEngine>(
    session: &mut EncodeSession<E>,
    sink: &mut dyn PacketSink,
    summary: &mut RunSummary,
) -> anyhow::Result<()> {
    while let Some(packet) = session.get_packet() {
        sink.send(packet.data())
            .with_context(|| format!("failed to write packet {}", packet.index()))?;
        summary.packets_written += 1;
        summary.bytes_written += packet.size() as u64;
        session.release_packet(packet)?;
    }
    Ok(())
}

/// Feeds `source` through `session` into `sink` until the session terminates.
///
/// One step follows every pushed frame and the output is drained after every
/// step. End-of-stream is signalled when the source runs dry or after
/// `max_frames` frames, whichever comes first.
pub fn run<E: StepEngine>(
    session: &mut EncodeSession<E>,
    source: &mut dyn FrameSource,
    sink: &mut dyn PacketSink,
    max_frames: Option<u64>,
) -> anyhow::Result<RunSummary> {
    let mut summary = RunSummary::default();

    while max_frames.is_none_or(|max| summary.frames_pushed < max) {
        let Some(frame) = source.next_frame()? else {
            break;
        };
        session
            .push_frame(frame)
            .context("failed to push frame into the session")?;
        summary.frames_pushed += 1;
        session.step()?;
        summary.steps += 1;
        drain(session, sink, &mut summary)?;
    }

    log::debug!(
        "end of input after {} frames, flushing {} buffered",
        summary.frames_pushed,
        session.buffered_frames()
    );
    session.push_end_of_stream()?;
    while !session.is_terminated() {
        session.step()?;
        summary.steps += 1;
        drain(session, sink, &mut summary)?;
    }
    drain(session, sink, &mut summary)?;
    sink.finish()?;

    log::info!(
        "encoded {} frames into {} packets ({} bytes) in {} steps",
        summary.frames_pushed,
        summary.packets_written,
        summary.bytes_written,
        summary.steps
    );
    Ok(summary)
}
