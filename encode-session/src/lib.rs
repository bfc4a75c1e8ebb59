//! Streaming encode session: frames are pushed in display order, a step
//! engine with a bounded look-ahead window turns them into packets, and the
//! caller drains packets after every step until end-of-stream has been flushed.

pub mod config;
pub mod diagnostics;
pub mod driver;
pub mod engine;
pub mod error;
pub mod frame;
pub mod packet;
pub mod queue;
pub mod session;
pub mod sink;
pub mod source;

pub use config::{EngineSettings, MAX_LOOKAHEAD_DEPTH, SessionConfig};
pub use diagnostics::{Diagnostics, Report, SectionReport};
pub use driver::{RunSummary, run};
pub use engine::{LookaheadEngine, StepEngine};
pub use error::{Error, ErrorKind, Result};
pub use frame::Frame;
pub use packet::{EncodedUnit, FrameType, Packet, PacketKind};
pub use session::{EncodeSession, SessionState, SessionStats, Teardown};
pub use sink::{FileSink, MemorySink, PacketSink};
pub use source::{FrameSource, YuvSource};
