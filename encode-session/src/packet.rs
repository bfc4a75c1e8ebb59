use bytes::Bytes;

/// What a packet carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    /// Stream-level parameters, emitted ahead of the first picture.
    SequenceHeader,
    /// Coded data of exactly one input frame.
    Picture,
}

/// Coding decision taken for a picture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Intra,
    Predicted,
}

impl FrameType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FrameType::Intra => "I",
            FrameType::Predicted => "P",
        }
    }
}

/// A finished output unit handed out by the engine, before the session has
/// stamped it with its production position.
#[derive(Debug, Clone)]
pub struct EncodedUnit {
    pub kind: PacketKind,
    /// Sequence number of the frame this unit represents, `None` for headers.
    pub frame_seq: Option<u64>,
    pub frame_type: Option<FrameType>,
    pub data: Bytes,
}

impl EncodedUnit {
    pub fn picture(frame_seq: u64, frame_type: FrameType, data: impl Into<Bytes>) -> Self {
        Self {
            kind: PacketKind::Picture,
            frame_seq: Some(frame_seq),
            frame_type: Some(frame_type),
            data: data.into(),
        }
    }

    pub fn sequence_header(data: impl Into<Bytes>) -> Self {
        Self {
            kind: PacketKind::SequenceHeader,
            frame_seq: None,
            frame_type: None,
            data: data.into(),
        }
    }
}

/// Output unit retrieved from a session.
///
/// A retrieved packet must be handed back with
/// [`EncodeSession::release_packet`](crate::session::EncodeSession::release_packet).
/// Cloning is cheap (the payload is shared) but a clone refers to the same
/// production slot, so only one of them can be released.
#[derive(Debug, Clone)]
pub struct Packet {
    session: u64,
    index: u64,
    unit: EncodedUnit,
}

impl Packet {
    pub(crate) fn new(session: u64, index: u64, unit: EncodedUnit) -> Self {
        Self {
            session,
            index,
            unit,
        }
    }

    pub(crate) fn session(&self) -> u64 {
        self.session
    }

    /// Production-order position within the session, starting at 0.
    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn kind(&self) -> PacketKind {
        self.unit.kind
    }

    pub fn frame_seq(&self) -> Option<u64> {
        self.unit.frame_seq
    }

    pub fn frame_type(&self) -> Option<FrameType> {
        self.unit.frame_type
    }

    pub fn data(&self) -> &Bytes {
        &self.unit.data
    }

    pub fn size(&self) -> usize {
        self.unit.data.len()
    }

    pub fn is_key(&self) -> bool {
        self.unit.frame_type == Some(FrameType::Intra)
    }
}
