use std::collections::VecDeque;

use crate::{
    error::{Error, Result},
    frame::Frame,
    packet::Packet,
};

/// Frames pushed into the session and not yet taken by the step engine, in
/// push order.
#[derive(Debug, Default)]
pub struct InputQueue {
    frames: VecDeque<Frame>,
    capacity: Option<usize>,
}

impl InputQueue {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            frames: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, frame: Frame) -> Result<()> {
        if let Some(capacity) = self.capacity {
            if self.frames.len() >= capacity {
                return Err(Error::ResourceExhaustion {
                    queue: "input",
                    capacity,
                });
            }
        }
        self.frames.push_back(frame);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<Frame> {
        self.frames.pop_front()
    }

    pub fn front(&self) -> Option<&Frame> {
        self.frames.front()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Drops every queued frame and returns how many there were.
    pub(crate) fn clear(&mut self) -> usize {
        let n = self.frames.len();
        self.frames.clear();
        n
    }
}

/// Packets produced by the engine and not yet retrieved, in production order.
#[derive(Debug, Default)]
pub struct OutputQueue {
    packets: VecDeque<Packet>,
    capacity: Option<usize>,
}

impl OutputQueue {
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            packets: VecDeque::new(),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, packet: Packet) {
        self.packets.push_back(packet);
    }

    pub(crate) fn pop(&mut self) -> Option<Packet> {
        self.packets.pop_front()
    }

    pub fn len(&self) -> usize {
        self.packets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packets.is_empty()
    }

    /// Fails when the queue already holds `capacity` packets. Bursts are only
    /// checked before they start, so one step may overshoot the bound.
    pub(crate) fn ensure_room(&self) -> Result<()> {
        match self.capacity {
            Some(capacity) if self.packets.len() >= capacity => Err(Error::ResourceExhaustion {
                queue: "output",
                capacity,
            }),
            _ => Ok(()),
        }
    }

    pub(crate) fn clear(&mut self) -> usize {
        let n = self.packets.len();
        self.packets.clear();
        n
    }
}
