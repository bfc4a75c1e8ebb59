use std::fmt::{Display, Formatter};

use bytes::Bytes;

use crate::error::{Error, Result};

/// One planar 8-bit 4:2:0 picture in display order.
///
/// Frames are immutable once built; the payload is reference counted so handing
/// a frame to the session never copies pixel data.
#[derive(Clone, Debug)]
pub struct Frame {
    seq: u64,
    width: u32,
    height: u32,
    data: Bytes,
}

impl Frame {
    pub fn new(seq: u64, width: u32, height: u32, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        let expected = required_size(width, height)?;
        if data.len() != expected {
            return Err(Error::invalid_argument(format!(
                "frame {} carries {} bytes, {}x{} needs {}",
                seq,
                data.len(),
                width,
                height,
                expected
            )));
        }
        Ok(Self {
            seq,
            width,
            height,
            data,
        })
    }

    /// A frame with every sample set to `value`.
    pub fn filled(seq: u64, width: u32, height: u32, value: u8) -> Result<Self> {
        let size = required_size(width, height)?;
        Self::new(seq, width, height, vec![value; size])
    }

    /// Display-order sequence number.
    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn luma(&self) -> &[u8] {
        &self.data[..self.luma_len()]
    }

    /// The two chroma planes (Cb, Cr).
    pub fn chroma(&self) -> (&[u8], &[u8]) {
        let luma = self.luma_len();
        let plane = luma / 4;
        (
            &self.data[luma..luma + plane],
            &self.data[luma + plane..luma + 2 * plane],
        )
    }

    fn luma_len(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl Display for Frame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Frame seq: {}, width: {}, height: {}, data_len: {}",
            self.seq,
            self.width,
            self.height,
            self.data.len()
        )
    }
}

/// Bytes needed by one 4:2:0 frame of the given size, `None` if that does
/// not fit in `usize`.
pub fn frame_size(width: u32, height: u32) -> Option<usize> {
    let luma = (width as usize).checked_mul(height as usize)?;
    luma.checked_add(luma / 2)
}

fn required_size(width: u32, height: u32) -> Result<usize> {
    if width == 0 || height == 0 {
        return Err(Error::invalid_argument(format!(
            "invalid frame size {}x{}",
            width, height
        )));
    }
    frame_size(width, height).ok_or_else(|| {
        Error::invalid_argument(format!("frame size {}x{} is too large", width, height))
    })
}
