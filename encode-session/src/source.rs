use std::fs::File;
use std::io::{BufReader, ErrorKind, Read};
use std::path::Path;

use anyhow::Context;

use crate::frame::{Frame, frame_size};

/// Supplies input frames in display order.
pub trait FrameSource {
    /// Next frame, or `None` once the input is exhausted.
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>>;

    /// Discards the first `n` frames. Only valid before the first
    /// [`next_frame`](FrameSource::next_frame) call; returns how many frames
    /// were actually skipped.
    fn skip(&mut self, n: u64) -> anyhow::Result<u64>;
}

/// Reads planar 8-bit 4:2:0 frames back to back from a byte stream.
pub struct YuvSource<R> {
    reader: R,
    width: u32,
    height: u32,
    frame_size: usize,
    next_seq: u64,
    started: bool,
    eof: bool,
}

impl YuvSource<BufReader<File>> {
    pub fn open(path: impl AsRef<Path>, width: u32, height: u32) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("failed to open input {}", path.display()))?;
        Self::new(BufReader::new(file), width, height)
    }
}

impl<R: Read> YuvSource<R> {
    pub fn new(reader: R, width: u32, height: u32) -> anyhow::Result<Self> {
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            anyhow::bail!("invalid 4:2:0 frame size {}x{}", width, height);
        }
        let frame_size = frame_size(width, height)
            .with_context(|| format!("frame size {}x{} is too large", width, height))?;
        Ok(Self {
            reader,
            width,
            height,
            frame_size,
            next_seq: 0,
            started: false,
            eof: false,
        })
    }

    /// Fills `buf` as far as the stream allows, returning the byte count.
    fn read_full(&mut self, buf: &mut [u8]) -> anyhow::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.reader.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e).context("failed to read input frame"),
            }
        }
        Ok(filled)
    }
}

impl<R: Read> FrameSource for YuvSource<R> {
    fn next_frame(&mut self) -> anyhow::Result<Option<Frame>> {
        self.started = true;
        if self.eof {
            return Ok(None);
        }
        let mut buf = vec![0u8; self.frame_size];
        let n = self.read_full(&mut buf)?;
        if n < self.frame_size {
            if n > 0 {
                log::warn!(
                    "input ends with a truncated frame ({} of {} bytes), ignoring it",
                    n,
                    self.frame_size
                );
            }
            self.eof = true;
            return Ok(None);
        }
        let frame = Frame::new(self.next_seq, self.width, self.height, buf)?;
        self.next_seq += 1;
        Ok(Some(frame))
    }

    fn skip(&mut self, n: u64) -> anyhow::Result<u64> {
        if self.started {
            anyhow::bail!("frames can only be skipped once, before the first frame is read");
        }
        self.started = true;
        let wanted = n.saturating_mul(self.frame_size as u64);
        let copied = std::io::copy(&mut (&mut self.reader).take(wanted), &mut std::io::sink())
            .context("failed to skip input frames")?;
        if copied < wanted {
            self.eof = true;
        }
        let skipped = copied / self.frame_size as u64;
        log::info!("skipped {} input frames", skipped);
        Ok(skipped)
    }
}
