use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use bytes::Bytes;

/// Consumes packet payloads retrieved from a session.
pub trait PacketSink {
    fn send(&mut self, data: &[u8]) -> anyhow::Result<()>;

    /// Flushes buffered output. Calling it more than once is harmless.
    fn finish(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes payloads back to back into a file.
pub struct FileSink {
    path: PathBuf,
    inner: BufWriter<File>,
    bytes_written: u64,
    finished: bool,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .with_context(|| format!("failed to create output {}", path.display()))?;
        Ok(Self {
            path,
            inner: BufWriter::new(file),
            bytes_written: 0,
            finished: false,
        })
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

impl PacketSink for FileSink {
    fn send(&mut self, data: &[u8]) -> anyhow::Result<()> {
        if self.finished {
            anyhow::bail!("output {} already finished", self.path.display());
        }
        self.inner
            .write_all(data)
            .with_context(|| format!("failed to write to {}", self.path.display()))?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    fn finish(&mut self) -> anyhow::Result<()> {
        if !self.finished {
            self.finished = true;
            self.inner
                .flush()
                .with_context(|| format!("failed to flush {}", self.path.display()))?;
            log::debug!(
                "output {} finished, {} bytes",
                self.path.display(),
                self.bytes_written
            );
        }
        Ok(())
    }
}

/// Keeps every payload in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    packets: Vec<Bytes>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn packets(&self) -> &[Bytes] {
        &self.packets
    }

    pub fn total_bytes(&self) -> usize {
        self.packets.iter().map(Bytes::len).sum()
    }
}

impl PacketSink for MemorySink {
    fn send(&mut self, data: &[u8]) -> anyhow::Result<()> {
        self.packets.push(Bytes::copy_from_slice(data));
        Ok(())
    }
}
