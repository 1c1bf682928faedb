//! The `.wfv` frame container.
//!
//! Encoding internals are an external capability; what the recorder needs is
//! a sink that survives crashes mid-write and that the file source can play
//! back. The container is deliberately dumb: a fixed header, then raw RGB24
//! frames, each prefixed by its sequence number. A truncated tail frame is
//! ignored on read.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use anyhow::{anyhow, Context, Result};

pub const MAGIC: &[u8; 4] = b"WFV1";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ContainerHeader {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl ContainerHeader {
    pub fn encode(&self) -> [u8; 16] {
        let mut buf = [0u8; 16];
        buf[0..4].copy_from_slice(MAGIC);
        buf[4..8].copy_from_slice(&self.width.to_le_bytes());
        buf[8..12].copy_from_slice(&self.height.to_le_bytes());
        buf[12..16].copy_from_slice(&self.fps.to_le_bytes());
        buf
    }

    pub fn frame_bytes(&self) -> usize {
        (self.width * self.height * 3) as usize
    }
}

/// Reader for recorded containers, used by the file source.
pub struct ContainerReader {
    reader: BufReader<File>,
    header: ContainerHeader,
}

impl ContainerReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .with_context(|| format!("open recording {} for replay", path.display()))?;
        let mut reader = BufReader::new(file);

        let mut buf = [0u8; 16];
        reader
            .read_exact(&mut buf)
            .with_context(|| format!("read container header of {}", path.display()))?;
        if &buf[0..4] != MAGIC {
            return Err(anyhow!("{} is not a wayfinder recording", path.display()));
        }
        let header = ContainerHeader {
            width: u32::from_le_bytes(buf[4..8].try_into().unwrap()),
            height: u32::from_le_bytes(buf[8..12].try_into().unwrap()),
            fps: u32::from_le_bytes(buf[12..16].try_into().unwrap()),
        };
        if header.width == 0 || header.height == 0 {
            return Err(anyhow!("{} has empty frame dimensions", path.display()));
        }
        Ok(Self { reader, header })
    }

    pub fn header(&self) -> ContainerHeader {
        self.header
    }

    /// Read the next frame, `None` at end of file. A truncated final frame
    /// (interrupted recording) reads as end of file.
    pub fn next_frame(&mut self) -> Result<Option<(u64, Vec<u8>)>> {
        let mut seq_buf = [0u8; 8];
        match self.reader.read_exact(&mut seq_buf) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e).context("read frame sequence"),
        }
        let seq = u64::from_le_bytes(seq_buf);

        let mut pixels = vec![0u8; self.header.frame_bytes()];
        match self.reader.read_exact(&mut pixels) {
            Ok(()) => Ok(Some((seq, pixels))),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e).context("read frame pixels"),
        }
    }
}
