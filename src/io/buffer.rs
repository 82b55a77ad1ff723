//! Bytes-backed input source.

use crate::error::{Error, Result};
use crate::io::InputSource;
use bytes::Bytes;
use std::io::SeekFrom;

/// Input source over an in-memory (or memory-mapped) byte buffer.
pub struct BufferInputSource {
    description: String,
    data: Bytes,
    pos: u64,
    last_offset: u64,
}

impl BufferInputSource {
    pub fn new(description: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            description: description.into(),
            data: data.into(),
            pos: 0,
            last_offset: 0,
        }
    }

    /// Open a file via mmap. The mapping is wrapped in shared [`Bytes`] so
    /// stream records copied out of this document can keep it alive.
    pub fn open_file(path: &std::path::Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        // Safety contract of memmap2: the file must not be truncated while
        // mapped. Same assumption the rest of the library makes about its
        // input not changing underneath it.
        let mmap = unsafe { memmap2::Mmap::map(&file)? };
        Ok(Self::new(
            path.to_string_lossy().into_owned(),
            Bytes::from_owner(mmap),
        ))
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }
}

impl InputSource for BufferInputSource {
    fn name(&self) -> &str {
        &self.description
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.pos)
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let target = match pos {
            SeekFrom::Start(p) => p as i64,
            SeekFrom::Current(d) => self.pos as i64 + d,
            SeekFrom::End(d) => self.len() as i64 + d,
        };
        if target < 0 {
            return Err(Error::logic(format!(
                "seek before start of input source {}",
                self.description
            )));
        }
        self.pos = target as u64;
        Ok(self.pos)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.last_offset = self.pos;
        let avail = self.data.len().saturating_sub(self.pos as usize);
        let n = avail.min(buf.len());
        if n > 0 {
            let start = self.pos as usize;
            buf[..n].copy_from_slice(&self.data[start..start + n]);
            self.pos += n as u64;
        }
        Ok(n)
    }

    fn unread(&mut self, _byte: u8) -> Result<()> {
        self.pos = self.pos.saturating_sub(1);
        Ok(())
    }

    fn last_offset(&self) -> u64 {
        self.last_offset
    }

    fn as_bytes(&self) -> Option<Bytes> {
        Some(self.data.clone())
    }
}
