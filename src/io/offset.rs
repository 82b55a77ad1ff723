//! Offset-translating adapter for files with junk before the PDF header.
//!
//! When `%PDF-` is found at a nonzero global offset, all offsets recorded in
//! the file (xref entries, stream positions) are relative to the header.
//! Wrapping the real source in this adapter lets the rest of the library
//! work in header-relative coordinates.

use crate::error::{Error, Result};
use crate::io::{InputSource, SharedSource};
use bytes::Bytes;
use std::io::SeekFrom;

pub struct OffsetInputSource {
    inner: SharedSource,
    name: String,
    global_offset: u64,
}

impl OffsetInputSource {
    pub fn new(inner: SharedSource, global_offset: u64) -> Self {
        let name = inner.borrow().name().to_string();
        Self {
            inner,
            name,
            global_offset,
        }
    }
}

impl InputSource for OffsetInputSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn tell(&mut self) -> Result<u64> {
        let pos = self.inner.borrow_mut().tell()?;
        pos.checked_sub(self.global_offset).ok_or_else(|| {
            Error::logic("offset input source positioned before its origin")
        })
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let mut inner = self.inner.borrow_mut();
        let result = match pos {
            SeekFrom::Start(p) => inner.seek(SeekFrom::Start(p + self.global_offset))?,
            SeekFrom::Current(d) => inner.seek(SeekFrom::Current(d))?,
            SeekFrom::End(d) => inner.seek(SeekFrom::End(d))?,
        };
        result.checked_sub(self.global_offset).ok_or_else(|| {
            Error::logic("offset input source positioned before its origin")
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.inner.borrow_mut().read(buf)
    }

    fn unread(&mut self, byte: u8) -> Result<()> {
        self.inner.borrow_mut().unread(byte)
    }

    fn last_offset(&self) -> u64 {
        self.inner
            .borrow()
            .last_offset()
            .saturating_sub(self.global_offset)
    }

    fn as_bytes(&self) -> Option<Bytes> {
        let bytes = self.inner.borrow().as_bytes()?;
        let start = (self.global_offset as usize).min(bytes.len());
        Some(bytes.slice(start..))
    }
}
