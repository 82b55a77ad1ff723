//! Random-access input sources.
//!
//! Every byte the library reads flows through an [`InputSource`]. A document
//! always points at some source: before `process_*` and after
//! `close_input_source` it points at an [`InvalidInputSource`], whose every
//! operation fails with a logic error naming the condition, so call sites
//! never need an Option.

use crate::error::Result;
use bytes::Bytes;
use std::cell::RefCell;
use std::io::SeekFrom;
use std::rc::Rc;

mod buffer;
mod invalid;
mod offset;

pub use buffer::BufferInputSource;
pub use invalid::InvalidInputSource;
pub use offset::OffsetInputSource;

/// Shared, interiorly mutable input source. A document is the single logical
/// owner; copied-stream records hold extra references to keep a foreign
/// source alive after its document is gone.
pub type SharedSource = Rc<RefCell<dyn InputSource>>;

/// Random-access byte stream.
pub trait InputSource {
    /// Description of the source (filename or caller-supplied label).
    fn name(&self) -> &str;

    /// Current read position.
    fn tell(&mut self) -> Result<u64>;

    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Read up to `buf.len()` bytes; returns the count read (0 at EOF).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Push the last byte read back onto the stream.
    fn unread(&mut self, byte: u8) -> Result<()>;

    /// Offset at which the most recent read began.
    fn last_offset(&self) -> u64;

    /// Zero-copy snapshot of the full contents, when the backing storage
    /// supports it. The lazy object parser works on this snapshot.
    fn as_bytes(&self) -> Option<Bytes> {
        None
    }
}

/// Snapshot the entire source into memory. Cheap for buffer-backed sources,
/// a full read otherwise.
pub fn slurp(source: &mut dyn InputSource) -> Result<Bytes> {
    if let Some(bytes) = source.as_bytes() {
        return Ok(bytes);
    }
    let len = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(0))?;
    let mut data = vec![0u8; len as usize];
    let mut filled = 0;
    while filled < data.len() {
        let n = source.read(&mut data[filled..])?;
        if n == 0 {
            data.truncate(filled);
            break;
        }
        filled += n;
    }
    Ok(Bytes::from(data))
}

/// Scan `[start, start + window)` for occurrences of `pattern`. At each
/// candidate the source is positioned on the match and `accept` is invoked;
/// the scan succeeds as soon as one call accepts, leaving the source
/// wherever `accept` left it.
pub fn find_first(
    source: &mut dyn InputSource,
    pattern: &[u8],
    start: u64,
    window: usize,
    accept: &mut dyn FnMut(&mut dyn InputSource) -> bool,
) -> Result<bool> {
    if pattern.is_empty() {
        return Ok(false);
    }
    source.seek(SeekFrom::Start(start))?;
    let mut buf = vec![0u8; window];
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);

    let mut from = 0;
    while from + pattern.len() <= buf.len() {
        let Some(hit) = buf[from..]
            .windows(pattern.len())
            .position(|w| w == pattern)
        else {
            break;
        };
        let pos = start + (from + hit) as u64;
        source.seek(SeekFrom::Start(pos))?;
        if accept(source) {
            return Ok(true);
        }
        from += hit + 1;
    }
    Ok(false)
}

/// Read one line (through LF, CR, or CRLF) of at most `max` bytes from the
/// current position. The line terminator is consumed but not returned.
pub fn read_line(source: &mut dyn InputSource, max: usize) -> Result<Vec<u8>> {
    let mut line = Vec::new();
    let mut byte = [0u8; 1];
    while line.len() < max {
        if source.read(&mut byte)? == 0 {
            break;
        }
        match byte[0] {
            b'\n' => break,
            b'\r' => {
                if source.read(&mut byte)? == 1 && byte[0] != b'\n' {
                    source.unread(byte[0])?;
                }
                break;
            }
            b => line.push(b),
        }
    }
    Ok(line)
}
