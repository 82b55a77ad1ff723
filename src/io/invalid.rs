//! The source a document points at before open and after close.

use crate::error::{Error, Result};
use crate::io::InputSource;
use std::io::SeekFrom;

/// Input source whose every operation fails with a logic error. Used in
/// place of "no source" so the document can dispatch unconditionally.
pub struct InvalidInputSource {
    description: String,
}

impl InvalidInputSource {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }

    fn fail<T>(&self) -> Result<T> {
        Err(Error::logic(format!(
            "operation attempted on a document with no usable input source \
             ({}); operations are invalid before processing a file or after \
             closing the input source",
            self.description
        )))
    }
}

impl InputSource for InvalidInputSource {
    fn name(&self) -> &str {
        &self.description
    }

    fn tell(&mut self) -> Result<u64> {
        self.fail()
    }

    fn seek(&mut self, _pos: SeekFrom) -> Result<u64> {
        self.fail()
    }

    fn read(&mut self, _buf: &mut [u8]) -> Result<usize> {
        self.fail()
    }

    fn unread(&mut self, _byte: u8) -> Result<()> {
        self.fail()
    }

    fn last_offset(&self) -> u64 {
        0
    }
}
