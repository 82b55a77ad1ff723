//! vellum - PDF object graph library.
//!
//! Parses a PDF's cross-reference index and exposes every numbered object
//! as a lazily resolved, value-typed handle. Objects can be created,
//! replaced in place, swapped, and copied between independently parsed
//! documents with identity, cycles, and stream payloads preserved.

mod copier;
pub mod document;
pub mod error;
pub mod io;
pub mod model;
pub mod parser;
pub mod stream;

pub use document::catalog::{Document, PdfVersion};
pub use document::xref::XRefEntry;
pub use error::{Damage, DamageCode, Error, Result};
pub use io::{BufferInputSource, InputSource, InvalidInputSource, OffsetInputSource, SharedSource};
pub use model::handle::Handle;
pub use model::objects::{ObjGen, StreamPayload, Value};
pub use stream::{
    pipe_foreign_stream_data, pipe_stream_data, register_stream_filter, BufferSink,
    EncryptionParameters, ForeignStreamData, Pipeline, StreamDataProvider, StreamDecrypter,
    StreamFilter,
};
