//! PDF object values and identities.

use crate::io::SharedSource;
use crate::model::handle::Handle;
use crate::stream::{EncryptionParameters, StreamDataProvider};
use bytes::Bytes;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::rc::Rc;

/// Identity of one indirect object within one document: object id plus
/// generation number. `(0, 0)` means "no identity" (a direct object).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct ObjGen {
    pub id: u32,
    pub gen: u16,
}

impl ObjGen {
    pub const fn new(id: u32, gen: u16) -> Self {
        Self { id, gen }
    }

    /// True when this names an indirect object.
    pub const fn is_indirect(&self) -> bool {
        self.id != 0
    }
}

impl std::fmt::Display for ObjGen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.id, self.gen)
    }
}

/// The tagged object value held by a slot or a direct handle.
#[derive(Clone)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    /// Real number, kept as its decimal text.
    Real(String),
    /// Name without the leading slash.
    Name(String),
    String(Bytes),
    Array(Vec<Handle>),
    Dictionary(IndexMap<String, Handle>),
    Stream(StreamObject),
    /// Placeholder reserving an identity whose final value is not yet
    /// known; legal as a reference target, illegal to serialize. Never
    /// observable after a successful top-level operation.
    Reserved,
    /// Slot known to the xref but not yet parsed.
    Unresolved,
}

impl Value {
    /// Variant name for type-assertion messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dictionary(_) => "dictionary",
            Self::Stream(_) => "stream",
            Self::Reserved => "reserved",
            Self::Unresolved => "unresolved",
        }
    }

    pub const fn is_scalar(&self) -> bool {
        matches!(
            self,
            Self::Null
                | Self::Bool(_)
                | Self::Integer(_)
                | Self::Real(_)
                | Self::Name(_)
                | Self::String(_)
        )
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Integer(n) => write!(f, "Integer({n})"),
            Self::Real(s) => write!(f, "Real({s})"),
            Self::Name(s) => write!(f, "Name(/{s})"),
            Self::String(s) => write!(f, "String({} bytes)", s.len()),
            Self::Array(items) => write!(f, "Array({} items)", items.len()),
            Self::Dictionary(map) => write!(f, "Dictionary({} keys)", map.len()),
            Self::Stream(_) => write!(f, "Stream"),
            other => write!(f, "{}", other.type_name()),
        }
    }
}

/// A stream: its dictionary plus a payload describing where the bytes come
/// from when the stream is piped.
#[derive(Clone)]
pub struct StreamObject {
    /// The stream's own dictionary (a direct handle).
    pub dict: Handle,
    pub payload: StreamPayload,
}

/// Where a stream's raw bytes live.
#[derive(Clone)]
pub enum StreamPayload {
    /// Parse lazily out of an input source: the byte range
    /// `[offset, offset + length)`, decrypted with `encryption` if the
    /// source document was encrypted.
    FromInput {
        source: SharedSource,
        offset: u64,
        length: u64,
        encryption: Rc<RefCell<EncryptionParameters>>,
    },
    /// Fully materialized.
    FromBuffer { data: Bytes },
    /// Supplied on demand by a provider, keyed so one provider can serve
    /// many streams.
    FromProvider {
        provider: Rc<RefCell<dyn StreamDataProvider>>,
        key: ObjGen,
    },
}

impl StreamPayload {
    /// Byte offset of the stream data in its source, when known.
    pub fn parsed_offset(&self) -> Option<u64> {
        match self {
            Self::FromInput { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Payload length, when known without piping.
    pub fn length(&self) -> Option<u64> {
        match self {
            Self::FromInput { length, .. } => Some(*length),
            Self::FromBuffer { data } => Some(data.len() as u64),
            Self::FromProvider { .. } => None,
        }
    }
}
