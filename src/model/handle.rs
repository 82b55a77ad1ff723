//! Value-typed handles to PDF objects.
//!
//! A handle either owns a direct value outright (shared with its clones) or
//! names an indirect object by `ObjGen` in some document. Indirect handles
//! go through the owning document's object store on every access, so
//! `replace` and `swap` on a slot are observed by every handle to it, and
//! the object graph holds no strong reference cycles: children of indirect
//! objects keep only a weak back-reference to the document.

use crate::document::catalog::{Document, DocumentInner};
use crate::error::{Damage, DamageCode, Error, Result};
use crate::model::objects::{ObjGen, StreamObject, StreamPayload, Value};
use crate::stream::{pipe_stream_data, BufferSink, Pipeline};
use bytes::Bytes;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::{Rc, Weak};

#[derive(Clone)]
enum Repr {
    Direct(Rc<RefCell<Value>>),
    Indirect {
        og: ObjGen,
        doc: Weak<DocumentInner>,
    },
}

#[derive(Clone)]
pub struct Handle {
    repr: Repr,
}

impl Handle {
    // === construction ===

    pub fn new_direct(value: Value) -> Self {
        Self {
            repr: Repr::Direct(Rc::new(RefCell::new(value))),
        }
    }

    pub(crate) fn indirect(og: ObjGen, doc: Weak<DocumentInner>) -> Self {
        Self {
            repr: Repr::Indirect { og, doc },
        }
    }

    pub fn new_null() -> Self {
        Self::new_direct(Value::Null)
    }

    pub fn new_bool(value: bool) -> Self {
        Self::new_direct(Value::Bool(value))
    }

    pub fn new_integer(value: i64) -> Self {
        Self::new_direct(Value::Integer(value))
    }

    pub fn new_real(text: impl Into<String>) -> Self {
        Self::new_direct(Value::Real(text.into()))
    }

    pub fn new_name(name: impl Into<String>) -> Self {
        Self::new_direct(Value::Name(name.into()))
    }

    pub fn new_string(data: impl Into<Bytes>) -> Self {
        Self::new_direct(Value::String(data.into()))
    }

    pub fn new_array(items: Vec<Handle>) -> Self {
        Self::new_direct(Value::Array(items))
    }

    pub fn new_dictionary(entries: impl IntoIterator<Item = (String, Handle)>) -> Self {
        Self::new_direct(Value::Dictionary(entries.into_iter().collect()))
    }

    // === identity ===

    pub fn is_indirect(&self) -> bool {
        matches!(self.repr, Repr::Indirect { .. })
    }

    /// The object's identity; `(0, 0)` for direct handles.
    pub fn obj_gen(&self) -> ObjGen {
        match &self.repr {
            Repr::Direct(_) => ObjGen::default(),
            Repr::Indirect { og, .. } => *og,
        }
    }

    /// The document owning this indirect object. Fails for direct handles
    /// and for handles that outlived their document.
    pub fn owning_document(&self) -> Result<Document> {
        match &self.repr {
            Repr::Direct(_) => Err(Error::logic(
                "attempted to retrieve the owning document of a direct object",
            )),
            Repr::Indirect { doc, .. } => doc
                .upgrade()
                .map(Document::from_inner)
                .ok_or_else(Self::dead_document_error),
        }
    }

    pub(crate) fn owner(&self) -> Option<Weak<DocumentInner>> {
        match &self.repr {
            Repr::Direct(_) => None,
            Repr::Indirect { doc, .. } => Some(doc.clone()),
        }
    }

    fn dead_document_error() -> Error {
        Error::logic("attempted to access an object whose owning document has been destroyed")
    }

    // === value access ===

    /// Run `f` against the (resolved) value. Child handles needed past the
    /// call must be cloned out inside `f`; the borrow ends when it returns.
    pub(crate) fn with_value<R>(&self, f: impl FnOnce(&Value) -> Result<R>) -> Result<R> {
        match &self.repr {
            Repr::Direct(value) => f(&value.borrow()),
            Repr::Indirect { og, doc } => {
                let inner = doc.upgrade().ok_or_else(Self::dead_document_error)?;
                inner.resolve(*og)?;
                let slot = inner.ensure_slot(*og);
                let value = slot.borrow();
                f(&value)
            }
        }
    }

    pub(crate) fn with_value_mut<R>(&self, f: impl FnOnce(&mut Value) -> Result<R>) -> Result<R> {
        match &self.repr {
            Repr::Direct(value) => f(&mut value.borrow_mut()),
            Repr::Indirect { og, doc } => {
                let inner = doc.upgrade().ok_or_else(Self::dead_document_error)?;
                inner.resolve(*og)?;
                let slot = inner.ensure_slot(*og);
                let mut value = slot.borrow_mut();
                f(&mut value)
            }
        }
    }

    fn kind(&self) -> Result<&'static str> {
        self.with_value(|v| Ok(v.type_name()))
    }

    // === type predicates ===

    fn matches(&self, f: impl FnOnce(&Value) -> bool) -> bool {
        self.with_value(|v| Ok(f(v))).unwrap_or(false)
    }

    pub fn is_null(&self) -> bool {
        self.matches(|v| matches!(v, Value::Null))
    }

    pub fn is_bool(&self) -> bool {
        self.matches(|v| matches!(v, Value::Bool(_)))
    }

    pub fn is_integer(&self) -> bool {
        self.matches(|v| matches!(v, Value::Integer(_)))
    }

    pub fn is_real(&self) -> bool {
        self.matches(|v| matches!(v, Value::Real(_)))
    }

    pub fn is_name(&self) -> bool {
        self.matches(|v| matches!(v, Value::Name(_)))
    }

    pub fn is_string(&self) -> bool {
        self.matches(|v| matches!(v, Value::String(_)))
    }

    pub fn is_array(&self) -> bool {
        self.matches(|v| matches!(v, Value::Array(_)))
    }

    pub fn is_dictionary(&self) -> bool {
        self.matches(|v| matches!(v, Value::Dictionary(_)))
    }

    pub fn is_stream(&self) -> bool {
        self.matches(|v| matches!(v, Value::Stream(_)))
    }

    pub fn is_reserved(&self) -> bool {
        self.matches(|v| matches!(v, Value::Reserved))
    }

    pub fn is_scalar(&self) -> bool {
        self.matches(Value::is_scalar)
    }

    /// True for a name equal to `name` (no leading slash).
    pub fn is_name_equal(&self, name: &str) -> bool {
        self.matches(|v| matches!(v, Value::Name(n) if n == name))
    }

    /// A `/Type /Page` leaf.
    pub fn is_page_object(&self) -> bool {
        self.dict_type_is("Page")
    }

    /// A `/Type /Pages` interior node of the page tree.
    pub fn is_pages_object(&self) -> bool {
        self.dict_type_is("Pages")
    }

    fn dict_type_is(&self, type_name: &str) -> bool {
        let Ok(type_handle) = self.with_value(|v| {
            Ok(match v {
                Value::Dictionary(map) => map.get("Type").cloned(),
                _ => None,
            })
        }) else {
            return false;
        };
        type_handle.is_some_and(|h| h.is_name_equal(type_name))
    }

    // === scalar conversions ===

    pub fn as_bool(&self) -> Result<bool> {
        self.with_value(|v| match v {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::type_assertion("boolean", other.type_name())),
        })
    }

    pub fn as_int(&self) -> Result<i64> {
        self.with_value(|v| match v {
            Value::Integer(n) => Ok(*n),
            other => Err(Error::type_assertion("integer", other.type_name())),
        })
    }

    pub fn as_name(&self) -> Result<String> {
        self.with_value(|v| match v {
            Value::Name(n) => Ok(n.clone()),
            other => Err(Error::type_assertion("name", other.type_name())),
        })
    }

    pub fn as_string(&self) -> Result<Bytes> {
        self.with_value(|v| match v {
            Value::String(s) => Ok(s.clone()),
            other => Err(Error::type_assertion("string", other.type_name())),
        })
    }

    pub fn as_real_text(&self) -> Result<String> {
        self.with_value(|v| match v {
            Value::Real(s) => Ok(s.clone()),
            other => Err(Error::type_assertion("real", other.type_name())),
        })
    }

    // === array operations ===

    pub fn items_count(&self) -> Result<usize> {
        self.with_value(|v| match v {
            Value::Array(items) => Ok(items.len()),
            other => Err(Error::type_assertion("array", other.type_name())),
        })
    }

    /// Element at `index`, or a fresh null handle when out of range.
    pub fn get_item(&self, index: usize) -> Result<Handle> {
        self.with_value(|v| match v {
            Value::Array(items) => Ok(items.get(index).cloned().unwrap_or_else(Handle::new_null)),
            other => Err(Error::type_assertion("array", other.type_name())),
        })
    }

    pub fn append_item(&self, item: Handle) -> Result<()> {
        self.with_value_mut(|v| match v {
            Value::Array(items) => {
                items.push(item);
                Ok(())
            }
            other => Err(Error::type_assertion("array", other.type_name())),
        })
    }

    pub fn set_item(&self, index: usize, item: Handle) -> Result<()> {
        self.with_value_mut(|v| match v {
            Value::Array(items) => {
                if index >= items.len() {
                    return Err(Error::logic(format!(
                        "array index {index} out of range (length {})",
                        items.len()
                    )));
                }
                items[index] = item;
                Ok(())
            }
            other => Err(Error::type_assertion("array", other.type_name())),
        })
    }

    // === dictionary operations ===

    pub fn keys(&self) -> Result<Vec<String>> {
        self.with_value(|v| match v {
            Value::Dictionary(map) => Ok(map.keys().cloned().collect()),
            other => Err(Error::type_assertion("dictionary", other.type_name())),
        })
    }

    /// Value for `key` (no leading slash); a fresh null handle when the key
    /// is absent. Null handles also answer with null, so lookups chain
    /// through missing structure.
    pub fn get_key(&self, key: &str) -> Result<Handle> {
        self.with_value(|v| match v {
            Value::Dictionary(map) => Ok(map.get(key).cloned().unwrap_or_else(Handle::new_null)),
            Value::Null => Ok(Handle::new_null()),
            other => Err(Error::type_assertion("dictionary", other.type_name())),
        })
    }

    pub fn has_key(&self, key: &str) -> Result<bool> {
        self.with_value(|v| match v {
            Value::Dictionary(map) => Ok(map.contains_key(key)),
            Value::Null => Ok(false),
            other => Err(Error::type_assertion("dictionary", other.type_name())),
        })
    }

    pub fn replace_key(&self, key: impl Into<String>, value: Handle) -> Result<()> {
        self.with_value_mut(|v| match v {
            Value::Dictionary(map) => {
                map.insert(key.into(), value);
                Ok(())
            }
            other => Err(Error::type_assertion("dictionary", other.type_name())),
        })
    }

    pub fn remove_key(&self, key: &str) -> Result<()> {
        self.with_value_mut(|v| match v {
            Value::Dictionary(map) => {
                map.shift_remove(key);
                Ok(())
            }
            other => Err(Error::type_assertion("dictionary", other.type_name())),
        })
    }

    // === stream operations ===

    pub fn stream_dict(&self) -> Result<Handle> {
        self.with_value(|v| match v {
            Value::Stream(s) => Ok(s.dict.clone()),
            other => Err(Error::type_assertion("stream", other.type_name())),
        })
    }

    pub(crate) fn stream_payload(&self) -> Result<StreamPayload> {
        self.with_value(|v| match v {
            Value::Stream(s) => Ok(s.payload.clone()),
            other => Err(Error::type_assertion("stream", other.type_name())),
        })
    }

    /// Offset of the stream data in its input source, when parsed from one.
    pub fn parsed_offset(&self) -> Result<Option<u64>> {
        Ok(self.stream_payload()?.parsed_offset())
    }

    /// Payload length, when known without piping.
    pub fn stream_length(&self) -> Result<Option<u64>> {
        Ok(self.stream_payload()?.length())
    }

    /// The provider backing this stream, when there is one.
    pub fn data_provider(
        &self,
    ) -> Result<Option<(Rc<RefCell<dyn crate::stream::StreamDataProvider>>, ObjGen)>> {
        Ok(match self.stream_payload()? {
            StreamPayload::FromProvider { provider, key } => Some((provider, key)),
            _ => None,
        })
    }

    /// Replace the stream's payload, together with the filter and decode
    /// parameters that describe how the new payload is encoded. Null
    /// filter/parms remove the corresponding dictionary keys.
    pub fn replace_stream_data(
        &self,
        payload: StreamPayload,
        filter: Handle,
        decode_parms: Handle,
    ) -> Result<()> {
        let dict = self.stream_dict()?;
        if filter.is_null() {
            dict.remove_key("Filter")?;
        } else {
            dict.replace_key("Filter", filter)?;
        }
        if decode_parms.is_null() {
            dict.remove_key("DecodeParms")?;
        } else {
            dict.replace_key("DecodeParms", decode_parms)?;
        }
        match payload.length() {
            // Length of provider payloads is only known at write time.
            Some(len) => dict.replace_key("Length", Handle::new_integer(len as i64))?,
            None => dict.remove_key("Length")?,
        }
        self.with_value_mut(|v| match v {
            Value::Stream(s) => {
                s.payload = payload;
                Ok(())
            }
            other => Err(Error::type_assertion("stream", other.type_name())),
        })
    }

    /// Pipe the stream's raw (undecoded) bytes into `sink`. Returns whether
    /// the pipe completed; failures are warned on the owning document.
    pub fn pipe_raw_data(
        &self,
        sink: &mut dyn Pipeline,
        suppress_warnings: bool,
        will_retry: bool,
    ) -> Result<bool> {
        let payload = self.stream_payload()?;
        match payload {
            StreamPayload::FromBuffer { data } => {
                sink.write(&data)?;
                sink.finish()?;
                Ok(true)
            }
            StreamPayload::FromProvider { provider, key } => provider
                .borrow_mut()
                .provide_stream_data(key, sink, suppress_warnings, will_retry),
            StreamPayload::FromInput {
                offset,
                length,
                encryption,
                ..
            } => {
                // Reads go through the document's current source, so
                // closing the input source detaches parsed streams too.
                let doc = self.owning_document()?;
                let source = doc.inner().current_source();
                pipe_stream_data(
                    &encryption,
                    &source,
                    &doc,
                    self.obj_gen(),
                    offset,
                    length,
                    self.stream_dict()?,
                    sink,
                    suppress_warnings,
                    will_retry,
                )
            }
        }
    }

    /// The stream's raw bytes, fully materialized.
    pub fn raw_stream_data(&self) -> Result<Bytes> {
        let mut sink = BufferSink::new();
        if !self.pipe_raw_data(&mut sink, false, false)? {
            let filename = self
                .owner()
                .and_then(|w| w.upgrade())
                .map(|inner| inner.source_name())
                .unwrap_or_default();
            return Err(Error::Damaged(Damage::new(
                DamageCode::DamagedPdf,
                filename,
                format!("object {}", self.obj_gen()),
                0,
                "failed to retrieve stream data",
            )));
        }
        Ok(sink.into_bytes())
    }

    // === direct conversion ===

    /// Deep-copy into a plain direct value, dereferencing indirect
    /// references along the way. Fails on streams, reserved objects, and
    /// reference loops.
    pub fn make_direct(&self) -> Result<Handle> {
        self.make_direct_inner(&mut HashSet::new())
    }

    fn make_direct_inner(&self, visited: &mut HashSet<ObjGen>) -> Result<Handle> {
        let og = self.obj_gen();
        if og.is_indirect() && !visited.insert(og) {
            return Err(Error::logic(
                "loop detected traversing objects while converting to direct",
            ));
        }

        enum Shape {
            Scalar(Value),
            Array(Vec<Handle>),
            Dict(Vec<(String, Handle)>),
        }

        let shape = self.with_value(|v| match v {
            Value::Null => Ok(Shape::Scalar(Value::Null)),
            Value::Bool(b) => Ok(Shape::Scalar(Value::Bool(*b))),
            Value::Integer(n) => Ok(Shape::Scalar(Value::Integer(*n))),
            Value::Real(s) => Ok(Shape::Scalar(Value::Real(s.clone()))),
            Value::Name(n) => Ok(Shape::Scalar(Value::Name(n.clone()))),
            Value::String(s) => Ok(Shape::Scalar(Value::String(s.clone()))),
            Value::Array(items) => Ok(Shape::Array(items.clone())),
            Value::Dictionary(map) => Ok(Shape::Dict(
                map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            )),
            Value::Stream(_) => Err(Error::logic(
                "attempt to convert a stream to a direct object",
            )),
            Value::Reserved => Err(Error::logic(
                "attempt to convert a reserved object to a direct object",
            )),
            Value::Unresolved => Err(Error::logic(
                "attempt to convert an unresolved object to a direct object",
            )),
        })?;

        let result = match shape {
            Shape::Scalar(value) => Handle::new_direct(value),
            Shape::Array(items) => {
                let mut copied = Vec::with_capacity(items.len());
                for item in items {
                    copied.push(item.make_direct_inner(visited)?);
                }
                Handle::new_array(copied)
            }
            Shape::Dict(entries) => {
                let mut copied = IndexMap::with_capacity(entries.len());
                for (key, value) in entries {
                    copied.insert(key, value.make_direct_inner(visited)?);
                }
                Handle::new_direct(Value::Dictionary(copied))
            }
        };

        if og.is_indirect() {
            visited.remove(&og);
        }
        Ok(result)
    }

    /// Build an unparsed-from-input stream value. Used by the object parser
    /// and by the stream factory on the document.
    pub(crate) fn new_stream_object(dict: Handle, payload: StreamPayload) -> Value {
        Value::Stream(StreamObject { dict, payload })
    }

    /// Take the value out of a freshly built, unshared direct handle.
    pub(crate) fn try_into_value(self) -> Option<Value> {
        match self.repr {
            Repr::Direct(rc) => Rc::try_unwrap(rc).ok().map(RefCell::into_inner),
            Repr::Indirect { .. } => None,
        }
    }

    /// The shared cell of a direct handle.
    pub(crate) fn direct_cell(&self) -> Option<Rc<RefCell<Value>>> {
        match &self.repr {
            Repr::Direct(rc) => Some(rc.clone()),
            Repr::Indirect { .. } => None,
        }
    }

    /// A copy of the resolved value.
    pub(crate) fn cloned_value(&self) -> Result<Value> {
        self.with_value(|v| Ok(v.clone()))
    }
}

impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.repr {
            Repr::Direct(value) => match value.try_borrow() {
                Ok(v) => write!(f, "Handle({v:?})"),
                Err(_) => write!(f, "Handle(<borrowed>)"),
            },
            Repr::Indirect { og, .. } => write!(f, "Handle({og} R, {})",
                self.kind().unwrap_or("inaccessible")),
        }
    }
}
