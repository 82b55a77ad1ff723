//! The document facade: parsing entry points, lazy object resolution,
//! warnings, version accessors, and the object factory surface.

use crate::copier::ObjCopier;
use crate::document::store::{ObjectStore, Slot};
use crate::document::xref::{XRefEntry, XRefTable};
use crate::error::{Damage, DamageCode, Error, Result};
use crate::io::{
    find_first, read_line, slurp, BufferInputSource, InputSource, InvalidInputSource,
    OffsetInputSource, SharedSource,
};
use crate::model::handle::Handle;
use crate::model::objects::{ObjGen, StreamPayload, Value};
use crate::parser::object_parser::ObjectParser;
use crate::stream::{CopiedStreamDataProvider, EncryptionParameters};
use bytes::Bytes;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// PDF version triple: `major.minor` from the header plus the extension
/// level declared under `/Root /Extensions /ADBE /ExtensionLevel`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PdfVersion {
    pub major: i32,
    pub minor: i32,
    pub extension_level: i32,
}

/// Distinguishes document instances process-wide; used to key the foreign
/// copier state by source document.
static NEXT_DOCUMENT_ID: AtomicU64 = AtomicU64::new(0);

pub(crate) struct DocumentInner {
    self_weak: Weak<DocumentInner>,
    unique_id: u64,
    source: RefCell<SharedSource>,
    /// Snapshot of the source the object parser works on; invalidated when
    /// the source changes or closes.
    file_bytes: RefCell<Option<Bytes>>,
    store: RefCell<ObjectStore>,
    xref: RefCell<XRefTable>,
    encryption: Rc<RefCell<EncryptionParameters>>,
    warnings: RefCell<Vec<Damage>>,
    pdf_version: RefCell<String>,
    in_parse: Cell<bool>,
    /// Objects currently being resolved; a re-entry means the xref sends
    /// an object's resolution through itself (object stream cycles).
    resolving: RefCell<std::collections::HashSet<ObjGen>>,
    fixed_dangling_refs: Cell<bool>,
    suppress_warnings: Cell<bool>,
    max_warnings: Cell<usize>,
    immediate_copy_from: Cell<bool>,
    check_mode: Cell<bool>,
    last_object_description: RefCell<String>,
    pub(crate) object_copiers: RefCell<HashMap<u64, ObjCopier>>,
    pub(crate) copied_streams: RefCell<Option<Rc<RefCell<CopiedStreamDataProvider>>>>,
}

impl DocumentInner {
    pub fn source_name(&self) -> String {
        self.source.borrow().borrow().name().to_string()
    }

    pub fn current_source(&self) -> SharedSource {
        self.source.borrow().clone()
    }

    pub fn encryption(&self) -> Rc<RefCell<EncryptionParameters>> {
        self.encryption.clone()
    }

    pub fn immediate_copy_from(&self) -> bool {
        self.immediate_copy_from.get()
    }

    pub fn last_object_description(&self) -> String {
        self.last_object_description.borrow().clone()
    }

    pub fn set_last_object_description(&self, description: &str, og: ObjGen) {
        let mut text = String::new();
        if !description.is_empty() {
            text.push_str(description);
            if og.is_indirect() {
                text.push_str(": ");
            }
        }
        if og.is_indirect() {
            text.push_str(&format!("object {og}"));
        }
        *self.last_object_description.borrow_mut() = text;
    }

    /// A damage value with the filename and current object description
    /// filled in.
    pub fn damaged(&self, offset: u64, message: impl Into<String>) -> Error {
        Error::Damaged(Damage::new(
            DamageCode::DamagedPdf,
            self.source_name(),
            self.last_object_description(),
            offset,
            message,
        ))
    }

    /// Record a warning; unless suppressed it is also logged. Exceeding the
    /// configured limit escalates to a fatal damage error.
    pub fn warn(&self, damage: Damage) -> Result<()> {
        let max = self.max_warnings.get();
        if max > 0 && self.warnings.borrow().len() >= max {
            return Err(Error::Damaged(Damage::new(
                DamageCode::DamagedPdf,
                self.source_name(),
                "",
                0,
                "Too many warnings - file is too badly damaged",
            )));
        }
        if !self.suppress_warnings.get() {
            log::warn!("{damage}");
        }
        self.warnings.borrow_mut().push(damage);
        Ok(())
    }

    /// Parse snapshot of the input, cached until the source changes.
    pub fn file_bytes(&self) -> Result<Bytes> {
        if let Some(bytes) = self.file_bytes.borrow().clone() {
            return Ok(bytes);
        }
        let source = self.current_source();
        let bytes = slurp(&mut *source.borrow_mut())?;
        *self.file_bytes.borrow_mut() = Some(bytes.clone());
        Ok(bytes)
    }

    pub fn xref_offset_of(&self, og: ObjGen) -> Option<u64> {
        match self.xref.borrow().get(og) {
            Some(XRefEntry::Uncompressed { offset, .. }) => Some(offset),
            _ => None,
        }
    }

    pub fn ensure_slot(&self, og: ObjGen) -> Slot {
        self.store.borrow_mut().ensure_slot(og)
    }

    /// Handle for `og`, creating its slot on first reference. Never fails.
    pub fn get_object(&self, og: ObjGen) -> Handle {
        self.store.borrow_mut().ensure_slot(og);
        Handle::indirect(og, self.self_weak.clone())
    }

    pub fn next_id(&self) -> ObjGen {
        let beyond = self.xref.borrow().max_id();
        self.store.borrow().next_id(beyond)
    }

    fn make_indirect_value(&self, value: Value) -> Handle {
        let beyond = self.xref.borrow().max_id();
        let og = self.store.borrow_mut().make_indirect(value, beyond);
        Handle::indirect(og, self.self_weak.clone())
    }

    /// Settle an unresolved slot: parse it from its xref location, or null
    /// it when the xref does not know the id. Parse damage is warned, and
    /// when recovery is enabled a reconstruction is attempted once.
    pub fn resolve(self: &Rc<Self>, og: ObjGen) -> Result<()> {
        let slot = self.ensure_slot(og);
        if !matches!(*slot.borrow(), Value::Unresolved) {
            return Ok(());
        }

        if !self.resolving.borrow_mut().insert(og) {
            *slot.borrow_mut() = Value::Null;
            return self.warn(Damage::new(
                DamageCode::DamagedPdf,
                self.source_name(),
                "",
                0,
                format!("loop detected resolving object {og}"),
            ));
        }
        let result = self.resolve_entry(og, &slot);
        self.resolving.borrow_mut().remove(&og);
        result
    }

    fn resolve_entry(self: &Rc<Self>, og: ObjGen, slot: &Slot) -> Result<()> {
        let entry = self.xref.borrow().get(og);
        match entry {
            None => {
                *slot.borrow_mut() = Value::Null;
                Ok(())
            }
            Some(XRefEntry::Uncompressed { offset, .. }) => {
                match self.read_object_at(offset, og) {
                    Ok(value) => {
                        *slot.borrow_mut() = value;
                        Ok(())
                    }
                    Err(Error::Damaged(damage)) => {
                        self.warn(damage)?;
                        let recovery = {
                            let xref = self.xref.borrow();
                            xref.recovery_enabled() && !xref.was_reconstructed()
                        };
                        if recovery {
                            self.reconstruct_xref()?;
                            // One retry against the rebuilt table.
                            match self.xref.borrow().get(og) {
                                Some(XRefEntry::Uncompressed { offset, .. }) => {
                                    match self.read_object_at(offset, og) {
                                        Ok(value) => *slot.borrow_mut() = value,
                                        Err(Error::Damaged(damage)) => {
                                            self.warn(damage)?;
                                            *slot.borrow_mut() = Value::Null;
                                        }
                                        Err(e) => return Err(e),
                                    }
                                }
                                _ => *slot.borrow_mut() = Value::Null,
                            }
                        } else {
                            *slot.borrow_mut() = Value::Null;
                        }
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            Some(XRefEntry::InStream { stream_id, index }) => {
                match self.read_object_from_stream(og, stream_id, index) {
                    Ok(value) => {
                        *slot.borrow_mut() = value;
                        Ok(())
                    }
                    Err(Error::Damaged(damage)) => {
                        self.warn(damage)?;
                        *slot.borrow_mut() = Value::Null;
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    fn read_object_at(self: &Rc<Self>, offset: u64, expected: ObjGen) -> Result<Value> {
        let data = self.file_bytes()?;
        let _guard = ParseGuard::claim(self)?;
        self.set_last_object_description("", expected);
        let parser = ObjectParser::new(&data, self);
        parser.parse_indirect_at(offset, expected)
    }

    fn read_object_from_stream(
        self: &Rc<Self>,
        og: ObjGen,
        stream_id: u32,
        index: usize,
    ) -> Result<Value> {
        let container = self.get_object(ObjGen::new(stream_id, 0));
        if !container.is_stream() {
            return Err(self.damaged(
                0,
                format!("supposed object stream {stream_id} is not a stream"),
            ));
        }
        let decoded = container.decoded_stream_data()?;
        let dict = container.stream_dict()?;
        let n = dict.get_key("N")?.as_int().map_err(|_| {
            self.damaged(0, format!("object stream {stream_id} has no valid /N"))
        })? as usize;
        let first = dict.get_key("First")?.as_int().map_err(|_| {
            self.damaged(0, format!("object stream {stream_id} has no valid /First"))
        })? as usize;

        let _guard = ParseGuard::claim(self)?;
        self.set_last_object_description(&format!("object stream {stream_id}"), og);
        let parser = ObjectParser::new(&decoded, self);
        let (member_id, value) = parser.parse_stream_member(n, first, index)?;
        if member_id != og.id {
            return Err(self.damaged(
                0,
                format!(
                    "object stream {stream_id} member {index} has id {member_id}, not {}",
                    og.id
                ),
            ));
        }
        Ok(value)
    }

    /// Rebuild the xref by scanning the file. The table is moved out of its
    /// cell for the duration so reconstruction-time parsing sees an empty
    /// (never a half-borrowed) table.
    fn reconstruct_xref(self: &Rc<Self>) -> Result<()> {
        let data = self.file_bytes()?;
        let mut table = std::mem::take(&mut *self.xref.borrow_mut());
        let result = table.reconstruct(self, &data);
        *self.xref.borrow_mut() = table;
        result
    }

    /// Materialize (and parse) a slot for every id in the xref. Returns
    /// false iff reconstruction was triggered while resolving.
    fn resolve_all(self: &Rc<Self>) -> Result<bool> {
        let before = self.xref.borrow().was_reconstructed();
        let ids = self.xref.borrow().all_ids();
        for og in ids {
            self.resolve(og)?;
        }
        let after = self.xref.borrow().was_reconstructed();
        Ok(before || !after)
    }
}

/// Re-entrancy guard: a parse that triggers another parse on the same
/// document indicates a resolver bug, not recoverable input damage.
struct ParseGuard<'a> {
    doc: &'a DocumentInner,
}

impl<'a> ParseGuard<'a> {
    fn claim(doc: &'a DocumentInner) -> Result<Self> {
        if doc.in_parse.get() {
            return Err(Error::logic(
                "re-entrant parsing detected; this is a bug in the resolver",
            ));
        }
        doc.in_parse.set(true);
        Ok(Self { doc })
    }
}

impl Drop for ParseGuard<'_> {
    fn drop(&mut self) {
        self.doc.in_parse.set(false);
    }
}

/// A parsed (or empty) PDF document: the object store, xref, warnings, and
/// every entry point of the library.
pub struct Document {
    inner: Rc<DocumentInner>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        let inner = Rc::new_cyclic(|self_weak| DocumentInner {
            self_weak: self_weak.clone(),
            unique_id: NEXT_DOCUMENT_ID.fetch_add(1, Ordering::Relaxed),
            source: RefCell::new(Rc::new(RefCell::new(InvalidInputSource::new(
                "no input source",
            )))),
            file_bytes: RefCell::new(None),
            store: RefCell::new(ObjectStore::default()),
            xref: RefCell::new(XRefTable::default()),
            encryption: Rc::new(RefCell::new(EncryptionParameters::default())),
            warnings: RefCell::new(Vec::new()),
            pdf_version: RefCell::new(String::new()),
            in_parse: Cell::new(false),
            resolving: RefCell::new(std::collections::HashSet::new()),
            fixed_dangling_refs: Cell::new(false),
            suppress_warnings: Cell::new(false),
            max_warnings: Cell::new(0),
            immediate_copy_from: Cell::new(false),
            check_mode: Cell::new(false),
            last_object_description: RefCell::new(String::new()),
            object_copiers: RefCell::new(HashMap::new()),
            copied_streams: RefCell::new(None),
        });
        Self { inner }
    }

    pub(crate) fn from_inner(inner: Rc<DocumentInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Rc<DocumentInner> {
        &self.inner
    }

    // === processing entry points ===

    /// Open and parse a PDF file from disk (memory-mapped).
    pub fn process_file(&self, path: impl AsRef<Path>, password: Option<&str>) -> Result<()> {
        let source = BufferInputSource::open_file(path.as_ref())?;
        self.process_input_source(Rc::new(RefCell::new(source)), password)
    }

    /// Parse a PDF held in memory, with a description used as its filename.
    pub fn process_memory(
        &self,
        description: impl Into<String>,
        data: impl Into<Bytes>,
        password: Option<&str>,
    ) -> Result<()> {
        let source = BufferInputSource::new(description, data);
        self.process_input_source(Rc::new(RefCell::new(source)), password)
    }

    /// Parse from a caller-supplied input source.
    pub fn process_input_source(
        &self,
        source: SharedSource,
        password: Option<&str>,
    ) -> Result<()> {
        *self.inner.source.borrow_mut() = source;
        *self.inner.file_bytes.borrow_mut() = None;
        self.parse(password)
    }

    /// Initialize as an object-only document with no input: version 1.3,
    /// empty xref.
    pub fn empty_pdf(&self) {
        *self.inner.pdf_version.borrow_mut() = "1.3".to_string();
        *self.inner.source.borrow_mut() =
            Rc::new(RefCell::new(InvalidInputSource::new("empty PDF")));
        *self.inner.file_bytes.borrow_mut() = None;
        self.inner.xref.borrow_mut().initialize_empty();
    }

    /// Detach the byte source. Objects already resolved stay usable;
    /// further lazy resolution and stream reads fail with a logic error
    /// naming the closed source.
    pub fn close_input_source(&self) {
        *self.inner.source.borrow_mut() =
            Rc::new(RefCell::new(InvalidInputSource::new("closed input source")));
        *self.inner.file_bytes.borrow_mut() = None;
    }

    fn parse(&self, password: Option<&str>) -> Result<()> {
        let inner = &self.inner;
        if let Some(password) = password {
            inner.encryption.borrow_mut().provided_password = password.to_string();
        }

        // Find the header anywhere in the first 1024 bytes.
        let mut header: Option<(String, u64)> = None;
        {
            let source = inner.current_source();
            let mut src = source.borrow_mut();
            find_first(&mut *src, b"%PDF-", 0, 1024, &mut |s| {
                match try_read_header(s) {
                    Some(found) => {
                        header = Some(found);
                        true
                    }
                    None => false,
                }
            })?;
        }
        match header {
            Some((version, global_offset)) => {
                *inner.pdf_version.borrow_mut() = version;
                if global_offset != 0 {
                    // Offsets in such files are relative to the header.
                    let old = inner.current_source();
                    *inner.source.borrow_mut() = Rc::new(RefCell::new(OffsetInputSource::new(
                        old,
                        global_offset,
                    )));
                    *inner.file_bytes.borrow_mut() = None;
                }
            }
            None => {
                inner.warn(Damage::new(
                    DamageCode::DamagedPdf,
                    inner.source_name(),
                    "",
                    0,
                    "can't find PDF header",
                ))?;
                // FlateDecode needs at least 1.2; writers assume it.
                *inner.pdf_version.borrow_mut() = "1.2".to_string();
            }
        }

        // Load the xref with the table moved out of its cell, so nothing
        // resolved mid-load can observe a half-borrowed table.
        {
            let mut table = std::mem::take(&mut *inner.xref.borrow_mut());
            let result = table.initialize(inner);
            *inner.xref.borrow_mut() = table;
            result?;
        }

        self.initialize_encryption()?;

        let has_objects = self.inner.xref.borrow().size() > 0;
        if has_objects && !self.get_root()?.get_key("Pages")?.is_dictionary() {
            return Err(inner.damaged(0, "unable to find page tree"));
        }
        Ok(())
    }

    /// Record encryption parameters from the trailer. Ciphers are outside
    /// this crate; a decrypter hook on the parameters does the actual work
    /// when one is attached.
    fn initialize_encryption(&self) -> Result<()> {
        let trailer = self.get_trailer();
        if trailer.is_dictionary() && trailer.has_key("Encrypt")? {
            self.inner.encryption.borrow_mut().encrypted = true;
        }
        Ok(())
    }

    // === configuration ===

    pub fn set_attempt_recovery(&self, value: bool) {
        self.inner.xref.borrow_mut().attempt_recovery(value);
    }

    pub fn set_ignore_xref_streams(&self, value: bool) {
        self.inner.xref.borrow_mut().ignore_streams(value);
    }

    pub fn set_suppress_warnings(&self, value: bool) {
        self.inner.suppress_warnings.set(value);
    }

    pub fn set_max_warnings(&self, value: usize) {
        self.inner.max_warnings.set(value);
    }

    pub fn set_password_is_hex_key(&self, value: bool) {
        self.inner.encryption.borrow_mut().password_is_hex_key = value;
    }

    /// Materialize foreign stream bytes eagerly when this document is the
    /// source of a foreign copy, so the copy does not need this document's
    /// input source later.
    pub fn set_immediate_copy_from(&self, value: bool) {
        self.inner.immediate_copy_from.set(value);
    }

    pub fn set_check_mode(&self, value: bool) {
        self.inner.check_mode.set(value);
    }

    // === warnings ===

    /// Record a damage warning against this document.
    pub fn warn(&self, damage: Damage) -> Result<()> {
        self.inner.warn(damage)
    }

    /// Drain the collected warnings.
    pub fn get_warnings(&self) -> Vec<Damage> {
        std::mem::take(&mut *self.inner.warnings.borrow_mut())
    }

    pub fn any_warnings(&self) -> bool {
        !self.inner.warnings.borrow().is_empty()
    }

    pub fn num_warnings(&self) -> usize {
        self.inner.warnings.borrow().len()
    }

    // === identity and versions ===

    pub fn get_unique_id(&self) -> u64 {
        self.inner.unique_id
    }

    pub fn get_filename(&self) -> String {
        self.inner.source_name()
    }

    pub fn get_pdf_version(&self) -> String {
        self.inner.pdf_version.borrow().clone()
    }

    /// `major.minor` parsed from the recorded version (1.3 when
    /// unparseable) plus the extension level.
    pub fn get_version_as_pdf_version(&self) -> Result<PdfVersion> {
        let mut major = 1;
        let mut minor = 3;
        let version = self.inner.pdf_version.borrow().clone();
        let pattern = regex::Regex::new(r"^\s*(\d+)\.(\d+)").expect("version pattern");
        if let Some(captures) = pattern.captures(&version) {
            major = captures[1].parse().unwrap_or(1);
            minor = captures[2].parse().unwrap_or(3);
        }
        Ok(PdfVersion {
            major,
            minor,
            extension_level: self.get_extension_level()?,
        })
    }

    /// `/Root /Extensions /ADBE /ExtensionLevel`, or 0.
    pub fn get_extension_level(&self) -> Result<i32> {
        let root = self.get_root()?;
        let mut obj = root;
        for key in ["Extensions", "ADBE"] {
            if !(obj.is_dictionary() && obj.has_key(key)?) {
                return Ok(0);
            }
            obj = obj.get_key(key)?;
        }
        if obj.is_dictionary() && obj.has_key("ExtensionLevel")? {
            let level = obj.get_key("ExtensionLevel")?;
            if level.is_integer() {
                return Ok(level.as_int()? as i32);
            }
        }
        Ok(0)
    }

    // === trailer and root ===

    /// The trailer dictionary; a null handle before any processing.
    pub fn get_trailer(&self) -> Handle {
        self.inner
            .xref
            .borrow()
            .trailer()
            .unwrap_or_else(Handle::new_null)
    }

    /// The catalog (`/Root`). Fatal damage when missing or not a
    /// dictionary; in check mode a missing `/Type` is repaired in place.
    pub fn get_root(&self) -> Result<Handle> {
        let root = self.get_trailer().get_key("Root")?;
        if !root.is_dictionary() {
            return Err(self.inner.damaged(0, "unable to find /Root dictionary"));
        }
        if self.inner.check_mode.get() && !root.get_key("Type")?.is_name_equal("Catalog") {
            self.inner.warn(Damage::new(
                DamageCode::DamagedPdf,
                self.inner.source_name(),
                "",
                0,
                "catalog /Type entry missing or invalid",
            ))?;
            root.replace_key("Type", Handle::new_name("Catalog"))?;
        }
        Ok(root)
    }

    /// Delete `/Root /Perms`, and zero `/AcroForm /SigFlags` when present.
    pub fn remove_security_restrictions(&self) -> Result<()> {
        let root = self.get_root()?;
        root.remove_key("Perms")?;
        let acroform = root.get_key("AcroForm")?;
        if acroform.is_dictionary() && acroform.has_key("SigFlags")? {
            acroform.replace_key("SigFlags", Handle::new_integer(0))?;
        }
        Ok(())
    }

    // === xref surface ===

    /// Human-readable dump of the xref.
    pub fn show_xref_table(&self) -> String {
        self.inner.xref.borrow().show()
    }

    pub fn get_xref_table(&self) -> Result<BTreeMap<ObjGen, XRefEntry>> {
        let xref = self.inner.xref.borrow();
        if !xref.initialized() {
            return Err(Error::logic("get_xref_table called before parsing"));
        }
        Ok(xref.as_map())
    }

    // === object access and factory ===

    pub fn get_object(&self, id: u32, gen: u16) -> Handle {
        self.inner.get_object(ObjGen::new(id, gen))
    }

    pub fn get_object_by_og(&self, og: ObjGen) -> Handle {
        self.inner.get_object(og)
    }

    /// Every slot in id order. Dangling references are repaired first so
    /// the listing is complete.
    pub fn get_all_objects(&self) -> Result<Vec<Handle>> {
        self.fix_dangling_references(false)?;
        let ids = self.inner.store.borrow().all_ids();
        Ok(ids
            .into_iter()
            .map(|og| Handle::indirect(og, self.inner.self_weak.clone()))
            .collect())
    }

    /// The highest assigned object id; after `fix_dangling_references`,
    /// every id up to this is a valid slot.
    pub fn get_object_count(&self) -> u32 {
        self.inner.next_id().id - 1
    }

    /// Ensure every object the xref knows (and everything they reference)
    /// has a slot. Runs resolution once, and once more if it triggered
    /// xref reconstruction. Idempotent unless forced.
    pub fn fix_dangling_references(&self, force: bool) -> Result<()> {
        if self.inner.fixed_dangling_refs.get() && !force {
            return Ok(());
        }
        if !self.inner.resolve_all()? {
            self.inner.resolve_all()?;
        }
        self.inner.fixed_dangling_refs.set(true);
        Ok(())
    }

    /// Allocate a new indirect object holding the referent of `handle`.
    /// A direct handle keeps aliasing the new slot's contents.
    pub fn make_indirect(&self, handle: Handle) -> Result<Handle> {
        if handle.is_indirect()
            && handle.owning_document()?.get_unique_id() != self.inner.unique_id
        {
            return Err(Error::logic(
                "make_indirect called with an object from another document; \
                 use copy_foreign_object",
            ));
        }
        if let Some(cell) = handle.direct_cell() {
            let beyond = self.inner.xref.borrow().max_id();
            let og = self.inner.store.borrow_mut().insert_slot(cell, beyond);
            return Ok(Handle::indirect(og, self.inner.self_weak.clone()));
        }
        let value = handle.cloned_value()?;
        Ok(self.inner.make_indirect_value(value))
    }

    pub fn new_indirect_null(&self) -> Handle {
        self.inner.make_indirect_value(Value::Null)
    }

    /// Reserve an identity whose content arrives later via
    /// [`replace_reserved`](Self::replace_reserved). The reserved-slot
    /// trick is how cyclic structures get built: allocate, reference, then
    /// fill.
    pub fn new_reserved(&self) -> Handle {
        self.inner.make_indirect_value(Value::Reserved)
    }

    /// A new empty stream (empty dictionary, empty payload).
    pub fn new_stream(&self) -> Handle {
        let dict = Handle::new_dictionary(Vec::new());
        let value = Handle::new_stream_object(
            dict,
            StreamPayload::FromBuffer {
                data: Bytes::new(),
            },
        );
        self.inner.make_indirect_value(value)
    }

    /// A new stream holding `data`.
    pub fn new_stream_with_data(&self, data: impl Into<Bytes>) -> Result<Handle> {
        let stream = self.new_stream();
        stream.replace_stream_data(
            StreamPayload::FromBuffer { data: data.into() },
            Handle::new_null(),
            Handle::new_null(),
        )?;
        Ok(stream)
    }

    /// Overwrite the slot `og` with the referent of `handle` in place;
    /// every existing handle to `og` observes the new content.
    pub fn replace_object(&self, og: ObjGen, handle: Handle) -> Result<()> {
        if handle.is_indirect() && handle.obj_gen() == og {
            if let Ok(owner) = handle.owning_document() {
                if owner.get_unique_id() == self.inner.unique_id {
                    return Ok(());
                }
            }
        }
        let value = handle.cloned_value()?;
        self.inner.store.borrow_mut().replace(og, value);
        Ok(())
    }

    /// Fill a reservation created by [`new_reserved`](Self::new_reserved).
    /// The target must still be reserved (or null).
    pub fn replace_reserved(&self, reserved: Handle, replacement: Handle) -> Result<()> {
        if !(reserved.is_reserved() || reserved.is_null()) {
            return Err(Error::logic(
                "replace_reserved called with non-reserved object",
            ));
        }
        self.replace_object(reserved.obj_gen(), replacement)
    }

    /// Exchange the contents of two slots; identities and therefore all
    /// references stay fixed.
    pub fn swap_objects(&self, og1: ObjGen, og2: ObjGen) -> Result<()> {
        self.inner.resolve(og1)?;
        self.inner.resolve(og2)?;
        self.inner.store.borrow_mut().swap(og1, og2);
        Ok(())
    }
}

/// Validate `%PDF-M.m` at the source's position; returns the version text
/// and the header's global offset.
fn try_read_header(source: &mut dyn InputSource) -> Option<(String, u64)> {
    let at = source.tell().ok()?;
    let line = read_line(source, 1024).ok()?;
    let rest = line.strip_prefix(b"%PDF-")?;
    let version = validate_pdf_version(rest)?;
    Some((version, at))
}

/// A version is digit-run `.` digit-run; trailing junk is ignored.
fn validate_pdf_version(bytes: &[u8]) -> Option<String> {
    let mut version = String::new();
    let mut i = 0;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        version.push(bytes[i] as char);
        i += 1;
    }
    if version.is_empty() || bytes.get(i) != Some(&b'.') {
        return None;
    }
    version.push('.');
    i += 1;
    let minor_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        version.push(bytes[i] as char);
        i += 1;
    }
    if i == minor_start {
        return None;
    }
    Some(version)
}
