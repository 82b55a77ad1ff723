//! Copying object subgraphs between documents.
//!
//! A handle owned by one document cannot be inserted into another as-is:
//! every indirect reference inside it names an object in the wrong store.
//! The copier walks the foreign subgraph twice. The first pass reserves a
//! local identity for every reachable foreign indirect object (a fresh
//! stream for streams, a reservation otherwise), recording the foreign-to-
//! local mapping and tolerating cycles. The second pass rebuilds each
//! recorded object with its references rewritten through the mapping and
//! fills the reservations, which is what makes circular structures come out
//! whole in any order.
//!
//! Page-tree boundaries stop the walk: a `/Type /Pages` node is never
//! copied, and a `/Type /Page` leaf reached as a mere cross-reference is
//! reserved but not traversed. Stream payloads are not copied eagerly;
//! the destination document's copied-stream provider keeps whatever makes
//! the foreign bytes reachable later.

use crate::document::catalog::Document;
use crate::error::{Damage, DamageCode, Error, Result};
use crate::model::handle::Handle;
use crate::model::objects::{ObjGen, StreamPayload, Value};
use crate::stream::{CopiedStreamDataProvider, ForeignStreamData, StreamDataProvider};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

/// Copy state per source document, keyed by that document's unique id.
#[derive(Default)]
pub(crate) struct ObjCopier {
    /// Foreign identity to local handle.
    object_map: HashMap<ObjGen, Handle>,
    /// Cycle guard for the reserve pass; empty between top-level copies.
    visiting: HashSet<ObjGen>,
    /// Foreign objects awaiting the rewrite pass.
    to_copy: Vec<Handle>,
}

enum Shape {
    Scalar,
    Array(Vec<Handle>),
    Dict(Vec<(String, Handle)>),
    Stream(Handle),
    Reserved,
}

fn shape_of(handle: &Handle) -> Result<Shape> {
    handle.with_value(|v| {
        Ok(match v {
            Value::Array(items) => Shape::Array(items.clone()),
            Value::Dictionary(map) => {
                Shape::Dict(map.iter().map(|(k, h)| (k.clone(), h.clone())).collect())
            }
            Value::Stream(s) => Shape::Stream(s.dict.clone()),
            Value::Reserved => Shape::Reserved,
            _ => Shape::Scalar,
        })
    })
}

impl Document {
    /// Copy the subgraph reachable from `foreign` (an indirect handle owned
    /// by another document) into this document, preserving identity and
    /// cycles, stopping at page-tree boundaries, and wiring stream payloads
    /// lazily. Returns the local counterpart of `foreign`.
    pub fn copy_foreign_object(&self, foreign: Handle) -> Result<Handle> {
        if !foreign.is_indirect() {
            return Err(Error::logic(
                "copy_foreign_object called with direct object handle",
            ));
        }
        let other = foreign.owning_document()?;
        if other.get_unique_id() == self.get_unique_id() {
            return Err(Error::logic(
                "copy_foreign_object called with object from this document",
            ));
        }

        // The copier is moved out of the map for the duration so recursive
        // store operations never contend with the map's cell.
        let other_id = other.get_unique_id();
        let mut copier = self
            .inner()
            .object_copiers
            .borrow_mut()
            .remove(&other_id)
            .unwrap_or_default();
        let result = self.copy_foreign_inner(&foreign, &mut copier);
        self.inner()
            .object_copiers
            .borrow_mut()
            .insert(other_id, copier);
        result
    }

    fn copy_foreign_inner(&self, foreign: &Handle, copier: &mut ObjCopier) -> Result<Handle> {
        if !copier.visiting.is_empty() {
            return Err(Error::logic(
                "copier visiting set is not empty at the beginning of a foreign copy",
            ));
        }

        self.reserve_objects(foreign, copier, true)?;

        if !copier.visiting.is_empty() {
            return Err(Error::logic(
                "copier visiting set is not empty after reserving objects",
            ));
        }

        let to_copy = std::mem::take(&mut copier.to_copy);
        for item in &to_copy {
            let copy = self.replace_foreign_indirect(item, copier, true)?;
            if !item.is_stream() {
                let target = copier
                    .object_map
                    .get(&item.obj_gen())
                    .cloned()
                    .ok_or_else(|| Error::logic("no local mapping for copied foreign object"))?;
                self.replace_reserved(target, copy)?;
            }
        }

        match copier.object_map.get(&foreign.obj_gen()) {
            Some(local) => Ok(local.clone()),
            // Only a pages object escapes both passes unmapped.
            None => {
                self.warn(Damage::new(
                    DamageCode::DamagedPdf,
                    self.get_filename(),
                    "",
                    0,
                    "unexpected reference to /Pages object while copying foreign object; \
                     replacing with null",
                ))?;
                Ok(Handle::new_null())
            }
        }
    }

    /// First pass: allocate a local identity for every foreign indirect
    /// object reachable from `foreign`, without descending into the page
    /// tree.
    fn reserve_objects(&self, foreign: &Handle, copier: &mut ObjCopier, top: bool) -> Result<()> {
        if foreign.is_reserved() {
            return Err(Error::logic("attempting to copy a reserved object"));
        }
        if foreign.is_pages_object() {
            return Ok(());
        }

        let is_indirect = foreign.is_indirect();
        if is_indirect {
            let og = foreign.obj_gen();
            if !copier.visiting.insert(og) {
                // Already on the path: a cycle.
                return Ok(());
            }
            match copier.object_map.get(&og) {
                Some(mapped) => {
                    // A page copied before only as a null reservation may be
                    // reopened when it is itself the object being copied.
                    let reopen = top && foreign.is_page_object() && mapped.is_null();
                    if !reopen {
                        copier.visiting.remove(&og);
                        return Ok(());
                    }
                }
                None => {
                    let local = if foreign.is_stream() {
                        self.new_stream()
                    } else {
                        self.new_indirect_null()
                    };
                    copier.object_map.insert(og, local);
                    if !top && foreign.is_page_object() {
                        // Cross-page reference: terminate at the
                        // reservation.
                        copier.visiting.remove(&og);
                        return Ok(());
                    }
                }
            }
            copier.to_copy.push(foreign.clone());
        }

        match shape_of(foreign)? {
            Shape::Array(items) => {
                for item in items {
                    self.reserve_objects(&item, copier, false)?;
                }
            }
            Shape::Dict(entries) => {
                for (_, value) in entries {
                    self.reserve_objects(&value, copier, false)?;
                }
            }
            Shape::Stream(dict) => {
                self.reserve_objects(&dict, copier, false)?;
            }
            Shape::Scalar | Shape::Reserved => {}
        }

        if is_indirect {
            copier.visiting.remove(&foreign.obj_gen());
        }
        Ok(())
    }

    /// Second pass: rebuild `foreign` with every embedded reference
    /// rewritten to its local counterpart.
    fn replace_foreign_indirect(
        &self,
        foreign: &Handle,
        copier: &mut ObjCopier,
        top: bool,
    ) -> Result<Handle> {
        if !top && foreign.is_indirect() {
            // Unmapped means a pages object deliberately not traversed.
            return Ok(copier
                .object_map
                .get(&foreign.obj_gen())
                .cloned()
                .unwrap_or_else(Handle::new_null));
        }

        let result = match shape_of(foreign)? {
            Shape::Array(items) => {
                let local = Handle::new_array(Vec::new());
                for item in items {
                    local.append_item(self.replace_foreign_indirect(&item, copier, false)?)?;
                }
                local
            }
            Shape::Dict(entries) => {
                let local = Handle::new_dictionary(Vec::new());
                for (key, value) in entries {
                    local.replace_key(key, self.replace_foreign_indirect(&value, copier, false)?)?;
                }
                local
            }
            Shape::Stream(foreign_dict) => {
                // The local stream allocated in the reserve pass, not a new
                // object.
                let local = copier
                    .object_map
                    .get(&foreign.obj_gen())
                    .cloned()
                    .ok_or_else(|| Error::logic("no local stream reserved for foreign stream"))?;
                if !local.is_stream() {
                    return Err(Error::logic(
                        "local counterpart of a foreign stream is not a stream",
                    ));
                }
                let local_dict = local.stream_dict()?;
                for key in foreign_dict.keys()? {
                    let value = foreign_dict.get_key(&key)?;
                    local_dict
                        .replace_key(key, self.replace_foreign_indirect(&value, copier, false)?)?;
                }
                self.copy_stream_data(&local, foreign)?;
                local
            }
            Shape::Scalar => foreign.make_direct()?,
            Shape::Reserved => {
                return Err(Error::logic("attempting to copy a reserved object"));
            }
        };

        if top && !result.is_stream() && result.is_indirect() {
            return Err(Error::logic("replacement for foreign object is indirect"));
        }
        Ok(result)
    }

    /// Wire the local stream's payload to the foreign stream's bytes
    /// without copying them now.
    fn copy_stream_data(&self, local: &Handle, foreign: &Handle) -> Result<()> {
        let local_dict = local.stream_dict()?;
        let foreign_dict = foreign.stream_dict()?;

        let provider = self
            .inner()
            .copied_streams
            .borrow_mut()
            .get_or_insert_with(|| {
                Rc::new(RefCell::new(CopiedStreamDataProvider::new(Rc::downgrade(
                    self.inner(),
                ))))
            })
            .clone();
        let local_og = local.obj_gen();

        let foreign_doc = foreign.owning_document()?;
        let mut payload = foreign.stream_payload()?;

        if foreign_doc.inner().immediate_copy_from()
            && !matches!(payload, StreamPayload::FromBuffer { .. })
        {
            // Buffer on the foreign side, so copying the same stream again
            // shares one buffer instead of re-reading the source.
            let raw = foreign.raw_stream_data()?;
            foreign.replace_stream_data(
                StreamPayload::FromBuffer { data: raw },
                foreign_dict.get_key("Filter")?,
                foreign_dict.get_key("DecodeParms")?,
            )?;
            payload = foreign.stream_payload()?;
        }

        let shared: Rc<RefCell<dyn StreamDataProvider>> = provider.clone();
        match payload {
            StreamPayload::FromBuffer { data } => {
                local.replace_stream_data(
                    StreamPayload::FromBuffer { data },
                    local_dict.get_key("Filter")?,
                    local_dict.get_key("DecodeParms")?,
                )?;
            }
            StreamPayload::FromProvider { .. } => {
                // The foreign document must stay alive for its provider.
                provider
                    .borrow_mut()
                    .register_foreign_stream(local_og, foreign.clone());
                local.replace_stream_data(
                    StreamPayload::FromProvider {
                        provider: shared,
                        key: local_og,
                    },
                    local_dict.get_key("Filter")?,
                    local_dict.get_key("DecodeParms")?,
                )?;
            }
            StreamPayload::FromInput {
                offset,
                length,
                encryption,
                ..
            } => {
                // Only the foreign input source must stay alive; the record
                // captures it as it stands at copy time.
                let record = Rc::new(ForeignStreamData {
                    encryption,
                    source: foreign_doc.inner().current_source(),
                    foreign_og: foreign.obj_gen(),
                    offset,
                    length,
                    local_dict: local_dict.clone(),
                });
                provider
                    .borrow_mut()
                    .register_foreign_stream_data(local_og, record);
                local.replace_stream_data(
                    StreamPayload::FromProvider {
                        provider: shared,
                        key: local_og,
                    },
                    local_dict.get_key("Filter")?,
                    local_dict.get_key("DecodeParms")?,
                )?;
            }
        }
        Ok(())
    }
}
