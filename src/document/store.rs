//! The object store: one slot per indirect object identity.
//!
//! Slots are shared cells; handles reach them through the store on every
//! access, so in-place replacement and content swaps are observed by all
//! outstanding handles. Slot lifetime equals document lifetime.

use crate::model::objects::{ObjGen, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub(crate) type Slot = Rc<RefCell<Value>>;

#[derive(Default)]
pub(crate) struct ObjectStore {
    slots: BTreeMap<ObjGen, Slot>,
}

impl ObjectStore {
    /// Slot for `og`, created unresolved on first reference. Resolution
    /// settles it to parsed content, or to null for ids the xref does not
    /// know (dangling references).
    pub fn ensure_slot(&mut self, og: ObjGen) -> Slot {
        self.slots
            .entry(og)
            .or_insert_with(|| Rc::new(RefCell::new(Value::Unresolved)))
            .clone()
    }

    /// Allocate a fresh slot holding `value` at the next free id.
    pub fn make_indirect(&mut self, value: Value, min_beyond: u32) -> ObjGen {
        self.insert_slot(Rc::new(RefCell::new(value)), min_beyond)
    }

    /// Adopt an existing shared cell as a fresh slot, so direct handles
    /// aliasing the cell keep observing it after it becomes indirect.
    pub fn insert_slot(&mut self, slot: Slot, min_beyond: u32) -> ObjGen {
        let og = self.next_id(min_beyond);
        self.slots.insert(og, slot);
        og
    }

    /// Overwrite the slot's value in place. Every handle to `og` observes
    /// the new content.
    pub fn replace(&mut self, og: ObjGen, value: Value) {
        let slot = self.ensure_slot(og);
        *slot.borrow_mut() = value;
    }

    /// Exchange the contents of two slots. Identities stay fixed, so
    /// existing references now point at the exchanged content. Callers
    /// resolve both slots first; swapping unresolved placeholders would be
    /// undone by later parsing.
    pub fn swap(&mut self, og1: ObjGen, og2: ObjGen) {
        let a = self.ensure_slot(og1);
        let b = self.ensure_slot(og2);
        if !Rc::ptr_eq(&a, &b) {
            std::mem::swap(&mut *a.borrow_mut(), &mut *b.borrow_mut());
        }
    }

    /// All slot identities in id order.
    pub fn all_ids(&self) -> Vec<ObjGen> {
        self.slots.keys().copied().collect()
    }

    /// Smallest unused object id with generation 0. `min_beyond` is the
    /// highest id known elsewhere (the xref), so fresh ids never collide
    /// with not-yet-materialized objects.
    pub fn next_id(&self, min_beyond: u32) -> ObjGen {
        let max_slot = self.slots.keys().next_back().map_or(0, |og| og.id);
        ObjGen::new(max_slot.max(min_beyond) + 1, 0)
    }
}
