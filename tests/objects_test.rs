//! Tests for object values and handle accessors.

use vellum::{Document, Handle, ObjGen};

// === scalar handles ===

#[test]
fn test_null_handle() {
    let h = Handle::new_null();
    assert!(h.is_null());
    assert!(!h.is_indirect());
    assert_eq!(h.obj_gen(), ObjGen::default());
}

#[test]
fn test_bool_handle() {
    assert!(Handle::new_bool(true).as_bool().unwrap());
    assert!(!Handle::new_bool(false).as_bool().unwrap());
    assert!(Handle::new_null().as_bool().is_err());
}

#[test]
fn test_integer_handle() {
    assert_eq!(Handle::new_integer(42).as_int().unwrap(), 42);
    assert_eq!(Handle::new_integer(-7).as_int().unwrap(), -7);
    assert!(Handle::new_integer(1).is_integer());
}

#[test]
fn test_real_keeps_text() {
    let h = Handle::new_real("3.14");
    assert!(h.is_real());
    assert_eq!(h.as_real_text().unwrap(), "3.14");
}

#[test]
fn test_name_handle() {
    let h = Handle::new_name("Type");
    assert_eq!(h.as_name().unwrap(), "Type");
    assert!(h.is_name_equal("Type"));
    assert!(!h.is_name_equal("Pages"));
}

#[test]
fn test_string_handle() {
    let h = Handle::new_string(&b"hello"[..]);
    assert_eq!(h.as_string().unwrap().as_ref(), b"hello");
}

#[test]
fn test_type_assertion_message() {
    let err = Handle::new_name("X").as_int().unwrap_err();
    let text = err.to_string();
    assert!(text.contains("operation for integer"), "{text}");
    assert!(text.contains("name"), "{text}");
}

// === arrays ===

#[test]
fn test_array_ops() {
    let arr = Handle::new_array(vec![Handle::new_integer(1), Handle::new_integer(2)]);
    assert!(arr.is_array());
    assert_eq!(arr.items_count().unwrap(), 2);
    assert_eq!(arr.get_item(1).unwrap().as_int().unwrap(), 2);

    arr.append_item(Handle::new_integer(3)).unwrap();
    assert_eq!(arr.items_count().unwrap(), 3);

    arr.set_item(0, Handle::new_name("First")).unwrap();
    assert!(arr.get_item(0).unwrap().is_name());
}

#[test]
fn test_array_out_of_range_is_null() {
    let arr = Handle::new_array(vec![Handle::new_integer(1)]);
    assert!(arr.get_item(5).unwrap().is_null());
    assert!(arr.set_item(5, Handle::new_null()).is_err());
}

#[test]
fn test_array_shared_between_clones() {
    let arr = Handle::new_array(Vec::new());
    let alias = arr.clone();
    arr.append_item(Handle::new_integer(9)).unwrap();
    assert_eq!(alias.items_count().unwrap(), 1);
}

// === dictionaries ===

#[test]
fn test_dict_ops() {
    let dict = Handle::new_dictionary(vec![
        ("Type".to_string(), Handle::new_name("Page")),
        ("Count".to_string(), Handle::new_integer(5)),
    ]);
    assert!(dict.is_dictionary());
    assert_eq!(dict.keys().unwrap(), vec!["Type", "Count"]);
    assert!(dict.has_key("Type").unwrap());
    assert_eq!(dict.get_key("Count").unwrap().as_int().unwrap(), 5);

    dict.replace_key("Count", Handle::new_integer(6)).unwrap();
    assert_eq!(dict.get_key("Count").unwrap().as_int().unwrap(), 6);

    dict.remove_key("Count").unwrap();
    assert!(!dict.has_key("Count").unwrap());
}

#[test]
fn test_missing_key_is_null() {
    let dict = Handle::new_dictionary(Vec::new());
    assert!(dict.get_key("Nope").unwrap().is_null());
}

#[test]
fn test_get_key_chains_through_null() {
    // Lookups through absent structure answer null instead of failing.
    let dict = Handle::new_dictionary(Vec::new());
    let missing = dict.get_key("A").unwrap();
    assert!(missing.get_key("B").unwrap().is_null());
}

// === page-type predicates ===

#[test]
fn test_page_predicates() {
    let page = Handle::new_dictionary(vec![("Type".to_string(), Handle::new_name("Page"))]);
    let pages = Handle::new_dictionary(vec![("Type".to_string(), Handle::new_name("Pages"))]);
    assert!(page.is_page_object());
    assert!(!page.is_pages_object());
    assert!(pages.is_pages_object());
    assert!(!pages.is_page_object());
    assert!(!Handle::new_integer(1).is_page_object());
}

// === make_direct ===

#[test]
fn test_make_direct_resolves_references() {
    let doc = Document::new();
    doc.empty_pdf();
    let inner = doc.make_indirect(Handle::new_integer(7)).unwrap();
    let dict = Handle::new_dictionary(vec![("Value".to_string(), inner)]);

    let direct = dict.make_direct().unwrap();
    let value = direct.get_key("Value").unwrap();
    assert!(!value.is_indirect());
    assert_eq!(value.as_int().unwrap(), 7);
}

#[test]
fn test_make_direct_rejects_reference_loop() {
    let doc = Document::new();
    doc.empty_pdf();
    let reserved = doc.new_reserved();
    let dict = Handle::new_dictionary(vec![("Self".to_string(), reserved.clone())]);
    let indirect = doc.make_indirect(dict).unwrap();
    doc.replace_reserved(reserved.clone(), indirect).unwrap();

    let err = reserved.make_direct().unwrap_err();
    assert!(err.to_string().contains("loop detected"), "{err}");
}

#[test]
fn test_make_direct_rejects_streams() {
    let doc = Document::new();
    doc.empty_pdf();
    let stream = doc.new_stream_with_data(&b"x"[..]).unwrap();
    assert!(stream.make_direct().is_err());
}

// === identity ===

#[test]
fn test_objgen_display() {
    assert_eq!(ObjGen::new(12, 0).to_string(), "12 0");
    assert!(ObjGen::new(1, 0).is_indirect());
    assert!(!ObjGen::default().is_indirect());
}

#[test]
fn test_owning_document_of_direct_fails() {
    assert!(Handle::new_integer(1).owning_document().is_err());
}

#[test]
fn test_owning_document_of_indirect() {
    let doc = Document::new();
    doc.empty_pdf();
    let h = doc.new_indirect_null();
    assert_eq!(
        h.owning_document().unwrap().get_unique_id(),
        doc.get_unique_id()
    );
}

#[test]
fn test_handle_outliving_document_fails() {
    let h = {
        let doc = Document::new();
        doc.empty_pdf();
        doc.new_indirect_null()
    };
    assert!(h.as_int().is_err());
    assert!(h.owning_document().is_err());
}
