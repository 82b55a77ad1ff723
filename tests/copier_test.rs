//! Tests for copying object subgraphs between documents.

mod common;

use common::{one_page_pdf, PdfBuilder};
use vellum::{Document, Handle};

fn parsed(data: Vec<u8>) -> Document {
    let doc = Document::new();
    doc.process_memory("source.pdf", data, None).unwrap();
    doc
}

fn destination() -> Document {
    let doc = Document::new();
    doc.empty_pdf();
    doc
}

// === preconditions ===

#[test]
fn test_copy_direct_handle_is_logic_error() {
    let y = destination();
    let err = y.copy_foreign_object(Handle::new_integer(1)).unwrap_err();
    assert!(err.to_string().contains("direct object handle"), "{err}");
}

#[test]
fn test_copy_from_same_document_is_logic_error() {
    let y = destination();
    let local = y.new_indirect_null();
    let err = y.copy_foreign_object(local).unwrap_err();
    assert!(err.to_string().contains("from this document"), "{err}");
}

#[test]
fn test_copy_reserved_is_logic_error() {
    let x = destination();
    let y = destination();
    let reserved = x.new_reserved();
    let err = y.copy_foreign_object(reserved).unwrap_err();
    assert!(err.to_string().contains("reserved"), "{err}");
}

// === cycles ===

#[test]
fn test_cyclic_copy() {
    let x = parsed(
        PdfBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 4 0 R /First 2 0 R >>")
            .object(2, "<< /Next 3 0 R >>")
            .object(3, "<< /Next 2 0 R >>")
            .object(4, "<< /Type /Pages /Kids [] /Count 0 >>")
            .root(1)
            .build(),
    );
    let y = destination();

    let local = y.copy_foreign_object(x.get_object(2, 0)).unwrap();
    assert!(local.is_indirect());
    assert!(local.is_dictionary());

    let l2 = local.get_key("Next").unwrap();
    assert!(l2.is_indirect());
    let back = l2.get_key("Next").unwrap();
    assert_eq!(back.obj_gen(), local.obj_gen());

    // All cycle edges point inside the copy.
    assert_eq!(
        back.owning_document().unwrap().get_unique_id(),
        y.get_unique_id()
    );
    for handle in y.get_all_objects().unwrap() {
        assert!(!handle.is_reserved());
    }
    assert!(!y.any_warnings());
}

#[test]
fn test_identity_preserved_within_copy() {
    let x = parsed(
        PdfBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 4 0 R >>")
            .object(2, "<< /A 3 0 R /B 3 0 R >>")
            .object(3, "<< /Marker (shared) >>")
            .object(4, "<< /Type /Pages /Kids [] /Count 0 >>")
            .root(1)
            .build(),
    );
    let y = destination();

    let local = y.copy_foreign_object(x.get_object(2, 0)).unwrap();
    let a = local.get_key("A").unwrap();
    let b = local.get_key("B").unwrap();
    assert!(a.is_indirect());
    assert_eq!(a.obj_gen(), b.obj_gen());
}

#[test]
fn test_identity_preserved_across_copies() {
    let x = parsed(
        PdfBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 4 0 R >>")
            .object(2, "<< /Shared 3 0 R >>")
            .object(3, "(payload)")
            .object(4, "<< /Type /Pages /Kids [] /Count 0 >>")
            .root(1)
            .build(),
    );
    let y = destination();

    let first = y.copy_foreign_object(x.get_object(2, 0)).unwrap();
    let second = y.copy_foreign_object(x.get_object(2, 0)).unwrap();
    assert_eq!(first.obj_gen(), second.obj_gen());

    let third = y.copy_foreign_object(x.get_object(3, 0)).unwrap();
    assert_eq!(
        third.obj_gen(),
        first.get_key("Shared").unwrap().obj_gen()
    );
}

// === scalars ===

#[test]
fn test_scalars_copied_as_direct_values() {
    let x = parsed(
        PdfBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 4 0 R >>")
            .object(
                2,
                "<< /Int 42 /Real 2.5 /Name /Widget /Str (hi) /Flag true /Nothing null >>",
            )
            .object(4, "<< /Type /Pages /Kids [] /Count 0 >>")
            .root(1)
            .build(),
    );
    let y = destination();

    let local = y.copy_foreign_object(x.get_object(2, 0)).unwrap();
    assert_eq!(local.get_key("Int").unwrap().as_int().unwrap(), 42);
    assert_eq!(local.get_key("Real").unwrap().as_real_text().unwrap(), "2.5");
    assert!(local.get_key("Name").unwrap().is_name_equal("Widget"));
    assert_eq!(local.get_key("Str").unwrap().as_string().unwrap().as_ref(), b"hi");
    assert!(local.get_key("Flag").unwrap().as_bool().unwrap());
    assert!(local.get_key("Nothing").unwrap().is_null());
    assert!(!local.get_key("Int").unwrap().is_indirect());
}

// === page boundaries ===

#[test]
fn test_page_boundary_stops_copy() {
    let x = parsed(one_page_pdf(b"hello"));
    let y = destination();

    let page = y.copy_foreign_object(x.get_object(3, 0)).unwrap();
    assert!(page.is_page_object());

    // The parent pages node was not crossed.
    assert!(page.get_key("Parent").unwrap().is_null());

    // The content stream came along and pipes the original bytes.
    let contents = page.get_key("Contents").unwrap();
    assert!(contents.is_stream());
    assert_eq!(contents.raw_stream_data().unwrap().as_ref(), b"hello");

    // No pages node materialized in the destination.
    for handle in y.get_all_objects().unwrap() {
        assert!(!handle.is_pages_object());
    }
}

#[test]
fn test_copying_pages_object_itself_yields_null() {
    let x = parsed(one_page_pdf(b"data"));
    let y = destination();

    let copied = y.copy_foreign_object(x.get_object(2, 0)).unwrap();
    assert!(copied.is_null());
    assert!(y
        .get_warnings()
        .iter()
        .any(|w| w.message.contains("unexpected reference to /Pages object")));
}

#[test]
fn test_cross_page_reference_becomes_null_reservation() {
    // Object 5 references page 3 from outside the page tree.
    let x = parsed(
        PdfBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
            .object(3, "<< /Type /Page /Parent 2 0 R >>")
            .object(5, "<< /SomePage 3 0 R >>")
            .root(1)
            .build(),
    );
    let y = destination();

    let local = y.copy_foreign_object(x.get_object(5, 0)).unwrap();
    let page_ref = local.get_key("SomePage").unwrap();
    assert!(page_ref.is_indirect());
    assert!(page_ref.is_null());
}

#[test]
fn test_page_reopened_after_null_copy() {
    // A page first reserved as null through a cross-reference is traversed
    // after all when it is itself the top-level copy target, and the
    // earlier reference heals to the full page.
    let x = parsed(
        PdfBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
            .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
            .object(3, "<< /Type /Page /Parent 2 0 R /Rotate 90 >>")
            .object(5, "<< /SomePage 3 0 R >>")
            .root(1)
            .build(),
    );
    let y = destination();

    let holder = y.copy_foreign_object(x.get_object(5, 0)).unwrap();
    let before = holder.get_key("SomePage").unwrap();
    assert!(before.is_null());

    let page = y.copy_foreign_object(x.get_object(3, 0)).unwrap();
    assert_eq!(page.obj_gen(), before.obj_gen());
    assert!(page.is_page_object());
    assert_eq!(page.get_key("Rotate").unwrap().as_int().unwrap(), 90);

    // The earlier copy now sees the page through the shared slot.
    assert!(holder.get_key("SomePage").unwrap().is_page_object());
}

// === stream payload wiring ===

#[test]
fn test_copied_stream_reads_after_source_document_dropped() {
    let y = destination();
    let copied = {
        let x = parsed(one_page_pdf(b"outlives the document"));
        y.copy_foreign_object(x.get_object(4, 0)).unwrap()
        // x dropped here; the copied-stream record keeps its input source.
    };
    assert_eq!(
        copied.raw_stream_data().unwrap().as_ref(),
        b"outlives the document"
    );
}

#[test]
fn test_immediate_copy_from() {
    let x = parsed(one_page_pdf(b"buffered at copy time"));
    x.set_immediate_copy_from(true);
    let y = destination();

    let copied = y.copy_foreign_object(x.get_object(4, 0)).unwrap();
    x.close_input_source();

    assert_eq!(
        copied.raw_stream_data().unwrap().as_ref(),
        b"buffered at copy time"
    );
}

#[test]
fn test_copy_buffer_backed_stream() {
    let x = destination();
    let y = destination();
    let stream = x.new_stream_with_data(&b"in memory"[..]).unwrap();
    stream
        .stream_dict()
        .unwrap()
        .replace_key("Kind", Handle::new_name("Blob"))
        .unwrap();

    let copied = y.copy_foreign_object(stream).unwrap();
    assert!(copied.is_stream());
    assert!(copied
        .stream_dict()
        .unwrap()
        .get_key("Kind")
        .unwrap()
        .is_name_equal("Blob"));
    assert_eq!(copied.raw_stream_data().unwrap().as_ref(), b"in memory");
}

#[test]
fn test_copied_stream_dict_references_rewritten() {
    let x = parsed(
        PdfBuilder::new()
            .object(1, "<< /Type /Catalog /Pages 5 0 R >>")
            .stream_object(2, "/Extra 3 0 R", b"with ref")
            .object(3, "<< /Tag (referenced) >>")
            .object(5, "<< /Type /Pages /Kids [] /Count 0 >>")
            .root(1)
            .build(),
    );
    let y = destination();

    let copied = y.copy_foreign_object(x.get_object(2, 0)).unwrap();
    let extra = copied.stream_dict().unwrap().get_key("Extra").unwrap();
    assert!(extra.is_indirect());
    assert_eq!(
        extra.owning_document().unwrap().get_unique_id(),
        y.get_unique_id()
    );
    assert_eq!(
        extra.get_key("Tag").unwrap().as_string().unwrap().as_ref(),
        b"referenced"
    );
}
