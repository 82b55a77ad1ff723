//! Tests for the document facade: header scan, versions, root access,
//! warnings, xref surface, lifecycle.

mod common;

use common::{one_page_pdf, PdfBuilder};
use std::io::Write as _;
use vellum::{Document, PdfVersion, XRefEntry};

// === header handling ===

#[test]
fn test_offset_header() {
    // Junk before %PDF-: all offsets are relative to the header.
    let data = PdfBuilder::new()
        .prefix(b"GARBAGE BYTES AHEAD OF HEADER...")
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .root(1)
        .build();

    let doc = Document::new();
    doc.process_memory("offset.pdf", data, None).unwrap();

    assert_eq!(doc.get_pdf_version(), "1.7");
    let root = doc.get_root().unwrap();
    assert!(root.get_key("Type").unwrap().is_name_equal("Catalog"));
    assert_eq!(
        doc.get_version_as_pdf_version().unwrap(),
        PdfVersion {
            major: 1,
            minor: 7,
            extension_level: 0
        }
    );
}

#[test]
fn test_missing_header() {
    let doc = Document::new();
    let result = doc.process_memory("bogus", &b"not a pdf"[..], None);
    assert!(result.is_err());

    let warnings = doc.get_warnings();
    assert!(
        warnings
            .iter()
            .any(|w| w.message.contains("can't find PDF header")),
        "{warnings:?}"
    );
    assert_eq!(doc.get_pdf_version(), "1.2");
}

#[test]
fn test_version_with_trailing_junk() {
    let data = PdfBuilder::new()
        .version("1.4abc")
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .root(1)
        .build();
    let doc = Document::new();
    doc.process_memory("v.pdf", data, None).unwrap();
    assert_eq!(doc.get_pdf_version(), "1.4");
}

// === parsing from a real file ===

#[test]
fn test_process_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&one_page_pdf(b"hello")).unwrap();
    file.flush().unwrap();

    let doc = Document::new();
    doc.process_file(file.path(), None).unwrap();
    assert!(doc.get_root().unwrap().is_dictionary());
    assert!(doc.get_filename().contains(
        file.path().file_name().unwrap().to_str().unwrap()
    ));
}

// === extension level ===

#[test]
fn test_extension_level() {
    let data = PdfBuilder::new()
        .object(
            1,
            "<< /Type /Catalog /Pages 2 0 R \
             /Extensions << /ADBE << /ExtensionLevel 3 >> >> >>",
        )
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .root(1)
        .build();
    let doc = Document::new();
    doc.process_memory("ext.pdf", data, None).unwrap();
    assert_eq!(
        doc.get_version_as_pdf_version().unwrap(),
        PdfVersion {
            major: 1,
            minor: 7,
            extension_level: 3
        }
    );
}

// === root handling ===

#[test]
fn test_missing_root_is_fatal() {
    let data = PdfBuilder::new()
        .object(1, "<< /Kind /NotACatalog >>")
        .build();
    let doc = Document::new();
    let err = doc.process_memory("noroot.pdf", data, None).unwrap_err();
    assert!(
        err.to_string().contains("unable to find /Root dictionary"),
        "{err}"
    );
}

#[test]
fn test_missing_page_tree_is_fatal() {
    let data = PdfBuilder::new()
        .object(1, "<< /Type /Catalog >>")
        .root(1)
        .build();
    let doc = Document::new();
    let err = doc.process_memory("nopages.pdf", data, None).unwrap_err();
    assert!(err.to_string().contains("unable to find page tree"), "{err}");
}

#[test]
fn test_check_mode_repairs_catalog_type() {
    let data = PdfBuilder::new()
        .object(1, "<< /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .root(1)
        .build();
    let doc = Document::new();
    doc.set_check_mode(true);
    doc.process_memory("repair.pdf", data, None).unwrap();

    let root = doc.get_root().unwrap();
    assert!(root.get_key("Type").unwrap().is_name_equal("Catalog"));
    assert!(doc
        .get_warnings()
        .iter()
        .any(|w| w.message.contains("catalog /Type entry missing or invalid")));
}

// === security restrictions ===

#[test]
fn test_remove_security_restrictions() {
    let data = PdfBuilder::new()
        .object(
            1,
            "<< /Type /Catalog /Pages 2 0 R /Perms << /DocMDP 5 0 R >> /AcroForm 3 0 R >>",
        )
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .object(3, "<< /SigFlags 3 >>")
        .root(1)
        .build();
    let doc = Document::new();
    doc.process_memory("perms.pdf", data, None).unwrap();

    doc.remove_security_restrictions().unwrap();
    let root = doc.get_root().unwrap();
    assert!(!root.has_key("Perms").unwrap());
    assert_eq!(
        root.get_key("AcroForm")
            .unwrap()
            .get_key("SigFlags")
            .unwrap()
            .as_int()
            .unwrap(),
        0
    );
}

// === warnings ===

#[test]
fn test_warnings_drain() {
    let doc = Document::new();
    let _ = doc.process_memory("bogus", &b"not a pdf"[..], None);
    assert!(doc.any_warnings());
    let first = doc.get_warnings();
    assert!(!first.is_empty());
    assert!(!doc.any_warnings());
    assert!(doc.get_warnings().is_empty());
}

#[test]
fn test_max_warnings_enforced() {
    use vellum::{Damage, DamageCode};
    let doc = Document::new();
    doc.empty_pdf();
    doc.set_max_warnings(2);
    doc.set_suppress_warnings(true);

    let damage = |n: u64| Damage::new(DamageCode::DamagedPdf, "f", "", n, "synthetic");
    doc.warn(damage(1)).unwrap();
    doc.warn(damage(2)).unwrap();
    let err = doc.warn(damage(3)).unwrap_err();
    assert!(err.to_string().contains("Too many warnings"), "{err}");
    assert_eq!(doc.num_warnings(), 2);
}

#[test]
fn test_suppressed_warnings_still_collected() {
    let doc = Document::new();
    doc.set_suppress_warnings(true);
    let _ = doc.process_memory("bogus", &b"not a pdf"[..], None);
    assert!(doc.any_warnings());
}

// === xref surface ===

#[test]
fn test_xref_table_entries() {
    let data = one_page_pdf(b"x");
    let doc = Document::new();
    doc.process_memory("xref.pdf", data, None).unwrap();

    let table = doc.get_xref_table().unwrap();
    assert_eq!(table.len(), 4);
    for entry in table.values() {
        assert!(matches!(entry, XRefEntry::Uncompressed { .. }));
    }

    let shown = doc.show_xref_table();
    assert!(shown.contains("uncompressed; offset ="), "{shown}");
}

#[test]
fn test_xref_table_before_parse_is_logic_error() {
    let doc = Document::new();
    let err = doc.get_xref_table().unwrap_err();
    assert!(err.to_string().contains("before parsing"), "{err}");
}

#[test]
fn test_xref_recovery_by_reconstruction() {
    // Break the startxref pointer; recovery scans for object frames.
    let mut data = one_page_pdf(b"recoverable");
    let pos = data
        .windows(9)
        .rposition(|w| w == b"startxref")
        .unwrap();
    data.truncate(pos);
    data.extend_from_slice(b"startxref\n999999\n%%EOF\n");

    let doc = Document::new();
    doc.process_memory("broken.pdf", data, None).unwrap();
    assert!(doc.get_root().unwrap().is_dictionary());
    assert!(doc
        .get_warnings()
        .iter()
        .any(|w| w.message.contains("Attempting to reconstruct cross-reference table")));
}

#[test]
fn test_recovery_disabled_propagates_damage() {
    let doc = Document::new();
    doc.set_attempt_recovery(false);
    let result = doc.process_memory("bogus", &b"not a pdf at all"[..], None);
    assert!(result.is_err());
}

// === stream length recovery ===

#[test]
fn test_stream_length_recovery() {
    let data = PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [] /Count 0 >>")
        .stream_object_with_length(3, "", b"actual bytes here", 99)
        .root(1)
        .build();
    let doc = Document::new();
    doc.process_memory("badlen.pdf", data, None).unwrap();

    let stream = doc.get_object(3, 0);
    assert_eq!(
        stream.raw_stream_data().unwrap().as_ref(),
        b"actual bytes here"
    );
    assert!(doc
        .get_warnings()
        .iter()
        .any(|w| w.message.contains("attempting to recover stream length")));
}

// === lifecycle ===

#[test]
fn test_empty_pdf_state() {
    let doc = Document::new();
    doc.empty_pdf();
    assert_eq!(doc.get_pdf_version(), "1.3");
    assert_eq!(doc.get_filename(), "empty PDF");
    assert!(doc.get_xref_table().unwrap().is_empty());
    assert!(doc.get_root().is_err());
}

#[test]
fn test_close_input_source() {
    let data = one_page_pdf(b"content");
    let doc = Document::new();
    doc.process_memory("close.pdf", data, None).unwrap();

    // Resolve the root before closing; it stays accessible after.
    let root = doc.get_root().unwrap();
    let stream = doc.get_object(4, 0);
    assert!(stream.is_stream());

    doc.close_input_source();
    assert_eq!(doc.get_filename(), "closed input source");
    assert!(root.is_dictionary());

    // Stream bytes now come from a detached source.
    let err = stream.raw_stream_data().unwrap_err();
    assert!(err.to_string().contains("closed input source"), "{err}");
}

#[test]
fn test_operations_before_processing_fail() {
    let doc = Document::new();
    let obj = doc.get_object(1, 0);
    // Resolution needs the input source, which does not exist yet.
    assert!(obj.as_int().is_err());
}

#[test]
fn test_unique_ids_distinct() {
    let a = Document::new();
    let b = Document::new();
    assert_ne!(a.get_unique_id(), b.get_unique_id());
}
