//! Tests for xref streams and compressed (object-stream) objects.

use vellum::{Document, XRefEntry};

/// Hand-assemble a PDF whose xref is a stream (uncompressed, W [1 2 1])
/// and whose objects 4 and 5 live inside an object stream. Offsets are
/// computed while writing.
fn xref_stream_pdf() -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.5\n");

    let o1 = out.len();
    out.extend_from_slice(b"1 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n");
    let o2 = out.len();
    out.extend_from_slice(b"2 0 obj\n<< /Type /Pages /Kids [] /Count 0 >>\nendobj\n");

    // Object stream holding objects 4 and 5.
    let member0 = b"<< /Tag (in-stream) >>";
    let member1 = b"42";
    let mut members = Vec::new();
    members.extend_from_slice(member0);
    members.push(b' ');
    members.extend_from_slice(member1);
    let header = format!("4 0 5 {}", member0.len() + 1);
    let first = header.len() + 1;
    let mut objstm_data = Vec::new();
    objstm_data.extend_from_slice(header.as_bytes());
    objstm_data.push(b'\n');
    objstm_data.extend_from_slice(&members);

    let o3 = out.len();
    out.extend_from_slice(
        format!(
            "3 0 obj\n<< /Type /ObjStm /N 2 /First {first} /Length {} >>\nstream\n",
            objstm_data.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&objstm_data);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    // Xref stream: 7 entries of 4 bytes each.
    let o6 = out.len();
    let mut entries = Vec::new();
    let mut push_entry = |kind: u8, field1: u64, field2: u8, entries: &mut Vec<u8>| {
        entries.push(kind);
        entries.extend_from_slice(&(field1 as u16).to_be_bytes());
        entries.push(field2);
    };
    push_entry(0, 0, 0, &mut entries); // 0: free
    push_entry(1, o1 as u64, 0, &mut entries);
    push_entry(1, o2 as u64, 0, &mut entries);
    push_entry(1, o3 as u64, 0, &mut entries);
    push_entry(2, 3, 0, &mut entries); // 4: in stream 3, index 0
    push_entry(2, 3, 1, &mut entries); // 5: in stream 3, index 1
    push_entry(1, o6 as u64, 0, &mut entries);

    out.extend_from_slice(
        format!(
            "6 0 obj\n<< /Type /XRef /Size 7 /Root 1 0 R /W [1 2 1] /Length {} >>\nstream\n",
            entries.len()
        )
        .as_bytes(),
    );
    out.extend_from_slice(&entries);
    out.extend_from_slice(b"\nendstream\nendobj\n");

    out.extend_from_slice(format!("startxref\n{o6}\n%%EOF\n").as_bytes());
    out
}

#[test]
fn test_xref_stream_parses() {
    let doc = Document::new();
    doc.process_memory("xrefstm.pdf", xref_stream_pdf(), None)
        .unwrap();

    assert_eq!(doc.get_pdf_version(), "1.5");
    let root = doc.get_root().unwrap();
    assert!(root.get_key("Type").unwrap().is_name_equal("Catalog"));

    let table = doc.get_xref_table().unwrap();
    let compressed = table
        .values()
        .filter(|e| matches!(e, XRefEntry::InStream { .. }))
        .count();
    assert_eq!(compressed, 2);
}

#[test]
fn test_object_stream_members_resolve() {
    let doc = Document::new();
    doc.process_memory("xrefstm.pdf", xref_stream_pdf(), None)
        .unwrap();

    let four = doc.get_object(4, 0);
    assert!(four.is_dictionary());
    assert_eq!(
        four.get_key("Tag").unwrap().as_string().unwrap().as_ref(),
        b"in-stream"
    );

    let five = doc.get_object(5, 0);
    assert_eq!(five.as_int().unwrap(), 42);
}

#[test]
fn test_ignore_xref_streams_forces_reconstruction() {
    let doc = Document::new();
    doc.set_ignore_xref_streams(true);
    doc.set_suppress_warnings(true);
    doc.process_memory("xrefstm.pdf", xref_stream_pdf(), None)
        .unwrap();

    // The stream xref was skipped, so the table was rebuilt by scanning;
    // the uncompressed objects are still reachable.
    assert!(doc.get_root().unwrap().is_dictionary());
    let table = doc.get_xref_table().unwrap();
    assert!(table
        .values()
        .all(|e| matches!(e, XRefEntry::Uncompressed { .. })));
}
