//! Shared test fixtures: a small builder that assembles PDF bytes with a
//! correct classic xref, so tests never hard-code byte offsets.
#![allow(dead_code)]

/// Builds a single-revision PDF: numbered objects, classic xref table,
/// trailer. Offsets are computed while writing, and are relative to the
/// header when a junk prefix is present.
pub struct PdfBuilder {
    version: String,
    prefix: Vec<u8>,
    objects: Vec<(u32, Vec<u8>)>,
    root: Option<u32>,
    trailer_extra: String,
}

impl PdfBuilder {
    pub fn new() -> Self {
        Self {
            version: "1.7".to_string(),
            prefix: Vec::new(),
            objects: Vec::new(),
            root: None,
            trailer_extra: String::new(),
        }
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }

    /// Arbitrary bytes before the `%PDF-` header.
    pub fn prefix(mut self, junk: &[u8]) -> Self {
        self.prefix = junk.to_vec();
        self
    }

    /// Add object `id` with the given body text (everything between
    /// `id 0 obj` and `endobj`).
    pub fn object(mut self, id: u32, body: &str) -> Self {
        self.objects.push((id, body.as_bytes().to_vec()));
        self
    }

    /// Add a stream object: dictionary entries (without /Length) plus data.
    pub fn stream_object(mut self, id: u32, dict_entries: &str, data: &[u8]) -> Self {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!("<< {} /Length {} >>\nstream\n", dict_entries, data.len()).as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.objects.push((id, body));
        self
    }

    /// Like `stream_object` but with an explicitly wrong /Length.
    pub fn stream_object_with_length(
        mut self,
        id: u32,
        dict_entries: &str,
        data: &[u8],
        length: usize,
    ) -> Self {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!("<< {} /Length {} >>\nstream\n", dict_entries, length).as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        self.objects.push((id, body));
        self
    }

    pub fn root(mut self, id: u32) -> Self {
        self.root = Some(id);
        self
    }

    /// Extra text spliced into the trailer dictionary.
    pub fn trailer_extra(mut self, text: &str) -> Self {
        self.trailer_extra = text.to_string();
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut out = self.prefix.clone();
        let header_base = out.len();
        out.extend_from_slice(format!("%PDF-{}\n", self.version).as_bytes());

        let max_id = self.objects.iter().map(|(id, _)| *id).max().unwrap_or(0);
        let mut offsets = vec![None; (max_id + 1) as usize];
        for (id, body) in &self.objects {
            offsets[*id as usize] = Some((out.len() - header_base) as u64);
            out.extend_from_slice(format!("{id} 0 obj\n").as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref_offset = out.len() - header_base;
        out.extend_from_slice(format!("xref\n0 {}\n", max_id + 1).as_bytes());
        out.extend_from_slice(b"0000000000 65535 f \n");
        for offset in offsets.iter().skip(1) {
            match offset {
                Some(pos) => out.extend_from_slice(format!("{pos:010} 00000 n \n").as_bytes()),
                None => out.extend_from_slice(b"0000000000 65535 f \n"),
            }
        }

        let mut trailer = format!("trailer\n<< /Size {}", max_id + 1);
        if let Some(root) = self.root {
            trailer.push_str(&format!(" /Root {root} 0 R"));
        }
        if !self.trailer_extra.is_empty() {
            trailer.push(' ');
            trailer.push_str(&self.trailer_extra);
        }
        trailer.push_str(&format!(" >>\nstartxref\n{xref_offset}\n%%EOF\n"));
        out.extend_from_slice(trailer.as_bytes());
        out
    }
}

/// A minimal one-page document: catalog, pages node, one page, one content
/// stream with the given bytes.
pub fn one_page_pdf(content: &[u8]) -> Vec<u8> {
    PdfBuilder::new()
        .object(1, "<< /Type /Catalog /Pages 2 0 R >>")
        .object(2, "<< /Type /Pages /Kids [3 0 R] /Count 1 >>")
        .object(
            3,
            "<< /Type /Page /Parent 2 0 R /Contents 4 0 R /MediaBox [0 0 612 792] >>",
        )
        .stream_object(4, "", content)
        .root(1)
        .build()
}
