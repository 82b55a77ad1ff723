//! Cross-reference table: maps object identities to byte offsets.
//!
//! Understands classic tables (with `/Prev` chains and hybrid `/XRefStm`
//! pointers) and xref streams, and can reconstruct the index by scanning
//! the file for object frames when the recorded tables are damaged.

use crate::document::catalog::DocumentInner;
use crate::error::{Damage, DamageCode, Error, Result};
use crate::model::handle::Handle;
use crate::model::objects::{ObjGen, Value};
use crate::parser::object_parser::ObjectParser;
use bytes::Bytes;
use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

/// Location of one object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XRefEntry {
    /// At a byte offset in the file.
    Uncompressed { offset: u64, gen: u16 },
    /// Member `index` of the object stream with id `stream_id`.
    InStream { stream_id: u32, index: usize },
}

pub(crate) struct XRefTable {
    entries: BTreeMap<ObjGen, XRefEntry>,
    trailer: Option<Handle>,
    initialized: bool,
    reconstructed: bool,
    attempt_recovery: bool,
    ignore_streams: bool,
}

impl Default for XRefTable {
    fn default() -> Self {
        Self {
            entries: BTreeMap::new(),
            trailer: None,
            initialized: false,
            reconstructed: false,
            attempt_recovery: true,
            ignore_streams: false,
        }
    }
}

impl XRefTable {
    pub fn initialized(&self) -> bool {
        self.initialized
    }

    pub fn was_reconstructed(&self) -> bool {
        self.reconstructed
    }

    pub fn attempt_recovery(&mut self, value: bool) {
        self.attempt_recovery = value;
    }

    pub fn recovery_enabled(&self) -> bool {
        self.attempt_recovery
    }

    pub fn ignore_streams(&mut self, value: bool) {
        self.ignore_streams = value;
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, og: ObjGen) -> Option<XRefEntry> {
        self.entries.get(&og).copied()
    }

    pub fn as_map(&self) -> BTreeMap<ObjGen, XRefEntry> {
        self.entries.clone()
    }

    pub fn all_ids(&self) -> Vec<ObjGen> {
        self.entries.keys().copied().collect()
    }

    pub fn max_id(&self) -> u32 {
        self.entries.keys().map(|og| og.id).max().unwrap_or(0)
    }

    pub fn trailer(&self) -> Option<Handle> {
        self.trailer.clone()
    }

    /// Set up the empty state used by documents created from scratch.
    pub fn initialize_empty(&mut self) {
        self.entries.clear();
        self.trailer = Some(Handle::new_dictionary(Vec::new()));
        self.initialized = true;
    }

    /// Scan the file tail and load the xref chain, reconstructing on
    /// damage when recovery is enabled.
    pub fn initialize(&mut self, doc: &Rc<DocumentInner>) -> Result<()> {
        let data = doc.file_bytes()?;
        let outcome = self.load_chain(doc, &data);
        match outcome {
            Ok(()) => {}
            Err(Error::Damaged(damage)) if self.attempt_recovery => {
                doc.warn(damage)?;
                self.reconstruct(doc, &data)?;
            }
            Err(e) => return Err(e),
        }
        self.initialized = true;
        Ok(())
    }

    fn load_chain(&mut self, doc: &Rc<DocumentInner>, data: &Bytes) -> Result<()> {
        let mut pos = find_startxref(doc, data)?;
        let mut visited = HashSet::new();
        while visited.insert(pos) {
            match self.load_xref_at(doc, data, pos)? {
                Some(prev) => pos = prev,
                None => break,
            }
        }
        if self.entries.is_empty() {
            return Err(doc.damaged(0, "no objects found in cross-reference data"));
        }
        Ok(())
    }

    /// Load one table or stream; returns the `/Prev` position, if any.
    fn load_xref_at(&mut self, doc: &Rc<DocumentInner>, data: &Bytes, pos: u64) -> Result<Option<u64>> {
        let start = pos as usize;
        if start >= data.len() {
            return Err(doc.damaged(pos, "cross-reference position out of range"));
        }
        let mut skip = start;
        while skip < data.len() && data[skip].is_ascii_whitespace() {
            skip += 1;
        }
        if data[skip..].starts_with(b"xref") {
            self.load_classic(doc, data, skip as u64)
        } else if self.ignore_streams {
            Err(doc.damaged(pos, "cross-reference streams are being ignored"))
        } else {
            self.load_stream(doc, data, pos)
        }
    }

    /// Classic `xref` table: subsections of fixed-format entries followed
    /// by a trailer dictionary.
    fn load_classic(
        &mut self,
        doc: &Rc<DocumentInner>,
        data: &Bytes,
        pos: u64,
    ) -> Result<Option<u64>> {
        let bytes = &data[pos as usize..];
        let mut cursor = 4; // past "xref"

        loop {
            while cursor < bytes.len() && bytes[cursor].is_ascii_whitespace() {
                cursor += 1;
            }
            if cursor >= bytes.len() || bytes[cursor..].starts_with(b"trailer") {
                break;
            }

            let (start_id, used) = read_decimal(&bytes[cursor..])
                .ok_or_else(|| doc.damaged(pos + cursor as u64, "invalid xref subsection header"))?;
            cursor += used;
            while cursor < bytes.len() && bytes[cursor] == b' ' {
                cursor += 1;
            }
            let (count, used) = read_decimal(&bytes[cursor..])
                .ok_or_else(|| doc.damaged(pos + cursor as u64, "invalid xref subsection header"))?;
            cursor += used;
            skip_to_next_line(bytes, &mut cursor);

            let mut base_id = start_id;
            for i in 0..count {
                let (offset, used) = read_decimal(&bytes[cursor..])
                    .ok_or_else(|| doc.damaged(pos + cursor as u64, "invalid xref entry"))?;
                cursor += used;
                while cursor < bytes.len() && bytes[cursor] == b' ' {
                    cursor += 1;
                }
                let (gen, used) = read_decimal(&bytes[cursor..])
                    .ok_or_else(|| doc.damaged(pos + cursor as u64, "invalid xref entry"))?;
                cursor += used;
                while cursor < bytes.len() && bytes[cursor] == b' ' {
                    cursor += 1;
                }
                let marker = bytes.get(cursor).copied().unwrap_or(b'f');
                cursor += 1;
                skip_to_next_line(bytes, &mut cursor);

                // Some writers start the first subsection at 1 but still
                // emit the object-0 free entry; realign so the remaining
                // entries land on their true ids.
                if i == 0 && base_id > 0 && marker == b'f' && offset == 0 && gen == 65535 {
                    base_id -= 1;
                }

                if marker == b'n' {
                    let og = ObjGen::new((base_id + i) as u32, gen as u16);
                    self.entries
                        .entry(og)
                        .or_insert(XRefEntry::Uncompressed { offset, gen: gen as u16 });
                }
            }
        }

        // Trailer dictionary.
        while cursor < bytes.len() && !bytes[cursor..].starts_with(b"trailer") {
            cursor += 1;
        }
        if cursor >= bytes.len() {
            return Err(doc.damaged(pos + cursor as u64, "expected trailer dictionary"));
        }
        cursor += b"trailer".len();
        let parser = ObjectParser::new(data, doc);
        let (trailer, _) = parser.parse_value_at(pos + cursor as u64)?;
        if !trailer.is_dictionary() {
            return Err(doc.damaged(pos + cursor as u64, "expected trailer dictionary"));
        }

        let prev = direct_int(&trailer.get_key("Prev")?).map(|n| n as u64);
        let xref_stm = direct_int(&trailer.get_key("XRefStm")?).map(|n| n as u64);
        if self.trailer.is_none() {
            self.trailer = Some(trailer);
        }

        // Hybrid file: the stream part carries entries the table marks free.
        if let Some(stm_pos) = xref_stm {
            if !self.ignore_streams {
                match self.load_stream(doc, data, stm_pos) {
                    Ok(_) => {}
                    Err(Error::Damaged(damage)) => doc.warn(damage)?,
                    Err(e) => return Err(e),
                }
            }
        }

        Ok(prev)
    }

    /// Xref stream: entries packed into a compressed stream per `/W` and
    /// `/Index`, the trailer being the stream dictionary itself.
    fn load_stream(
        &mut self,
        doc: &Rc<DocumentInner>,
        data: &Bytes,
        pos: u64,
    ) -> Result<Option<u64>> {
        let parser = ObjectParser::new(data, doc);
        let (_, value) = parser.parse_indirect_at_any(pos)?;
        let Value::Stream(stream) = value else {
            return Err(doc.damaged(pos, "expected xref stream"));
        };
        let dict = stream.dict.clone();
        let (offset, length) = match &stream.payload {
            crate::model::objects::StreamPayload::FromInput { offset, length, .. } => {
                (*offset, *length)
            }
            _ => return Err(doc.damaged(pos, "expected xref stream")),
        };
        let end = (offset + length).min(data.len() as u64);
        let raw = data.slice(offset as usize..end as usize);
        let decoded = decode_xref_stream_data(doc, &dict, &raw, pos)?;

        let invalid_w = || doc.damaged(pos, "xref stream: invalid /W");
        let w = dict.get_key("W")?;
        if !w.is_array() || w.items_count()? != 3 {
            return Err(invalid_w());
        }
        let w0 = direct_int(&w.get_item(0)?).ok_or_else(invalid_w)? as usize;
        let w1 = direct_int(&w.get_item(1)?).ok_or_else(invalid_w)? as usize;
        let w2 = direct_int(&w.get_item(2)?).ok_or_else(invalid_w)? as usize;
        let entry_size = w0 + w1 + w2;
        if entry_size == 0 {
            return Err(invalid_w());
        }

        let size = direct_int(&dict.get_key("Size")?).unwrap_or(0) as usize;
        let index = dict.get_key("Index")?;
        let mut ranges = Vec::new();
        if index.is_array() {
            let n = index.items_count()?;
            let mut i = 0;
            while i + 1 < n {
                let invalid_index = || doc.damaged(pos, "xref stream: invalid /Index");
                let start = direct_int(&index.get_item(i)?).ok_or_else(invalid_index)? as u32;
                let count = direct_int(&index.get_item(i + 1)?).ok_or_else(invalid_index)? as usize;
                ranges.push((start, count));
                i += 2;
            }
        } else {
            ranges.push((0, size));
        }

        let mut data_pos = 0;
        for (start_id, count) in ranges {
            for i in 0..count {
                if data_pos + entry_size > decoded.len() {
                    break;
                }
                let id = start_id + i as u32;
                let kind = if w0 > 0 {
                    be_int(&decoded[data_pos..data_pos + w0])
                } else {
                    1
                };
                let field1 = be_int(&decoded[data_pos + w0..data_pos + w0 + w1]);
                let field2 = be_int(&decoded[data_pos + w0 + w1..data_pos + entry_size]);
                data_pos += entry_size;

                match kind {
                    1 => {
                        let og = ObjGen::new(id, field2 as u16);
                        self.entries.entry(og).or_insert(XRefEntry::Uncompressed {
                            offset: field1,
                            gen: field2 as u16,
                        });
                    }
                    2 => {
                        let og = ObjGen::new(id, 0);
                        self.entries.entry(og).or_insert(XRefEntry::InStream {
                            stream_id: field1 as u32,
                            index: field2 as usize,
                        });
                    }
                    _ => {}
                }
            }
        }

        let prev = direct_int(&dict.get_key("Prev")?).map(|n| n as u64);
        if self.trailer.is_none() {
            const STRUCTURAL: &[&str] = &["Length", "Filter", "DecodeParms", "W", "Index", "Type"];
            let mut entries = Vec::new();
            for key in dict.keys()? {
                if !STRUCTURAL.contains(&key.as_str()) {
                    entries.push((key.clone(), dict.get_key(&key)?));
                }
            }
            self.trailer = Some(Handle::new_dictionary(entries));
        }
        Ok(prev)
    }

    /// Rebuild the index by scanning the whole file for `N G obj` frames.
    /// Last definition of an id wins, matching how writers append updates.
    pub fn reconstruct(&mut self, doc: &Rc<DocumentInner>, data: &Bytes) -> Result<()> {
        doc.warn(Damage::new(
            DamageCode::DamagedPdf,
            doc.source_name(),
            "",
            0,
            "file is damaged",
        ))?;
        doc.warn(Damage::new(
            DamageCode::DamagedPdf,
            doc.source_name(),
            "",
            0,
            "Attempting to reconstruct cross-reference table",
        ))?;

        self.reconstructed = true;
        self.entries.clear();

        let pattern = regex::bytes::Regex::new(r"(\d+)\s+(\d+)\s+obj\b")
            .expect("object frame pattern");
        for captures in pattern.captures_iter(data) {
            let Some(id) = parse_capture::<u32>(&captures[1]) else {
                continue;
            };
            let Some(gen) = parse_capture::<u16>(&captures[2]) else {
                continue;
            };
            if id == 0 {
                continue;
            }
            let offset = captures.get(0).expect("whole match").start() as u64;
            self.entries.insert(
                ObjGen::new(id, gen),
                XRefEntry::Uncompressed { offset, gen },
            );
        }

        // Prefer an intact trailer for /Root; otherwise hunt for a catalog.
        if let Some(trailer_pos) = rfind(data, b"trailer") {
            let parser = ObjectParser::new(data, doc);
            if let Ok((dict, _)) = parser.parse_value_at((trailer_pos + b"trailer".len()) as u64) {
                if dict.is_dictionary() && has_root_entry(&dict)? {
                    self.trailer = Some(dict);
                }
            }
        }
        if self.trailer.is_none() || !self.trailer_has_root()? {
            if let Some(root_og) = self.find_catalog(doc, data) {
                self.trailer = Some(Handle::new_dictionary(vec![
                    ("Root".to_string(), doc.get_object(root_og)),
                    (
                        "Size".to_string(),
                        Handle::new_integer(i64::from(self.max_id()) + 1),
                    ),
                ]));
            }
        }
        if self.trailer.is_none() || !self.trailer_has_root()? {
            return Err(doc.damaged(
                0,
                "unable to find trailer dictionary while recovering damaged file",
            ));
        }
        Ok(())
    }

    fn trailer_has_root(&self) -> Result<bool> {
        match &self.trailer {
            Some(trailer) => has_root_entry(trailer),
            None => Ok(false),
        }
    }

    fn find_catalog(&self, doc: &Rc<DocumentInner>, data: &Bytes) -> Option<ObjGen> {
        let parser = ObjectParser::new(data, doc);
        for (og, entry) in &self.entries {
            let XRefEntry::Uncompressed { offset, .. } = entry else {
                continue;
            };
            let Ok((_, value)) = parser.parse_indirect_at_any(*offset) else {
                continue;
            };
            if let Value::Dictionary(map) = &value {
                if let Some(type_handle) = map.get("Type") {
                    if type_handle.is_name_equal("Catalog") {
                        return Some(*og);
                    }
                }
            }
        }
        None
    }

    /// Human-readable dump of the table.
    pub fn show(&self) -> String {
        use std::fmt::Write as _;
        let mut out = String::new();
        for (og, entry) in &self.entries {
            match entry {
                XRefEntry::Uncompressed { offset, .. } => {
                    let _ = writeln!(out, "{og}: uncompressed; offset = {offset}");
                }
                XRefEntry::InStream { stream_id, index } => {
                    let _ = writeln!(
                        out,
                        "{og}: compressed; stream = {stream_id}, index = {index}"
                    );
                }
            }
        }
        out
    }
}

/// Locate `startxref` near the end of the file and parse the position that
/// follows it.
fn find_startxref(doc: &Rc<DocumentInner>, data: &Bytes) -> Result<u64> {
    let needle = b"startxref";
    if data.len() < needle.len() {
        return Err(doc.damaged(0, "can't find startxref"));
    }
    let window_start = data.len().saturating_sub(1024);
    let window = &data[window_start..];
    let hit = window
        .windows(needle.len())
        .rposition(|w| w == needle)
        .ok_or_else(|| doc.damaged(0, "can't find startxref"))?;

    let mut pos = window_start + hit + needle.len();
    while pos < data.len() && data[pos].is_ascii_whitespace() {
        pos += 1;
    }
    read_decimal(&data[pos..])
        .map(|(value, _)| value)
        .ok_or_else(|| doc.damaged(pos as u64, "can't find startxref"))
}

/// Integer value of a handle, without resolving: xref loading must never
/// trigger object resolution (the table is still being built).
fn direct_int(handle: &Handle) -> Option<i64> {
    if handle.is_indirect() {
        return None;
    }
    handle.as_int().ok()
}

/// Whether a trailer dictionary carries a usable /Root, judged without
/// resolving (a reference counts; resolution happens after loading).
fn has_root_entry(trailer: &Handle) -> Result<bool> {
    let root = trailer.get_key("Root")?;
    Ok(root.is_indirect() || root.is_dictionary())
}

fn read_decimal(data: &[u8]) -> Option<(u64, usize)> {
    let mut end = 0;
    while end < data.len() && data[end].is_ascii_digit() {
        end += 1;
    }
    if end == 0 {
        return None;
    }
    std::str::from_utf8(&data[..end])
        .ok()?
        .parse()
        .ok()
        .map(|value| (value, end))
}

fn skip_to_next_line(data: &[u8], cursor: &mut usize) {
    while *cursor < data.len() && data[*cursor] != b'\n' && data[*cursor] != b'\r' {
        *cursor += 1;
    }
    while *cursor < data.len() && (data[*cursor] == b'\n' || data[*cursor] == b'\r') {
        *cursor += 1;
    }
}

fn be_int(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0, |acc, &b| (acc << 8) | u64::from(b))
}

fn parse_capture<T: std::str::FromStr>(bytes: &[u8]) -> Option<T> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn rfind(data: &[u8], needle: &[u8]) -> Option<usize> {
    if data.len() < needle.len() {
        return None;
    }
    data.windows(needle.len()).rposition(|w| w == needle)
}

/// Inflate and un-predict xref stream data. Only `/FlateDecode` with an
/// optional PNG predictor appears in practice for xref streams.
fn decode_xref_stream_data(
    doc: &Rc<DocumentInner>,
    dict: &Handle,
    raw: &[u8],
    pos: u64,
) -> Result<Vec<u8>> {
    let filter = dict.get_key("Filter")?;
    if filter.is_indirect() {
        return Err(doc.damaged(pos, "xref stream: indirect /Filter is not supported"));
    }
    let mut data = if filter.is_null() {
        raw.to_vec()
    } else {
        let name = if filter.is_array() && filter.items_count()? == 1 {
            filter.get_item(0)?.as_name()?
        } else {
            filter
                .as_name()
                .map_err(|_| doc.damaged(pos, "xref stream: unsupported filter"))?
        };
        if name != "FlateDecode" {
            return Err(doc.damaged(pos, format!("xref stream: unsupported filter /{name}")));
        }
        use std::io::Read;
        let mut decoder = flate2::read::ZlibDecoder::new(raw);
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|e| doc.damaged(pos, format!("xref stream: inflate failed: {e}")))?;
        out
    };

    let parms = dict.get_key("DecodeParms")?;
    let parms = if !parms.is_indirect() && parms.is_array() && parms.items_count()? > 0 {
        parms.get_item(0)?
    } else {
        parms
    };
    if !parms.is_indirect() && parms.is_dictionary() {
        let predictor = direct_int(&parms.get_key("Predictor")?).unwrap_or(1);
        if predictor >= 10 {
            let columns = direct_int(&parms.get_key("Columns")?).unwrap_or(1) as usize;
            let colors = direct_int(&parms.get_key("Colors")?).unwrap_or(1) as usize;
            let bits = direct_int(&parms.get_key("BitsPerComponent")?).unwrap_or(8) as usize;
            data = undo_png_prediction(&data, columns, colors, bits);
        }
    }
    Ok(data)
}

/// Reverse PNG row prediction (filters None/Sub/Up/Average/Paeth).
fn undo_png_prediction(data: &[u8], columns: usize, colors: usize, bits: usize) -> Vec<u8> {
    let row_bytes = columns * colors * bits / 8;
    let bpp = std::cmp::max(1, colors * bits / 8);
    let row_size = row_bytes + 1;
    if row_bytes == 0 {
        return Vec::new();
    }

    let mut result = Vec::with_capacity(data.len());
    let mut prev_row = vec![0u8; row_bytes];

    for row_start in (0..data.len()).step_by(row_size) {
        if row_start + row_size > data.len() {
            break;
        }
        let filter_type = data[row_start];
        let row_data = &data[row_start + 1..row_start + row_size];
        let mut row = vec![0u8; row_bytes];

        match filter_type {
            0 => row.copy_from_slice(row_data),
            1 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    row[i] = row_data[i].wrapping_add(left);
                }
            }
            2 => {
                for i in 0..row_bytes {
                    row[i] = row_data[i].wrapping_add(prev_row[i]);
                }
            }
            3 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { u16::from(row[i - bpp]) } else { 0 };
                    let above = u16::from(prev_row[i]);
                    row[i] = row_data[i].wrapping_add(((left + above) / 2) as u8);
                }
            }
            4 => {
                for i in 0..row_bytes {
                    let left = if i >= bpp { row[i - bpp] } else { 0 };
                    let above = prev_row[i];
                    let upper_left = if i >= bpp { prev_row[i - bpp] } else { 0 };
                    row[i] = row_data[i].wrapping_add(paeth(left, above, upper_left));
                }
            }
            _ => row.copy_from_slice(row_data),
        }

        result.extend_from_slice(&row);
        prev_row = row;
    }
    result
}

const fn paeth(left: u8, above: u8, upper_left: u8) -> u8 {
    let a = left as i32;
    let b = above as i32;
    let c = upper_left as i32;
    let p = a + b - c;
    let pa = (p - a).abs();
    let pb = (p - b).abs();
    let pc = (p - c).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        above
    } else {
        upper_left
    }
}
