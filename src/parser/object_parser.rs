//! Object parser: builds values from tokens.
//!
//! Works over a byte snapshot of the input. Indirect references (`n g R`)
//! become lazy handles through the owning document's store; nothing is
//! resolved while a parse is in progress, which is what keeps the
//! document's re-entrancy guard honest.

use crate::document::catalog::DocumentInner;
use crate::error::{Damage, DamageCode, Error, Result};
use crate::model::handle::Handle;
use crate::model::objects::{ObjGen, StreamPayload, Value};
use crate::parser::lexer::{Lexer, Token};
use bytes::Bytes;
use std::rc::Rc;

pub(crate) struct ObjectParser<'a> {
    data: &'a [u8],
    doc: &'a Rc<DocumentInner>,
}

impl<'a> ObjectParser<'a> {
    pub fn new(data: &'a [u8], doc: &'a Rc<DocumentInner>) -> Self {
        Self { data, doc }
    }

    fn damaged(&self, offset: u64, message: impl Into<String>) -> Error {
        Error::Damaged(Damage::new(
            DamageCode::DamagedPdf,
            self.doc.source_name(),
            self.doc.last_object_description(),
            offset,
            message,
        ))
    }

    fn next_token(&self, lexer: &mut Lexer<'_>) -> Result<(usize, Token)> {
        match lexer.next_token() {
            Some(result) => result,
            None => Err(self.damaged(lexer.tell() as u64, "unexpected EOF while parsing")),
        }
    }

    /// Parse the indirect object framed as `id gen obj ... endobj` at
    /// `offset`, verifying the frame carries the expected identity.
    pub fn parse_indirect_at(&self, offset: u64, expected: ObjGen) -> Result<Value> {
        Ok(self.parse_frame(offset, Some(expected))?.1)
    }

    /// Parse an indirect object frame whose identity is not known up front
    /// (xref stream bootstrap, reconstruction scans).
    pub fn parse_indirect_at_any(&self, offset: u64) -> Result<(ObjGen, Value)> {
        self.parse_frame(offset, None)
    }

    fn parse_frame(&self, offset: u64, expected: Option<ObjGen>) -> Result<(ObjGen, Value)> {
        let mut lexer = Lexer::at(self.data, offset as usize);

        let frame_error = || match expected {
            Some(og) => self.damaged(offset, format!("expected {og} obj")),
            None => self.damaged(offset, "expected n n obj"),
        };
        let (_, id_tok) = self.next_token(&mut lexer).map_err(|_| frame_error())?;
        let (_, gen_tok) = self.next_token(&mut lexer).map_err(|_| frame_error())?;
        let (_, obj_tok) = self.next_token(&mut lexer).map_err(|_| frame_error())?;
        let og = match (id_tok, gen_tok, obj_tok) {
            (Token::Integer(id), Token::Integer(gen), Token::Keyword(kw))
                if kw == b"obj"
                    && (1..=i64::from(u32::MAX)).contains(&id)
                    && (0..=i64::from(u16::MAX)).contains(&gen) =>
            {
                ObjGen::new(id as u32, gen as u16)
            }
            _ => return Err(frame_error()),
        };
        if let Some(expected) = expected {
            if og != expected {
                return Err(frame_error());
            }
        }

        let value = self.parse_value(&mut lexer)?;

        // Peek at the closing keyword: endobj, or stream for stream objects.
        let after_value = lexer.tell();
        match lexer.next_token() {
            Some(Ok((_, Token::Keyword(kw)))) if kw == b"stream" => {
                return Ok((og, self.parse_stream_tail(&mut lexer, og, value)?));
            }
            Some(Ok((_, Token::Keyword(kw)))) if kw == b"endobj" => {}
            _ => {
                lexer.set_pos(after_value);
                self.doc.warn(Damage::new(
                    DamageCode::DamagedPdf,
                    self.doc.source_name(),
                    format!("object {og}"),
                    after_value as u64,
                    "expected endobj",
                ))?;
            }
        }

        match value.try_into_value() {
            Some(v) => Ok((og, v)),
            // `1 0 obj 2 0 R endobj`: a reference as object contents has no
            // slot representation here; degrade to null.
            None => {
                self.doc.warn(Damage::new(
                    DamageCode::DamagedPdf,
                    self.doc.source_name(),
                    format!("object {og}"),
                    offset,
                    "indirect reference as object contents; treating as null",
                ))?;
                Ok((og, Value::Null))
            }
        }
    }

    /// Continue after the `stream` keyword: locate the data range and wrap
    /// it in a lazily-read payload.
    fn parse_stream_tail(
        &self,
        lexer: &mut Lexer<'_>,
        expected: ObjGen,
        dict: Handle,
    ) -> Result<Value> {
        if !dict.is_dictionary() {
            return Err(self.damaged(
                lexer.tell() as u64,
                "stream keyword not preceded by a dictionary",
            ));
        }

        // The keyword is followed by CRLF or LF only; lone CR is tolerated.
        let mut pos = lexer.tell();
        if self.data.get(pos) == Some(&b'\r') {
            pos += 1;
        }
        if self.data.get(pos) == Some(&b'\n') {
            pos += 1;
        }
        let data_offset = pos as u64;

        let length = self.stream_length(&dict, expected, data_offset)?;

        lexer.set_pos(data_offset as usize + length as usize);
        match lexer.next_token() {
            Some(Ok((_, Token::Keyword(kw)))) if kw == b"endstream" => {}
            _ => {
                self.doc.warn(Damage::new(
                    DamageCode::DamagedPdf,
                    self.doc.source_name(),
                    format!("object {expected}"),
                    data_offset + length,
                    "expected endstream",
                ))?;
            }
        }

        let payload = StreamPayload::FromInput {
            source: self.doc.current_source(),
            offset: data_offset,
            length,
            encryption: self.doc.encryption(),
        };
        Ok(Handle::new_stream_object(dict, payload))
    }

    /// Determine the stream's data length: the dictionary's direct
    /// `/Length`, an indirect `/Length` resolved straight off the xref, or
    /// a scan for `endstream` when neither checks out.
    fn stream_length(&self, dict: &Handle, expected: ObjGen, data_offset: u64) -> Result<u64> {
        let recorded = self.recorded_length(dict);

        if let Some(length) = recorded {
            let end = data_offset + length;
            if (end as usize) <= self.data.len() {
                let mut check = Lexer::at(self.data, end as usize);
                if let Some(Ok((_, Token::Keyword(kw)))) = check.next_token() {
                    if kw == b"endstream" {
                        return Ok(length);
                    }
                }
            }
        }

        self.doc.warn(Damage::new(
            DamageCode::DamagedPdf,
            self.doc.source_name(),
            format!("object {expected}"),
            data_offset,
            "attempting to recover stream length",
        ))?;

        let tail = &self.data[(data_offset as usize).min(self.data.len())..];
        let Some(found) = tail
            .windows(b"endstream".len())
            .position(|w| w == b"endstream")
        else {
            return Err(self.damaged(data_offset, "unable to find endstream"));
        };
        let mut length = found;
        // Back off the EOL that separates data from the keyword.
        if length > 0 && tail[length - 1] == b'\n' {
            length -= 1;
        }
        if length > 0 && tail[length - 1] == b'\r' {
            length -= 1;
        }
        Ok(length as u64)
    }

    /// `/Length` as recorded in the stream dictionary. An indirect length
    /// is read from its xref offset with a throwaway lexer so no resolution
    /// re-enters the parser.
    fn recorded_length(&self, dict: &Handle) -> Option<u64> {
        let length = dict.get_key("Length").ok()?;
        if length.is_indirect() {
            let entry_offset = self.doc.xref_offset_of(length.obj_gen())?;
            let mut lexer = Lexer::at(self.data, entry_offset as usize);
            for _ in 0..3 {
                lexer.next_token()?.ok()?; // id gen obj
            }
            match lexer.next_token()?.ok()? {
                (_, Token::Integer(n)) if n >= 0 => Some(n as u64),
                _ => None,
            }
        } else {
            match length.as_int() {
                Ok(n) if n >= 0 => Some(n as u64),
                _ => None,
            }
        }
    }

    /// Parse one value at the lexer's position.
    pub fn parse_value(&self, lexer: &mut Lexer<'_>) -> Result<Handle> {
        let (pos, token) = self.next_token(lexer)?;
        self.token_to_value(lexer, pos, token)
    }

    fn token_to_value(&self, lexer: &mut Lexer<'_>, pos: usize, token: Token) -> Result<Handle> {
        match token {
            Token::Integer(n) => {
                // Possible reference: id gen R.
                let after_first = lexer.tell();
                if let Some(Ok((_, Token::Integer(gen)))) = lexer.next_token() {
                    let after_second = lexer.tell();
                    if let Some(Ok((_, Token::Keyword(kw)))) = lexer.next_token() {
                        if kw == b"R"
                            && (0..=i64::from(u32::MAX)).contains(&n)
                            && (0..=i64::from(u16::MAX)).contains(&gen)
                        {
                            let og = ObjGen::new(n as u32, gen as u16);
                            return Ok(self.doc.get_object(og));
                        }
                    }
                    lexer.set_pos(after_second);
                }
                lexer.set_pos(after_first);
                Ok(Handle::new_integer(n))
            }
            Token::Real(text) => Ok(Handle::new_real(text)),
            Token::Bool(b) => Ok(Handle::new_bool(b)),
            Token::Name(name) => Ok(Handle::new_name(name)),
            Token::Str(data) => Ok(Handle::new_string(Bytes::from(data))),
            Token::ArrayStart => self.parse_array(lexer),
            Token::DictStart => self.parse_dict(lexer),
            Token::Keyword(kw) if kw == b"null" => Ok(Handle::new_null()),
            Token::Keyword(kw) => Err(self.damaged(
                pos as u64,
                format!("unexpected keyword: {}", String::from_utf8_lossy(&kw)),
            )),
            Token::ArrayEnd | Token::DictEnd => {
                Err(self.damaged(pos as u64, "unexpected closing delimiter"))
            }
        }
    }

    fn parse_array(&self, lexer: &mut Lexer<'_>) -> Result<Handle> {
        let mut items = Vec::new();
        loop {
            let (pos, token) = self.next_token(lexer)?;
            if token == Token::ArrayEnd {
                break;
            }
            items.push(self.token_to_value(lexer, pos, token)?);
        }
        Ok(Handle::new_array(items))
    }

    fn parse_dict(&self, lexer: &mut Lexer<'_>) -> Result<Handle> {
        let mut entries: Vec<(String, Handle)> = Vec::new();
        loop {
            let (pos, token) = self.next_token(lexer)?;
            if token == Token::DictEnd {
                break;
            }
            let key = match token {
                Token::Name(name) => name,
                _ => return Err(self.damaged(pos as u64, "expected name as dictionary key")),
            };
            let value = self.parse_value(lexer)?;
            entries.push((key, value));
        }
        Ok(Handle::new_dictionary(entries))
    }

    /// Parse a standalone value at `offset` (trailer dictionaries, xref
    /// stream objects). Returns the value and the position following it.
    pub fn parse_value_at(&self, offset: u64) -> Result<(Handle, u64)> {
        let mut lexer = Lexer::at(self.data, offset as usize);
        let value = self.parse_value(&mut lexer)?;
        Ok((value, lexer.tell() as u64))
    }

    /// Parse member `index` of an object stream whose decoded data, object
    /// count and first-member offset are given. Returns the member's id and
    /// value.
    pub fn parse_stream_member(
        &self,
        n: usize,
        first: usize,
        index: usize,
    ) -> Result<(u32, Value)> {
        if index >= n {
            return Err(self.damaged(
                0,
                format!("object stream member index {index} out of range ({n} members)"),
            ));
        }
        let header = &self.data[..first.min(self.data.len())];
        let mut lexer = Lexer::new(header);
        let mut pairs = Vec::with_capacity(n);
        for _ in 0..n {
            let (pos, id_tok) = self.next_token(&mut lexer)?;
            let (_, off_tok) = self.next_token(&mut lexer)?;
            match (id_tok, off_tok) {
                (Token::Integer(id), Token::Integer(off)) if id >= 0 && off >= 0 => {
                    pairs.push((id as u32, off as usize));
                }
                _ => {
                    return Err(
                        self.damaged(pos as u64, "invalid object stream member table")
                    )
                }
            }
        }
        let (id, member_offset) = pairs[index];
        let (handle, _) = self.parse_value_at((first + member_offset) as u64)?;
        let value = handle
            .try_into_value()
            .ok_or_else(|| self.damaged(0, "indirect reference as object stream member"))?;
        Ok((id, value))
    }
}
