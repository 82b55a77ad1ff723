//! Stream data pipeline: sinks, the raw-byte piper, copied-stream
//! providers, and the process-wide filter registry.

use crate::document::catalog::{Document, DocumentInner};
use crate::error::{Damage, DamageCode, Error, Result};
use crate::io::SharedSource;
use crate::model::handle::Handle;
use crate::model::objects::ObjGen;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::SeekFrom;
use std::rc::{Rc, Weak};
use std::sync::{Mutex, OnceLock};

/// A byte sink. `finish` is called exactly once per pipe, on every exit
/// path; errors from a cleanup-path finish are discarded by the piper.
pub trait Pipeline {
    fn write(&mut self, data: &[u8]) -> Result<()>;
    fn finish(&mut self) -> Result<()>;
}

/// Pipeline collecting everything written into a buffer.
#[derive(Default)]
pub struct BufferSink {
    data: Vec<u8>,
    finished: bool,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> bytes::Bytes {
        bytes::Bytes::from(self.data)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl Pipeline for BufferSink {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        self.data.extend_from_slice(data);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

/// User- or copier-supplied callback streaming a payload on demand.
pub trait StreamDataProvider {
    fn provide_stream_data(
        &mut self,
        key: ObjGen,
        sink: &mut dyn Pipeline,
        suppress_warnings: bool,
        will_retry: bool,
    ) -> Result<bool>;
}

/// Decrypts raw stream bytes. Actual ciphers live outside this crate; a
/// document that parses an encrypted file records the parameters here and
/// a handler may be attached to do the work.
pub trait StreamDecrypter {
    fn decrypt(&self, og: ObjGen, stream_dict: &Handle, data: &[u8]) -> Result<Vec<u8>>;
}

/// Encryption state shared between a document and stream records copied out
/// of it.
#[derive(Default)]
pub struct EncryptionParameters {
    pub encrypted: bool,
    pub provided_password: String,
    pub password_is_hex_key: bool,
    pub decrypter: Option<Rc<dyn StreamDecrypter>>,
}

/// Everything needed to pipe a foreign stream's bytes after its document is
/// gone: the foreign source and encryption context stay alive through this
/// record.
pub struct ForeignStreamData {
    pub encryption: Rc<RefCell<EncryptionParameters>>,
    pub source: SharedSource,
    pub foreign_og: ObjGen,
    pub offset: u64,
    pub length: u64,
    pub local_dict: Handle,
}

/// Pipe `[offset, offset + length)` of `source` into `sink`, decrypting if
/// the encryption context calls for it. Failures become warnings on
/// `doc_for_warnings`; the return value says whether the pipe completed.
#[allow(clippy::too_many_arguments)]
pub fn pipe_stream_data(
    encryption: &Rc<RefCell<EncryptionParameters>>,
    source: &SharedSource,
    doc_for_warnings: &Document,
    og: ObjGen,
    offset: u64,
    length: u64,
    stream_dict: Handle,
    sink: &mut dyn Pipeline,
    suppress_warnings: bool,
    will_retry: bool,
) -> Result<bool> {
    let mut attempted_finish = false;
    let outcome = pipe_inner(
        encryption,
        source,
        og,
        offset,
        length,
        &stream_dict,
        sink,
        &mut attempted_finish,
    );
    match outcome {
        Ok(()) => Ok(true),
        Err(err) => {
            if !suppress_warnings {
                let damage = match err {
                    Error::Damaged(d) => d,
                    other => Damage::new(
                        DamageCode::DamagedPdf,
                        source.borrow().name(),
                        "",
                        source.borrow().last_offset(),
                        format!("error decoding stream data for object {og}: {other}"),
                    ),
                };
                doc_for_warnings.warn(damage)?;
                if will_retry {
                    doc_for_warnings.warn(Damage::new(
                        DamageCode::DamagedPdf,
                        source.borrow().name(),
                        "",
                        source.borrow().last_offset(),
                        "stream will be re-processed without filtering to avoid data loss",
                    ))?;
                }
            }
            if !attempted_finish {
                let _ = sink.finish();
            }
            Ok(false)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn pipe_inner(
    encryption: &Rc<RefCell<EncryptionParameters>>,
    source: &SharedSource,
    og: ObjGen,
    offset: u64,
    length: u64,
    stream_dict: &Handle,
    sink: &mut dyn Pipeline,
    attempted_finish: &mut bool,
) -> Result<()> {
    let mut buf = vec![0u8; length as usize];
    {
        let mut src = source.borrow_mut();
        src.seek(SeekFrom::Start(offset))?;
        let mut filled = 0;
        while filled < buf.len() {
            let n = src.read(&mut buf[filled..])?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if (filled as u64) < length {
            return Err(Error::Damaged(Damage::new(
                DamageCode::DamagedPdf,
                src.name(),
                format!("object {og}"),
                offset + filled as u64,
                "unexpected EOF reading stream data",
            )));
        }
    }

    let enc = encryption.borrow();
    let data = if enc.encrypted {
        match &enc.decrypter {
            Some(decrypter) => decrypter.decrypt(og, stream_dict, &buf)?,
            None => buf,
        }
    } else {
        buf
    };
    drop(enc);

    sink.write(&data)?;
    *attempted_finish = true;
    sink.finish()?;
    Ok(())
}

/// Pipe a copied foreign stream through its captured record.
pub fn pipe_foreign_stream_data(
    doc_for_warnings: &Document,
    foreign: &Rc<ForeignStreamData>,
    sink: &mut dyn Pipeline,
    suppress_warnings: bool,
    will_retry: bool,
) -> Result<bool> {
    pipe_stream_data(
        &foreign.encryption,
        &foreign.source,
        doc_for_warnings,
        foreign.foreign_og,
        foreign.offset,
        foreign.length,
        foreign.local_dict.clone(),
        sink,
        suppress_warnings,
        will_retry,
    )
}

/// The singleton provider a destination document installs for streams
/// copied into it. Holds whatever keeps each foreign payload reachable:
/// the foreign handle (provider-backed streams, foreign document must stay
/// alive) or a [`ForeignStreamData`] record (input-backed streams, only the
/// foreign source must stay alive).
pub struct CopiedStreamDataProvider {
    destination: Weak<DocumentInner>,
    foreign_streams: HashMap<ObjGen, Handle>,
    foreign_stream_data: HashMap<ObjGen, Rc<ForeignStreamData>>,
}

impl CopiedStreamDataProvider {
    pub(crate) fn new(destination: Weak<DocumentInner>) -> Self {
        Self {
            destination,
            foreign_streams: HashMap::new(),
            foreign_stream_data: HashMap::new(),
        }
    }

    pub(crate) fn register_foreign_stream(&mut self, local_og: ObjGen, foreign: Handle) {
        self.foreign_streams.insert(local_og, foreign);
    }

    pub(crate) fn register_foreign_stream_data(
        &mut self,
        local_og: ObjGen,
        data: Rc<ForeignStreamData>,
    ) {
        self.foreign_stream_data.insert(local_og, data);
    }
}

impl StreamDataProvider for CopiedStreamDataProvider {
    fn provide_stream_data(
        &mut self,
        key: ObjGen,
        sink: &mut dyn Pipeline,
        suppress_warnings: bool,
        will_retry: bool,
    ) -> Result<bool> {
        if let Some(data) = self.foreign_stream_data.get(&key) {
            let inner = self.destination.upgrade().ok_or_else(|| {
                Error::logic("copied-stream provider outlived its destination document")
            })?;
            let doc = Document::from_inner(inner);
            return pipe_foreign_stream_data(&doc, data, sink, suppress_warnings, will_retry);
        }
        if let Some(foreign) = self.foreign_streams.get(&key) {
            return foreign
                .clone()
                .pipe_raw_data(sink, suppress_warnings, will_retry);
        }
        Err(Error::logic(format!(
            "no foreign stream registered for copied stream {key}"
        )))
    }
}

// === stream filter registry ===

/// Decodes one filter's encoding of stream data.
pub trait StreamFilter: Send {
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;
}

pub type StreamFilterFactory = fn() -> Box<dyn StreamFilter>;

fn registry() -> &'static Mutex<HashMap<String, StreamFilterFactory>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, StreamFilterFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut map: HashMap<String, StreamFilterFactory> = HashMap::new();
        map.insert("FlateDecode".to_string(), || Box::new(FlateFilter));
        Mutex::new(map)
    })
}

/// Register a decoding filter process-wide under `name` (no leading slash).
pub fn register_stream_filter(name: &str, factory: StreamFilterFactory) {
    registry()
        .lock()
        .expect("stream filter registry poisoned")
        .insert(name.to_string(), factory);
}

pub(crate) fn make_stream_filter(name: &str) -> Option<Box<dyn StreamFilter>> {
    registry()
        .lock()
        .expect("stream filter registry poisoned")
        .get(name)
        .map(|factory| factory())
}

struct FlateFilter;

impl StreamFilter for FlateFilter {
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        use std::io::Read;
        let mut decoder = flate2::read::ZlibDecoder::new(data);
        let mut out = Vec::new();
        match decoder.read_to_end(&mut out) {
            Ok(_) => Ok(out),
            // Partial output is still useful for corrupted tails.
            Err(_) if !out.is_empty() => Ok(out),
            Err(e) => Err(Error::Damaged(Damage::new(
                DamageCode::DamagedPdf,
                "",
                "",
                0,
                format!("error inflating stream data: {e}"),
            ))),
        }
    }
}

impl Handle {
    /// The stream's bytes after applying its `/Filter` chain via the
    /// process-wide registry. Unknown filters are a damage error.
    pub fn decoded_stream_data(&self) -> Result<bytes::Bytes> {
        let raw = self.raw_stream_data()?;
        let dict = self.stream_dict()?;
        let filter = dict.get_key("Filter")?;

        let mut names = Vec::new();
        if filter.is_name() {
            names.push(filter.as_name()?);
        } else if filter.is_array() {
            for i in 0..filter.items_count()? {
                names.push(filter.get_item(i)?.as_name()?);
            }
        }

        let mut data = raw.to_vec();
        for name in names {
            let Some(codec) = make_stream_filter(&name) else {
                return Err(Error::Damaged(Damage::new(
                    DamageCode::Unsupported,
                    "",
                    format!("object {}", self.obj_gen()),
                    0,
                    format!("unsupported stream filter /{name}"),
                )));
            };
            data = codec.decode(&data)?;
        }
        Ok(bytes::Bytes::from(data))
    }
}
