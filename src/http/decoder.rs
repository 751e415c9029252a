//! Request body content decoding.
//!
//! # Responsibilities
//! - Map `Content-Encoding` to a supported coding (identity, deflate, gzip)
//! - Wrap the raw body stream in an incremental decompressor
//!
//! # Design Decisions
//! - Decoding happens chunk by chunk; the body is never buffered here
//! - Output is produced through a fixed window, so no stream item exceeds
//!   `MAX_DECODED_CHUNK` however far a chunk expands
//! - A compressed stream that ends before its end marker (and, for gzip, its
//!   checksum trailer) is an `UnexpectedEof` error
//! - Decompression errors are yielded as stream items, so they surface wherever
//!   the decoded stream is consumed rather than in this module
//! - `deflate` means the zlib format, as sent by HTTP clients

use std::io;
use std::str::FromStr;

use axum::http::{header, HeaderMap};
use bytes::{Buf, Bytes};
use flate2::{Crc, Decompress, FlushDecompress, Status};
use futures_util::stream::{self, BoxStream, Stream, StreamExt};

/// Stream of decoded body bytes.
pub type BodyStream = BoxStream<'static, Result<Bytes, io::Error>>;

/// Declared encoding is not one we can decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unsupported content encoding: {0}")]
pub struct UnsupportedEncoding(pub String);

/// Supported content codings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCoding {
    Identity,
    Deflate,
    Gzip,
}

impl FromStr for ContentCoding {
    type Err = UnsupportedEncoding;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "identity" => Ok(ContentCoding::Identity),
            "deflate" => Ok(ContentCoding::Deflate),
            "gzip" => Ok(ContentCoding::Gzip),
            other => Err(UnsupportedEncoding(other.to_string())),
        }
    }
}

impl ContentCoding {
    /// Coding declared by `headers`, `identity` when absent.
    pub fn from_headers(headers: &HeaderMap) -> Result<Self, UnsupportedEncoding> {
        match headers.get(header::CONTENT_ENCODING) {
            None => Ok(ContentCoding::Identity),
            Some(value) => value
                .to_str()
                .map_err(|_| UnsupportedEncoding("<non-ascii>".to_string()))?
                .parse(),
        }
    }

    /// Wrap `input` so that it yields decoded bytes.
    pub fn decode<S>(self, input: S) -> BodyStream
    where
        S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
    {
        match self {
            ContentCoding::Identity => input.boxed(),
            ContentCoding::Deflate => inflate(input, Inflater::zlib()),
            ContentCoding::Gzip => inflate(input, Inflater::gzip()),
        }
    }
}

/// Decode the body of a request according to its `Content-Encoding`.
pub fn decode_body(headers: &HeaderMap, body: axum::body::Body) -> Result<BodyStream, UnsupportedEncoding> {
    let coding = ContentCoding::from_headers(headers)?;
    let raw = body.into_data_stream().map(|chunk| chunk.map_err(io::Error::other));
    Ok(coding.decode(raw))
}

/// Largest decoded piece yielded per stream item.
pub const MAX_DECODED_CHUNK: usize = 64 * 1024;

/// Cap on gzip header bytes (optional name, comment and extra fields).
const MAX_GZIP_HEADER: usize = 64 * 1024;

const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];
const FHCRC: u8 = 0x02;
const FEXTRA: u8 = 0x04;
const FNAME: u8 = 0x08;
const FCOMMENT: u8 = 0x10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Zlib,
    Gzip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Header,
    Body,
    Trailer,
    Done,
}

/// Incremental inflater with a fixed output window.
///
/// gzip framing (RFC 1952) is handled here around a raw deflate stream, so both
/// codings share one bounded decompression path.
struct Inflater {
    format: Format,
    stage: Stage,
    inner: Decompress,
    window: Vec<u8>,
    /// Last step filled the window; the decompressor may hold more output.
    pending_output: bool,
    header: Vec<u8>,
    trailer: Vec<u8>,
    crc: Crc,
}

impl Inflater {
    fn zlib() -> Self {
        Self::new(Format::Zlib, Stage::Body, Decompress::new(true))
    }

    fn gzip() -> Self {
        Self::new(Format::Gzip, Stage::Header, Decompress::new(false))
    }

    fn new(format: Format, stage: Stage, inner: Decompress) -> Self {
        Self {
            format,
            stage,
            inner,
            window: vec![0; MAX_DECODED_CHUNK],
            pending_output: false,
            header: Vec::new(),
            trailer: Vec::new(),
            crc: Crc::new(),
        }
    }

    /// Consume a prefix of `input`, returning how much was consumed and at most
    /// `MAX_DECODED_CHUNK` bytes of output.
    fn step(&mut self, input: &[u8]) -> io::Result<(usize, Bytes)> {
        match self.stage {
            Stage::Header => self.read_header(input).map(|consumed| (consumed, Bytes::new())),
            Stage::Body => self.inflate_body(input),
            Stage::Trailer => self.read_trailer(input).map(|consumed| (consumed, Bytes::new())),
            Stage::Done if input.is_empty() => Ok((0, Bytes::new())),
            Stage::Done => Err(invalid_data("trailing data after compressed stream")),
        }
    }

    fn read_header(&mut self, input: &[u8]) -> io::Result<usize> {
        let seen = self.header.len();
        self.header.extend_from_slice(input);
        match gzip_header_len(&self.header)? {
            Some(len) => {
                self.header.clear();
                self.stage = Stage::Body;
                Ok(len - seen)
            }
            None if self.header.len() > MAX_GZIP_HEADER => Err(invalid_data("gzip header too long")),
            None => Ok(input.len()),
        }
    }

    fn inflate_body(&mut self, input: &[u8]) -> io::Result<(usize, Bytes)> {
        let (before_in, before_out) = (self.inner.total_in(), self.inner.total_out());
        let status = self
            .inner
            .decompress(input, &mut self.window, FlushDecompress::None)
            .map_err(invalid_data)?;
        let consumed = (self.inner.total_in() - before_in) as usize;
        let produced = (self.inner.total_out() - before_out) as usize;

        if consumed == 0 && produced == 0 && !input.is_empty() && status != Status::StreamEnd {
            return Err(invalid_data("corrupt deflate stream"));
        }

        let out = &self.window[..produced];
        self.pending_output = produced == self.window.len();
        if self.format == Format::Gzip {
            self.crc.update(out);
        }
        if status == Status::StreamEnd {
            self.pending_output = false;
            self.stage = match self.format {
                Format::Zlib => Stage::Done,
                Format::Gzip => Stage::Trailer,
            };
        }
        Ok((consumed, Bytes::copy_from_slice(out)))
    }

    fn read_trailer(&mut self, input: &[u8]) -> io::Result<usize> {
        let take = input.len().min(8 - self.trailer.len());
        self.trailer.extend_from_slice(&input[..take]);
        if self.trailer.len() == 8 {
            let crc = u32::from_le_bytes([self.trailer[0], self.trailer[1], self.trailer[2], self.trailer[3]]);
            let size = u32::from_le_bytes([self.trailer[4], self.trailer[5], self.trailer[6], self.trailer[7]]);
            if crc != self.crc.sum() || size != self.crc.amount() {
                return Err(invalid_data("gzip checksum mismatch"));
            }
            self.stage = Stage::Done;
        }
        Ok(take)
    }

    /// Input has ended; anything short of a complete stream is truncated.
    fn finish(&self) -> io::Result<()> {
        match self.stage {
            Stage::Done => Ok(()),
            _ => Err(io::Error::new(io::ErrorKind::UnexpectedEof, "truncated compressed stream")),
        }
    }
}

/// Length of a complete gzip member header at the start of `buf`, `None` while
/// more bytes are needed.
fn gzip_header_len(buf: &[u8]) -> io::Result<Option<usize>> {
    let prefix = buf.len().min(GZIP_MAGIC.len());
    if buf[..prefix] != GZIP_MAGIC[..prefix] {
        return Err(invalid_data("not a gzip stream"));
    }
    let Some(&flags) = buf.get(3) else {
        return Ok(None);
    };

    let mut pos = 10;
    if flags & FEXTRA != 0 {
        let Some(len) = buf.get(pos..pos + 2) else {
            return Ok(None);
        };
        pos += 2 + usize::from(u16::from_le_bytes([len[0], len[1]]));
    }
    for flag in [FNAME, FCOMMENT] {
        if flags & flag != 0 {
            match buf.get(pos..).and_then(|rest| rest.iter().position(|&b| b == 0)) {
                Some(nul) => pos += nul + 1,
                None => return Ok(None),
            }
        }
    }
    if flags & FHCRC != 0 {
        pos += 2;
    }
    Ok((buf.len() >= pos).then_some(pos))
}

fn invalid_data<E>(error: E) -> io::Error
where
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    io::Error::new(io::ErrorKind::InvalidData, error)
}

struct InflateState {
    input: BodyStream,
    chunk: Bytes,
    ended: bool,
    inflater: Inflater,
}

fn inflate<S>(input: S, inflater: Inflater) -> BodyStream
where
    S: Stream<Item = Result<Bytes, io::Error>> + Send + 'static,
{
    let state = InflateState {
        input: input.boxed(),
        chunk: Bytes::new(),
        ended: false,
        inflater,
    };

    stream::try_unfold(state, |mut state| async move {
        loop {
            if !state.chunk.is_empty() || state.inflater.pending_output {
                let (consumed, out) = state.inflater.step(&state.chunk)?;
                state.chunk.advance(consumed);
                if !out.is_empty() {
                    return Ok(Some((out, state)));
                }
                continue;
            }
            if state.ended {
                state.inflater.finish()?;
                return Ok::<_, io::Error>(None);
            }
            match state.input.next().await {
                Some(chunk) => state.chunk = chunk?,
                None => state.ended = true,
            }
        }
    })
    .boxed()
}
