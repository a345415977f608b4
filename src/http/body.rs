//! Streaming POST body decoding.
//!
//! Body chunks are decoded as they arrive, so memory use is bounded by
//! the limits in [`ReqLimits`] rather than by the body size:
//!
//! - `multipart/form-data`: file parts stream to temporary files,
//!   attributes stay in memory up to [`ReqLimits::memory_threshold`]
//!   and spill to disk above it.
//! - anything else: `application/x-www-form-urlencoded`, split on `&`
//!   as the data comes in.
//!
//! Decoded values land in the [`Request`] POST maps. Temporary files of
//! parts still in progress belong to the decoder and are deleted when it
//! is dropped.

use crate::{
    errors::HttpError,
    http::{
        query::{self, Query},
        request::Request,
        upload::{FileUpload, TempFile},
    },
    limits::ReqLimits,
};
use memchr::{memchr, memmem::Finder};
use std::{mem, path::PathBuf};

#[derive(Debug)]
pub(crate) struct PostDecoder {
    format: Format,
    received: usize,
    max_body_size: usize,
    max_params: usize,
}

#[derive(Debug)]
enum Format {
    UrlEncoded(UrlEncoded),
    Multipart(Box<Multipart>),
}

impl PostDecoder {
    /// Picks the body format from the request's `Content-Type`.
    pub(crate) fn new(content_type: Option<&str>, limits: &ReqLimits) -> Result<Self, HttpError> {
        let format = match content_type.and_then(multipart_boundary) {
            Some(boundary) => Format::Multipart(Box::new(Multipart::new(boundary?, limits))),
            None => Format::UrlEncoded(UrlEncoded::default()),
        };

        Ok(PostDecoder {
            format,
            received: 0,
            max_body_size: limits.max_body_size,
            max_params: limits.max_query_params,
        })
    }

    /// Decodes the next body chunk.
    pub(crate) fn feed(&mut self, chunk: &[u8], req: &mut Request) -> Result<(), HttpError> {
        self.received += chunk.len();
        if self.received > self.max_body_size {
            return Err(HttpError::PayloadTooLarge);
        }

        match &mut self.format {
            Format::UrlEncoded(decoder) => decoder.feed(chunk, req, self.max_params),
            Format::Multipart(decoder) => decoder.feed(chunk, req, self.max_params),
        }
    }

    /// Completes decoding at the end of the message.
    pub(crate) fn finish(mut self, req: &mut Request) -> Result<(), HttpError> {
        match &mut self.format {
            Format::UrlEncoded(decoder) => decoder.finish(req, self.max_params),
            Format::Multipart(decoder) => decoder.finish(),
        }
    }
}

/// Returns `None` for non-multipart types, and the boundary (or the
/// reason there is none) for multipart ones.
fn multipart_boundary(content_type: &str) -> Option<Result<Vec<u8>, HttpError>> {
    let mut params = split_params(content_type);
    let mime = params.next()?.trim();
    if !mime.eq_ignore_ascii_case("multipart/form-data") {
        return None;
    }

    let boundary = params
        .filter_map(|param| param.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("boundary"))
        .map(|(_, value)| unquote(value.trim()));

    Some(match boundary {
        Some(b) if !b.is_empty() && b.len() <= 70 => Ok(b.as_bytes().to_vec()),
        _ => Err(HttpError::bad_request("missing or invalid multipart boundary")),
    })
}

// URL-ENCODED

#[derive(Debug, Default)]
struct UrlEncoded {
    pending: Vec<u8>,
}

impl UrlEncoded {
    fn feed(&mut self, chunk: &[u8], req: &mut Request, max: usize) -> Result<(), HttpError> {
        self.pending.extend_from_slice(chunk);

        let mut start = 0;
        while let Some(pos) = memchr(b'&', &self.pending[start..]) {
            add_pair(&self.pending[start..start + pos], req, max)?;
            start += pos + 1;
        }
        self.pending.drain(..start);
        Ok(())
    }

    fn finish(&mut self, req: &mut Request, max: usize) -> Result<(), HttpError> {
        let rest = mem::take(&mut self.pending);
        add_pair(&rest, req, max)
    }
}

fn add_pair(segment: &[u8], req: &mut Request, max: usize) -> Result<(), HttpError> {
    let pair = Query::parse_pair(segment).map_err(|err| match err {
        query::Error::Encoding(_) => HttpError::bad_request("invalid form encoding"),
        query::Error::OverLimit(_) => HttpError::bad_request("too many form parameters"),
    })?;

    if let Some((name, value)) = pair {
        if req.post_param_count() >= max {
            return Err(HttpError::bad_request("too many form parameters"));
        }
        req.set_post_param(name, value);
    }
    Ok(())
}

// MULTIPART

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Looking for the first delimiter; anything before it is ignored.
    Preamble,
    /// Just after a delimiter: `--` closes the body, CRLF opens a part.
    AfterDelimiter,
    Headers,
    Body,
    Done,
}

#[derive(Debug)]
struct Multipart {
    state: State,
    buf: Vec<u8>,

    /// `--boundary`, for the very first delimiter.
    first: Finder<'static>,
    /// `\r\n--boundary`, for every later one.
    delimiter: Finder<'static>,

    part: Option<Part>,

    memory_threshold: usize,
    max_header_size: usize,
    temp_dir: Option<PathBuf>,
}

#[derive(Debug)]
struct Part {
    name: String,
    filename: Option<String>,
    content_type: Option<String>,
    latin1: bool,
    data: PartData,
}

#[derive(Debug)]
enum PartData {
    Memory(Vec<u8>),
    Disk(TempFile),
}

impl Multipart {
    fn new(boundary: Vec<u8>, limits: &ReqLimits) -> Self {
        let mut first = b"--".to_vec();
        first.extend_from_slice(&boundary);
        let mut delimiter = b"\r\n".to_vec();
        delimiter.extend_from_slice(&first);

        Multipart {
            state: State::Preamble,
            buf: Vec::new(),
            first: Finder::new(&first).into_owned(),
            delimiter: Finder::new(&delimiter).into_owned(),
            part: None,
            memory_threshold: limits.memory_threshold,
            max_header_size: limits.max_part_header_size,
            temp_dir: limits.temp_dir.clone(),
        }
    }

    fn feed(&mut self, chunk: &[u8], req: &mut Request, max: usize) -> Result<(), HttpError> {
        if self.state == State::Done {
            return Ok(());
        }
        self.buf.extend_from_slice(chunk);

        // Each step consumes input or reports that more is needed.
        while self.step(req, max)? {}
        Ok(())
    }

    fn finish(&mut self) -> Result<(), HttpError> {
        match self.state {
            State::Done => Ok(()),
            _ => Err(HttpError::bad_request("multipart body without closing delimiter")),
        }
    }

    fn step(&mut self, req: &mut Request, max: usize) -> Result<bool, HttpError> {
        match self.state {
            State::Preamble => match self.first.find(&self.buf) {
                Some(pos) => {
                    self.buf.drain(..pos + self.first.needle().len());
                    self.state = State::AfterDelimiter;
                    Ok(true)
                }
                None => {
                    let keep = self.first.needle().len() - 1;
                    let skip = self.buf.len().saturating_sub(keep);
                    self.buf.drain(..skip);
                    Ok(false)
                }
            },

            State::AfterDelimiter => {
                if self.buf.len() < 2 {
                    return Ok(false);
                }
                match &self.buf[..2] {
                    b"--" => {
                        self.buf = Vec::new();
                        self.state = State::Done;
                        Ok(false)
                    }
                    b"\r\n" => {
                        self.buf.drain(..2);
                        self.state = State::Headers;
                        Ok(true)
                    }
                    _ => Err(HttpError::bad_request("malformed multipart delimiter")),
                }
            }

            State::Headers => {
                // An empty header block is just the terminating CRLF
                let end = match self.buf.starts_with(b"\r\n") {
                    true => Some((0, 2)),
                    false => memchr::memmem::find(&self.buf, b"\r\n\r\n").map(|pos| (pos, pos + 4)),
                };

                match end {
                    Some((pos, consumed)) => {
                        if pos > self.max_header_size {
                            return Err(HttpError::bad_request("multipart part headers too large"));
                        }
                        let part = Part::from_headers(&self.buf[..pos])?;
                        if req.post_param_count() >= max {
                            return Err(HttpError::bad_request("too many form parameters"));
                        }
                        self.buf.drain(..consumed);
                        self.part = Some(part);
                        self.state = State::Body;
                        Ok(true)
                    }
                    None if self.buf.len() > self.max_header_size => {
                        Err(HttpError::bad_request("multipart part headers too large"))
                    }
                    None => Ok(false),
                }
            }

            State::Body => match self.delimiter.find(&self.buf) {
                Some(pos) => {
                    let data: Vec<u8> = self.buf.drain(..pos + self.delimiter.needle().len()).collect();
                    self.write_part(&data[..pos])?;
                    self.complete_part(req)?;
                    self.state = State::AfterDelimiter;
                    Ok(true)
                }
                None => {
                    // Keep a tail that could be the start of a delimiter
                    let keep = self.delimiter.needle().len() - 1;
                    let safe = self.buf.len().saturating_sub(keep);
                    if safe > 0 {
                        let data: Vec<u8> = self.buf.drain(..safe).collect();
                        self.write_part(&data)?;
                    }
                    Ok(false)
                }
            },

            State::Done => Ok(false),
        }
    }

    fn write_part(&mut self, bytes: &[u8]) -> Result<(), HttpError> {
        let Some(part) = self.part.as_mut() else {
            return Ok(());
        };

        match &mut part.data {
            PartData::Memory(mem) if mem.len() + bytes.len() <= self.memory_threshold => {
                mem.extend_from_slice(bytes);
            }
            PartData::Memory(mem) => {
                let mut file = TempFile::create(self.temp_dir.as_deref())?;
                file.write_all(mem)?;
                file.write_all(bytes)?;
                part.data = PartData::Disk(file);
            }
            PartData::Disk(file) => file.write_all(bytes)?,
        }
        Ok(())
    }

    fn complete_part(&mut self, req: &mut Request) -> Result<(), HttpError> {
        let Some(part) = self.part.take() else {
            return Ok(());
        };

        match part.filename {
            Some(filename) => {
                let file = match part.data {
                    PartData::Disk(file) => file,
                    PartData::Memory(mem) => {
                        let mut file = TempFile::create(self.temp_dir.as_deref())?;
                        file.write_all(&mem)?;
                        file
                    }
                };
                req.set_file_upload(FileUpload {
                    field: part.name,
                    filename,
                    content_type: part.content_type,
                    file,
                });
            }
            None => {
                let bytes = match part.data {
                    PartData::Memory(mem) => mem,
                    PartData::Disk(mut file) => {
                        let bytes = file.read_to_vec()?;
                        file.release();
                        bytes
                    }
                };
                let value: String = match part.latin1 {
                    true => bytes.iter().map(|&b| b as char).collect(),
                    false => simdutf8::basic::from_utf8(&bytes)
                        .map_err(|_| HttpError::bad_request("form attribute is not valid UTF-8"))?
                        .to_owned(),
                };
                req.set_post_param(part.name, value);
            }
        }
        Ok(())
    }
}

impl Part {
    fn from_headers(block: &[u8]) -> Result<Self, HttpError> {
        let block = simdutf8::basic::from_utf8(block)
            .map_err(|_| HttpError::bad_request("multipart part headers are not valid UTF-8"))?;

        let mut name = None;
        let mut filename = None;
        let mut content_type = None;
        let mut latin1 = false;

        for line in block.split("\r\n").filter(|l| !l.is_empty()) {
            let (header, value) = line
                .split_once(':')
                .ok_or_else(|| HttpError::bad_request("malformed multipart part header"))?;
            let header = header.trim();

            if header.eq_ignore_ascii_case("content-disposition") {
                let mut params = split_params(value);
                match params.next().map(str::trim) {
                    Some(d) if d.eq_ignore_ascii_case("form-data") => {}
                    _ => return Err(HttpError::bad_request("multipart part is not form-data")),
                }
                for param in params {
                    let Some((key, val)) = param.split_once('=') else {
                        continue;
                    };
                    let key = key.trim();
                    if key.eq_ignore_ascii_case("name") {
                        name = Some(unquote(val.trim()).to_owned());
                    } else if key.eq_ignore_ascii_case("filename") {
                        filename = Some(unquote(val.trim()).to_owned());
                    }
                }
            } else if header.eq_ignore_ascii_case("content-type") {
                let value = value.trim();
                latin1 = split_params(value)
                    .skip(1)
                    .filter_map(|p| p.split_once('='))
                    .any(|(k, v)| {
                        k.trim().eq_ignore_ascii_case("charset") && is_latin1(unquote(v.trim()))
                    });
                content_type = Some(value.to_owned());
            }
        }

        let name = name
            .filter(|n| !n.is_empty())
            .ok_or_else(|| HttpError::bad_request("multipart part without a name"))?;

        Ok(Part {
            name,
            filename,
            content_type,
            latin1,
            data: PartData::Memory(Vec::new()),
        })
    }
}

#[inline]
fn is_latin1(charset: &str) -> bool {
    ["iso-8859-1", "latin1", "iso_8859-1"]
        .iter()
        .any(|c| c.eq_ignore_ascii_case(charset))
}

/// Splits a header value on `;`, leaving quoted strings intact.
fn split_params(value: &str) -> impl Iterator<Item = &str> {
    let mut rest = Some(value);
    std::iter::from_fn(move || {
        let current = rest?;
        let mut quoted = false;
        for (i, c) in current.char_indices() {
            match c {
                '"' => quoted = !quoted,
                ';' if !quoted => {
                    rest = Some(&current[i + 1..]);
                    return Some(&current[..i]);
                }
                _ => {}
            }
        }
        rest = None;
        Some(current)
    })
}

#[inline]
fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}
