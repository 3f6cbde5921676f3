//! Body assembly: bounded buffering, decompression and charset handling.
//!
//! # Responsibilities
//! - Join the upstream chunk stream into one buffer, never past the limit
//! - Undo gzip / deflate content encoding with a bounded decoded size
//! - Decode the buffer into text and re-encode the rewritten text
//!
//! # Design Decisions
//! - The size limit applies to the wire bytes and again to the decoded bytes
//! - Decompression is CPU work and runs on the blocking pool
//! - The rewritten text keeps the charset the upstream used

use std::io::{ErrorKind, Read};
use std::sync::atomic::AtomicBool;

use axum::body::Body;
use bytes::{Bytes, BytesMut};
use flate2::read::{DeflateDecoder, MultiGzDecoder, ZlibDecoder};
use futures_util::StreamExt;

use crate::rewrite::error::RewriteError;
use crate::rewrite::gate::{Charset, ContentEncoding, ContentTypeClass};
use crate::transform::ensure_live;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Decoded bytes produced between cancellation checks.
const INFLATE_CHUNK: usize = 64 * 1024;

/// Read the whole body stream, failing once more than `limit` bytes arrive.
pub async fn collect(body: Body, limit: usize) -> Result<Bytes, RewriteError> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| RewriteError::BodyRead(e.to_string()))?;
        if buf.len() + chunk.len() > limit {
            return Err(RewriteError::BodyTooLarge { limit });
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf.freeze())
}

/// Remove the content encoding. Blocking; call from the blocking pool.
///
/// Stops with `Cancelled` once `cancelled` is raised.
pub fn decompress(
    raw: Bytes,
    encoding: &ContentEncoding,
    limit: usize,
    cancelled: &AtomicBool,
) -> Result<Bytes, RewriteError> {
    match encoding {
        ContentEncoding::Identity | ContentEncoding::Unsupported(_) => Ok(raw),
        ContentEncoding::Gzip => {
            read_bounded(MultiGzDecoder::new(&raw[..]), "gzip", limit, cancelled)
        }
        ContentEncoding::Deflate => {
            // "deflate" is zlib-wrapped per RFC 9110, but raw streams are common.
            match read_bounded(ZlibDecoder::new(&raw[..]), "deflate", limit, cancelled) {
                Err(RewriteError::Decompression { .. }) => {
                    read_bounded(DeflateDecoder::new(&raw[..]), "deflate", limit, cancelled)
                }
                other => other,
            }
        }
    }
}

fn read_bounded<R: Read>(
    mut reader: R,
    encoding: &'static str,
    limit: usize,
    cancelled: &AtomicBool,
) -> Result<Bytes, RewriteError> {
    let mut out = Vec::new();
    let mut chunk = vec![0u8; INFLATE_CHUNK];
    loop {
        ensure_live(cancelled)?;
        let n = match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(source) => return Err(RewriteError::Decompression { encoding, source }),
        };
        if out.len() + n > limit {
            return Err(RewriteError::BodyTooLarge { limit });
        }
        out.extend_from_slice(&chunk[..n]);
    }
    Ok(Bytes::from(out))
}

/// Pick the charset for decoding: the header wins, then an XML prolog, then UTF-8.
pub fn resolve_charset(declared: Option<Charset>, class: ContentTypeClass, body: &[u8]) -> Charset {
    declared
        .or_else(|| {
            (class == ContentTypeClass::XmlOrGml)
                .then(|| sniff_xml_encoding(body))
                .flatten()
        })
        .unwrap_or(Charset::Utf8)
}

/// Read `encoding="…"` out of an XML declaration, if there is one.
pub fn sniff_xml_encoding(body: &[u8]) -> Option<Charset> {
    let body = body.strip_prefix(UTF8_BOM).unwrap_or(body);
    let head = &body[..body.len().min(256)];
    if !head.starts_with(b"<?xml") {
        return None;
    }
    let end = head.windows(2).position(|w| w == b"?>")?;
    let decl = std::str::from_utf8(&head[..end]).ok()?;
    let (_, rest) = decl.split_once("encoding")?;
    let rest = rest.trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next().filter(|c| *c == '"' || *c == '\'')?;
    let label = rest[1..].split(quote).next()?;
    Charset::from_label(label)
}

pub fn decode_text(body: &[u8], charset: Charset) -> Result<String, RewriteError> {
    match charset {
        Charset::Utf8 => {
            let body = body.strip_prefix(UTF8_BOM).unwrap_or(body);
            String::from_utf8(body.to_vec())
                .map_err(|e| RewriteError::parse("text", format!("invalid utf-8: {e}")))
        }
        Charset::Latin1 => Ok(body.iter().map(|&b| char::from(b)).collect()),
    }
}

pub fn encode_text(text: String, charset: Charset) -> Result<Bytes, RewriteError> {
    match charset {
        Charset::Utf8 => Ok(Bytes::from(text)),
        Charset::Latin1 => text
            .chars()
            .map(|c| u8::try_from(u32::from(c)).ok())
            .collect::<Option<Vec<u8>>>()
            .map(Bytes::from)
            .ok_or_else(|| {
                RewriteError::serialization("text", "rewritten text is not representable in iso-8859-1")
            }),
    }
}
