//! Content-type gate.
//!
//! Decides from the response head alone whether a body may be rewritten.
//! Runs before any body byte is read, so ineligible responses (map tiles,
//! images, archives) stream through without buffering.

use std::fmt;

use axum::http::{header, HeaderMap, StatusCode};

/// Rewrite family derived from the declared media type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentTypeClass {
    Text,
    Json,
    XmlOrGml,
    Other,
}

impl fmt::Display for ContentTypeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::XmlOrGml => "xml",
            Self::Other => "other",
        };
        f.write_str(name)
    }
}

impl ContentTypeClass {
    /// Classify a lowercased media type without parameters.
    pub fn from_media_type(media_type: &str) -> Self {
        if media_type.is_empty() {
            return Self::Other;
        }
        if media_type == "text/xml"
            || media_type == "application/xml"
            || media_type.ends_with("+xml")
            || media_type.ends_with("_xml")
            || media_type.contains("gml")
        {
            return Self::XmlOrGml;
        }
        if media_type == "application/json"
            || media_type == "text/json"
            || media_type.ends_with("+json")
        {
            return Self::Json;
        }
        if media_type.starts_with("text/") || media_type == "application/javascript" {
            return Self::Text;
        }
        Self::Other
    }
}

/// Character sets the pipeline can decode and re-encode losslessly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Charset {
    Utf8,
    /// ISO-8859-1. US-ASCII is decoded as its subset.
    Latin1,
}

impl Charset {
    pub fn from_label(label: &str) -> Option<Self> {
        match label.trim().trim_matches('"').to_ascii_lowercase().as_str() {
            "utf-8" | "utf8" => Some(Self::Utf8),
            "iso-8859-1" | "iso8859-1" | "iso_8859-1" | "latin1" | "l1" | "us-ascii"
            | "ascii" => Some(Self::Latin1),
            _ => None,
        }
    }
}

/// Declared `Content-Encoding` of the upstream body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
    Unsupported(String),
}

impl ContentEncoding {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let Some(value) = headers.get(header::CONTENT_ENCODING) else {
            return Self::Identity;
        };
        let Ok(value) = value.to_str() else {
            return Self::Unsupported("<non-ascii>".to_string());
        };
        let codings: Vec<String> = value
            .split(',')
            .map(|c| c.trim().to_ascii_lowercase())
            .filter(|c| !c.is_empty() && c != "identity")
            .collect();
        match codings.as_slice() {
            [] => Self::Identity,
            [single] => match single.as_str() {
                "gzip" | "x-gzip" => Self::Gzip,
                "deflate" => Self::Deflate,
                other => Self::Unsupported(other.to_string()),
            },
            // Stacked codings are not unwound.
            _ => Self::Unsupported(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Deflate => "deflate",
            Self::Unsupported(name) => name,
        }
    }
}

/// Gate verdict for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eligibility {
    pub eligible: bool,
    pub class: ContentTypeClass,
    /// Lowercased media type without parameters, empty when absent.
    pub media_type: String,
    /// Charset from the `Content-Type` parameter, if declared and supported.
    pub charset: Option<Charset>,
    pub encoding: ContentEncoding,
    /// Why an otherwise rewritable response was let through.
    pub skip_reason: Option<&'static str>,
}

/// Split a `Content-Type` value into its media type and charset label.
pub fn parse_content_type(value: &str) -> (String, Option<String>) {
    let mut parts = value.split(';');
    let media_type = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
    let charset = parts.find_map(|param| {
        let (name, value) = param.split_once('=')?;
        name.trim()
            .eq_ignore_ascii_case("charset")
            .then(|| value.trim().trim_matches('"').to_string())
    });
    (media_type, charset)
}

/// Classify a response head. Pure: reads headers and status only.
pub fn eligible(status: StatusCode, headers: &HeaderMap) -> Eligibility {
    let (media_type, charset_label) = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(parse_content_type)
        .unwrap_or_default();
    let class = ContentTypeClass::from_media_type(&media_type);
    let encoding = ContentEncoding::from_headers(headers);
    let charset = charset_label.as_deref().and_then(Charset::from_label);

    let skip_reason = if class == ContentTypeClass::Other {
        Some("content type not rewritable")
    } else if status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
    {
        Some("status carries no body")
    } else if declared_empty(headers) {
        Some("empty body")
    } else if charset_label.is_some() && charset.is_none() {
        Some("unsupported charset")
    } else if matches!(encoding, ContentEncoding::Unsupported(_)) {
        Some("unsupported content encoding")
    } else {
        None
    };

    Eligibility {
        eligible: skip_reason.is_none(),
        class,
        media_type,
        charset,
        encoding,
        skip_reason,
    }
}

fn declared_empty(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        == Some(0)
}
