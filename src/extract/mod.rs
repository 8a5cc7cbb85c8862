//! Payload decoding and record extraction
//!
//! A fetched body is decoded exactly once into a [`Payload`] variant at the
//! fetch boundary; everything downstream matches on the variant instead of
//! re-inspecting the body.

pub mod json;
pub mod markup;

pub use json::{FieldMap, IdMode, DEFAULT_LIST_KEY};
pub use markup::{MarkupExtractor, MarkupRule};

use crate::Record;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::borrow::Cow;
use std::fmt;
use std::io::Read;

/// Leading bytes of a gzip stream
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Wire format of a source's responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadFormat {
    /// JSON array or object with a list under a known key
    Json,
    /// HTML browse page
    Html,
    /// XML sitemap (or sitemap index)
    Xml,
}

impl PayloadFormat {
    /// `Accept` header value sent for this format
    pub fn accept_header(&self) -> &'static str {
        match self {
            PayloadFormat::Json => "application/json",
            PayloadFormat::Html => "text/html,application/xhtml+xml",
            PayloadFormat::Xml => "application/xml,text/xml",
        }
    }
}

impl fmt::Display for PayloadFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadFormat::Json => write!(f, "json"),
            PayloadFormat::Html => write!(f, "html"),
            PayloadFormat::Xml => write!(f, "xml"),
        }
    }
}

/// A decoded response body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Top-level JSON array
    Array(Vec<Value>),
    /// JSON object carrying an array under the list key
    Object {
        /// Elements of the list
        items: Vec<Value>,
    },
    /// JSON object without a usable list; extracts to nothing
    Unknown,
    /// HTML document, kept as text (the DOM type is not `Send`)
    Html(String),
    /// Text of every `<loc>` element of an XML document
    Locations(Vec<String>),
}

impl Payload {
    /// Decode a response body according to `format`
    ///
    /// # Errors
    ///
    /// Returns an error if the body is not valid JSON, is a JSON scalar, is
    /// not well-formed XML, or is a blank HTML document.
    pub fn decode(body: &str, format: PayloadFormat, list_key: &str) -> Result<Self, ExtractError> {
        match format {
            PayloadFormat::Json => Self::decode_json(body, list_key),
            PayloadFormat::Html => {
                if body.trim().is_empty() {
                    return Err(ExtractError::EmptyDocument);
                }
                Ok(Payload::Html(body.to_string()))
            }
            PayloadFormat::Xml => markup::collect_locations(body).map(Payload::Locations),
        }
    }

    /// Decode a raw response body, inflating it first if it is a gzip stream
    ///
    /// Sitemap shards are served as `.xml.gz` files without a
    /// `Content-Encoding` header, so the client hands them over compressed.
    pub fn decode_bytes(body: &[u8], format: PayloadFormat, list_key: &str) -> Result<Self, ExtractError> {
        let text = body_text(body)?;
        Self::decode(&text, format, list_key)
    }

    /// Decode a JSON body into `Array`, `Object` or `Unknown`
    pub fn decode_json(body: &str, list_key: &str) -> Result<Self, ExtractError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| ExtractError::InvalidJson(e.to_string()))?;

        match value {
            Value::Array(items) => Ok(Payload::Array(items)),
            Value::Object(mut map) => match map.remove(list_key) {
                Some(Value::Array(items)) => Ok(Payload::Object { items }),
                _ => Ok(Payload::Unknown),
            },
            other => Err(ExtractError::UnexpectedShape(format!(
                "expected array or object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Number of raw elements before extraction
    pub fn len(&self) -> usize {
        match self {
            Payload::Array(items) | Payload::Object { items } => items.len(),
            Payload::Unknown | Payload::Html(_) => 0,
            Payload::Locations(locs) => locs.len(),
        }
    }

    /// Whether the payload carries no raw elements
    pub fn is_empty(&self) -> bool {
        match self {
            Payload::Html(body) => body.is_empty(),
            _ => self.len() == 0,
        }
    }
}

/// Turns a decoded payload into records for one source
#[derive(Debug, Clone)]
pub enum Extractor {
    /// JSON list elements mapped through a field map
    Json(FieldMap),
    /// HTML anchors or XML locations matched against an identifier pattern
    Markup(MarkupExtractor),
}

impl Extractor {
    /// Build an extractor for a source
    ///
    /// JSON sources fall back to the default field map; markup sources
    /// require a rule.
    pub fn new(
        format: PayloadFormat,
        fields: Option<&FieldMap>,
        rule: Option<&MarkupRule>,
    ) -> Result<Self, ExtractError> {
        match format {
            PayloadFormat::Json => Ok(Extractor::Json(fields.cloned().unwrap_or_default())),
            PayloadFormat::Html | PayloadFormat::Xml => {
                let rule = rule.ok_or_else(|| {
                    ExtractError::MissingRule(format!("{format} source needs a markup rule"))
                })?;
                Ok(Extractor::Markup(MarkupExtractor::compile(format, rule)?))
            }
        }
    }

    /// Format this extractor consumes
    pub fn format(&self) -> PayloadFormat {
        match self {
            Extractor::Json(_) => PayloadFormat::Json,
            Extractor::Markup(m) => m.format(),
        }
    }

    /// Key holding the record list in JSON objects
    pub fn list_key(&self) -> &str {
        match self {
            Extractor::Json(fields) => &fields.list_key,
            Extractor::Markup(_) => json::DEFAULT_LIST_KEY,
        }
    }

    /// Decode a body with this extractor's format
    pub fn decode(&self, body: &str) -> Result<Payload, ExtractError> {
        Payload::decode(body, self.format(), self.list_key())
    }

    /// Extract records, ranked 1-based in payload order
    ///
    /// Never fails: shapes without records yield an empty list.
    pub fn extract(&self, payload: &Payload) -> Vec<Record> {
        match (self, payload) {
            (Extractor::Json(fields), Payload::Array(items))
            | (Extractor::Json(fields), Payload::Object { items }) => fields.extract(items),
            (Extractor::Markup(m), Payload::Html(body)) => m.extract_html(body),
            (Extractor::Markup(m), Payload::Locations(locs)) => m.extract_locations(locs),
            _ => Vec::new(),
        }
    }
}

/// Body as text: gzip streams are inflated, anything else is read as
/// UTF-8 with invalid sequences replaced
pub fn body_text(body: &[u8]) -> Result<Cow<'_, str>, ExtractError> {
    if !body.starts_with(&GZIP_MAGIC) {
        return Ok(String::from_utf8_lossy(body));
    }
    let mut inflated = Vec::new();
    GzDecoder::new(body)
        .read_to_end(&mut inflated)
        .map_err(|e| ExtractError::Compression(e.to_string()))?;
    Ok(Cow::Owned(String::from_utf8_lossy(&inflated).into_owned()))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Errors raised while decoding payloads or building extractors
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// Body is not valid JSON
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// JSON parsed but has a shape no source produces
    #[error("unexpected payload shape: {0}")]
    UnexpectedShape(String),

    /// Body is not well-formed XML
    #[error("invalid XML: {0}")]
    InvalidXml(String),

    /// Markup body was blank
    #[error("empty document")]
    EmptyDocument,

    /// Body looked like gzip but did not inflate
    #[error("invalid gzip body: {0}")]
    Compression(String),

    /// CSS selector failed to parse
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// Markup source without a rule
    #[error("missing markup rule: {0}")]
    MissingRule(String),

    /// Identifier pattern error
    #[error(transparent)]
    Pattern(#[from] crate::identifier::IdentifierError),
}
