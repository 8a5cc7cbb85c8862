//! HTML anchor and XML `<loc>` extraction

use super::{ExtractError, PayloadFormat};
use crate::identifier::{IdPattern, APPLE_ID_PATTERN};
use crate::Record;
use quick_xml::events::Event;
use quick_xml::Reader;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const DEFAULT_SELECTOR: &str = "a[href]";
const DEFAULT_ATTRIBUTE: &str = "href";

/// Declarative description of where identifiers live in a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupRule {
    /// CSS selector for candidate elements (HTML only)
    #[serde(default = "default_selector")]
    pub selector: String,
    /// Attribute holding the link (HTML only)
    #[serde(default = "default_attribute")]
    pub attribute: String,
    /// Regex whose first capture group is the identifier
    #[serde(default = "default_pattern")]
    pub id_pattern: String,
    /// Reject identifiers shorter than this
    #[serde(default)]
    pub min_id_len: Option<usize>,
    /// Reject identifiers longer than this
    #[serde(default)]
    pub max_id_len: Option<usize>,
}

fn default_selector() -> String {
    DEFAULT_SELECTOR.to_string()
}

fn default_attribute() -> String {
    DEFAULT_ATTRIBUTE.to_string()
}

fn default_pattern() -> String {
    APPLE_ID_PATTERN.to_string()
}

impl Default for MarkupRule {
    fn default() -> Self {
        Self {
            selector: default_selector(),
            attribute: default_attribute(),
            id_pattern: default_pattern(),
            min_id_len: None,
            max_id_len: None,
        }
    }
}

/// Compiled [`MarkupRule`]
#[derive(Debug, Clone)]
pub struct MarkupExtractor {
    format: PayloadFormat,
    selector: Selector,
    attribute: String,
    pattern: IdPattern,
    min_id_len: Option<usize>,
    max_id_len: Option<usize>,
}

impl MarkupExtractor {
    /// Compile the selector and identifier pattern of a rule
    pub fn compile(format: PayloadFormat, rule: &MarkupRule) -> Result<Self, ExtractError> {
        let selector = Selector::parse(&rule.selector)
            .map_err(|e| ExtractError::InvalidSelector(format!("{}: {e}", rule.selector)))?;
        Ok(Self {
            format,
            selector,
            attribute: rule.attribute.clone(),
            pattern: IdPattern::parse(&rule.id_pattern)?,
            min_id_len: rule.min_id_len,
            max_id_len: rule.max_id_len,
        })
    }

    /// Document format
    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// One record per distinct identifier linked from the page, anchor text as name
    pub fn extract_html(&self, body: &str) -> Vec<Record> {
        let document = Html::parse_document(body);
        let mut builder = RecordBuilder::default();

        for element in document.select(&self.selector) {
            let Some(link) = element.value().attr(&self.attribute) else {
                continue;
            };
            let Some(id) = self.identifier(link) else {
                continue;
            };
            let name = element.text().flat_map(str::split_whitespace).collect::<Vec<_>>().join(" ");
            builder.push(id, name);
        }

        builder.finish()
    }

    /// One record per distinct identifier found in sitemap locations
    pub fn extract_locations(&self, locations: &[String]) -> Vec<Record> {
        let mut builder = RecordBuilder::default();
        for loc in locations {
            if let Some(id) = self.identifier(loc) {
                builder.push(id, String::new());
            }
        }
        builder.finish()
    }

    fn identifier<'a>(&self, haystack: &'a str) -> Option<&'a str> {
        let id = self.pattern.find(haystack)?;
        if self.min_id_len.is_some_and(|min| id.len() < min) {
            return None;
        }
        if self.max_id_len.is_some_and(|max| id.len() > max) {
            return None;
        }
        Some(id)
    }
}

/// Collapses repeated links to the same identifier onto the first occurrence
#[derive(Default)]
struct RecordBuilder {
    records: Vec<Record>,
    positions: HashMap<String, usize>,
}

impl RecordBuilder {
    fn push(&mut self, id: &str, name: String) {
        if let Some(&pos) = self.positions.get(id) {
            // image links come before title links on browse pages
            if self.records[pos].name.is_empty() {
                self.records[pos].name = name;
            }
            return;
        }
        self.positions.insert(id.to_string(), self.records.len());
        self.records.push(Record {
            id: id.to_string(),
            name,
            rank: self.records.len() as u32 + 1,
            ..Default::default()
        });
    }

    fn finish(self) -> Vec<Record> {
        self.records
    }
}

/// Collect the text of every `<loc>` element, verifying the document is well-formed
pub(crate) fn collect_locations(body: &str) -> Result<Vec<String>, ExtractError> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut locations = Vec::new();
    let mut saw_element = false;
    let mut in_loc = false;
    let mut current = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                saw_element = true;
                if e.local_name().as_ref() == b"loc" {
                    in_loc = true;
                    current.clear();
                }
            }
            Ok(Event::Empty(_)) => saw_element = true,
            Ok(Event::Text(t)) if in_loc => {
                let text = t
                    .unescape()
                    .map_err(|e| ExtractError::InvalidXml(e.to_string()))?;
                current.push_str(&text);
            }
            Ok(Event::CData(c)) if in_loc => {
                current.push_str(&String::from_utf8_lossy(&c.into_inner()));
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"loc" => {
                in_loc = false;
                let loc = current.trim();
                if !loc.is_empty() {
                    locations.push(loc.to_string());
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(ExtractError::InvalidXml(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
            _ => {}
        }
    }

    if !saw_element {
        return Err(ExtractError::EmptyDocument);
    }
    Ok(locations)
}
