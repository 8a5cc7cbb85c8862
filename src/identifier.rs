//! Identifier derivation
//!
//! Shows are keyed by a natural identifier taken either from a URI suffix
//! (`spotify:show:4rOoJ6Egrf8K2IrywzwOMk`) or from a numeric id embedded in a
//! URL (`https://podcasts.apple.com/us/podcast/foo/id1200361736`).

use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

/// Pattern for Apple-style numeric ids embedded in a path (`/id1200361736`)
pub const APPLE_ID_PATTERN: &str = r"/id(\d+)";

/// Pattern for Apple sitemap `<loc>` entries, which may omit the leading slash
pub const SITEMAP_ID_PATTERN: &str = r"id(\d+)";

/// Pattern for Spotify show links (`/show/4rOoJ6Egrf8K2IrywzwOMk`)
pub const SPOTIFY_SHOW_PATTERN: &str = r"/show/([A-Za-z0-9]+)";

static DEFAULT_PATTERN: Lazy<IdPattern> = Lazy::new(|| IdPattern {
    source: APPLE_ID_PATTERN.to_string(),
    regex: Regex::new(APPLE_ID_PATTERN).unwrap_or_else(|e| {
        panic!("FATAL: built-in identifier pattern failed to compile: {e}")
    }),
});

/// Take the identifier from a colon-separated URI (`spotify:show:ABC` -> `ABC`)
///
/// Empty input yields an empty identifier rather than an error.
///
/// # Examples
///
/// ```
/// use chart_harvester::identifier::uri_suffix;
///
/// assert_eq!(uri_suffix("spotify:show:ABC"), "ABC");
/// assert_eq!(uri_suffix("ABC"), "ABC");
/// assert_eq!(uri_suffix(""), "");
/// ```
pub fn uri_suffix(uri: &str) -> &str {
    let uri = uri.trim();
    uri.rsplit(':').next().unwrap_or("").trim()
}

/// Whether an identifier is a non-empty run of ASCII digits
pub fn is_numeric(id: &str) -> bool {
    !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit())
}

/// Whether `name` is a plain SQL identifier (`[A-Za-z_][A-Za-z0-9_]*`)
///
/// Table and column names cannot be bound as parameters, so anything
/// interpolated into SQL must pass this check first.
pub fn is_sql_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}

/// Compiled regex used to pull an identifier out of a link or sitemap location
///
/// The first capture group is the identifier; patterns without a capture
/// group are rejected.
#[derive(Clone)]
pub struct IdPattern {
    source: String,
    regex: Regex,
}

impl IdPattern {
    /// Compile a pattern
    ///
    /// # Errors
    ///
    /// Returns an error if the regex is invalid or has no capture group.
    pub fn parse(pattern: &str) -> Result<Self, IdentifierError> {
        let regex = Regex::new(pattern)
            .map_err(|e| IdentifierError::InvalidPattern(format!("{pattern}: {e}")))?;
        if regex.captures_len() < 2 {
            return Err(IdentifierError::InvalidPattern(format!(
                "{pattern}: pattern needs one capture group for the identifier"
            )));
        }
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    /// The Apple `/id(\d+)` pattern
    pub fn apple() -> Self {
        DEFAULT_PATTERN.clone()
    }

    /// Extract the identifier from `haystack`, if the pattern matches
    pub fn find<'a>(&self, haystack: &'a str) -> Option<&'a str> {
        self.regex
            .captures(haystack)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }

    /// Pattern source text
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl fmt::Debug for IdPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("IdPattern").field(&self.source).finish()
    }
}

impl Default for IdPattern {
    fn default() -> Self {
        Self::apple()
    }
}

/// Errors that can occur while building identifier patterns
#[derive(Debug, thiserror::Error)]
pub enum IdentifierError {
    /// Invalid identifier pattern
    #[error("invalid identifier pattern: {0}")]
    InvalidPattern(String),
}
