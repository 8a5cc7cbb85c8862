//! Source catalog
//!
//! The catalog describes every supported chart source (endpoint template,
//! payload format, field mapping, country/category tiers) plus ISO country
//! display names. A copy is embedded in the binary; a user catalog file can
//! replace or add sources.

use crate::extract::{ExtractError, Extractor, FieldMap, MarkupRule, PayloadFormat};
use crate::harvest::task::{CategoryPlan, CategoryTier};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Embedded catalog data
const CATALOG_JSON: &str = include_str!("catalog.json");

/// Global catalog instance (loaded once)
static CATALOG: Lazy<Result<Catalog, RegistryError>> = Lazy::new(|| Catalog::from_json(CATALOG_JSON));

/// Catalog of sources and country names
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    schema_version: String,
    #[serde(default)]
    last_updated: String,
    #[serde(default = "default_user_agent")]
    user_agent: String,
    #[serde(default)]
    country_names: BTreeMap<String, String>,
    #[serde(default)]
    sources: Vec<SourceSpec>,
}

fn default_user_agent() -> String {
    crate::fetcher::http::DEFAULT_USER_AGENT.to_string()
}

impl Catalog {
    /// Load the embedded catalog
    ///
    /// This is a singleton operation - the catalog is parsed once and cached.
    pub fn load() -> Result<&'static Self, &'static RegistryError> {
        CATALOG.as_ref()
    }

    /// Load the embedded catalog, returning an owned copy
    pub fn load_embedded() -> Result<Self, RegistryError> {
        Self::from_json(CATALOG_JSON)
    }

    /// Parse a catalog from a JSON string
    pub fn from_json(json: &str) -> Result<Self, RegistryError> {
        let catalog: Catalog = serde_json::from_str(json)
            .map_err(|e| RegistryError::ParseError(format!("Failed to parse catalog: {e}")))?;
        catalog.validate()?;
        Ok(catalog)
    }

    /// Read a user catalog file
    pub fn from_file(path: &Path) -> Result<Self, RegistryError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::Io(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Embedded catalog with a user file layered on top
    ///
    /// Sources in the override replace embedded sources of the same name;
    /// country names are merged key by key.
    pub fn with_override(path: Option<&Path>) -> Result<Self, RegistryError> {
        let mut catalog = Self::load_embedded()?;
        if let Some(path) = path {
            catalog.merge(Self::from_file(path)?);
        }
        Ok(catalog)
    }

    /// Layer `other` on top of this catalog
    pub fn merge(&mut self, other: Catalog) {
        self.country_names.extend(other.country_names);
        if other.user_agent != default_user_agent() {
            self.user_agent = other.user_agent;
        }
        for source in other.sources {
            match self.sources.iter_mut().find(|s| s.name == source.name) {
                Some(existing) => *existing = source,
                None => self.sources.push(source),
            }
        }
    }

    fn validate(&self) -> Result<(), RegistryError> {
        for source in &self.sources {
            if source.name.trim().is_empty() {
                return Err(RegistryError::ParseError("source with empty name".to_string()));
            }
            if source.endpoint.trim().is_empty() {
                return Err(RegistryError::ParseError(format!(
                    "source {} has no endpoint",
                    source.name
                )));
            }
        }
        Ok(())
    }

    /// Catalog schema version
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    /// `User-Agent` sent with every request
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// All sources in declaration order
    pub fn sources(&self) -> &[SourceSpec] {
        &self.sources
    }

    /// Look up a source by name (case-insensitive)
    pub fn source(&self, name: &str) -> Result<&SourceSpec, RegistryError> {
        self.sources
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| {
                let known: Vec<&str> = self.sources.iter().map(|s| s.name.as_str()).collect();
                RegistryError::NotFound(format!("source {name} (known: {})", known.join(", ")))
            })
    }

    /// Display name of a country code; `None` for unknown codes
    pub fn country_name(&self, code: &str) -> Option<&str> {
        self.country_names
            .get(&code.trim().to_lowercase())
            .map(String::as_str)
    }

    /// Country code -> display name map
    pub fn country_names(&self) -> &BTreeMap<String, String> {
        &self.country_names
    }
}

/// One chart source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceSpec {
    name: String,
    #[serde(default)]
    description: String,
    endpoint: String,
    format: PayloadFormat,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fields: Option<FieldMap>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    markup: Option<MarkupRule>,
    #[serde(default)]
    tiers: Vec<CategoryTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_categories: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    index_url: Option<String>,
    #[serde(default)]
    retry_empty: bool,
    #[serde(default = "default_region_param")]
    region_param: bool,
    #[serde(default = "default_id_column")]
    id_column: String,
}

fn default_id_column() -> String {
    "Identifier".to_string()
}

fn default_region_param() -> bool {
    true
}

impl SourceSpec {
    /// Build a source in code (tests, ad-hoc endpoints)
    pub fn new(name: impl Into<String>, endpoint: impl Into<String>, format: PayloadFormat) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            endpoint: endpoint.into(),
            format,
            fields: None,
            markup: None,
            tiers: Vec::new(),
            default_categories: None,
            index_url: None,
            retry_empty: false,
            region_param: default_region_param(),
            id_column: default_id_column(),
        }
    }

    /// Replace the country/category tiers
    pub fn with_tiers(mut self, tiers: Vec<CategoryTier>) -> Self {
        self.tiers = tiers;
        self
    }

    /// Replace the JSON field map
    pub fn with_fields(mut self, fields: FieldMap) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Replace the markup rule
    pub fn with_markup(mut self, rule: MarkupRule) -> Self {
        self.markup = Some(rule);
        self
    }

    /// Toggle the empty-result retry
    pub fn with_retry_empty(mut self, retry_empty: bool) -> Self {
        self.retry_empty = retry_empty;
        self
    }

    /// Toggle the `region` parameter added to templates without `{country}`
    pub fn with_region_param(mut self, region_param: bool) -> Self {
        self.region_param = region_param;
        self
    }

    /// Source name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human description
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Endpoint template with `{country}`, `{category}` or `{url}` placeholders
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Payload format
    pub fn format(&self) -> PayloadFormat {
        self.format
    }

    /// Country/category tiers in precedence order
    pub fn tiers(&self) -> &[CategoryTier] {
        &self.tiers
    }

    /// Sitemap index listing shard URLs, if the source has one
    pub fn index_url(&self) -> Option<&str> {
        self.index_url.as_deref()
    }

    /// Whether empty results join the retry pass
    pub fn retry_empty(&self) -> bool {
        self.retry_empty
    }

    /// Whether templates without `{country}` get a `region` parameter
    pub fn region_param(&self) -> bool {
        self.region_param
    }

    /// Header used when writing this source's identifier lists
    pub fn id_column(&self) -> &str {
        &self.id_column
    }

    /// Category plan built from the tiers (plus default categories, if any)
    pub fn plan(&self) -> CategoryPlan {
        let plan = CategoryPlan::new(self.tiers.clone());
        match &self.default_categories {
            Some(categories) => plan.with_fallback(categories.clone()),
            None => plan,
        }
    }

    /// Compile this source's extractor
    pub fn extractor(&self) -> Result<Extractor, ExtractError> {
        Extractor::new(self.format, self.fields.as_ref(), self.markup.as_ref())
    }
}

/// Errors that can occur when working with the catalog
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Failed to parse catalog JSON
    #[error("catalog parse error: {0}")]
    ParseError(String),

    /// Failed to read a catalog file
    #[error("catalog read error: {0}")]
    Io(String),

    /// Source not found in catalog
    #[error("not found: {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_loads() {
        let catalog = Catalog::load().unwrap();
        assert!(!catalog.sources().is_empty());
        assert_eq!(catalog.country_name("GB"), Some("United Kingdom"));
        assert_eq!(catalog.country_name("xx"), None);
    }

    #[test]
    fn test_spotify_tiers() {
        let catalog = Catalog::load_embedded().unwrap();
        let spotify = catalog.source("spotify").unwrap();
        let plan = spotify.plan();
        assert_eq!(plan.categories_for("us").unwrap().len(), 20);
        assert_eq!(plan.categories_for("fr").unwrap().len(), 3);
        assert_eq!(plan.categories_for("al").unwrap(), &["top".to_string()][..]);
        // gb is listed by the full tier and the top-only tier
        assert_eq!(plan.categories_for("gb").unwrap().len(), 20);
        assert!(spotify.retry_empty());
        assert!(spotify.extractor().is_ok());
    }

    #[test]
    fn test_markup_sources_compile() {
        let catalog = Catalog::load_embedded().unwrap();
        for name in ["apple-genre", "apple-sitemap"] {
            let source = catalog.source(name).unwrap();
            assert!(source.extractor().is_ok(), "{name} extractor failed to compile");
        }
        assert!(catalog.source("apple-sitemap").unwrap().index_url().is_some());
    }

    #[test]
    fn test_podcastindex_search() {
        let catalog = Catalog::load_embedded().unwrap();
        let source = catalog.source("podcastindex").unwrap();
        assert!(!source.region_param());
        assert_eq!(source.format(), PayloadFormat::Json);

        let categories = source.plan().categories_for("us").unwrap().to_vec();
        assert!(categories.contains(&"Health & Fitness".to_string()));

        let extractor = source.extractor().unwrap();
        assert_eq!(extractor.list_key(), "feeds");
        let payload = extractor
            .decode(r#"{"status":"true","feeds":[{"itunesId":1200361736,"title":"Feed"},{"itunesId":null}]}"#)
            .unwrap();
        let ids: Vec<String> = extractor.extract(&payload).into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["1200361736".to_string(), String::new()]);
    }

    #[test]
    fn test_unknown_source() {
        let catalog = Catalog::load_embedded().unwrap();
        assert!(matches!(catalog.source("napster"), Err(RegistryError::NotFound(_))));
    }

    #[test]
    fn test_merge_replaces_source() {
        let mut catalog = Catalog::load_embedded().unwrap();
        let user = Catalog::from_json(
            r#"{
                "schema_version": "1.0",
                "country_names": {"xk": "Kosovo"},
                "sources": [
                    {"name": "spotify", "endpoint": "http://localhost/{category}?region={country}", "format": "json"}
                ]
            }"#,
        )
        .unwrap();
        catalog.merge(user);
        assert_eq!(catalog.country_name("xk"), Some("Kosovo"));
        assert_eq!(catalog.country_name("us"), Some("United States"));
        let spotify = catalog.source("spotify").unwrap();
        assert!(spotify.endpoint().starts_with("http://localhost"));
        assert!(spotify.tiers().is_empty());
    }
}
