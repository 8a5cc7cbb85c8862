//! Endpoint templating
//!
//! Templates carry `{country}`, `{category}` or `{url}` placeholders. A chart
//! template without `{category}` gets the category appended as a path
//! segment; one without `{country}` gets a `region` query parameter, so a bare
//! base such as `https://host/api/charts` yields
//! `https://host/api/charts/top?region=us`. Sources whose API has no region
//! dimension switch that parameter off.
//!
//! Values substituted into the query string are percent-encoded, so a
//! category such as `Health & Fitness` stays one parameter. Path
//! substitutions are inserted verbatim.

use super::FetchError;
use crate::harvest::task::FetchTask;

const COUNTRY: &str = "{country}";
const CATEGORY: &str = "{category}";
const URL: &str = "{url}";

/// URL template for one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    template: String,
    region_param: bool,
}

impl Endpoint {
    /// Validate and wrap a template
    pub fn new(template: impl Into<String>) -> Result<Self, FetchError> {
        let template = template.into();
        let trimmed = template.trim();
        if trimmed != URL && !trimmed.starts_with("http://") && !trimmed.starts_with("https://") {
            return Err(FetchError::InvalidEndpoint(format!(
                "{template}: expected an http(s) URL or {URL}"
            )));
        }
        Ok(Self {
            template: trimmed.to_string(),
            region_param: true,
        })
    }

    /// Whether a template without `{country}` gets a `region` parameter
    pub fn with_region_param(mut self, region_param: bool) -> Self {
        self.region_param = region_param;
        self
    }

    /// Template text
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Concrete URL for `task`
    pub fn url_for(&self, task: &FetchTask) -> Result<String, FetchError> {
        match task {
            FetchTask::Chart { country, category } => self.chart_url(country, category),
            FetchTask::Shard { url } => {
                if url.starts_with("http://") || url.starts_with("https://") {
                    Ok(url.clone())
                } else {
                    Err(FetchError::InvalidEndpoint(format!("shard {url} is not an http(s) URL")))
                }
            }
        }
    }

    fn chart_url(&self, country: &str, category: &str) -> Result<String, FetchError> {
        if self.template == URL {
            return Err(FetchError::InvalidEndpoint(
                "chart task needs a template with {country}/{category}".to_string(),
            ));
        }

        let (path, query) = split_query(&self.template);
        let mut url = path.replace(COUNTRY, country).replace(CATEGORY, category);
        url.push_str(
            &query
                .replace(COUNTRY, &urlencoding::encode(country))
                .replace(CATEGORY, &urlencoding::encode(category)),
        );

        if !self.template.contains(CATEGORY) && !category.is_empty() {
            let (path, query) = split_query(&url);
            url = format!("{}/{}{}", path.trim_end_matches('/'), category, query);
        }
        if self.region_param && !self.template.contains(COUNTRY) {
            let sep = if url.contains('?') { '&' } else { '?' };
            url = format!("{url}{sep}region={country}");
        }
        Ok(url)
    }
}

fn split_query(url: &str) -> (&str, &str) {
    match url.find('?') {
        Some(idx) => url.split_at(idx),
        None => (url, ""),
    }
}
