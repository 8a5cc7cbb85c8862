//! Fetch tasks and work-set enumeration

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use tracing::warn;

/// One unit of enumerated work
///
/// Tasks are immutable once built; ordering derives from the dimension values
/// so a sorted work-set is sorted by country first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FetchTask {
    /// Chart page for one country and category
    Chart {
        /// Lowercase ISO 3166-1 alpha-2 country code
        country: String,
        /// Category code exactly as the endpoint expects it
        category: String,
    },
    /// One sitemap shard (or any fully formed URL)
    Shard {
        /// Absolute URL
        url: String,
    },
}

impl FetchTask {
    /// Build a chart task; the country code is normalized to lowercase
    pub fn chart(country: impl AsRef<str>, category: impl Into<String>) -> Self {
        FetchTask::Chart {
            country: normalize_country(country.as_ref()),
            category: category.into(),
        }
    }

    /// Build a shard task
    pub fn shard(url: impl Into<String>) -> Self {
        FetchTask::Shard { url: url.into() }
    }

    /// Country dimension, if any
    pub fn country(&self) -> Option<&str> {
        match self {
            FetchTask::Chart { country, .. } => Some(country),
            FetchTask::Shard { .. } => None,
        }
    }

    /// Category dimension, if any
    pub fn category(&self) -> Option<&str> {
        match self {
            FetchTask::Chart { category, .. } => Some(category),
            FetchTask::Shard { .. } => None,
        }
    }
}

impl fmt::Display for FetchTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchTask::Chart { country, category } => {
                write!(f, "{} - {}", country.to_uppercase(), category)
            }
            FetchTask::Shard { url } => write!(f, "{url}"),
        }
    }
}

/// A named group of countries sharing one category list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTier {
    /// Tier name (e.g. "full", "core", "top-only")
    pub name: String,
    /// Member country codes
    pub countries: Vec<String>,
    /// Categories fetched for every member country, in declared order
    pub categories: Vec<String>,
}

/// Resolves which categories apply to a country
///
/// A country belongs to the first tier that lists it. Countries in no tier
/// use the fallback list when one is configured and are skipped otherwise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPlan {
    tiers: Vec<CategoryTier>,
    fallback: Option<Vec<String>>,
}

impl CategoryPlan {
    /// Build a plan from tiers in precedence order
    pub fn new(tiers: Vec<CategoryTier>) -> Self {
        Self {
            tiers,
            fallback: None,
        }
    }

    /// Build a plan with one tier per country
    pub fn from_country_map<I, C, S>(map: I) -> Self
    where
        I: IntoIterator<Item = (C, Vec<S>)>,
        C: Into<String>,
        S: Into<String>,
    {
        let tiers = map
            .into_iter()
            .map(|(country, categories)| {
                let country = country.into();
                CategoryTier {
                    name: country.clone(),
                    countries: vec![country],
                    categories: categories.into_iter().map(Into::into).collect(),
                }
            })
            .collect();
        Self::new(tiers)
    }

    /// Categories used for countries that no tier lists
    pub fn with_fallback<S: Into<String>>(mut self, categories: Vec<S>) -> Self {
        self.fallback = Some(categories.into_iter().map(Into::into).collect());
        self
    }

    /// Tiers in precedence order
    pub fn tiers(&self) -> &[CategoryTier] {
        &self.tiers
    }

    /// The tier a country belongs to
    pub fn tier_of(&self, country: &str) -> Option<&CategoryTier> {
        let country = normalize_country(country);
        self.tiers
            .iter()
            .find(|tier| tier.countries.iter().any(|c| normalize_country(c) == country))
    }

    /// Categories that apply to `country`
    pub fn categories_for(&self, country: &str) -> Option<&[String]> {
        self.tier_of(country)
            .map(|tier| tier.categories.as_slice())
            .or(self.fallback.as_deref())
    }

    /// Every country listed by any tier, normalized and sorted
    pub fn countries(&self) -> Vec<String> {
        let set: BTreeSet<String> = self
            .tiers
            .iter()
            .flat_map(|tier| tier.countries.iter())
            .map(|c| normalize_country(c))
            .filter(|c| !c.is_empty())
            .collect();
        set.into_iter().collect()
    }

    /// Countries of the named tiers, normalized and sorted
    pub fn countries_in(&self, tier_names: &[String]) -> Vec<String> {
        let set: BTreeSet<String> = self
            .tiers
            .iter()
            .filter(|tier| tier_names.iter().any(|n| n.eq_ignore_ascii_case(&tier.name)))
            .flat_map(|tier| tier.countries.iter())
            .map(|c| normalize_country(c))
            .filter(|c| !c.is_empty())
            .collect();
        set.into_iter().collect()
    }
}

/// Expand country lists x categories into an ordered, duplicate-free work-set
///
/// Country lists are unioned (and normalized) before the cross product, so a
/// country appearing in several lists yields its tasks once. Tasks are ordered
/// by country ascending, then by category in the order the plan declares.
pub fn enumerate_chart_tasks(country_lists: &[Vec<String>], plan: &CategoryPlan) -> Vec<FetchTask> {
    let countries: BTreeSet<String> = country_lists
        .iter()
        .flatten()
        .map(|c| normalize_country(c))
        .filter(|c| !c.is_empty())
        .collect();

    let mut tasks = Vec::new();
    for country in countries {
        let Some(categories) = plan.categories_for(&country) else {
            warn!(country = %country, "Country has no category tier; skipping");
            continue;
        };

        let mut seen = HashSet::new();
        for category in categories {
            let category = category.trim();
            if category.is_empty() || !seen.insert(category) {
                continue;
            }
            tasks.push(FetchTask::chart(&country, category));
        }
    }
    tasks
}

/// Build a sorted, duplicate-free work-set of shard URLs
pub fn enumerate_shard_tasks<I, S>(urls: I) -> Vec<FetchTask>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let set: BTreeSet<String> = urls
        .into_iter()
        .map(|u| u.as_ref().trim().to_string())
        .filter(|u| !u.is_empty())
        .collect();
    set.into_iter().map(FetchTask::shard).collect()
}

fn normalize_country(country: &str) -> String {
    country.trim().to_lowercase()
}
