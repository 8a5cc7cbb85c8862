//! CLI command for listing catalog sources

use super::{CliError, OutputFormat};
use crate::registry::{Catalog, SourceSpec};
use clap::Args;
use serde_json::json;

/// Sources subcommand
#[derive(Debug, Args)]
pub struct SourcesCommand {
    #[command(subcommand)]
    action: SourcesAction,
}

/// Sources actions
#[derive(Debug, clap::Subcommand)]
enum SourcesAction {
    /// List every source with its format and tiers
    List,

    /// Show the countries and categories of one source
    Show {
        /// Source name (e.g. spotify)
        name: String,
    },
}

impl SourcesCommand {
    /// Execute the sources command
    pub fn execute(&self, catalog: &Catalog, format: OutputFormat) -> Result<(), CliError> {
        match &self.action {
            SourcesAction::List => {
                list_sources(catalog, format);
                Ok(())
            }
            SourcesAction::Show { name } => {
                show_source(catalog, catalog.source(name)?, format);
                Ok(())
            }
        }
    }
}

fn list_sources(catalog: &Catalog, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let sources: Vec<_> = catalog
                .sources()
                .iter()
                .map(|source| {
                    json!({
                        "name": source.name(),
                        "description": source.description(),
                        "format": source.format().to_string(),
                        "endpoint": source.endpoint(),
                        "tiers": source.tiers().iter().map(|t| t.name.as_str()).collect::<Vec<_>>(),
                        "countries": source.plan().countries().len(),
                    })
                })
                .collect();
            println!("{}", json!(sources));
        }
        OutputFormat::Human => {
            println!("Found {} sources:\n", catalog.sources().len());
            for source in catalog.sources() {
                println!(
                    "{} | {} | {} countries | {}",
                    source.name(),
                    source.format(),
                    source.plan().countries().len(),
                    source.description()
                );
            }
        }
    }
}

fn show_source(catalog: &Catalog, source: &SourceSpec, format: OutputFormat) {
    let plan = source.plan();
    match format {
        OutputFormat::Json => {
            let tiers: Vec<_> = source
                .tiers()
                .iter()
                .map(|tier| {
                    json!({
                        "name": tier.name,
                        "countries": tier.countries,
                        "categories": tier.categories,
                    })
                })
                .collect();
            println!(
                "{}",
                json!({
                    "name": source.name(),
                    "endpoint": source.endpoint(),
                    "format": source.format().to_string(),
                    "index_url": source.index_url(),
                    "id_column": source.id_column(),
                    "retry_empty": source.retry_empty(),
                    "tiers": tiers,
                })
            );
        }
        OutputFormat::Human => {
            println!("{} ({})", source.name(), source.format());
            println!("Endpoint: {}", source.endpoint());
            if let Some(index) = source.index_url() {
                println!("Sitemap index: {index}");
            }
            for tier in source.tiers() {
                println!("\nTier {} ({} categories):", tier.name, tier.categories.len());
                println!("  Categories: {}", tier.categories.join(", "));
                for country in &tier.countries {
                    // A country listed by an earlier tier keeps that tier's categories
                    let owner = plan.tier_of(country).map(|t| t.name.as_str()).unwrap_or("");
                    let name = catalog.country_name(country).unwrap_or("?");
                    if owner == tier.name {
                        println!("  {} {}", country.to_uppercase(), name);
                    } else {
                        println!("  {} {} (uses tier {owner})", country.to_uppercase(), name);
                    }
                }
            }
        }
    }
}
