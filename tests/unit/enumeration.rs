//! Work-set enumeration against the bundled catalog

use chart_harvester::harvest::{enumerate_chart_tasks, enumerate_shard_tasks, CategoryPlan};
use chart_harvester::registry::Catalog;
use chart_harvester::FetchTask;
use std::collections::HashSet;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_overlapping_country_lists_enumerate_once() {
    let plan = CategoryPlan::from_country_map([
        ("us", vec!["top", "trending"]),
        ("gb", vec!["top"]),
    ]);

    let tasks = enumerate_chart_tasks(&[strings(&["us", "gb"]), strings(&["US", " gb "])], &plan);

    assert_eq!(
        tasks,
        vec![
            FetchTask::chart("gb", "top"),
            FetchTask::chart("us", "top"),
            FetchTask::chart("us", "trending"),
        ]
    );
}

#[test]
fn test_catalog_plans_have_no_duplicate_tasks() {
    let catalog = Catalog::load_embedded().unwrap();
    let spotify = catalog.source("spotify").unwrap();
    let plan = spotify.plan();

    let tasks = enumerate_chart_tasks(&[plan.countries()], &plan);
    assert!(!tasks.is_empty());

    let unique: HashSet<&FetchTask> = tasks.iter().collect();
    assert_eq!(unique.len(), tasks.len());

    let mut sorted = tasks.clone();
    sorted.sort_by(|a, b| a.country().cmp(&b.country()));
    assert_eq!(sorted, tasks);
}

#[test]
fn test_tier_filter_restricts_countries() {
    let catalog = Catalog::load_embedded().unwrap();
    let plan = catalog.source("spotify").unwrap().plan();
    let Some(first) = plan.tiers().first() else {
        panic!("spotify has no tiers");
    };

    let countries = plan.countries_in(&[first.name.clone()]);
    assert!(!countries.is_empty());
    for country in &countries {
        assert_eq!(plan.tier_of(country).map(|t| t.name.as_str()), Some(first.name.as_str()));
    }
}

#[test]
fn test_unplanned_country_skipped() {
    let plan = CategoryPlan::from_country_map([("us", vec!["top"])]);
    let tasks = enumerate_chart_tasks(&[strings(&["us", "xx"])], &plan);
    assert_eq!(tasks, vec![FetchTask::chart("us", "top")]);
}

#[test]
fn test_shard_urls_sorted_and_deduplicated() {
    let tasks = enumerate_shard_tasks([
        "https://example.test/sitemap_2.xml",
        "https://example.test/sitemap_1.xml",
        "https://example.test/sitemap_2.xml",
        "  ",
    ]);
    assert_eq!(
        tasks,
        vec![
            FetchTask::shard("https://example.test/sitemap_1.xml"),
            FetchTask::shard("https://example.test/sitemap_2.xml"),
        ]
    );
}
