//! Sitemap shard runs: compressed and plain shards through the executor

use crate::support::{executor_for, fast, ScriptedTransport, Step};
use chart_harvester::fetcher::RawResponse;
use chart_harvester::harvest::{enumerate_shard_tasks, HarvestOptions};
use chart_harvester::registry::Catalog;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::sync::Arc;

const GZ_SHARD: &str = "https://podcasts.test/sitemaps/podcasts_1.xml.gz";
const PLAIN_SHARD: &str = "https://podcasts.test/sitemaps/podcasts_2.xml";

fn urlset(ids: &[u64]) -> String {
    let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">"#);
    for id in ids {
        xml.push_str(&format!("<url><loc>https://podcasts.apple.com/us/podcast/show/id{id}</loc></url>"));
    }
    xml.push_str("</urlset>");
    xml
}

fn gzipped(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

#[tokio::test]
async fn test_gzipped_shards_yield_identifiers() {
    let catalog = Catalog::load_embedded().unwrap();
    let source = catalog.source("apple-sitemap").unwrap();
    let transport = Arc::new(
        ScriptedTransport::new(Step::status(404))
            .route(
                GZ_SHARD,
                vec![Step::Respond(RawResponse::ok(gzipped(&urlset(&[1000000001, 1000000002]))))],
            )
            .route(PLAIN_SHARD, vec![Step::body(&urlset(&[1000000002, 1000000003]))]),
    );

    let tasks = enumerate_shard_tasks([GZ_SHARD, PLAIN_SHARD]);
    let outcome = executor_for(source, &transport, fast(HarvestOptions::sequential()))
        .run(tasks, None)
        .await
        .unwrap();

    let summary = &outcome.summary;
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 0);
    assert_eq!(summary.empty, 0);

    let mut ids: Vec<&str> = outcome.accumulator.ids().iter().map(String::as_str).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["1000000001", "1000000002", "1000000003"]);
}

#[tokio::test]
async fn test_corrupt_gzip_shard_is_a_parse_failure() {
    let catalog = Catalog::load_embedded().unwrap();
    let source = catalog.source("apple-sitemap").unwrap();
    let mut truncated = gzipped(&urlset(&[1000000001]));
    truncated.truncate(12);
    let transport = Arc::new(
        ScriptedTransport::new(Step::status(404)).route(GZ_SHARD, vec![Step::Respond(RawResponse::ok(truncated))]),
    );

    let outcome = executor_for(source, &transport, fast(HarvestOptions::sequential()))
        .run(enumerate_shard_tasks([GZ_SHARD]), None)
        .await
        .unwrap();

    assert_eq!(outcome.summary.failed, 1);
    assert_eq!(transport.count(GZ_SHARD), 1);
    assert!(outcome.summary.failures[0].message.contains("gzip"));
}
