//! Integration tests module loader

mod support;

mod integration {
    pub mod cancellation;
    pub mod cli;
    pub mod parallel_harvest;
    pub mod retry_pass;
    pub mod sequential_harvest;
    pub mod sitemap_shards;
    pub mod sqlite_sink;
}

mod unit {
    pub mod enumeration;
    pub mod snapshot_files;
}
