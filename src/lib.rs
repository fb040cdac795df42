//! newsreel — feed ingestion and article extraction pipeline.
//!
//! One [`pipeline::run_cycle`] invocation polls every active source in the
//! registry, normalizes its feed into items, fetches and extracts the full
//! readable body of each linked article under bounded concurrency, and
//! persists deduplicated rows. Failures are contained at the smallest
//! possible scope: item failures never fail their source, source failures
//! never fail the cycle.

pub mod config;
pub mod extract;
pub mod feed;
pub mod fetch;
pub mod pipeline;
pub mod storage;
pub mod util;
