//! URL extraction.
//!
//! Collects candidate website URLs from pluggable sources (CSV file,
//! Google Places, Google Search scrape), runs them concurrently, and
//! fans the raw URLs into one normalized, deduplicated `Site` list for
//! the audit engine.

pub mod csv_file;
pub mod places;
pub mod search;
mod sites;

use async_trait::async_trait;
use tracing::info;

use siteaudit_core::{Result, Site};

pub use csv_file::CsvFileSource;
pub use places::GooglePlacesSource;
pub use search::GoogleSearchSource;
pub use sites::{filter_sites, IGNORED_BUSINESS_DOMAINS};

/// A fallible producer of candidate website URLs.
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self) -> Result<Vec<String>>;
}

/// Run every source concurrently (first error wins), then normalize,
/// dedupe and filter the combined URL list into audit-ready sites.
pub async fn collect_sites(sources: &[Box<dyn Source>]) -> Result<Vec<Site>> {
    let extractions = sources.iter().map(|source| async move {
        info!(source = source.name(), "extracting URLs");
        let urls = source.extract().await?;
        info!(source = source.name(), count = urls.len(), "source finished");
        Ok::<_, siteaudit_core::Error>(urls)
    });

    let batches = futures::future::try_join_all(extractions).await?;

    Ok(filter_sites(batches.into_iter().flatten()))
}
