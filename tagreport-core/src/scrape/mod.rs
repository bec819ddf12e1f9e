//! Supplementary data from authenticated web pages
//!
//! Webhook and tag-watcher counts are not exposed by the API. When enabled,
//! a [`WebScraper`] reads them from admin pages using a browser session.
//! The aggregation engine never talks to this module; it only sees the
//! merged [`Supplementary`](crate::snapshot::Supplementary) data.

pub mod html;
mod web;

pub use web::WebScraper;

use crate::error::Result;
use crate::snapshot::{Snapshot, Supplementary};

/// Where supplementary data for a harvest comes from.
pub enum SupplementarySource {
    /// Not requested; the snapshot carries no supplementary data points
    None,
    Scraper(WebScraper),
}

impl SupplementarySource {
    /// Collect supplementary data for the tags and users in `snapshot`.
    pub async fn collect(
        &self,
        snapshot: &Snapshot,
        on_progress: &mut (dyn FnMut(&str, usize) + Send),
    ) -> Result<Supplementary> {
        match self {
            SupplementarySource::None => Ok(Supplementary::default()),
            SupplementarySource::Scraper(scraper) => {
                tracing::info!("Collecting supplementary data from web pages");
                scraper.collect(snapshot, on_progress).await
            }
        }
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, SupplementarySource::Scraper(_))
    }
}
