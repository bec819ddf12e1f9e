//! Platform API harvesting
//!
//! Pulls the complete, unfiltered corpus from a Stack Overflow for Teams
//! instance into a [`Snapshot`](crate::snapshot::Snapshot).
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐    ┌───────────────┐    ┌──────────────┐    ┌──────────┐
//! │  ApiClient   │ ─► │    records    │ ─► │ ApiHarvester │ ─► │ Snapshot │
//! │ (paging,     │    │ (JSON → typed │    │ (orchestrate,│    │          │
//! │  retry)      │    │  skip + count)│    │  single writer)   │          │
//! └──────────────┘    └───────────────┘    └──────────────┘    └──────────┘
//! ```
//!
//! Two API versions are used: v2.3 for questions (answers embedded),
//! articles and users, and v3 for tags and their subject-matter experts.

mod client;
mod harvester;
pub mod records;

pub use client::{ApiClient, ApiVersion, Edition};
pub use harvester::{ApiHarvester, HarvestOutcome, HarvestStats, SyncHarvester};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared flag used to abort a harvest between requests.
///
/// Cloning shares the flag, so a signal handler can hold one clone while the
/// harvester checks another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Returns [`Error::Cancelled`](crate::Error::Cancelled) once cancelled.
    pub fn check(&self) -> crate::Result<()> {
        if self.is_cancelled() {
            Err(crate::Error::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let handle = token.clone();
        assert!(token.check().is_ok());

        handle.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(token.check(), Err(crate::Error::Cancelled)));
    }
}
