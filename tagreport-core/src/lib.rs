//! # tagreport-core
//!
//! Core library for tagreport - per-tag usage reports for Stack Overflow for Teams.
//!
//! This library provides:
//! - Domain types for tags, posts, users and supplementary counts
//! - The snapshot store (one JSON blob per harvest)
//! - API and web-page harvesters that fill the snapshot
//! - The aggregation engine and CSV report emitter
//! - Configuration management and logging infrastructure
//!
//! ## Architecture
//!
//! ```text
//! API harvester ──┐
//!                 ├─► Snapshot ─► aggregate(window) ─► TagMetrics rows ─► CSV
//! web scraper ────┘      ▲
//!                        └── or loaded from disk (--no-api)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use tagreport_core::analytics::{aggregate, TimeWindow};
//! use tagreport_core::{report, Config, Snapshot};
//!
//! let loaded = Snapshot::load(&Config::snapshot_path()).expect("failed to load snapshot");
//! let window = TimeWindow::past_days(30, chrono::Utc::now()).expect("invalid window");
//! let aggregation = aggregate(&loaded.snapshot, &window);
//!
//! let today = chrono::Utc::now().date_naive();
//! let path = report::write_report(std::path::Path::new("."), &aggregation.rows, window.days(), today)
//!     .expect("failed to write report");
//! println!("wrote {}", path.display());
//! ```

// Re-export commonly used items at the crate root
pub use config::Config;
pub use error::{Error, Result};
pub use snapshot::{DataPoint, LoadedSnapshot, Snapshot, Supplementary};
pub use types::*;

// Public modules
pub mod analytics;
pub mod api;
pub mod config;
pub mod error;
pub mod format;
pub mod logging;
pub mod report;
pub mod scrape;
pub mod snapshot;
pub mod types;
