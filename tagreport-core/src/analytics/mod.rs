//! Aggregation of snapshot records into per-tag metrics
//!
//! - [`window`]: the creation-date cutoff applied to posts
//! - [`engine`]: the fold from [`Snapshot`](crate::snapshot::Snapshot) to ranked [`TagMetrics`] rows

pub mod engine;
pub mod window;

pub use engine::{aggregate, Aggregation, TagMetrics};
pub use window::TimeWindow;
