//! minirpc Metrics Collection
//!
//! Thread-safe counters and latency histograms for minirpc servers.
//!
//! # Architecture
//!
//! - [`MetricsRegistry`]: lock-free counters plus per-method statistics
//! - [`MetricsCollector`]: the interface the server reports through
//! - [`MetricsSnapshot`] / [`ServerInfo`]: serializable views for the debug page
//!
//! # Usage Example
//!
//! ```rust
//! use minirpc_metrics::{MetricsCollector, ServerMetricsCollector};
//! use std::time::Instant;
//!
//! let collector = ServerMetricsCollector::new();
//!
//! let start = Instant::now();
//! collector.record_call("Foo.Sum", start, true);
//!
//! let snapshot = collector.snapshot();
//! println!("Total requests: {}", snapshot.total_requests);
//! ```

mod collector;
mod registry;
mod snapshot;

pub use collector::{MetricsCollector, ServerMetricsCollector};
pub use registry::MetricsRegistry;
pub use snapshot::{MethodMetrics, MetricsSnapshot, ServerInfo};
