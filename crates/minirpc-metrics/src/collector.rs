// Copyright 2025 minirpc Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::registry::MetricsRegistry;
use crate::snapshot::{MetricsSnapshot, ServerInfo};
use std::sync::Arc;
use std::time::Instant;

/// Trait for metrics collection in minirpc servers.
///
/// The server calls [`record_call`](Self::record_call) once per dispatched
/// invocation and brackets every served connection with
/// [`connection_opened`](Self::connection_opened) /
/// [`connection_closed`](Self::connection_closed).
///
/// # Example
///
/// ```rust
/// use minirpc_metrics::{MetricsCollector, ServerMetricsCollector};
/// use std::time::Instant;
///
/// let collector = ServerMetricsCollector::new();
///
/// let start = Instant::now();
/// // ... invoke the method ...
/// collector.record_call("Foo.Sum", start, true);
///
/// assert_eq!(collector.snapshot().total_requests, 1);
/// ```
pub trait MetricsCollector: Send + Sync {
    /// Records an invocation with its outcome and the latency since `start_time`.
    fn record_call(&self, method: &str, start_time: Instant, success: bool);

    fn connection_opened(&self);

    fn connection_closed(&self);

    /// Takes a snapshot of the current metrics state.
    fn snapshot(&self) -> MetricsSnapshot;

    fn info(&self) -> ServerInfo;
}

/// Default collector, backed by a [`MetricsRegistry`].
#[derive(Debug, Default)]
pub struct ServerMetricsCollector {
    registry: Arc<MetricsRegistry>,
}

impl ServerMetricsCollector {
    pub fn new() -> Self {
        Self {
            registry: Arc::new(MetricsRegistry::new()),
        }
    }

    pub fn with_registry(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetricsRegistry> {
        &self.registry
    }
}

impl MetricsCollector for ServerMetricsCollector {
    fn record_call(&self, method: &str, start_time: Instant, success: bool) {
        let latency_us = start_time.elapsed().as_micros() as u64;
        self.registry.record_method_call(method, latency_us, success);
    }

    fn connection_opened(&self) {
        self.registry.increment_active_connections();
    }

    fn connection_closed(&self) {
        self.registry.decrement_active_connections();
    }

    fn snapshot(&self) -> MetricsSnapshot {
        self.registry.snapshot()
    }

    fn info(&self) -> ServerInfo {
        ServerInfo::new(self.registry.uptime_ms())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_metrics_collector() {
        let collector = ServerMetricsCollector::new();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_requests, 0);
        assert!(snapshot.methods.is_empty());

        collector.connection_opened();
        collector.record_call("Foo.Sum", Instant::now(), true);
        collector.record_call("Foo.Sum", Instant::now(), false);
        collector.connection_closed();

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.total_requests, 2);
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.total_connections, 1);
        assert_eq!(snapshot.active_connections, 0);
    }

    #[test]
    fn test_shared_registry() {
        let registry = Arc::new(MetricsRegistry::new());
        let collector = ServerMetricsCollector::with_registry(registry.clone());

        collector.record_call("Foo.Sleep", Instant::now(), true);
        assert_eq!(registry.snapshot().methods["Foo.Sleep"].call_count, 1);
    }

    #[test]
    fn test_info_serializes() {
        let info = ServerMetricsCollector::new().info();
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["name"], "minirpc");
        assert!(json["version"].is_string());
    }
}
