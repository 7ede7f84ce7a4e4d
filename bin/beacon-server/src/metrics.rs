//! Prometheus metrics for the discovery API

use anyhow::Result;
use prometheus::{CounterVec, Encoder, IntGauge, Opts, Registry, TextEncoder};

/// Collector for the HTTP operation surface.
pub struct Metrics {
    /// API requests by operation and response code.
    pub requests_total: CounterVec,
    /// Long-poll waiters currently hanging.
    pub pollers: IntGauge,
    registry: Registry,
}

impl Metrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new("discovery_requests_total", "Total discovery API requests"),
            &["path", "code"],
        )?;
        let pollers = IntGauge::new("discovery_pollers", "Long-poll waiters currently hanging")?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(pollers.clone()))?;

        Ok(Self {
            requests_total,
            pollers,
            registry,
        })
    }

    pub fn observe(&self, path: &str, code: i64) {
        self.requests_total
            .with_label_values(&[path, &code.to_string()])
            .inc();
    }

    /// Render the Prometheus text exposition for /metrics.
    pub fn encode(&self) -> Result<String> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }
}
