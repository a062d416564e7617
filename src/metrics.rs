use prometheus::{
    register_counter_with_registry, register_gauge_with_registry, register_histogram_with_registry,
    Counter, Gauge, Histogram, Registry,
};
use std::sync::Arc;

pub struct GatewayMetrics {
    pub outstanding_codes: Gauge,
    pub active_rooms: Gauge,
    pub connected_clients: Gauge,
    pub codes_generated: Counter,
    pub codes_verified: Counter,
    pub codes_rejected: Counter,
    pub codes_expired: Counter,
    pub rooms_reclaimed: Counter,
    pub messages_relayed: Counter,
    pub deliveries_dropped: Counter,
    pub request_latency: Histogram,
    pub registry: Arc<Registry>,
}

impl GatewayMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Arc::new(Registry::new());

        let outstanding_codes = register_gauge_with_registry!(
            "pairlink_outstanding_codes",
            "Number of unconsumed pairing codes",
            registry
        )?;

        let active_rooms = register_gauge_with_registry!(
            "pairlink_active_rooms",
            "Number of rooms in the directory",
            registry
        )?;

        let connected_clients = register_gauge_with_registry!(
            "pairlink_connected_clients",
            "Number of live WebSocket connections",
            registry
        )?;

        let codes_generated = register_counter_with_registry!(
            "pairlink_codes_generated_total",
            "Total pairing codes issued",
            registry
        )?;

        let codes_verified = register_counter_with_registry!(
            "pairlink_codes_verified_total",
            "Total successful code verifications",
            registry
        )?;

        let codes_rejected = register_counter_with_registry!(
            "pairlink_codes_rejected_total",
            "Total rejected code verifications",
            registry
        )?;

        let codes_expired = register_counter_with_registry!(
            "pairlink_codes_expired_total",
            "Total pairing codes evicted after TTL",
            registry
        )?;

        let rooms_reclaimed = register_counter_with_registry!(
            "pairlink_rooms_reclaimed_total",
            "Total idle rooms reclaimed",
            registry
        )?;

        let messages_relayed = register_counter_with_registry!(
            "pairlink_messages_relayed_total",
            "Total payload deliveries fanned out",
            registry
        )?;

        let deliveries_dropped = register_counter_with_registry!(
            "pairlink_deliveries_dropped_total",
            "Total per-recipient deliveries dropped on dead connections",
            registry
        )?;

        let request_latency = register_histogram_with_registry!(
            "pairlink_request_latency_seconds",
            "HTTP request latency in seconds",
            registry
        )?;

        Ok(Self {
            outstanding_codes,
            active_rooms,
            connected_clients,
            codes_generated,
            codes_verified,
            codes_rejected,
            codes_expired,
            rooms_reclaimed,
            messages_relayed,
            deliveries_dropped,
            request_latency,
            registry,
        })
    }

    pub fn export_prometheus(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer).unwrap();
        String::from_utf8(buffer).unwrap()
    }
}

impl Default for GatewayMetrics {
    fn default() -> Self {
        Self::new().unwrap()
    }
}
