//! Thread-safe bus counters
//!
//! One `BusMetrics` is owned by each bus instance and shared with the agent
//! runtimes it creates. Atomics only, so recording never blocks dispatch.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct BusMetrics {
    requests_routed: AtomicU64,
    requests_unavailable: AtomicU64,
    requests_timed_out: AtomicU64,
    responses_resolved: AtomicU64,
    late_responses_dropped: AtomicU64,
    unsupported_rejections: AtomicU64,
    handler_failures: AtomicU64,
    handler_panics: AtomicU64,
    events_published: AtomicU64,
    event_deliveries: AtomicU64,
    event_delivery_failures: AtomicU64,
}

impl BusMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_routed(&self) {
        self.requests_routed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_unavailable(&self) {
        self.requests_unavailable.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_timed_out(&self) {
        self.requests_timed_out.fetch_add(1, Ordering::Relaxed);
    }

    pub fn response_resolved(&self) {
        self.responses_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn late_response_dropped(&self) {
        self.late_responses_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn unsupported_rejected(&self) {
        self.unsupported_rejections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_failed(&self) {
        self.handler_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn handler_panicked(&self) {
        self.handler_panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_published(&self) {
        self.events_published.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_delivered(&self) {
        self.event_deliveries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_delivery_failed(&self) {
        self.event_delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            requests_routed: self.requests_routed.load(Ordering::Relaxed),
            requests_unavailable: self.requests_unavailable.load(Ordering::Relaxed),
            requests_timed_out: self.requests_timed_out.load(Ordering::Relaxed),
            responses_resolved: self.responses_resolved.load(Ordering::Relaxed),
            late_responses_dropped: self.late_responses_dropped.load(Ordering::Relaxed),
            unsupported_rejections: self.unsupported_rejections.load(Ordering::Relaxed),
            handler_failures: self.handler_failures.load(Ordering::Relaxed),
            handler_panics: self.handler_panics.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            event_deliveries: self.event_deliveries.load(Ordering::Relaxed),
            event_delivery_failures: self.event_delivery_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub requests_routed: u64,
    pub requests_unavailable: u64,
    pub requests_timed_out: u64,
    pub responses_resolved: u64,
    pub late_responses_dropped: u64,
    pub unsupported_rejections: u64,
    pub handler_failures: u64,
    pub handler_panics: u64,
    pub events_published: u64,
    pub event_deliveries: u64,
    pub event_delivery_failures: u64,
}
