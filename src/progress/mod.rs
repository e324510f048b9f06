//! Execution lifecycle reporting
//!
//! Every dispatched request produces `STARTED` followed by `COMPLETED` or
//! `FAILED`. Reporting is best-effort: a reporter never returns an error and
//! never aborts the request it describes.

use crate::bus::WeakMessageBus;
use crate::protocol::{
    message_types, Event, ExecutionStatus, ExecutionStatusPayload, MessagePayload,
};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, trace};

#[async_trait]
pub trait ExecutionReporter: Send + Sync {
    async fn report_started(&self, agent_id: &str, request_id: &str);
    async fn report_completed(&self, agent_id: &str, request_id: &str, result: Option<&str>);
    async fn report_failed(&self, agent_id: &str, request_id: &str, error: &str);
}

pub struct NoOpReporter;

#[async_trait]
impl ExecutionReporter for NoOpReporter {
    async fn report_started(&self, _agent_id: &str, _request_id: &str) {}
    async fn report_completed(&self, _agent_id: &str, _request_id: &str, _result: Option<&str>) {}
    async fn report_failed(&self, _agent_id: &str, _request_id: &str, _error: &str) {}
}

/// Build the lifecycle event an agent emits for one request
pub fn status_event(
    agent_id: &str,
    request_id: &str,
    status: ExecutionStatus,
    result: Option<&str>,
    error: Option<&str>,
) -> Event {
    Event::new(
        agent_id,
        message_types::AGENT_EXECUTION_STATUS,
        MessagePayload::ExecutionStatus(ExecutionStatusPayload {
            status,
            agent_id: agent_id.to_string(),
            request_id: request_id.to_string(),
            timestamp: Utc::now(),
            result: result.map(str::to_string),
            error: error.map(str::to_string),
        }),
    )
}

/// Publishes `AGENT_EXECUTION_STATUS` events on the owning bus
///
/// Holds a weak handle so a runtime stored in the bus registry does not keep
/// the bus alive.
pub struct BusStatusReporter {
    bus: WeakMessageBus,
}

impl BusStatusReporter {
    pub fn new(bus: WeakMessageBus) -> Self {
        Self { bus }
    }

    fn publish(&self, event: Event) {
        match self.bus.upgrade() {
            Some(bus) => {
                trace!("Publishing execution status from {}", event.sender_id);
                bus.publish(event);
            }
            None => debug!("Bus dropped, status event discarded"),
        }
    }
}

#[async_trait]
impl ExecutionReporter for BusStatusReporter {
    async fn report_started(&self, agent_id: &str, request_id: &str) {
        self.publish(status_event(
            agent_id,
            request_id,
            ExecutionStatus::Started,
            None,
            None,
        ));
    }

    async fn report_completed(&self, agent_id: &str, request_id: &str, result: Option<&str>) {
        self.publish(status_event(
            agent_id,
            request_id,
            ExecutionStatus::Completed,
            result,
            None,
        ));
    }

    async fn report_failed(&self, agent_id: &str, request_id: &str, error: &str) {
        self.publish(status_event(
            agent_id,
            request_id,
            ExecutionStatus::Failed,
            None,
            Some(error),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MessageBus;

    #[test]
    fn test_status_event_shape() {
        let event = status_event("bug-1", "r1", ExecutionStatus::Failed, None, Some("boom"));

        assert_eq!(event.sender_id, "bug-1");
        assert_eq!(event.event_type, message_types::AGENT_EXECUTION_STATUS);
        assert!(!event.broadcast);
        match event.payload {
            MessagePayload::ExecutionStatus(payload) => {
                assert_eq!(payload.status, ExecutionStatus::Failed);
                assert_eq!(payload.request_id, "r1");
                assert_eq!(payload.error.as_deref(), Some("boom"));
                assert!(payload.result.is_none());
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_noop_reporter() {
        let reporter = NoOpReporter;
        reporter.report_started("a", "r").await;
        reporter.report_completed("a", "r", Some("ok")).await;
        reporter.report_failed("a", "r", "err").await;
    }

    #[tokio::test]
    async fn test_bus_reporter_publishes_to_subscribers() {
        let bus = MessageBus::default();
        let (_id, mut rx) = bus.subscribe_channel([message_types::AGENT_EXECUTION_STATUS]);
        let reporter = BusStatusReporter::new(bus.downgrade());

        reporter.report_started("a", "r1").await;
        reporter.report_completed("a", "r1", Some("empty")).await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(matches!(
            first.payload,
            MessagePayload::ExecutionStatus(ExecutionStatusPayload {
                status: ExecutionStatus::Started,
                ..
            })
        ));
        assert!(matches!(
            second.payload,
            MessagePayload::ExecutionStatus(ExecutionStatusPayload {
                status: ExecutionStatus::Completed,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_bus_reporter_after_bus_dropped() {
        let bus = MessageBus::default();
        let reporter = BusStatusReporter::new(bus.downgrade());
        drop(bus);

        reporter.report_failed("a", "r1", "late").await;
    }
}
