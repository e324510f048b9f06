//! Agent runtime tests
//!
//! Concurrency limits, priority ordering, failure containment and lifecycle
//! reporting, observed through the bus the way a caller sees them.


use a2a_analyzer::config::AgentOverrides;
use a2a_analyzer::protocol::{
    message_types, AgentType, ErrorCode, ExecutionStatus, MessagePayload,
};
use a2a_analyzer::testing::mocks::{MockAgent, MockBehavior};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use test_helpers::{collect_events, request, test_bus};
use tokio_test::assert_ok;

fn execution_status(payload: &MessagePayload) -> (String, ExecutionStatus) {
    match payload {
        MessagePayload::ExecutionStatus(status) => (status.request_id.clone(), status.status),
        other => panic!("unexpected payload {}", other.kind()),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_never_exceeds_declared_bound() {
    let bus = test_bus();
    let agent = Arc::new(
        MockAgent::new("bounded", AgentType::BugDetection)
            .handling(message_types::BUG_ANALYSIS_REQUEST)
            .with_max_concurrent(2)
            .with_delay(Duration::from_millis(30)),
    );
    let runtime = bus.register_agent(agent.clone());

    let requests = (0..10).map(|_| bus.request_response(request(message_types::BUG_ANALYSIS_REQUEST)));
    let responses = join_all(requests).await;

    assert!(responses.iter().all(|r| r.success));
    assert_eq!(agent.call_count(), 10);
    assert_eq!(agent.peak_in_flight(), 2);
    assert!(runtime.peak_in_flight() <= 2);
    assert_eq!(runtime.in_flight(), 0);
    assert_eq!(runtime.queued(), 0);
}

#[tokio::test]
async fn test_configured_bound_overrides_declared_one() {
    let bus = test_bus();
    let agent = Arc::new(
        MockAgent::new("overridden", AgentType::CodeQuality)
            .handling(message_types::CODE_QUALITY_REQUEST)
            .with_max_concurrent(8)
            .with_delay(Duration::from_millis(20)),
    );
    let runtime = bus.register_agent_with(
        agent.clone(),
        &AgentOverrides {
            max_concurrent_messages: Some(1),
            priority: None,
        },
    );
    assert_eq!(runtime.descriptor().max_concurrent_messages, 1);

    let requests = (0..4).map(|_| bus.request_response(request(message_types::CODE_QUALITY_REQUEST)));
    join_all(requests).await;

    assert_eq!(agent.peak_in_flight(), 1);
}

#[tokio::test]
async fn test_queued_requests_are_served_by_priority() {
    let bus = test_bus();
    let agent = Arc::new(
        MockAgent::new("serial", AgentType::BugDetection)
            .handling(message_types::BUG_ANALYSIS_REQUEST)
            .with_max_concurrent(1)
            .with_delay(Duration::from_millis(50)),
    );
    bus.register_agent(agent.clone());

    let mut handles = Vec::new();
    for (id, priority) in [("blocker", 100), ("low", 200), ("normal", 100), ("urgent", 1)] {
        let bus = bus.clone();
        let request = request(message_types::BUG_ANALYSIS_REQUEST)
            .with_id(id)
            .with_priority(priority);
        handles.push(tokio::spawn(async move { bus.request_response(request).await }));
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }

    assert_eq!(
        agent.handled_requests(),
        vec!["blocker", "urgent", "normal", "low"]
    );
}

#[tokio::test]
async fn test_unsupported_type_never_reaches_handler() {
    let bus = test_bus();
    let agent = Arc::new(
        MockAgent::new("picky", AgentType::CodeReview)
            .handling("REVIEW_REQUEST")
            .with_behavior(MockBehavior::NotApplicable),
    );
    bus.register_agent(agent.clone());

    let response = bus.request_response(request("REVIEW_REQUEST")).await;
    assert_eq!(response.error_code(), Some(ErrorCode::UnsupportedType));
    assert_eq!(agent.call_count(), 1);

    let response = bus.request_response(request("SOMETHING_ELSE")).await;
    assert_eq!(response.error_code(), Some(ErrorCode::AgentUnavailable));
    assert_eq!(agent.call_count(), 1);
}

#[tokio::test]
async fn test_agent_survives_handler_panic() {
    let bus = test_bus();
    let agent = Arc::new(
        MockAgent::new("fragile", AgentType::BugDetection)
            .handling(message_types::BUG_ANALYSIS_REQUEST)
            .with_behavior(MockBehavior::Panic),
    );
    let runtime = bus.register_agent(agent.clone());

    let response = bus
        .request_response(request(message_types::BUG_ANALYSIS_REQUEST))
        .await;
    assert!(!response.success);
    assert_eq!(response.error_code(), Some(ErrorCode::InternalError));
    assert!(response
        .error_detail()
        .is_some_and(|detail| detail.contains("mock handler panic")));
    assert_eq!(runtime.in_flight(), 0);

    agent.set_behavior(MockBehavior::Reply);
    let response = bus
        .request_response(request(message_types::BUG_ANALYSIS_REQUEST))
        .await;
    assert!(response.success);
    assert_eq!(bus.metrics().handler_panics, 1);
}

#[tokio::test]
async fn test_lifecycle_events_are_published() {
    let bus = test_bus();
    let agent = Arc::new(
        MockAgent::new("reporter", AgentType::CodeQuality)
            .handling(message_types::CODE_QUALITY_REQUEST),
    );
    bus.register_agent(agent.clone());
    let (_sub, mut statuses) = bus.subscribe_channel([message_types::AGENT_EXECUTION_STATUS]);

    let ok = bus
        .request_response(request(message_types::CODE_QUALITY_REQUEST).with_id("ok"))
        .await;
    assert!(ok.success);

    agent.set_behavior(MockBehavior::Fail(ErrorCode::InternalError));
    let failed = bus
        .request_response(request(message_types::CODE_QUALITY_REQUEST).with_id("bad"))
        .await;
    assert!(!failed.success);

    let events = collect_events(&mut statuses, 4, Duration::from_millis(500)).await;
    let statuses: Vec<_> = events.iter().map(|e| execution_status(&e.payload)).collect();
    assert_eq!(
        statuses,
        vec![
            ("ok".to_string(), ExecutionStatus::Started),
            ("ok".to_string(), ExecutionStatus::Completed),
            ("bad".to_string(), ExecutionStatus::Started),
            ("bad".to_string(), ExecutionStatus::Failed),
        ]
    );
    assert!(events.iter().all(|e| e.sender_id == "reporter" && !e.broadcast));
}

#[tokio::test]
async fn test_request_cancelled_while_queued_never_runs() {
    let bus = test_bus();
    let agent = Arc::new(
        MockAgent::new("busy", AgentType::BugDetection)
            .handling(message_types::BUG_ANALYSIS_REQUEST)
            .with_max_concurrent(1)
            .with_delay(Duration::from_millis(150)),
    );
    let runtime = bus.register_agent(agent.clone());

    let blocker = {
        let bus = bus.clone();
        tokio::spawn(async move {
            bus.request_response(request(message_types::BUG_ANALYSIS_REQUEST).with_id("first"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(10)).await;

    let queued = bus
        .request_response(
            request(message_types::BUG_ANALYSIS_REQUEST)
                .with_id("second")
                .with_timeout_ms(30),
        )
        .await;
    assert_eq!(queued.error_code(), Some(ErrorCode::Timeout));

    let first = assert_ok!(blocker.await);
    assert!(first.success);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(agent.handled_requests(), vec!["first"]);
    assert_eq!(runtime.queued(), 0);
}
