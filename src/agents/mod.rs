//! Built-in agents
//!
//! Ordinary `A2AAgent` implementations that speak the same request/response
//! contract as any external collaborator would.

pub mod bug_detection;
pub mod code_quality;
pub mod project_scanner;
pub mod report_generator;
pub mod rules;
pub mod scan;

pub use bug_detection::BugDetectionAgent;
pub use code_quality::CodeQualityAgent;
pub use project_scanner::ProjectScannerAgent;
pub use report_generator::ReportGeneratorAgent;

use crate::bus::{MessageBus, WeakMessageBus};
use crate::config::AppConfig;
use crate::error::AgentError;
use crate::protocol::{AgentType, CustomPayload, Event, MessagePayload};
use std::sync::Arc;
use tracing::debug;

/// Payload type of every analysis request: `data.root` names the project
pub const ANALYSIS_TARGET_PAYLOAD_TYPE: &str = "analysis_target";

/// Build an analysis request payload for `root`
pub fn analysis_target(root: impl Into<String>) -> MessagePayload {
    MessagePayload::Custom(
        CustomPayload::new(ANALYSIS_TARGET_PAYLOAD_TYPE).with("root", root.into()),
    )
}

/// The `root` of an analysis target payload
pub fn analysis_root(payload: &MessagePayload) -> Result<&str, AgentError> {
    let custom = payload.as_custom()?;
    if custom.payload_type != ANALYSIS_TARGET_PAYLOAD_TYPE {
        return Err(AgentError::validation_error(format!(
            "expected '{ANALYSIS_TARGET_PAYLOAD_TYPE}' payload, got '{}'",
            custom.payload_type
        )));
    }
    custom.require_str("root")
}

/// Publishes an agent's domain events, if it is attached to a bus
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender_id: String,
    bus: WeakMessageBus,
}

impl EventEmitter {
    pub fn new(sender_id: impl Into<String>, bus: WeakMessageBus) -> Self {
        Self {
            sender_id: sender_id.into(),
            bus,
        }
    }

    /// An emitter that discards everything
    pub fn detached(sender_id: impl Into<String>) -> Self {
        Self::new(sender_id, WeakMessageBus::default())
    }

    pub fn emit(&self, event_type: &str, payload: MessagePayload, broadcast: bool) {
        let Some(bus) = self.bus.upgrade() else {
            debug!("{} not attached to a bus, {} discarded", self.sender_id, event_type);
            return;
        };
        let event = Event::new(&self.sender_id, event_type, payload);
        bus.publish(if broadcast { event.broadcast() } else { event });
    }
}

/// Register the scanner, both analyzers and the report generator
pub fn register_builtin_agents(bus: &MessageBus, config: &AppConfig) {
    let weak = bus.downgrade();

    bus.register_agent_with(
        Arc::new(ProjectScannerAgent::new(
            config.scanner.clone(),
            EventEmitter::new(project_scanner::PROJECT_SCANNER_ID, weak.clone()),
        )),
        &config.overrides_for(AgentType::ProjectScanner),
    );
    bus.register_agent_with(
        Arc::new(BugDetectionAgent::new(
            config.scanner.clone(),
            EventEmitter::new(bug_detection::BUG_DETECTION_ID, weak.clone()),
        )),
        &config.overrides_for(AgentType::BugDetection),
    );
    bus.register_agent_with(
        Arc::new(CodeQualityAgent::new(
            config.scanner.clone(),
            EventEmitter::new(code_quality::CODE_QUALITY_ID, weak.clone()),
        )),
        &config.overrides_for(AgentType::CodeQuality),
    );
    bus.register_agent_with(
        Arc::new(ReportGeneratorAgent::new(
            weak.clone(),
            config.report.clone(),
            config.scoring.clone(),
            EventEmitter::new(report_generator::REPORT_GENERATOR_ID, weak),
        )),
        &config.overrides_for(AgentType::ReportGenerator),
    );
}

/// A bus configured from `config` with every built-in agent registered
pub fn build_default_bus(config: &AppConfig) -> MessageBus {
    let bus = MessageBus::new(config.bus.clone());
    register_builtin_agents(&bus, config);
    bus.log_summary();
    bus
}
