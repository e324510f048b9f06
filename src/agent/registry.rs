//! Agent Registry
//!
//! Thread-safe, explicitly owned collection of agent runtimes. Each bus owns
//! one registry; there is no process-wide instance. Lookups preserve
//! registration order so routing by message type is a deterministic first
//! match.

use crate::agent::runtime::{AgentDescriptor, AgentRuntime};
use crate::protocol::AgentType;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// Thread-safe registry of agent runtimes
#[derive(Debug, Clone, Default)]
pub struct AgentRegistry {
    /// Runtimes in registration order
    agents: Arc<RwLock<Vec<Arc<AgentRuntime>>>>,
}

impl AgentRegistry {
    /// Create a new empty agent registry
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Vec<Arc<AgentRuntime>>> {
        self.agents.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Arc<AgentRuntime>>> {
        self.agents.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a runtime, replacing any entry with the same agent id
    ///
    /// A replacement keeps the original registration slot. Returns the
    /// runtime that was replaced, if any.
    pub fn register(&self, runtime: Arc<AgentRuntime>) -> Option<Arc<AgentRuntime>> {
        let agent_id = runtime.agent_id().to_string();
        let mut agents = self.write();

        match agents.iter().position(|r| r.agent_id() == agent_id) {
            Some(index) => {
                let previous = std::mem::replace(&mut agents[index], runtime);
                debug!("Replaced agent registration: {}", agent_id);
                Some(previous)
            }
            None => {
                info!(
                    "Registered new agent: {} ({})",
                    agent_id,
                    runtime.descriptor().agent_type
                );
                agents.push(runtime);
                None
            }
        }
    }

    /// Remove an agent; returns false if it was not registered
    ///
    /// Requests already dispatched to the runtime keep running because they
    /// hold their own reference to it.
    pub fn unregister(&self, agent_id: &str) -> bool {
        let mut agents = self.write();
        let before = agents.len();
        agents.retain(|r| r.agent_id() != agent_id);
        let removed = agents.len() != before;

        if removed {
            info!("Unregistered agent: {}", agent_id);
        } else {
            debug!("Unregister ignored, agent not registered: {}", agent_id);
        }
        removed
    }

    /// Get an agent runtime by ID
    pub fn get_agent(&self, agent_id: &str) -> Option<Arc<AgentRuntime>> {
        self.read()
            .iter()
            .find(|r| r.agent_id() == agent_id)
            .cloned()
    }

    /// All agents of a type, possibly none
    pub fn get_agents_by_type(&self, agent_type: AgentType) -> Vec<Arc<AgentRuntime>> {
        self.read()
            .iter()
            .filter(|r| r.descriptor().agent_type == agent_type)
            .cloned()
            .collect()
    }

    /// Agents eligible for a message type, in registration order
    pub fn find_agents_for_message_type(&self, message_type: &str) -> Vec<Arc<AgentRuntime>> {
        let candidates: Vec<_> = self
            .read()
            .iter()
            .filter(|r| r.supports(message_type))
            .cloned()
            .collect();

        if candidates.is_empty() {
            debug!("No agents found for message type: {}", message_type);
        }
        candidates
    }

    /// Get count of registered agents
    pub fn agent_count(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Agent ids in registration order
    pub fn agent_ids(&self) -> Vec<String> {
        self.read()
            .iter()
            .map(|r| r.agent_id().to_string())
            .collect()
    }

    /// Descriptors of every registered agent, in registration order
    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        self.read().iter().map(|r| r.descriptor().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentOverrides;
    use crate::testing::mocks::MockAgent;

    fn runtime(agent: MockAgent) -> Arc<AgentRuntime> {
        Arc::new(AgentRuntime::standalone(
            Arc::new(agent),
            &AgentOverrides::default(),
        ))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = AgentRegistry::new();
        assert!(registry.is_empty());

        registry.register(runtime(
            MockAgent::new("bug-1", AgentType::BugDetection).handling("BUG_ANALYSIS_REQUEST"),
        ));
        registry.register(runtime(
            MockAgent::new("quality-1", AgentType::CodeQuality).handling("CODE_QUALITY_REQUEST"),
        ));

        assert_eq!(registry.agent_count(), 2);
        assert!(registry.get_agent("bug-1").is_some());
        assert!(registry.get_agent("missing").is_none());
        assert_eq!(registry.get_agents_by_type(AgentType::CodeQuality).len(), 1);
        assert!(registry
            .get_agents_by_type(AgentType::VulnerabilityScanner)
            .is_empty());
    }

    #[test]
    fn test_reregister_replaces_in_place() {
        let registry = AgentRegistry::new();
        registry.register(runtime(
            MockAgent::new("a", AgentType::BugDetection).handling("X"),
        ));
        registry.register(runtime(
            MockAgent::new("b", AgentType::BugDetection).handling("X"),
        ));

        let previous = registry.register(runtime(
            MockAgent::new("a", AgentType::CodeReview).handling("Y"),
        ));

        assert!(previous.is_some());
        assert_eq!(registry.agent_count(), 2);
        assert_eq!(registry.agent_ids(), vec!["a", "b"]);
        assert_eq!(
            registry.get_agent("a").unwrap().descriptor().agent_type,
            AgentType::CodeReview
        );
        // "a" no longer handles X, so routing falls through to "b"
        let candidates = registry.find_agents_for_message_type("X");
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].agent_id(), "b");
    }

    #[test]
    fn test_message_type_lookup_is_registration_ordered() {
        let registry = AgentRegistry::new();
        for id in ["first", "second", "third"] {
            registry.register(runtime(
                MockAgent::new(id, AgentType::BugDetection).handling("BUG_ANALYSIS_REQUEST"),
            ));
        }

        let ids: Vec<_> = registry
            .find_agents_for_message_type("BUG_ANALYSIS_REQUEST")
            .iter()
            .map(|r| r.agent_id().to_string())
            .collect();
        assert_eq!(ids, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let registry = AgentRegistry::new();
        registry.register(runtime(MockAgent::new("a", AgentType::BugDetection)));

        assert!(registry.unregister("a"));
        assert!(!registry.unregister("a"));
        assert!(!registry.unregister("never-registered"));
        assert_eq!(registry.agent_count(), 0);
    }

    #[test]
    fn test_clones_share_state() {
        let registry = AgentRegistry::new();
        let clone = registry.clone();
        clone.register(runtime(MockAgent::new("a", AgentType::CodeQuality)));
        assert_eq!(registry.agent_count(), 1);
        assert_eq!(registry.descriptors()[0].agent_id, "a");
    }
}
