//! Project scanner agent
//!
//! Answers `PROJECT_SCAN_REQUEST` with the project's file layout and detected
//! build system. Results are cached per root for the life of the agent.

use super::scan::{self, ScanResult};
use super::{analysis_root, EventEmitter};
use crate::agent::runtime::{A2AAgent, RequestContext};
use crate::config::ScannerSection;
use crate::error::AgentError;
use crate::protocol::{
    message_types, AgentType, MessagePayload, ProjectStructurePayload, Request, Response,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};

pub const PROJECT_SCANNER_ID: &str = "project-scanner";

/// Marker files checked in order; the first present one wins
const PROJECT_MARKERS: &[(&str, &str)] = &[
    ("Cargo.toml", "rust"),
    ("build.gradle.kts", "gradle"),
    ("build.gradle", "gradle"),
    ("pom.xml", "maven"),
    ("package.json", "node"),
    ("pyproject.toml", "python"),
    ("setup.py", "python"),
    ("go.mod", "go"),
];

pub fn detect_project_type(root: &Path) -> &'static str {
    PROJECT_MARKERS
        .iter()
        .find(|(marker, _)| root.join(marker).is_file())
        .map(|(_, kind)| *kind)
        .unwrap_or("unknown")
}

pub struct ProjectScannerAgent {
    agent_id: String,
    config: ScannerSection,
    cache: Mutex<HashMap<PathBuf, ProjectStructurePayload>>,
    events: EventEmitter,
}

impl ProjectScannerAgent {
    pub fn new(config: ScannerSection, events: EventEmitter) -> Self {
        Self {
            agent_id: PROJECT_SCANNER_ID.to_string(),
            config,
            cache: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn cached_roots(&self) -> usize {
        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    async fn scan(&self, root: PathBuf) -> Result<ProjectStructurePayload, AgentError> {
        let cached = self
            .cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&root)
            .cloned();
        if let Some(cached) = cached {
            debug!("Scan cache hit for {}", root.display());
            return Ok(cached);
        }

        let config = self.config.clone();
        let scan_root = root.clone();
        let (result, project_type) = scan::run_blocking(move || {
            let result: ScanResult = scan::walk(&scan_root, &config)?;
            Ok((result, detect_project_type(&scan_root)))
        })
        .await?;

        info!(
            "Scanned {}: {} files, {} directories ({})",
            root.display(),
            result.files.len(),
            result.directories.len(),
            project_type
        );

        let structure = ProjectStructurePayload {
            total_files: result.files.len(),
            files: result.files,
            directories: result.directories,
            project_type: project_type.to_string(),
            scanned_at: Utc::now(),
        };

        self.cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(root, structure.clone());
        Ok(structure)
    }
}

#[async_trait]
impl A2AAgent for ProjectScannerAgent {
    fn a2a_agent_id(&self) -> &str {
        &self.agent_id
    }

    fn agent_type(&self) -> AgentType {
        AgentType::ProjectScanner
    }

    fn supported_message_types(&self) -> Vec<String> {
        vec![message_types::PROJECT_SCAN_REQUEST.to_string()]
    }

    fn published_event_types(&self) -> Vec<String> {
        vec![message_types::PROJECT_SCANNED.to_string()]
    }

    fn message_processing_priority(&self) -> i32 {
        10
    }

    async fn handle_request(
        &self,
        request: &Request,
        _ctx: &RequestContext,
    ) -> Result<Option<Response>, AgentError> {
        if request.message_type != message_types::PROJECT_SCAN_REQUEST {
            return Ok(None);
        }

        let root = scan::resolve_root(analysis_root(&request.payload)?)?;
        let structure = self.scan(root).await?;
        let payload = MessagePayload::ProjectStructure(structure);

        self.events
            .emit(message_types::PROJECT_SCANNED, payload.clone(), false);
        Ok(Some(Response::success(&self.agent_id, &request.id, payload)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::CustomPayload;
    use std::fs;
    use tempfile::TempDir;

    fn target(root: &Path) -> MessagePayload {
        MessagePayload::Custom(
            CustomPayload::new(crate::agents::ANALYSIS_TARGET_PAYLOAD_TYPE)
                .with("root", root.to_string_lossy().into_owned()),
        )
    }

    #[test]
    fn test_detect_project_type() {
        let dir = TempDir::new().unwrap();
        assert_eq!(detect_project_type(dir.path()), "unknown");

        fs::write(dir.path().join("package.json"), "{}").unwrap();
        assert_eq!(detect_project_type(dir.path()), "node");

        fs::write(dir.path().join("build.gradle.kts"), "").unwrap();
        assert_eq!(detect_project_type(dir.path()), "gradle");

        fs::write(dir.path().join("Cargo.toml"), "").unwrap();
        assert_eq!(detect_project_type(dir.path()), "rust");
    }

    #[tokio::test]
    async fn test_scan_request_returns_structure_and_caches() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("src")).unwrap();
        fs::write(dir.path().join("Cargo.toml"), "").unwrap();
        fs::write(dir.path().join("src/lib.rs"), "").unwrap();

        let agent = ProjectScannerAgent::new(ScannerSection::default(), EventEmitter::detached(PROJECT_SCANNER_ID));
        let request = Request::new("t", message_types::PROJECT_SCAN_REQUEST, target(dir.path()));

        let response = agent
            .handle_request(&request, &RequestContext::default())
            .await
            .unwrap()
            .unwrap();

        let structure = response.payload.as_project_structure().unwrap();
        assert_eq!(structure.project_type, "rust");
        assert_eq!(structure.total_files, 2);
        assert_eq!(structure.directories, vec!["src"]);
        assert_eq!(agent.cached_roots(), 1);

        agent
            .handle_request(&request, &RequestContext::default())
            .await
            .unwrap();
        assert_eq!(agent.cached_roots(), 1);
    }

    #[tokio::test]
    async fn test_missing_root_is_validation_error() {
        let agent = ProjectScannerAgent::new(ScannerSection::default(), EventEmitter::detached(PROJECT_SCANNER_ID));
        let request = Request::new(
            "t",
            message_types::PROJECT_SCAN_REQUEST,
            MessagePayload::Custom(CustomPayload::new("analysis_target")),
        );

        let error = agent
            .handle_request(&request, &RequestContext::default())
            .await
            .unwrap_err();
        assert!(matches!(error, AgentError::ValidationError { .. }));
    }

    #[tokio::test]
    async fn test_non_custom_payload_is_validation_error() {
        let agent = ProjectScannerAgent::new(ScannerSection::default(), EventEmitter::detached(PROJECT_SCANNER_ID));
        let request = Request::new("t", message_types::PROJECT_SCAN_REQUEST, MessagePayload::Empty);

        assert!(matches!(
            agent.handle_request(&request, &RequestContext::default()).await,
            Err(AgentError::ValidationError { .. })
        ));
    }
}
