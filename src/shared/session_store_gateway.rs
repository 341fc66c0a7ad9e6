use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domains::sessions::entity::{Project, Session, SessionStatePatch, Worktree};

/// Automated message routed into a resolved session. `execution` carries
/// opaque execution parameters the backend interprets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution: Option<serde_json::Value>,
}

/// Concrete target a resolver invocation settles on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoutingTarget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub worktree_id: String,
    pub worktree_path: std::path::PathBuf,
    pub session_id: String,
}

/// Asynchronous contract of the durable session/worktree store. Every call
/// fails independently; the engine never treats its own read-through cache
/// as authoritative for writes. Clearing a label is signalled by an empty
/// string in the patch.
#[async_trait]
pub trait SessionStoreGateway: Send + Sync {
    async fn list_projects(&self) -> Result<Vec<Project>>;

    async fn list_worktrees(&self, project_id: &str) -> Result<Vec<Worktree>>;

    async fn create_base_worktree(&self, project_id: &str) -> Result<Worktree>;

    async fn list_sessions(&self, worktree_id: &str, worktree_path: &Path)
    -> Result<Vec<Session>>;

    async fn create_session(&self, worktree_id: &str, worktree_path: &Path) -> Result<Session>;

    async fn update_session_state(
        &self,
        worktree_id: &str,
        worktree_path: &Path,
        session_id: &str,
        patch: SessionStatePatch,
    ) -> Result<()>;

    async fn archive_session(
        &self,
        worktree_id: &str,
        worktree_path: &Path,
        session_id: &str,
    ) -> Result<()>;

    async fn send_message(&self, target: &RoutingTarget, message: &MessagePayload) -> Result<()>;
}
