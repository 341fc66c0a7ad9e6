use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};

use crate::domains::sessions::entity::{Session, Worktree};
use crate::domains::sessions::store::SessionStore;
use crate::errors::StellwerkError;
use crate::infrastructure::query::QueryCache;
use crate::shared::{RoutingTarget, SessionStoreGateway};

/// Find-or-create resolution of an automation target: a usable worktree for
/// the requested branch, then a reusable empty session inside it. Creates at
/// most one worktree and at most one session per invocation. Reads degrade
/// toward the creation branch on failure; a failed creation aborts the whole
/// resolution.
pub struct MessageTargetResolver {
    store: SessionStore,
    cache: Arc<QueryCache>,
    gateway: Arc<dyn SessionStoreGateway>,
}

impl MessageTargetResolver {
    pub fn new(
        store: SessionStore,
        cache: Arc<QueryCache>,
        gateway: Arc<dyn SessionStoreGateway>,
    ) -> Self {
        Self {
            store,
            cache,
            gateway,
        }
    }

    pub async fn resolve(
        &self,
        branch: &str,
        project_path: &Path,
    ) -> Result<RoutingTarget, StellwerkError> {
        let Some(project) = self.find_project(project_path).await else {
            return self.active_context_fallback(project_path);
        };

        let worktree = self.resolve_worktree(&project.id, branch).await?;
        let session = self.resolve_session(&worktree).await?;

        // Register routing information so transient-flag updates for this
        // session can reach the persisted store.
        self.store
            .register_worktree_path(&worktree.id, worktree.path.clone());
        self.store.register_session_worktree(&session.id, &worktree.id);

        Ok(RoutingTarget {
            project_id: Some(project.id),
            worktree_id: worktree.id,
            worktree_path: worktree.path,
            session_id: session.id,
        })
    }

    async fn find_project(
        &self,
        project_path: &Path,
    ) -> Option<crate::domains::sessions::entity::Project> {
        let projects = match self.cache.projects().await {
            Ok(projects) => projects,
            Err(err) => {
                warn!("Project listing failed, treating as empty: {err}");
                Vec::new()
            }
        };
        projects.into_iter().find(|p| p.path == project_path)
    }

    /// No registered project matched the exact path: degrade to whatever the
    /// user is currently working in, without creating anything. State is
    /// re-read here, after the project listing await, not captured earlier.
    fn active_context_fallback(
        &self,
        project_path: &Path,
    ) -> Result<RoutingTarget, StellwerkError> {
        let Some(worktree_id) = self.store.active_worktree() else {
            return Err(StellwerkError::ProjectNotFound {
                project_path: project_path.display().to_string(),
            });
        };
        let session_id = self.store.selection(&worktree_id).session_id;
        let worktree_path = self.store.worktree_path(&worktree_id);
        match (session_id, worktree_path) {
            (Some(session_id), Some(worktree_path)) => {
                info!(
                    "No project registered at '{}'; routing to active context (worktree '{worktree_id}')",
                    project_path.display()
                );
                Ok(RoutingTarget {
                    project_id: None,
                    worktree_id,
                    worktree_path,
                    session_id,
                })
            }
            _ => Err(StellwerkError::resolution(
                "project",
                format!(
                    "no project at '{}' and no routable active session",
                    project_path.display()
                ),
            )),
        }
    }

    async fn resolve_worktree(
        &self,
        project_id: &str,
        branch: &str,
    ) -> Result<Worktree, StellwerkError> {
        let worktrees = match self.cache.worktrees(project_id).await {
            Ok(worktrees) => worktrees,
            Err(err) => {
                warn!("Worktree listing for project '{project_id}' failed, treating as empty: {err}");
                Vec::new()
            }
        };

        let usable: Vec<&Worktree> = worktrees.iter().filter(|w| w.is_usable()).collect();
        if let Some(matching) = usable.iter().find(|w| w.branch.as_deref() == Some(branch)) {
            debug!(
                "Resolved branch '{branch}' to existing worktree '{}'",
                matching.id
            );
            return Ok((*matching).clone());
        }
        if let Some(first) = usable.first() {
            debug!(
                "No worktree for branch '{branch}'; falling back to usable worktree '{}'",
                first.id
            );
            return Ok((*first).clone());
        }

        info!("No usable worktree in project '{project_id}'; creating a base worktree");
        let created = self
            .gateway
            .create_base_worktree(project_id)
            .await
            .map_err(|err| StellwerkError::creation("worktree", err))?;
        self.cache.invalidate_worktrees(project_id);
        Ok(created)
    }

    async fn resolve_session(&self, worktree: &Worktree) -> Result<Session, StellwerkError> {
        let sessions = match self.cache.sessions(&worktree.id, &worktree.path).await {
            Ok(sessions) => sessions,
            Err(err) => {
                warn!(
                    "Session listing for worktree '{}' failed, treating as empty: {err}",
                    worktree.id
                );
                Vec::new()
            }
        };

        // Reuse the first empty, non-archived session so repeated automated
        // triggers converge on one target instead of proliferating sessions.
        // Not synchronized across concurrent invocations; near-simultaneous
        // triggers for the same branch can still each create a session.
        if let Some(empty) = sessions.iter().find(|s| s.is_empty()) {
            debug!(
                "Reusing empty session '{}' in worktree '{}'",
                empty.id, worktree.id
            );
            return Ok(empty.clone());
        }

        info!("No reusable session in worktree '{}'; creating one", worktree.id);
        let created = self
            .gateway
            .create_session(&worktree.id, &worktree.path)
            .await
            .map_err(|err| StellwerkError::creation("session", err))?;
        self.cache.invalidate_sessions(&worktree.id);
        Ok(created)
    }
}
