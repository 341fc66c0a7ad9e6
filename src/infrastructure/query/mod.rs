use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use dashmap::DashMap;
use log::debug;

use crate::domains::sessions::entity::{Project, Session, Worktree};
use crate::shared::SessionStoreGateway;

/// Background refresh interval for remote reads.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(20 * 60);

struct Entry<T> {
    value: T,
    fetched_at: Instant,
}

/// One cached read, with an async fetch guard that de-duplicates concurrent
/// identical reads: the second caller waits on the guard and then finds a
/// fresh value instead of fetching again.
struct CachedCell<T> {
    fetch: tokio::sync::Mutex<()>,
    slot: Mutex<Option<Entry<T>>>,
}

impl<T> Default for CachedCell<T> {
    fn default() -> Self {
        Self {
            fetch: tokio::sync::Mutex::new(()),
            slot: Mutex::new(None),
        }
    }
}

impl<T: Clone> CachedCell<T> {
    fn fresh_value(&self, ttl: Duration) -> Option<T> {
        let slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        slot.as_ref()
            .filter(|entry| entry.fetched_at.elapsed() < ttl)
            .map(|entry| entry.value.clone())
    }

    fn store(&self, value: T) {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *slot = Some(Entry {
            value,
            fetched_at: Instant::now(),
        });
    }

    fn invalidate(&self) {
        let mut slot = self.slot.lock().unwrap_or_else(|p| p.into_inner());
        *slot = None;
    }

    async fn read_through(
        &self,
        ttl: Duration,
        fetch: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        if let Some(value) = self.fresh_value(ttl) {
            return Ok(value);
        }
        let _guard = self.fetch.lock().await;
        if let Some(value) = self.fresh_value(ttl) {
            return Ok(value);
        }
        // Fetch errors are not cached; the next caller retries.
        let value = fetch.await?;
        self.store(value.clone());
        Ok(value)
    }

    async fn force_refresh(
        &self,
        fetch: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let _guard = self.fetch.lock().await;
        let value = fetch.await?;
        self.store(value.clone());
        Ok(value)
    }
}

struct SessionsCell {
    cell: CachedCell<Vec<Session>>,
    worktree_path: PathBuf,
}

/// Read-through, invalidation-tracked cache over the persisted store.
/// Never authoritative for writes; writes go straight to the gateway and
/// invalidate the affected key here.
pub struct QueryCache {
    gateway: Arc<dyn SessionStoreGateway>,
    ttl: Duration,
    projects: CachedCell<Vec<Project>>,
    worktrees: DashMap<String, Arc<CachedCell<Vec<Worktree>>>>,
    sessions: DashMap<String, Arc<SessionsCell>>,
}

impl QueryCache {
    pub fn new(gateway: Arc<dyn SessionStoreGateway>, ttl: Duration) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            ttl,
            projects: CachedCell::default(),
            worktrees: DashMap::new(),
            sessions: DashMap::new(),
        })
    }

    pub async fn projects(&self) -> Result<Vec<Project>> {
        self.projects
            .read_through(self.ttl, self.gateway.list_projects())
            .await
    }

    pub async fn worktrees(&self, project_id: &str) -> Result<Vec<Worktree>> {
        let cell = self
            .worktrees
            .entry(project_id.to_string())
            .or_default()
            .clone();
        cell.read_through(self.ttl, self.gateway.list_worktrees(project_id))
            .await
    }

    pub async fn sessions(&self, worktree_id: &str, worktree_path: &Path) -> Result<Vec<Session>> {
        let cell = self
            .sessions
            .entry(worktree_id.to_string())
            .or_insert_with(|| {
                Arc::new(SessionsCell {
                    cell: CachedCell::default(),
                    worktree_path: worktree_path.to_path_buf(),
                })
            })
            .clone();
        cell.cell
            .read_through(self.ttl, self.gateway.list_sessions(worktree_id, worktree_path))
            .await
    }

    pub fn invalidate_projects(&self) {
        self.projects.invalidate();
    }

    pub fn invalidate_worktrees(&self, project_id: &str) {
        if let Some(cell) = self.worktrees.get(project_id) {
            cell.invalidate();
        }
    }

    pub fn invalidate_sessions(&self, worktree_id: &str) {
        if let Some(cell) = self.sessions.get(worktree_id) {
            cell.cell.invalidate();
        }
    }

    /// Worktrees whose session lists have been read at least once; these are
    /// the keys the background refresh keeps warm.
    pub fn tracked_session_worktrees(&self) -> Vec<(String, PathBuf)> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().worktree_path.clone()))
            .collect()
    }

    /// Bypasses freshness and refetches a tracked worktree's session list.
    pub async fn refresh_sessions(&self, worktree_id: &str) -> Result<Option<Vec<Session>>> {
        let Some(cell) = self.sessions.get(worktree_id).map(|e| e.value().clone()) else {
            return Ok(None);
        };
        debug!("Refreshing session list for worktree '{worktree_id}'");
        let sessions = cell
            .cell
            .force_refresh(
                self.gateway
                    .list_sessions(worktree_id, &cell.worktree_path),
            )
            .await?;
        Ok(Some(sessions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::sessions::entity::SessionStatePatch;
    use crate::shared::{MessagePayload, RoutingTarget};
    use anyhow::{Result, anyhow};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingGateway {
        project_calls: AtomicUsize,
        session_calls: AtomicUsize,
        fail_projects: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl SessionStoreGateway for CountingGateway {
        async fn list_projects(&self) -> Result<Vec<Project>> {
            self.project_calls.fetch_add(1, Ordering::SeqCst);
            // Hold the fetch long enough for a concurrent caller to pile up
            // on the guard.
            tokio::time::sleep(Duration::from_millis(20)).await;
            if self.fail_projects.load(Ordering::SeqCst) {
                return Err(anyhow!("remote store unavailable"));
            }
            Ok(Vec::new())
        }

        async fn list_worktrees(&self, _project_id: &str) -> Result<Vec<Worktree>> {
            Ok(Vec::new())
        }

        async fn create_base_worktree(&self, _project_id: &str) -> Result<Worktree> {
            unimplemented!("not exercised by cache tests")
        }

        async fn list_sessions(
            &self,
            _worktree_id: &str,
            _worktree_path: &Path,
        ) -> Result<Vec<Session>> {
            self.session_calls.fetch_add(1, Ordering::SeqCst);
            Ok(Vec::new())
        }

        async fn create_session(
            &self,
            _worktree_id: &str,
            _worktree_path: &Path,
        ) -> Result<Session> {
            unimplemented!("not exercised by cache tests")
        }

        async fn update_session_state(
            &self,
            _worktree_id: &str,
            _worktree_path: &Path,
            _session_id: &str,
            _patch: SessionStatePatch,
        ) -> Result<()> {
            Ok(())
        }

        async fn archive_session(
            &self,
            _worktree_id: &str,
            _worktree_path: &Path,
            _session_id: &str,
        ) -> Result<()> {
            Ok(())
        }

        async fn send_message(
            &self,
            _target: &RoutingTarget,
            _message: &MessagePayload,
        ) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn concurrent_identical_reads_fetch_once() {
        let gateway = Arc::new(CountingGateway::default());
        let cache = QueryCache::new(gateway.clone(), Duration::from_secs(60));

        let (a, b) = tokio::join!(cache.projects(), cache.projects());
        a.unwrap();
        b.unwrap();
        assert_eq!(gateway.project_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn repeated_reads_hit_the_cache_until_invalidated() {
        let gateway = Arc::new(CountingGateway::default());
        let cache = QueryCache::new(gateway.clone(), Duration::from_secs(60));

        cache.projects().await.unwrap();
        cache.projects().await.unwrap();
        assert_eq!(gateway.project_calls.load(Ordering::SeqCst), 1);

        cache.invalidate_projects();
        cache.projects().await.unwrap();
        assert_eq!(gateway.project_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fetch_errors_are_not_cached() {
        let gateway = Arc::new(CountingGateway::default());
        gateway.fail_projects.store(true, Ordering::SeqCst);
        let cache = QueryCache::new(gateway.clone(), Duration::from_secs(60));

        assert!(cache.projects().await.is_err());
        gateway.fail_projects.store(false, Ordering::SeqCst);
        assert!(cache.projects().await.is_ok());
        assert_eq!(gateway.project_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn session_lists_are_cached_per_worktree() {
        let gateway = Arc::new(CountingGateway::default());
        let cache = QueryCache::new(gateway.clone(), Duration::from_secs(60));

        cache.sessions("w-1", Path::new("/tmp/w-1")).await.unwrap();
        cache.sessions("w-2", Path::new("/tmp/w-2")).await.unwrap();
        cache.sessions("w-1", Path::new("/tmp/w-1")).await.unwrap();
        assert_eq!(gateway.session_calls.load(Ordering::SeqCst), 2);

        let mut tracked = cache.tracked_session_worktrees();
        tracked.sort();
        assert_eq!(
            tracked,
            vec![
                ("w-1".to_string(), PathBuf::from("/tmp/w-1")),
                ("w-2".to_string(), PathBuf::from("/tmp/w-2")),
            ]
        );
    }

    #[tokio::test]
    async fn refresh_bypasses_freshness_for_tracked_worktrees() {
        let gateway = Arc::new(CountingGateway::default());
        let cache = QueryCache::new(gateway.clone(), Duration::from_secs(60));

        assert!(cache.refresh_sessions("w-1").await.unwrap().is_none());

        cache.sessions("w-1", Path::new("/tmp/w-1")).await.unwrap();
        assert!(cache.refresh_sessions("w-1").await.unwrap().is_some());
        assert_eq!(gateway.session_calls.load(Ordering::SeqCst), 2);
    }
}
