use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use log::warn;

use crate::domains::sessions::entity::SessionStatePatch;
use crate::domains::sessions::store::{SessionStore, StoreSnapshot};
use crate::errors::StellwerkError;
use crate::shared::SessionStoreGateway;

/// A routed, ready-to-persist transient state transition.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionUpdate {
    pub session_id: String,
    pub worktree_id: String,
    pub worktree_path: PathBuf,
    pub patch: SessionStatePatch,
}

#[derive(Default)]
struct Shadow {
    reviewing: HashMap<String, bool>,
    waiting: HashMap<String, bool>,
    labels: HashMap<String, String>,
}

/// Mirrors reviewing/waiting/label transitions to durable storage the moment
/// they happen, bypassing any debounce, so they survive abrupt process exit.
/// Persistence is fire-and-forget: a failed write is logged and the
/// in-memory state stays authoritative for the UI.
pub struct PersistBridge {
    gateway: Arc<dyn SessionStoreGateway>,
    shadow: Mutex<Shadow>,
}

impl PersistBridge {
    pub fn new(gateway: Arc<dyn SessionStoreGateway>) -> Arc<Self> {
        Arc::new(Self {
            gateway,
            shadow: Mutex::new(Shadow::default()),
        })
    }

    /// Subscribes the bridge to every store notification.
    pub fn install(self: &Arc<Self>, store: &SessionStore) {
        let bridge = self.clone();
        store.subscribe(move |snapshot| bridge.on_snapshot(snapshot));
    }

    fn on_snapshot(&self, snapshot: &StoreSnapshot) {
        let updates = self.process(snapshot);
        if updates.is_empty() {
            return;
        }
        let gateway = self.gateway.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    dispatch(gateway, updates).await;
                });
            }
            Err(_) => {
                warn!(
                    "No async runtime available; dropping {} immediate-persist update(s)",
                    updates.len()
                );
            }
        }
    }

    /// Diffs one notification cycle against the shadow and routes each
    /// resulting patch to its owning worktree. All diffs are computed (and
    /// the shadow replaced wholesale) before anything is dispatched.
    pub fn process(&self, snapshot: &StoreSnapshot) -> Vec<SessionUpdate> {
        self.diff_cycle(snapshot)
            .into_iter()
            .filter_map(|(session_id, patch)| route_update(snapshot, session_id, patch))
            .collect()
    }

    fn diff_cycle(&self, snapshot: &StoreSnapshot) -> Vec<(String, SessionStatePatch)> {
        let mut shadow = self.shadow.lock().unwrap_or_else(|p| p.into_inner());
        let mut patches: BTreeMap<String, SessionStatePatch> = BTreeMap::new();

        for (id, value) in &snapshot.reviewing {
            if shadow.reviewing.get(id) != Some(value) {
                patches.entry(id.clone()).or_default().is_reviewing = Some(*value);
            }
        }
        // Absence of a previously tracked entry always fires, even when the
        // shadow value was already false: a removed entry marks a completed
        // lifecycle, not a value change.
        for id in shadow.reviewing.keys() {
            if !snapshot.reviewing.contains_key(id) {
                patches.entry(id.clone()).or_default().is_reviewing = Some(false);
            }
        }

        for (id, value) in &snapshot.waiting {
            if shadow.waiting.get(id) != Some(value) {
                patches.entry(id.clone()).or_default().waiting_for_input = Some(*value);
            }
        }
        for id in shadow.waiting.keys() {
            if !snapshot.waiting.contains_key(id) {
                patches.entry(id.clone()).or_default().waiting_for_input = Some(false);
            }
        }

        for (id, label) in &snapshot.labels {
            if shadow.labels.get(id) != Some(label) {
                patches.entry(id.clone()).or_default().label = Some(label.clone());
            }
        }
        for id in shadow.labels.keys() {
            if !snapshot.labels.contains_key(id) {
                // Cleared label travels as the empty string.
                patches.entry(id.clone()).or_default().label = Some(String::new());
            }
        }

        shadow.reviewing = snapshot.reviewing.clone();
        shadow.waiting = snapshot.waiting.clone();
        shadow.labels = snapshot.labels.clone();

        patches.into_iter().collect()
    }
}

fn route_update(
    snapshot: &StoreSnapshot,
    session_id: String,
    patch: SessionStatePatch,
) -> Option<SessionUpdate> {
    let Some(worktree_id) = snapshot.session_worktrees.get(&session_id) else {
        warn!(
            "Dropping update: {}",
            StellwerkError::precondition(&session_id, "owning worktree unknown")
        );
        return None;
    };
    let Some(worktree_path) = snapshot.worktree_paths.get(worktree_id) else {
        warn!(
            "Dropping update: {}",
            StellwerkError::precondition(
                &session_id,
                format!("no path registered for worktree '{worktree_id}'")
            )
        );
        return None;
    };
    Some(SessionUpdate {
        session_id,
        worktree_id: worktree_id.clone(),
        worktree_path: worktree_path.clone(),
        patch,
    })
}

/// Persists one cycle's updates. Calls are unordered relative to each other;
/// a failure is logged and never rolls back in-memory state.
pub async fn dispatch(gateway: Arc<dyn SessionStoreGateway>, updates: Vec<SessionUpdate>) {
    let calls = updates.into_iter().map(|update| {
        let gateway = gateway.clone();
        async move {
            if let Err(err) = gateway
                .update_session_state(
                    &update.worktree_id,
                    &update.worktree_path,
                    &update.session_id,
                    update.patch,
                )
                .await
            {
                warn!(
                    "{}",
                    StellwerkError::persistence("updateSessionState", &update.session_id, err)
                );
            }
        }
    });
    join_all(calls).await;
}
