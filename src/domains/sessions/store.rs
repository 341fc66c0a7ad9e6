use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use crate::domains::sessions::entity::{SelectionState, TransientFlag};

/// Full immutable state delivered to subscribers on every mutation.
/// Consumers diff against their own previous copy; the store never emits
/// per-field deltas.
#[derive(Debug, Clone, Default)]
pub struct StoreSnapshot {
    /// Transient mirrors keyed by session id. Entries appear on first write
    /// and are removed outright when the condition stops being tracked;
    /// removal and "set to false" are distinct observable states.
    pub reviewing: HashMap<String, bool>,
    pub waiting: HashMap<String, bool>,
    pub labels: HashMap<String, String>,
    pub sending: HashSet<String>,
    pub worktree_loading: HashSet<String>,
    pub selections: HashMap<String, SelectionState>,
    pub session_worktrees: HashMap<String, String>,
    pub worktree_paths: HashMap<String, PathBuf>,
    pub active_worktree: Option<String>,
    pub last_active_session: HashMap<String, String>,
    pub auto_open: HashSet<String>,
}

type Subscriber = Arc<dyn Fn(&StoreSnapshot) + Send + Sync>;

struct Inner {
    state: StoreSnapshot,
    subscribers: Vec<Subscriber>,
}

/// Process-local reactive session state. All mutation is synchronous and
/// non-blocking; persistence side effects are dispatched by observers, never
/// inline in a setter. Cloning shares the underlying state.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                state: StoreSnapshot::default(),
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn subscribe(&self, subscriber: impl Fn(&StoreSnapshot) + Send + Sync + 'static) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.subscribers.push(Arc::new(subscriber));
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.state.clone()
    }

    /// Runs `mutation` under the lock; when it reports a change, subscribers
    /// are notified with a snapshot taken after the mutation. Notification
    /// happens outside the lock so subscribers may read the store.
    fn mutate<R>(&self, mutation: impl FnOnce(&mut StoreSnapshot) -> (bool, R)) -> R {
        let (result, notification) = {
            let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            let (changed, result) = mutation(&mut inner.state);
            if changed {
                (result, Some((inner.state.clone(), inner.subscribers.clone())))
            } else {
                (result, None)
            }
        };
        if let Some((snapshot, subscribers)) = notification {
            for subscriber in subscribers {
                subscriber(&snapshot);
            }
        }
        result
    }

    fn set_entry(&self, pick: impl FnOnce(&mut StoreSnapshot) -> &mut HashMap<String, bool>, session_id: &str, value: bool) {
        self.mutate(|state| {
            let map = pick(state);
            let changed = map.get(session_id) != Some(&value);
            if changed {
                map.insert(session_id.to_string(), value);
            }
            (changed, ())
        });
    }

    fn clear_entry(&self, pick: impl FnOnce(&mut StoreSnapshot) -> &mut HashMap<String, bool>, session_id: &str) {
        self.mutate(|state| (pick(state).remove(session_id).is_some(), ()));
    }

    pub fn set_reviewing(&self, session_id: &str, value: bool) {
        self.set_entry(|s| &mut s.reviewing, session_id, value);
    }

    /// Removes the reviewing entry entirely; distinct from setting it false.
    pub fn clear_reviewing(&self, session_id: &str) {
        self.clear_entry(|s| &mut s.reviewing, session_id);
    }

    pub fn set_waiting(&self, session_id: &str, value: bool) {
        self.set_entry(|s| &mut s.waiting, session_id, value);
    }

    pub fn clear_waiting(&self, session_id: &str) {
        self.clear_entry(|s| &mut s.waiting, session_id);
    }

    pub fn set_label(&self, session_id: &str, label: &str) {
        self.mutate(|state| {
            let changed = state.labels.get(session_id).map(String::as_str) != Some(label);
            if changed {
                state.labels.insert(session_id.to_string(), label.to_string());
            }
            (changed, ())
        });
    }

    pub fn clear_label(&self, session_id: &str) {
        self.mutate(|state| (state.labels.remove(session_id).is_some(), ()));
    }

    pub fn set_sending(&self, session_id: &str, sending: bool) {
        self.mutate(|state| {
            let changed = if sending {
                state.sending.insert(session_id.to_string())
            } else {
                state.sending.remove(session_id)
            };
            (changed, ())
        });
    }

    pub fn set_worktree_loading(&self, worktree_id: &str, loading: bool) {
        self.mutate(|state| {
            let changed = if loading {
                state.worktree_loading.insert(worktree_id.to_string())
            } else {
                state.worktree_loading.remove(worktree_id)
            };
            (changed, ())
        });
    }

    pub fn register_session_worktree(&self, session_id: &str, worktree_id: &str) {
        self.mutate(|state| {
            let changed =
                state.session_worktrees.get(session_id).map(String::as_str) != Some(worktree_id);
            if changed {
                state
                    .session_worktrees
                    .insert(session_id.to_string(), worktree_id.to_string());
            }
            (changed, ())
        });
    }

    pub fn register_worktree_path(&self, worktree_id: &str, path: PathBuf) {
        self.mutate(|state| {
            let changed = state.worktree_paths.get(worktree_id) != Some(&path);
            if changed {
                state.worktree_paths.insert(worktree_id.to_string(), path);
            }
            (changed, ())
        });
    }

    /// Drops every trace of a session (transient mirrors and the worktree
    /// index). Used when a session is archived or deleted. The transient
    /// mirrors are cleared first, in their own notification, while the
    /// routing index is still intact: removal of a tracked entry must reach
    /// the persisted store, and an unroutable update would be dropped.
    pub fn forget_session(&self, session_id: &str) {
        self.mutate(|state| {
            let mut changed = state.reviewing.remove(session_id).is_some();
            changed |= state.waiting.remove(session_id).is_some();
            changed |= state.labels.remove(session_id).is_some();
            changed |= state.sending.remove(session_id);
            (changed, ())
        });
        self.mutate(|state| (state.session_worktrees.remove(session_id).is_some(), ()));
    }

    pub fn set_selection(
        &self,
        worktree_id: &str,
        session_id: Option<String>,
        index: Option<usize>,
    ) {
        self.mutate(|state| {
            let entry = state.selections.entry(worktree_id.to_string()).or_default();
            let changed = entry.session_id != session_id || entry.index != index;
            if changed {
                entry.session_id = session_id;
                entry.index = index;
            }
            (changed, ())
        });
    }

    pub fn set_overlay_open(&self, worktree_id: &str, open: bool) {
        self.mutate(|state| {
            let entry = state.selections.entry(worktree_id.to_string()).or_default();
            let changed = entry.overlay_open != open;
            entry.overlay_open = open;
            (changed, ())
        });
    }

    /// Atomic fan-out for a default-selection transition: records the
    /// selection, marks the worktree as the active navigation target, and
    /// registers its filesystem path. Subscribers observe all three effects
    /// in one notification or none at all.
    pub fn apply_selection_fanout(
        &self,
        worktree_id: &str,
        session_id: &str,
        index: usize,
        path: Option<PathBuf>,
    ) {
        self.mutate(|state| {
            let mut changed = false;
            let entry = state.selections.entry(worktree_id.to_string()).or_default();
            if entry.session_id.as_deref() != Some(session_id) || entry.index != Some(index) {
                entry.session_id = Some(session_id.to_string());
                entry.index = Some(index);
                changed = true;
            }
            if state.active_worktree.as_deref() != Some(worktree_id) {
                state.active_worktree = Some(worktree_id.to_string());
                changed = true;
            }
            if let Some(path) = path
                && state.worktree_paths.get(worktree_id) != Some(&path)
            {
                state.worktree_paths.insert(worktree_id.to_string(), path);
                changed = true;
            }
            (changed, ())
        });
    }

    pub fn set_active_worktree(&self, worktree_id: &str) {
        self.mutate(|state| {
            let changed = state.active_worktree.as_deref() != Some(worktree_id);
            if changed {
                state.active_worktree = Some(worktree_id.to_string());
            }
            (changed, ())
        });
    }

    pub fn mark_last_active(&self, worktree_id: &str, session_id: &str) {
        self.mutate(|state| {
            let changed =
                state.last_active_session.get(worktree_id).map(String::as_str) != Some(session_id);
            if changed {
                state
                    .last_active_session
                    .insert(worktree_id.to_string(), session_id.to_string());
            }
            (changed, ())
        });
    }

    pub fn request_auto_open(&self, worktree_id: &str) {
        self.mutate(|state| (state.auto_open.insert(worktree_id.to_string()), ()));
    }

    /// Consume-once: returns true at most once per `request_auto_open`.
    pub fn take_auto_open(&self, worktree_id: &str) -> bool {
        self.mutate(|state| {
            let taken = state.auto_open.remove(worktree_id);
            (taken, taken)
        })
    }

    /// Three-valued view of the reviewing mirror: untracked sessions read as
    /// `Unset`, which is observably different from an explicit `False`.
    pub fn reviewing_state(&self, session_id: &str) -> TransientFlag {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        TransientFlag::from(inner.state.reviewing.get(session_id).copied())
    }

    pub fn waiting_state(&self, session_id: &str) -> TransientFlag {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        TransientFlag::from(inner.state.waiting.get(session_id).copied())
    }

    pub fn selection(&self, worktree_id: &str) -> SelectionState {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner
            .state
            .selections
            .get(worktree_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn active_worktree(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.state.active_worktree.clone()
    }

    pub fn worktree_path(&self, worktree_id: &str) -> Option<PathBuf> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.state.worktree_paths.get(worktree_id).cloned()
    }

    pub fn worktree_for_session(&self, session_id: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.state.session_worktrees.get(session_id).cloned()
    }

    pub fn last_active_session(&self, worktree_id: &str) -> Option<String> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.state.last_active_session.get(worktree_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_store() -> (SessionStore, Arc<AtomicUsize>) {
        let store = SessionStore::new();
        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = notifications.clone();
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        (store, notifications)
    }

    #[test]
    fn setters_notify_only_on_actual_change() {
        let (store, notifications) = counting_store();

        store.set_reviewing("s-1", true);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);

        store.set_reviewing("s-1", true);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);

        store.set_reviewing("s-1", false);
        assert_eq!(notifications.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn clearing_is_distinct_from_setting_false() {
        let store = SessionStore::new();
        assert_eq!(store.waiting_state("s-1"), TransientFlag::Unset);

        store.set_waiting("s-1", false);
        assert_eq!(store.snapshot().waiting.get("s-1"), Some(&false));
        assert_eq!(store.waiting_state("s-1"), TransientFlag::False);

        store.clear_waiting("s-1");
        assert!(!store.snapshot().waiting.contains_key("s-1"));
        assert_eq!(store.waiting_state("s-1"), TransientFlag::Unset);
    }

    #[test]
    fn clearing_an_absent_entry_does_not_notify() {
        let (store, notifications) = counting_store();
        store.clear_label("s-1");
        assert_eq!(notifications.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn selection_fanout_is_a_single_notification() {
        let (store, notifications) = counting_store();

        store.apply_selection_fanout("w-1", "s-1", 0, Some(PathBuf::from("/tmp/w-1")));
        assert_eq!(notifications.load(Ordering::SeqCst), 1);

        let snapshot = store.snapshot();
        assert_eq!(
            snapshot.selections.get("w-1").and_then(|s| s.session_id.clone()),
            Some("s-1".to_string())
        );
        assert_eq!(snapshot.active_worktree.as_deref(), Some("w-1"));
        assert_eq!(
            snapshot.worktree_paths.get("w-1"),
            Some(&PathBuf::from("/tmp/w-1"))
        );

        // Identical fan-out is a no-op.
        store.apply_selection_fanout("w-1", "s-1", 0, Some(PathBuf::from("/tmp/w-1")));
        assert_eq!(notifications.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn auto_open_flag_is_consume_once() {
        let store = SessionStore::new();
        store.request_auto_open("w-1");
        assert!(store.take_auto_open("w-1"));
        assert!(!store.take_auto_open("w-1"));
    }

    #[test]
    fn subscriber_may_read_the_store_during_notification() {
        let store = SessionStore::new();
        let observed = Arc::new(Mutex::new(None));
        let reader = store.clone();
        let slot = observed.clone();
        store.subscribe(move |_| {
            *slot.lock().unwrap() = reader.active_worktree();
        });

        store.set_active_worktree("w-1");
        assert_eq!(observed.lock().unwrap().as_deref(), Some("w-1"));
    }

    #[test]
    fn forget_session_drops_all_transient_entries() {
        let store = SessionStore::new();
        store.set_reviewing("s-1", true);
        store.set_label("s-1", "urgent");
        store.register_session_worktree("s-1", "w-1");

        store.forget_session("s-1");
        let snapshot = store.snapshot();
        assert!(!snapshot.reviewing.contains_key("s-1"));
        assert!(!snapshot.labels.contains_key("s-1"));
        assert!(!snapshot.session_worktrees.contains_key("s-1"));
    }
}
