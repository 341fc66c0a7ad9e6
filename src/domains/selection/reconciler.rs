use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::domains::sessions::entity::Session;
use crate::domains::sessions::store::SessionStore;

/// One entry of the derived, filtered, sorted card list the canvas renders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionCard {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SessionCard {
    pub fn from_session(session: &Session) -> Self {
        Self {
            session_id: session.id.clone(),
            display_name: session.display_name.clone(),
            label: session.label.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavDirection {
    Next,
    Prev,
}

/// Keeps the visual selection for each worktree stable while the card list
/// underneath it mutates. Reconciliation is idempotent: identical inputs
/// leave the store untouched and fire no notifications.
pub struct SelectionReconciler {
    store: SessionStore,
    lists: Mutex<HashMap<String, Vec<SessionCard>>>,
}

impl SelectionReconciler {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            lists: Mutex::new(HashMap::new()),
        }
    }

    /// Applies a new card list for a worktree and repairs the selection.
    /// Either the previously selected session still exists (its index is
    /// recomputed) or a default is chosen: the worktree's last active
    /// session when present in the list, else the first element. The list
    /// is stored before the selection is touched, so navigation processed
    /// afterwards always acts on the new ordering.
    pub fn reconcile(&self, worktree_id: &str, worktree_path: Option<&Path>, cards: Vec<SessionCard>) {
        let selection = {
            let mut lists = self.lists.lock().unwrap_or_else(|p| p.into_inner());
            lists.insert(worktree_id.to_string(), cards.clone());
            self.store.selection(worktree_id)
        };

        if let Some(selected) = selection.session_id.as_deref()
            && let Some(position) = position_of(&cards, selected)
        {
            if selection.index != Some(position) {
                debug!(
                    "Recomputed index for selected session '{selected}' in worktree '{worktree_id}': {:?} -> {position}",
                    selection.index
                );
                self.store
                    .set_selection(worktree_id, Some(selected.to_string()), Some(position));
            }
            return;
        }

        if cards.is_empty() {
            if selection.session_id.is_some() || selection.index.is_some() {
                self.store.set_selection(worktree_id, None, None);
            }
            return;
        }

        let fallback = self
            .store
            .last_active_session(worktree_id)
            .and_then(|id| position_of(&cards, &id).map(|pos| (id, pos)));
        let (session_id, position) =
            fallback.unwrap_or_else(|| (cards[0].session_id.clone(), 0));

        debug!(
            "Defaulting selection for worktree '{worktree_id}' to session '{session_id}' at index {position}"
        );
        self.store.apply_selection_fanout(
            worktree_id,
            &session_id,
            position,
            worktree_path.map(Path::to_path_buf),
        );
    }

    /// Moves the selection one card forward or back, clamped at the list
    /// edges. Returns the newly selected session id. With no prior
    /// selection, navigation lands on the first card.
    pub fn navigate(&self, worktree_id: &str, direction: NavDirection) -> Option<String> {
        let cards = self.cards(worktree_id);
        if cards.is_empty() {
            return None;
        }

        let selection = self.store.selection(worktree_id);
        let current = selection
            .session_id
            .as_deref()
            .and_then(|id| position_of(&cards, id))
            .or(selection.index.filter(|i| *i < cards.len()));

        let next = match (current, direction) {
            (None, _) => 0,
            (Some(i), NavDirection::Next) => (i + 1).min(cards.len() - 1),
            (Some(i), NavDirection::Prev) => i.saturating_sub(1),
        };

        let session_id = cards[next].session_id.clone();
        self.store
            .set_selection(worktree_id, Some(session_id.clone()), Some(next));
        self.store.mark_last_active(worktree_id, &session_id);
        Some(session_id)
    }

    /// Explicit selection of a session by id, e.g. from a pointer click or a
    /// cross-window command. No-op if the session is not in the current list.
    pub fn select(&self, worktree_id: &str, session_id: &str) -> bool {
        let cards = self.cards(worktree_id);
        let Some(position) = position_of(&cards, session_id) else {
            return false;
        };
        self.store
            .set_selection(worktree_id, Some(session_id.to_string()), Some(position));
        self.store.mark_last_active(worktree_id, session_id);
        true
    }

    pub fn cards(&self, worktree_id: &str) -> Vec<SessionCard> {
        let lists = self.lists.lock().unwrap_or_else(|p| p.into_inner());
        lists.get(worktree_id).cloned().unwrap_or_default()
    }
}

fn position_of(cards: &[SessionCard], session_id: &str) -> Option<usize> {
    cards.iter().position(|card| card.session_id == session_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn card(id: &str) -> SessionCard {
        SessionCard {
            session_id: id.to_string(),
            display_name: None,
            label: None,
        }
    }

    fn watched(store: &SessionStore) -> Arc<AtomicUsize> {
        let notifications = Arc::new(AtomicUsize::new(0));
        let counter = notifications.clone();
        store.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        notifications
    }

    #[test]
    fn reconciliation_is_idempotent() {
        let store = SessionStore::new();
        let reconciler = SelectionReconciler::new(store.clone());
        let notifications = watched(&store);

        let cards = vec![card("a"), card("b")];
        reconciler.reconcile("w-1", Some(Path::new("/tmp/w-1")), cards.clone());
        let after_first = notifications.load(Ordering::SeqCst);

        reconciler.reconcile("w-1", Some(Path::new("/tmp/w-1")), cards);
        assert_eq!(notifications.load(Ordering::SeqCst), after_first);
        assert_eq!(store.selection("w-1").session_id.as_deref(), Some("a"));
    }

    #[test]
    fn selection_survives_append() {
        let store = SessionStore::new();
        let reconciler = SelectionReconciler::new(store.clone());

        reconciler.reconcile("w-1", None, vec![card("a"), card("b")]);
        reconciler.select("w-1", "b");

        reconciler.reconcile("w-1", None, vec![card("a"), card("b"), card("c")]);
        let selection = store.selection("w-1");
        assert_eq!(selection.session_id.as_deref(), Some("b"));
        assert_eq!(selection.index, Some(1));
    }

    #[test]
    fn selection_survives_reorder_with_index_repair() {
        let store = SessionStore::new();
        let reconciler = SelectionReconciler::new(store.clone());

        reconciler.reconcile("w-1", None, vec![card("a"), card("b")]);
        reconciler.select("w-1", "b");

        // New card lands in front; b moves from index 1 to index 2.
        reconciler.reconcile("w-1", None, vec![card("c"), card("a"), card("b")]);
        let selection = store.selection("w-1");
        assert_eq!(selection.session_id.as_deref(), Some("b"));
        assert_eq!(selection.index, Some(2));
    }

    #[test]
    fn removing_another_session_keeps_selection() {
        let store = SessionStore::new();
        let reconciler = SelectionReconciler::new(store.clone());

        reconciler.reconcile("w-1", None, vec![card("a"), card("b"), card("c")]);
        reconciler.select("w-1", "c");

        reconciler.reconcile("w-1", None, vec![card("a"), card("c")]);
        let selection = store.selection("w-1");
        assert_eq!(selection.session_id.as_deref(), Some("c"));
        assert_eq!(selection.index, Some(1));
    }

    #[test]
    fn default_selection_prefers_last_active_session() {
        let store = SessionStore::new();
        store.mark_last_active("w-1", "b");
        let reconciler = SelectionReconciler::new(store.clone());

        reconciler.reconcile("w-1", None, vec![card("a"), card("b")]);
        let selection = store.selection("w-1");
        assert_eq!(selection.session_id.as_deref(), Some("b"));
        assert_eq!(selection.index, Some(1));
    }

    #[test]
    fn default_selection_falls_back_to_first_card() {
        let store = SessionStore::new();
        store.mark_last_active("w-1", "gone");
        let reconciler = SelectionReconciler::new(store.clone());

        reconciler.reconcile("w-1", None, vec![card("a"), card("b")]);
        let selection = store.selection("w-1");
        assert_eq!(selection.session_id.as_deref(), Some("a"));
        assert_eq!(selection.index, Some(0));
    }

    #[test]
    fn default_selection_fans_out_in_one_notification() {
        let store = SessionStore::new();
        let reconciler = SelectionReconciler::new(store.clone());
        let notifications = watched(&store);

        reconciler.reconcile("w-1", Some(Path::new("/tmp/w-1")), vec![card("a")]);
        assert_eq!(notifications.load(Ordering::SeqCst), 1);

        let snapshot = store.snapshot();
        assert_eq!(snapshot.active_worktree.as_deref(), Some("w-1"));
        assert_eq!(
            snapshot.worktree_paths.get("w-1"),
            Some(&PathBuf::from("/tmp/w-1"))
        );
        assert_eq!(store.selection("w-1").session_id.as_deref(), Some("a"));
    }

    #[test]
    fn removed_selection_falls_back_to_default() {
        let store = SessionStore::new();
        let reconciler = SelectionReconciler::new(store.clone());

        reconciler.reconcile("w-1", None, vec![card("a"), card("b")]);
        reconciler.select("w-1", "b");

        // b disappears; b was also last active, so the default falls through
        // to the first remaining card.
        reconciler.reconcile("w-1", None, vec![card("a")]);
        let selection = store.selection("w-1");
        assert_eq!(selection.session_id.as_deref(), Some("a"));
        assert_eq!(selection.index, Some(0));
    }

    #[test]
    fn empty_list_clears_selection() {
        let store = SessionStore::new();
        let reconciler = SelectionReconciler::new(store.clone());

        reconciler.reconcile("w-1", None, vec![card("a")]);
        reconciler.reconcile("w-1", None, Vec::new());
        let selection = store.selection("w-1");
        assert_eq!(selection.session_id, None);
        assert_eq!(selection.index, None);
    }

    #[test]
    fn navigation_clamps_at_list_edges() {
        let store = SessionStore::new();
        let reconciler = SelectionReconciler::new(store.clone());

        reconciler.reconcile("w-1", None, vec![card("a"), card("b")]);
        assert_eq!(
            reconciler.navigate("w-1", NavDirection::Next).as_deref(),
            Some("b")
        );
        assert_eq!(
            reconciler.navigate("w-1", NavDirection::Next).as_deref(),
            Some("b")
        );
        assert_eq!(
            reconciler.navigate("w-1", NavDirection::Prev).as_deref(),
            Some("a")
        );
        assert_eq!(
            reconciler.navigate("w-1", NavDirection::Prev).as_deref(),
            Some("a")
        );
    }

    #[test]
    fn navigation_after_reconcile_acts_on_the_new_list() {
        let store = SessionStore::new();
        let reconciler = SelectionReconciler::new(store.clone());

        reconciler.reconcile("w-1", None, vec![card("a"), card("b"), card("c")]);
        reconciler.select("w-1", "b");

        // The list shrinks before the pending keypress is handled; the
        // stale index 1 must not be trusted.
        reconciler.reconcile("w-1", None, vec![card("b")]);
        assert_eq!(
            reconciler.navigate("w-1", NavDirection::Next).as_deref(),
            Some("b")
        );
    }
}
