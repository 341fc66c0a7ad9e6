use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One unit of conversational work bound to a worktree. The owning worktree
/// id never changes after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub worktree_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u32>,
}

impl Session {
    /// A session is empty iff it has no messages and is not archived.
    /// Both a null and a zero message count mean "no messages yet".
    pub fn is_empty(&self) -> bool {
        self.message_count.unwrap_or(0) == 0 && self.archived_at.is_none()
    }

    pub fn is_archived(&self) -> bool {
        self.archived_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WorktreeStatus {
    Pending,
    Ready,
    Error(String),
}

/// Cached git counters carried on the worktree record, used as a fallback
/// while live git status has not yet arrived.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GitCounters {
    pub behind: u32,
    pub unpushed: u32,
    pub diff_added: u32,
    pub diff_removed: u32,
}

/// A working-copy/branch context inside a project. `branch` is None for the
/// distinguished base worktree.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Worktree {
    pub id: String,
    pub project_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<WorktreeStatus>,
    #[serde(default)]
    pub git_counters: GitCounters,
}

impl Worktree {
    /// Usable means an absent status or an explicit ready state. Pending and
    /// error states are never resolution targets.
    pub fn is_usable(&self) -> bool {
        matches!(self.status, None | Some(WorktreeStatus::Ready))
    }

    pub fn is_base(&self) -> bool {
        self.branch.is_none()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub path: PathBuf,
    pub display_name: String,
    pub default_branch: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Three-valued transient flag. External storage collapses False and Unset,
/// but the change detector needs to tell "absent" apart from "set to false"
/// because absence of a previously tracked entry is itself a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransientFlag {
    #[default]
    Unset,
    False,
    True,
}

impl TransientFlag {
    pub fn from_bool(value: bool) -> Self {
        if value {
            TransientFlag::True
        } else {
            TransientFlag::False
        }
    }

    pub fn as_bool(self) -> Option<bool> {
        match self {
            TransientFlag::Unset => None,
            TransientFlag::False => Some(false),
            TransientFlag::True => Some(true),
        }
    }
}

impl From<Option<bool>> for TransientFlag {
    fn from(value: Option<bool>) -> Self {
        value.map_or(TransientFlag::Unset, TransientFlag::from_bool)
    }
}

/// Partial update to a session's durable transient state. `None` means the
/// field is untouched. A cleared label is canonically the empty string at
/// this boundary; inside the engine a cleared label is simply absent from
/// the label map.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_reviewing: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub waiting_for_input: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl SessionStatePatch {
    pub fn is_noop(&self) -> bool {
        self.is_reviewing.is_none() && self.waiting_for_input.is_none() && self.label.is_none()
    }
}

/// Per-browsing-context selection for one worktree. If a session id is
/// selected, `index` (when known) must point at the same session in the
/// current card list; the reconciler repairs it after any list change.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SelectionState {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default)]
    pub overlay_open: bool,
}
