use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Named events crossing the engine boundary: inbound cross-window signals
/// and outbound notifications for the embedding shell. Delivery is at most
/// once per dispatch, unordered relative to store mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StellwerkEvent {
    OpenSessionModal,
    CreateNewSession,
    SelectionChanged,
    SessionsRefreshed,
    ProjectExpanded,
    RouteSucceeded,
    RouteFailed,
    SessionCreateFailed,
}

impl StellwerkEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            StellwerkEvent::OpenSessionModal => "stellwerk:open-session-modal",
            StellwerkEvent::CreateNewSession => "stellwerk:create-new-session",
            StellwerkEvent::SelectionChanged => "stellwerk:selection-changed",
            StellwerkEvent::SessionsRefreshed => "stellwerk:sessions-refreshed",
            StellwerkEvent::ProjectExpanded => "stellwerk:project-expanded",
            StellwerkEvent::RouteSucceeded => "stellwerk:route-succeeded",
            StellwerkEvent::RouteFailed => "stellwerk:route-failed",
            StellwerkEvent::SessionCreateFailed => "stellwerk:session-create-failed",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "stellwerk:open-session-modal" => Some(StellwerkEvent::OpenSessionModal),
            "stellwerk:create-new-session" => Some(StellwerkEvent::CreateNewSession),
            "stellwerk:selection-changed" => Some(StellwerkEvent::SelectionChanged),
            "stellwerk:sessions-refreshed" => Some(StellwerkEvent::SessionsRefreshed),
            "stellwerk:project-expanded" => Some(StellwerkEvent::ProjectExpanded),
            "stellwerk:route-succeeded" => Some(StellwerkEvent::RouteSucceeded),
            "stellwerk:route-failed" => Some(StellwerkEvent::RouteFailed),
            "stellwerk:session-create-failed" => Some(StellwerkEvent::SessionCreateFailed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionChangedPayload {
    pub worktree_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastKind {
    Success,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteResultPayload {
    pub request_id: String,
    pub kind: ToastKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Outbound notification seam. The embedding shell implements this against
/// its window/event plumbing; tests use a recording implementation.
pub trait EventEmitter: Send + Sync {
    fn emit_event(&self, event: StellwerkEvent, payload: serde_json::Value) -> Result<()>;
}

pub fn emit_json<T: Serialize>(
    emitter: &dyn EventEmitter,
    event: StellwerkEvent,
    payload: &T,
) -> Result<()> {
    emitter.emit_event(event, serde_json::to_value(payload)?)
}
