use log::warn;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domains::selection::NavDirection;
use crate::errors::StellwerkError;
use crate::events::StellwerkEvent;
use crate::shared::MessagePayload;

/// Closed set of commands the engine processes, in arrival order, on one
/// logical thread. Delivery is at most once and unordered relative to store
/// mutations from other sources.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    SelectSession {
        worktree_id: String,
        session_id: String,
    },
    CreateSession {
        worktree_id: String,
    },
    OpenSessionModal {
        session_id: String,
    },
    ArchiveSession {
        session_id: String,
    },
    RouteAutomatedMessage {
        request: RouteRequest,
    },
    SessionsRefreshed {
        worktree_id: String,
    },
    Navigate {
        worktree_id: String,
        direction: NavDirection,
    },
}

/// Automation request: "route this message into the session working on
/// `branch` inside the project at `project_path`".
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteRequest {
    pub branch: String,
    pub project_path: std::path::PathBuf,
    pub message: MessagePayload,
}

pub type CommandSender = mpsc::UnboundedSender<EngineCommand>;
pub type CommandReceiver = mpsc::UnboundedReceiver<EngineCommand>;

pub fn command_channel() -> (CommandSender, CommandReceiver) {
    mpsc::unbounded_channel()
}

static COMMAND_SENDER: OnceCell<CommandSender> = OnceCell::new();

/// Installs the process-wide command sender so boundary code (window event
/// handlers) can dispatch without holding an engine handle.
pub fn install_command_sender(sender: CommandSender) {
    if COMMAND_SENDER.set(sender).is_err() {
        warn!("Command sender already installed; keeping the existing one");
    }
}

pub fn dispatch(command: EngineCommand) {
    match COMMAND_SENDER.get() {
        Some(sender) => {
            if sender.send(command).is_err() {
                warn!("Engine command loop is gone; dropping command");
            }
        }
        None => warn!("Command sender not installed; dropping command"),
    }
}

/// Maps a named cross-window event into an engine command. Unknown names and
/// malformed payloads are dropped with a warning; cross-window delivery is
/// best effort by contract.
pub fn command_for_window_event(
    name: &str,
    payload: &serde_json::Value,
    active_worktree: Option<&str>,
) -> Option<EngineCommand> {
    let event = StellwerkEvent::from_name(name)?;
    match event {
        StellwerkEvent::OpenSessionModal => {
            let session_id = payload.get("sessionId").and_then(|v| v.as_str());
            match session_id {
                Some(session_id) => Some(EngineCommand::OpenSessionModal {
                    session_id: session_id.to_string(),
                }),
                None => {
                    warn!(
                        "Dropping open-session-modal event: {}",
                        StellwerkError::invalid_input("sessionId", "missing from payload")
                    );
                    None
                }
            }
        }
        StellwerkEvent::CreateNewSession => match active_worktree {
            Some(worktree_id) => Some(EngineCommand::CreateSession {
                worktree_id: worktree_id.to_string(),
            }),
            None => {
                warn!("create-new-session event with no active worktree; dropping");
                None
            }
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn open_session_modal_maps_to_command() {
        let command = command_for_window_event(
            "stellwerk:open-session-modal",
            &json!({"sessionId": "s-1"}),
            None,
        );
        assert!(matches!(
            command,
            Some(EngineCommand::OpenSessionModal { session_id }) if session_id == "s-1"
        ));
    }

    #[test]
    fn open_session_modal_without_session_id_is_dropped() {
        let command =
            command_for_window_event("stellwerk:open-session-modal", &json!({}), None);
        assert!(command.is_none());
    }

    #[test]
    fn create_new_session_targets_the_active_worktree() {
        let command =
            command_for_window_event("stellwerk:create-new-session", &json!({}), Some("w-1"));
        assert!(matches!(
            command,
            Some(EngineCommand::CreateSession { worktree_id }) if worktree_id == "w-1"
        ));

        assert!(command_for_window_event("stellwerk:create-new-session", &json!({}), None).is_none());
    }

    #[test]
    fn unknown_event_names_are_ignored() {
        assert!(command_for_window_event("stellwerk:unknown", &json!({}), None).is_none());
        assert!(command_for_window_event("stellwerk:route-failed", &json!({}), None).is_none());
    }
}
