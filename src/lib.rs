//! Stellwerk keeps three independently updating views of session/worktree
//! state mutually consistent: the in-process reactive store, the remote
//! persisted store behind the gateway, and the rendered selection state of
//! the canvas. The embedding desktop shell supplies the gateway and event
//! plumbing; everything else lives here.

pub mod domains;
pub mod engine;
pub mod errors;
pub mod events;
pub mod infrastructure;
pub mod shared;

pub use domains::resolver::MessageTargetResolver;
pub use domains::selection::{NavDirection, SelectionReconciler, SessionCard};
pub use domains::sessions::{
    PersistBridge, Project, SelectionState, Session, SessionStatePatch, SessionStore,
    StoreSnapshot, TransientFlag, Worktree, WorktreeStatus,
};
pub use engine::SyncEngine;
pub use errors::StellwerkError;
pub use events::{EventEmitter, StellwerkEvent};
pub use infrastructure::events::{
    CommandSender, EngineCommand, RouteRequest, dispatch, install_command_sender,
};
pub use infrastructure::query::QueryCache;
pub use shared::{MessagePayload, RoutingTarget, SessionStoreGateway};
