pub mod bridge;
pub mod entity;
pub mod store;

pub use bridge::PersistBridge;
pub use entity::{
    Project, SelectionState, Session, SessionStatePatch, TransientFlag, Worktree, WorktreeStatus,
};
pub use store::{SessionStore, StoreSnapshot};
