use serde::Serialize;
use std::fmt;

#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", content = "data")]
pub enum StellwerkError {
    ProjectNotFound {
        project_path: String,
    },
    WorktreeNotFound {
        worktree_id: String,
    },
    SessionNotFound {
        session_id: String,
    },
    ResolutionFailed {
        stage: String,
        message: String,
    },
    CreationFailed {
        resource: String,
        message: String,
    },
    PersistenceFailed {
        operation: String,
        session_id: String,
        message: String,
    },
    PreconditionFailed {
        session_id: String,
        message: String,
    },
    RoutingFailed {
        session_id: String,
        message: String,
    },
    InvalidInput {
        field: String,
        message: String,
    },
}

impl StellwerkError {
    pub fn resolution(stage: &str, error: impl ToString) -> Self {
        StellwerkError::ResolutionFailed {
            stage: stage.to_string(),
            message: error.to_string(),
        }
    }

    pub fn creation(resource: &str, error: impl ToString) -> Self {
        StellwerkError::CreationFailed {
            resource: resource.to_string(),
            message: error.to_string(),
        }
    }

    pub fn persistence(operation: &str, session_id: &str, error: impl ToString) -> Self {
        StellwerkError::PersistenceFailed {
            operation: operation.to_string(),
            session_id: session_id.to_string(),
            message: error.to_string(),
        }
    }

    pub fn precondition(session_id: &str, message: impl ToString) -> Self {
        StellwerkError::PreconditionFailed {
            session_id: session_id.to_string(),
            message: message.to_string(),
        }
    }

    pub fn invalid_input(field: &str, message: impl ToString) -> Self {
        StellwerkError::InvalidInput {
            field: field.to_string(),
            message: message.to_string(),
        }
    }
}

impl fmt::Display for StellwerkError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::ProjectNotFound { project_path } => {
                write!(f, "Project not found at path: {project_path}")
            }
            Self::WorktreeNotFound { worktree_id } => {
                write!(f, "Worktree '{worktree_id}' not found")
            }
            Self::SessionNotFound { session_id } => {
                write!(f, "Session '{session_id}' not found")
            }
            Self::ResolutionFailed { stage, message } => {
                write!(f, "Resolution failed during '{stage}': {message}")
            }
            Self::CreationFailed { resource, message } => {
                write!(f, "Failed to create {resource}: {message}")
            }
            Self::PersistenceFailed {
                operation,
                session_id,
                message,
            } => {
                write!(
                    f,
                    "Persistence operation '{operation}' failed for session '{session_id}': {message}"
                )
            }
            Self::PreconditionFailed {
                session_id,
                message,
            } => {
                write!(
                    f,
                    "Precondition failed for session '{session_id}': {message}"
                )
            }
            Self::RoutingFailed {
                session_id,
                message,
            } => {
                write!(
                    f,
                    "Failed to route message to session '{session_id}': {message}"
                )
            }
            Self::InvalidInput { field, message } => {
                write!(f, "Invalid input for field '{field}': {message}")
            }
        }
    }
}

impl std::error::Error for StellwerkError {}

impl From<StellwerkError> for String {
    fn from(error: StellwerkError) -> Self {
        error.to_string()
    }
}
