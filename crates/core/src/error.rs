#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error("{resource}: request could not complete: {detail}")]
    Transport {
        resource: &'static str,
        detail: String,
        body: Option<String>,
    },
    #[error("{resource}: response did not contain `{field}`")]
    Resolution {
        resource: &'static str,
        field: &'static str,
    },
    #[error("{resource}: backend rejected request with status {status}: {body}")]
    Creation {
        resource: &'static str,
        status: u16,
        body: String,
    },
    #[error("{step} requires {requires}, which has not been created")]
    MissingDependency {
        step: &'static str,
        requires: &'static str,
    },
    #[error("identifier slot {slot} is already filled")]
    AlreadyCreated { slot: &'static str },

    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("configuration error: {0}")]
    Config(String),
}

impl IntakeError {
    /// The backend resource the error is tagged with, if it came from a backend call.
    pub fn resource(&self) -> Option<&'static str> {
        match self {
            IntakeError::Transport { resource, .. }
            | IntakeError::Resolution { resource, .. }
            | IntakeError::Creation { resource, .. } => Some(resource),
            _ => None,
        }
    }

    /// The raw response body, where the backend sent one.
    pub fn response_body(&self) -> Option<&str> {
        match self {
            IntakeError::Transport { body, .. } => body.as_deref(),
            IntakeError::Creation { body, .. } => Some(body),
            _ => None,
        }
    }
}

pub type IntakeResult<T> = std::result::Result<T, IntakeError>;
