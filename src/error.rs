use serde::Serialize;
use thiserror::Error;

use crate::model::RequestError;

/// Ways an operation can end without a usable result.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    /// The external call rejected; carries the stringified rejection verbatim.
    #[error("{0}")]
    Transport(String),
    /// The call resolved, but not with the structure the command promises.
    #[error("unexpected data format: {0}")]
    ShapeValidation(String),
    /// Usage error: invalid request, or an operation is already in flight.
    #[error("{0}")]
    Precondition(String),
}

impl SessionError {
    pub fn busy(command: &str) -> Self {
        SessionError::Precondition(format!(
            "cannot start {command}: another operation is still in progress"
        ))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::Transport(_) => "transport",
            SessionError::ShapeValidation(_) => "shape",
            SessionError::Precondition(_) => "precondition",
        }
    }
}

impl From<RequestError> for SessionError {
    fn from(e: RequestError) -> Self {
        SessionError::Precondition(e.to_string())
    }
}

impl Serialize for SessionError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::ser::Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}
