use thiserror::Error;

use crate::models::context::ErrorKind;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QaError {
    #[error("could not understand the question: {0}")]
    Parse(String),

    #[error("year {year} is outside the supported range 1900–2100")]
    InvalidRange { year: i32 },

    #[error("'{token}' matches several {role} values: {}", .candidates.join(", "))]
    AmbiguousEntity {
        token: String,
        role: &'static str,
        candidates: Vec<String>,
    },
}

impl QaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            QaError::Parse(_) => ErrorKind::Parse,
            QaError::InvalidRange { .. } => ErrorKind::InvalidRange,
            QaError::AmbiguousEntity { .. } => ErrorKind::AmbiguousEntity,
        }
    }
}
