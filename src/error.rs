use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Form inputs a validation failure can point back to.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InputField {
    Name,
    Year,
    SysId,
    PageSize,
}

impl fmt::Display for InputField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputField::Name => write!(f, "name"),
            InputField::Year => write!(f, "year"),
            InputField::SysId => write!(f, "sysId"),
            InputField::PageSize => write!(f, "page size"),
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum BrowseError {
    /// Blocks a submission locally; the service is never contacted.
    #[error("{message}")]
    Validation { field: InputField, message: String },
    #[error("no place name found for sysId {0:?}")]
    NotFound(String),
    #[error("{0}")]
    Service(String),
    /// Programmer error: the detail cache was asked for an empty key.
    #[error("a record without a sysId cannot be fetched or cached")]
    MissingKey,
}

impl BrowseError {
    pub fn validation(field: InputField, message: impl Into<String>) -> Self {
        BrowseError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn service(message: impl Into<String>) -> Self {
        BrowseError::Service(message.into())
    }

    /// Input that should regain focus after this error, if any.
    pub fn field(&self) -> Option<InputField> {
        match self {
            BrowseError::Validation { field, .. } => Some(*field),
            _ => None,
        }
    }
}

pub type Result<T, E = BrowseError> = std::result::Result<T, E>;
