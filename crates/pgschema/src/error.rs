use thiserror::Error;

use crate::ObjectKind;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unsupported document format version: {version}")]
    UnsupportedVersion { version: String },

    #[error("unsupported object type: {kind}")]
    UnsupportedObjectKind { kind: String },

    #[error("type not defined in schema {schema}: {name}")]
    TypeNotFound { schema: String, name: String },

    #[error("{kind} not defined in schema {schema}: {name}")]
    ObjectNotFound {
        kind: ObjectKind,
        schema: String,
        name: String,
    },

    #[error("role not defined: {name}")]
    RoleNotFound { name: String },

    #[error("malformed {kind} entry: {message}")]
    MalformedObject { kind: String, message: String },

    #[error("malformed document: {0}")]
    Document(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(kind: impl Into<String>, message: impl ToString) -> Self {
        Error::MalformedObject {
            kind: kind.into(),
            message: message.to_string(),
        }
    }
}
