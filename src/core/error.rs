use thiserror::Error as ThisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Io,
    DatabaseOpening,
    DatabaseCorrupt,
    /// A reader's snapshot was overwritten by a later writer.
    DatabaseModified,
    DatabaseLock,
    InvalidArgument,
    InvalidOperation,
    Unimplemented,
    DocNotFound,
    Serialisation,
    Parse,
    Internal,
}

#[derive(Debug, ThisError)]
#[error("{kind:?}: {context}")]
pub struct Error {
    pub kind: ErrorKind,
    pub context: String,
}

impl Error {
    pub fn new(kind: ErrorKind, context: impl Into<String>) -> Self {
        Error { kind, context: context.into() }
    }

    pub fn corrupt(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::DatabaseCorrupt, context)
    }

    pub fn invalid_argument(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, context)
    }

    pub fn unimplemented(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unimplemented, context)
    }

    pub fn serialisation(context: impl Into<String>) -> Self {
        Self::new(ErrorKind::Serialisation, context)
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind == kind
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error {
            kind: ErrorKind::Io,
            context: err.to_string(),
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error {
            kind: ErrorKind::DatabaseCorrupt,
            context: format!("bad base file payload: {}", err),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            kind: ErrorKind::Parse,
            context: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
