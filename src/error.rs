//! Error taxonomy shared by the name server, storage servers, and client.

use std::fmt;

/// Numeric codes carried in `ERROR;code;message` replies from the name
/// server (§6 of the protocol).
#[derive(Debug, Copy, Clone, PartialEq, Eq, num_derive::ToPrimitive, num_derive::FromPrimitive)]
pub enum ErrorCode {
    UnknownCommand = 400,
    NotOwner = 401,
    PermissionDenied = 403,
    FileNotFound = 404,
    FileExists = 409,
    InvalidArgs = 422,
    NoStorageServer = 503,
    StorageServerFailure = 504,
    UserNotFound = 105,
    InvalidInput = 106,
    ServerMisc = 107,
    StorageServerUnreachable = 108,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", *self as i32)
    }
}

/// Errors a name-server request handler can fail with. Every variant maps
/// onto exactly one [`ErrorCode`] for the wire reply.
#[derive(Debug, thiserror::Error)]
pub enum NsError {
    #[error("unknown command")]
    UnknownCommand,
    #[error("not owner of '{0}'")]
    NotOwner(String),
    #[error("permission denied for '{0}'")]
    PermissionDenied(String),
    #[error("file '{0}' not found")]
    FileNotFound(String),
    #[error("file '{0}' already exists")]
    FileExists(String),
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),
    #[error("no storage servers registered")]
    NoStorageServer,
    #[error("storage server failure: {0}")]
    StorageServerFailure(String),
    #[error("user '{0}' not found")]
    UserNotFound(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("server error: {0}")]
    ServerMisc(String),
    #[error("storage server unreachable: {0}")]
    StorageServerUnreachable(String),
}

impl NsError {
    pub fn code(&self) -> ErrorCode {
        match self {
            NsError::UnknownCommand => ErrorCode::UnknownCommand,
            NsError::NotOwner(_) => ErrorCode::NotOwner,
            NsError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            NsError::FileNotFound(_) => ErrorCode::FileNotFound,
            NsError::FileExists(_) => ErrorCode::FileExists,
            NsError::InvalidArgs(_) => ErrorCode::InvalidArgs,
            NsError::NoStorageServer => ErrorCode::NoStorageServer,
            NsError::StorageServerFailure(_) => ErrorCode::StorageServerFailure,
            NsError::UserNotFound(_) => ErrorCode::UserNotFound,
            NsError::InvalidInput(_) => ErrorCode::InvalidInput,
            NsError::ServerMisc(_) => ErrorCode::ServerMisc,
            NsError::StorageServerUnreachable(_) => ErrorCode::StorageServerUnreachable,
        }
    }

    /// Render as the wire form `ERROR;code;message` (without the trailing
    /// `__END__` marker, which the session loop appends).
    pub fn to_wire(&self) -> String {
        format!("ERROR;{};{}\n", self.code(), self)
    }
}

pub type NsResult<T> = std::result::Result<T, NsError>;

/// Errors the storage-server file engine can fail with. These never cross
/// the wire as a code, only as free-text `ERROR;...` lines (§6).
#[derive(Debug, thiserror::Error)]
pub enum SsError {
    #[error("file already exists")]
    Exists,
    #[error("file not found")]
    NotFound,
    #[error("invalid filename")]
    InvalidFilename,
    #[error("sentence {0} not found")]
    SentenceNotFound(usize),
    #[error("no sentence is locked on this connection")]
    NotLocked,
    #[error("no backup to restore")]
    NoBackup,
    #[error("checkpoint '{0}' not found")]
    CheckpointNotFound(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SsResult<T> = std::result::Result<T, SsError>;
