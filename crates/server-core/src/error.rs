use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Keys(#[from] russh::keys::Error),

    #[error("State store error: {0}")]
    StateStore(#[from] state_store::DbError),

    #[error("Cryptography error: {0}")]
    Crypto(String),

    // Wording matches what callers have historically seen on denial.
    #[error("you don't have permission to that host")]
    AccessDenied { host: String },

    #[error("invalid ACL action: {0:?}")]
    InvalidAclAction(String),

    #[error("ssh: host key mismatch")]
    HostKeyMismatch { host: String },

    #[error("Other error: {0}")]
    Other(String),
}

pub type ServerResult<T> = Result<T, ServerError>;
