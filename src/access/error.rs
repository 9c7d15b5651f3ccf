use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("ssh error: {0}")]
    Ssh(#[from] ssh2::Error),
    #[error("ssh authentication failed for {0}")]
    AuthFailed(String),
    #[error("host key of {0} is not in known hosts")]
    HostKey(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("invalid access configuration: {0}")]
    Config(&'static str),
}
