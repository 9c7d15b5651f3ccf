pub mod error;
pub mod local;
#[cfg(test)]
pub mod memory;
pub mod remote;

use std::{path::PathBuf, str::FromStr, sync::Arc, time::Duration};

use async_trait::async_trait;
use clap::Parser;
use tracing::warn;

pub use error::AccessError;
pub use local::LocalAccess;
pub use remote::{Credential, RemoteAccess, RemoteTarget};

/// Everything the provisioning engine needs from the host running WireGuard.
///
/// Paths are plain `/`-separated strings since the remote side is always a
/// unix host. Commands are run through `bash -c` on the target.
#[async_trait]
pub trait ServerAccess: Sync + Send {
    async fn file_exists(&self, path: &str) -> Result<bool, AccessError>;
    /// `Ok(None)` when the file does not exist.
    async fn read_file(&self, path: &str) -> Result<Option<String>, AccessError>;
    async fn write_file(&self, path: &str, contents: &str) -> Result<(), AccessError>;
    async fn append_file(&self, path: &str, contents: &str) -> Result<(), AccessError>;
    /// Full paths of regular files in `dir` whose name matches `pattern`.
    /// A missing directory lists as empty.
    async fn list_files(&self, dir: &str, pattern: &str) -> Result<Vec<String>, AccessError>;
    /// Returns the exit status of `cmd`.
    async fn run_command(&self, cmd: &str) -> Result<i32, AccessError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Remote,
    Local,
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote" => Ok(Self::Remote),
            "local" => Ok(Self::Local),
            unsupported => Err(format!("unsupported backend {unsupported} (supported: remote, local)")),
        }
    }
}

#[derive(Debug, Parser)]
pub struct Config {
    #[clap(long, env = "ACCESS_BACKEND", default_value = "remote", value_parser)]
    backend: Backend,
    #[clap(long, env = "SSH_HOST", value_parser)]
    ssh_host: Option<String>,
    #[clap(long, env = "SSH_PORT", default_value_t = 22, value_parser)]
    ssh_port: u16,
    #[clap(long, env = "SSH_USERNAME", default_value = "root", value_parser)]
    ssh_username: String,
    #[clap(long, env = "SSH_PASSWORD", hide_env_values = true, value_parser)]
    ssh_password: Option<String>,
    #[clap(long, env = "SSH_KEY_PATH", value_parser)]
    ssh_key_path: Option<PathBuf>,
    #[clap(long, env = "SSH_KNOWN_HOSTS", value_parser)]
    ssh_known_hosts: Option<PathBuf>,
    /// Seconds allowed for connecting and for each remote or local command.
    #[clap(long, env = "ACCESS_TIMEOUT", default_value_t = 15, value_parser)]
    timeout: u64,
}

impl Config {
    pub fn backend(&self) -> Backend {
        self.backend
    }

    pub fn build(self) -> Result<Arc<dyn ServerAccess>, AccessError> {
        let timeout = Duration::from_secs(self.timeout);
        match self.backend {
            Backend::Local => Ok(Arc::new(LocalAccess::new(timeout))),
            Backend::Remote => {
                let host = self
                    .ssh_host
                    .ok_or(AccessError::Config("SSH_HOST is required for the remote backend"))?;
                // key file wins when both are configured
                let credential = match (self.ssh_key_path, self.ssh_password) {
                    (Some(path), _) => Credential::KeyFile(path),
                    (None, Some(password)) => Credential::Password(password),
                    (None, None) => {
                        return Err(AccessError::Config(
                            "either SSH_KEY_PATH or SSH_PASSWORD must be set",
                        ))
                    }
                };

                Ok(Arc::new(RemoteAccess::new(RemoteTarget {
                    host,
                    port: self.ssh_port,
                    username: self.ssh_username,
                    credential,
                    known_hosts: self.ssh_known_hosts,
                    timeout,
                })))
            }
        }
    }
}

/// Logs a failure at the access boundary and converts it.
pub(crate) fn report(op: &str, target: &str, e: impl Into<AccessError>) -> AccessError {
    let e = e.into();
    warn!("{op} {target} failed: {e}");
    e
}

pub(crate) fn join_path(dir: &str, name: &str) -> String {
    format!("{}/{name}", dir.trim_end_matches('/'))
}

/// Shell-style wildcard match supporting `*` and `?`. Like a shell glob,
/// dotfiles only match patterns that start with a dot.
pub(crate) fn matches_pattern(name: &str, pattern: &str) -> bool {
    if name.starts_with('.') && !pattern.starts_with('.') {
        return false;
    }

    let (name, pattern) = (name.as_bytes(), pattern.as_bytes());
    let (mut n, mut p) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while n < name.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, n));
                p += 1;
            }
            Some(&c) if c == b'?' || c == name[n] => {
                n += 1;
                p += 1;
            }
            _ => match backtrack {
                Some((star, consumed)) => {
                    p = star + 1;
                    n = consumed + 1;
                    backtrack = Some((star, consumed + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == b'*')
}

/// Quotes `s` as a single POSIX shell word.
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
