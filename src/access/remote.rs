use std::{
    fmt,
    io::{self, Read, Write},
    net::{TcpStream, ToSocketAddrs},
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use ssh2::{
    CheckResult, ErrorCode, ExtendedData, FileStat, KnownHostFileKind, OpenFlags, OpenType, Session, Sftp,
};
use tracing::{debug, instrument};

use super::{join_path, matches_pattern, report, shell_quote, AccessError, ServerAccess};

// LIBSSH2_FX_NO_SUCH_FILE
const SFTP_NO_SUCH_FILE: i32 = 2;

#[derive(Clone)]
pub enum Credential {
    KeyFile(PathBuf),
    Password(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::KeyFile(path) => f.debug_tuple("KeyFile").field(path).finish(),
            Credential::Password(_) => f.write_str("Password(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemoteTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub credential: Credential,
    pub known_hosts: Option<PathBuf>,
    pub timeout: Duration,
}

impl RemoteTarget {
    fn connect(&self) -> Result<Session, AccessError> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "host has no addresses"))?;
        let tcp = TcpStream::connect_timeout(&addr, self.timeout)?;

        let mut session = Session::new()?;
        session.set_timeout(u32::try_from(self.timeout.as_millis()).unwrap_or(u32::MAX));
        session.set_tcp_stream(tcp);
        session.handshake()?;

        if let Some(known_hosts) = &self.known_hosts {
            self.verify_host_key(&session, known_hosts)?;
        }

        match &self.credential {
            Credential::KeyFile(key) => {
                session.userauth_pubkey_file(&self.username, None, key, None)?
            }
            Credential::Password(password) => session.userauth_password(&self.username, password)?,
        }
        if !session.authenticated() {
            return Err(AccessError::AuthFailed(format!(
                "{}@{}",
                self.username, self.host
            )));
        }

        Ok(session)
    }

    fn verify_host_key(&self, session: &Session, known_hosts: &Path) -> Result<(), AccessError> {
        let mut known = session.known_hosts()?;
        known.read_file(known_hosts, KnownHostFileKind::OpenSSH)?;
        let (key, _) = session
            .host_key()
            .ok_or_else(|| AccessError::HostKey(self.host.clone()))?;

        match known.check_port(&self.host, self.port, key) {
            CheckResult::Match => Ok(()),
            _ => Err(AccessError::HostKey(self.host.clone())),
        }
    }
}

/// SSH backed access. Every operation opens its own session and closes it
/// when done.
pub struct RemoteAccess {
    target: Arc<RemoteTarget>,
}

impl RemoteAccess {
    pub fn new(target: RemoteTarget) -> Self {
        Self {
            target: Arc::new(target),
        }
    }

    async fn with_session<T, F>(&self, op: &'static str, subject: &str, f: F) -> Result<T, AccessError>
    where
        T: Send + 'static,
        F: FnOnce(&Session) -> Result<T, AccessError> + Send + 'static,
    {
        let target = self.target.clone();
        let res = tokio::task::spawn_blocking(move || {
            let session = target.connect()?;
            let res = f(&session);
            if let Err(e) = session.disconnect(None, "bye", None) {
                debug!("ssh disconnect from {} failed: {e}", target.host);
            }
            res
        })
        .await;

        match res {
            Ok(res) => res.map_err(|e| report(op, subject, e)),
            Err(e) => Err(report(op, subject, e)),
        }
    }
}

fn is_missing(e: &ssh2::Error) -> bool {
    matches!(e.code(), ErrorCode::SFTP(SFTP_NO_SUCH_FILE))
}

fn stat(sftp: &Sftp, path: &Path) -> Result<Option<FileStat>, ssh2::Error> {
    match sftp.stat(path) {
        Ok(stat) => Ok(Some(stat)),
        Err(e) if is_missing(&e) => Ok(None),
        Err(e) => Err(e),
    }
}

fn write_with(sftp: &Sftp, path: &Path, flags: OpenFlags, contents: &str) -> Result<(), AccessError> {
    // client configs carry private keys
    let mut file = sftp.open_mode(path, flags, 0o600, OpenType::File)?;
    file.write_all(contents.as_bytes())?;
    file.flush()?;
    Ok(())
}

#[async_trait]
impl ServerAccess for RemoteAccess {
    #[instrument(skip(self))]
    async fn file_exists(&self, path: &str) -> Result<bool, AccessError> {
        let target = PathBuf::from(path);
        self.with_session("stat", path, move |session| {
            Ok(stat(&session.sftp()?, &target)?.is_some())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn read_file(&self, path: &str) -> Result<Option<String>, AccessError> {
        let target = PathBuf::from(path);
        self.with_session("read", path, move |session| {
            let sftp = session.sftp()?;
            let mut file = match sftp.open(&target) {
                Ok(file) => file,
                Err(e) if is_missing(&e) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let mut contents = String::new();
            file.read_to_string(&mut contents)?;
            Ok(Some(contents))
        })
        .await
    }

    #[instrument(skip(self, contents))]
    async fn write_file(&self, path: &str, contents: &str) -> Result<(), AccessError> {
        let target = PathBuf::from(path);
        let contents = contents.to_owned();
        self.with_session("write", path, move |session| {
            let flags = OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE;
            write_with(&session.sftp()?, &target, flags, &contents)
        })
        .await
    }

    #[instrument(skip(self, contents))]
    async fn append_file(&self, path: &str, contents: &str) -> Result<(), AccessError> {
        let target = PathBuf::from(path);
        let contents = contents.to_owned();
        self.with_session("append", path, move |session| {
            let flags = OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::CREATE;
            write_with(&session.sftp()?, &target, flags, &contents)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn list_files(&self, dir: &str, pattern: &str) -> Result<Vec<String>, AccessError> {
        let root = dir.to_owned();
        let pattern = pattern.to_owned();
        self.with_session("list", dir, move |session| {
            let sftp = session.sftp()?;
            let entries = match sftp.readdir(Path::new(&root)) {
                Ok(entries) => entries,
                Err(e) if is_missing(&e) => return Ok(vec![]),
                Err(e) => return Err(e.into()),
            };

            let mut files = entries
                .into_iter()
                .filter(|(_, stat)| stat.is_file())
                .filter_map(|(path, _)| {
                    let name = path.file_name()?.to_str()?;
                    matches_pattern(name, &pattern).then(|| join_path(&root, name))
                })
                .collect::<Vec<_>>();
            files.sort();

            Ok(files)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn run_command(&self, cmd: &str) -> Result<i32, AccessError> {
        let line = format!("bash -c {}", shell_quote(cmd));
        self.with_session("run", cmd, move |session| {
            let mut channel = session.channel_session()?;
            // stderr shares the window with stdout, an unread stderr stream stalls the command
            channel.handle_extended_data(ExtendedData::Merge)?;
            channel.exec(&line)?;

            let output = read_output(&mut channel)?;
            channel.wait_close()?;

            let status = channel.exit_status()?;
            debug!("`{line}` exited with {status}, output: {output:?}");
            Ok(status)
        })
        .await
    }
}

/// Drains command output. Tools may print non-UTF-8 bytes, which are replaced.
fn read_output(mut stream: impl Read) -> io::Result<String> {
    let mut output = Vec::new();
    stream.read_to_end(&mut output)?;
    Ok(String::from_utf8_lossy(&output).into_owned())
}
