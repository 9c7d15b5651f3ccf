use std::{io::ErrorKind, time::Duration};

use async_trait::async_trait;
use tokio::{
    fs::{self, OpenOptions},
    io::AsyncWriteExt,
    process::Command,
};
use tracing::{debug, instrument};

use super::{join_path, matches_pattern, report, AccessError, ServerAccess};

/// Runs directly on the WireGuard host.
pub struct LocalAccess {
    timeout: Duration,
}

impl LocalAccess {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn open_and_write(
        &self,
        options: &OpenOptions,
        path: &str,
        contents: &str,
    ) -> std::io::Result<()> {
        let mut file = options.open(path).await?;
        file.write_all(contents.as_bytes()).await?;
        file.flush().await
    }
}

fn write_options(append: bool) -> OpenOptions {
    let mut options = OpenOptions::new();
    options.create(true);
    if append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }
    // client configs carry private keys
    #[cfg(unix)]
    options.mode(0o600);
    options
}

#[async_trait]
impl ServerAccess for LocalAccess {
    #[instrument(skip(self))]
    async fn file_exists(&self, path: &str) -> Result<bool, AccessError> {
        fs::try_exists(path)
            .await
            .map_err(|e| report("stat", path, e))
    }

    #[instrument(skip(self))]
    async fn read_file(&self, path: &str) -> Result<Option<String>, AccessError> {
        match fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(report("read", path, e)),
        }
    }

    #[instrument(skip(self, contents))]
    async fn write_file(&self, path: &str, contents: &str) -> Result<(), AccessError> {
        self.open_and_write(&write_options(false), path, contents)
            .await
            .map_err(|e| report("write", path, e))
    }

    #[instrument(skip(self, contents))]
    async fn append_file(&self, path: &str, contents: &str) -> Result<(), AccessError> {
        self.open_and_write(&write_options(true), path, contents)
            .await
            .map_err(|e| report("append", path, e))
    }

    #[instrument(skip(self))]
    async fn list_files(&self, dir: &str, pattern: &str) -> Result<Vec<String>, AccessError> {
        let mut entries = match fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(vec![]),
            Err(e) => return Err(report("list", dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| report("list", dir, e))?
        {
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if !matches_pattern(&name, pattern) {
                continue;
            }
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| report("list", dir, e))?;
            if file_type.is_dir() {
                continue;
            }
            files.push(join_path(dir, &name));
        }
        files.sort();

        Ok(files)
    }

    #[instrument(skip(self))]
    async fn run_command(&self, cmd: &str) -> Result<i32, AccessError> {
        let mut command = Command::new("bash");
        command.arg("-c").arg(cmd).kill_on_drop(true);

        let status = tokio::time::timeout(self.timeout, command.status())
            .await
            .map_err(|_| report("run", cmd, AccessError::Timeout(self.timeout)))?
            .map_err(|e| report("run", cmd, e))?;
        debug!("`{cmd}` exited with {status}");

        // killed by a signal
        Ok(status.code().unwrap_or(-1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn access() -> LocalAccess {
        LocalAccess::new(Duration::from_secs(5))
    }

    fn path_in(dir: &tempfile::TempDir, name: &str) -> String {
        join_path(dir.path().to_str().unwrap(), name)
    }

    #[tokio::test]
    async fn write_read_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "phone.conf");
        let access = access();

        assert!(!access.file_exists(&path).await.unwrap());
        assert_eq!(access.read_file(&path).await.unwrap(), None);

        access.write_file(&path, "first").await.unwrap();
        access.write_file(&path, "second").await.unwrap();

        assert!(access.file_exists(&path).await.unwrap());
        assert_eq!(access.read_file(&path).await.unwrap().as_deref(), Some("second"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn written_files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "phone.conf");
        access().write_file(&path, "PrivateKey = x").await.unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn append_keeps_existing_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = path_in(&dir, "wg0.conf");
        std::fs::write(&path, "[Interface]\n").unwrap();

        let access = access();
        access.append_file(&path, "\n[Peer]\n").await.unwrap();
        access.append_file(&path, "\n[Peer]\n").await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "[Interface]\n\n[Peer]\n\n[Peer]\n"
        );
    }

    #[tokio::test]
    async fn lists_matching_files_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.conf", "a.conf", "notes.txt", ".hidden.conf"] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }
        std::fs::create_dir(dir.path().join("nested.conf")).unwrap();

        let files = access()
            .list_files(dir.path().to_str().unwrap(), "*.conf")
            .await
            .unwrap();

        assert_eq!(files, vec![path_in(&dir, "a.conf"), path_in(&dir, "b.conf")]);
    }

    #[tokio::test]
    async fn missing_directory_lists_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = access()
            .list_files(&path_in(&dir, "clients"), "*.conf")
            .await
            .unwrap();
        assert!(files.is_empty());
    }

    #[tokio::test]
    async fn reports_exit_status() {
        let access = access();
        assert_eq!(access.run_command("true").await.unwrap(), 0);
        assert_eq!(access.run_command("exit 3").await.unwrap(), 3);
        // needs bash for process substitution
        assert_eq!(access.run_command("cat <(echo ok) >/dev/null").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn slow_commands_time_out() {
        let access = LocalAccess::new(Duration::from_millis(100));
        assert!(matches!(
            access.run_command("sleep 5").await,
            Err(AccessError::Timeout(_))
        ));
    }
}
