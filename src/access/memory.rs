use std::{
    collections::{BTreeMap, BTreeSet},
    io,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use super::{matches_pattern, AccessError, ServerAccess};

/// In-memory host for tests. Every operation yields to the scheduler first
/// so concurrent callers interleave.
#[derive(Default)]
pub struct MemoryAccess {
    files: Mutex<BTreeMap<String, String>>,
    commands: Mutex<Vec<String>>,
    exit_codes: Mutex<Vec<(String, i32)>>,
    fail_appends: AtomicBool,
    fail_reads: Mutex<BTreeSet<String>>,
}

impl MemoryAccess {
    pub fn with_file(self, path: &str, contents: &str) -> Self {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_owned(), contents.to_owned());
        self
    }

    /// Commands starting with `prefix` exit with `code`.
    pub fn exit_with(self, prefix: &str, code: i32) -> Self {
        self.exit_codes.lock().unwrap().push((prefix.to_owned(), code));
        self
    }

    pub fn fail_appends(&self) {
        self.fail_appends.store(true, Ordering::SeqCst);
    }

    /// Reads of `path` fail as if the connection dropped.
    pub fn fail_reads_of(&self, path: &str) {
        self.fail_reads.lock().unwrap().insert(path.to_owned());
    }

    pub fn file(&self, path: &str) -> Option<String> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }
}

#[async_trait]
impl ServerAccess for MemoryAccess {
    async fn file_exists(&self, path: &str) -> Result<bool, AccessError> {
        tokio::task::yield_now().await;
        Ok(self.files.lock().unwrap().contains_key(path))
    }

    async fn read_file(&self, path: &str) -> Result<Option<String>, AccessError> {
        tokio::task::yield_now().await;
        if self.fail_reads.lock().unwrap().contains(path) {
            return Err(io::Error::new(io::ErrorKind::ConnectionReset, "connection reset").into());
        }
        Ok(self.file(path))
    }

    async fn write_file(&self, path: &str, contents: &str) -> Result<(), AccessError> {
        tokio::task::yield_now().await;
        self.files
            .lock()
            .unwrap()
            .insert(path.to_owned(), contents.to_owned());
        Ok(())
    }

    async fn append_file(&self, path: &str, contents: &str) -> Result<(), AccessError> {
        tokio::task::yield_now().await;
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "connection reset").into());
        }
        self.files
            .lock()
            .unwrap()
            .entry(path.to_owned())
            .or_default()
            .push_str(contents);
        Ok(())
    }

    async fn list_files(&self, dir: &str, pattern: &str) -> Result<Vec<String>, AccessError> {
        tokio::task::yield_now().await;
        let dir = dir.trim_end_matches('/');
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|path| {
                matches!(path.rsplit_once('/'), Some((parent, name)) if parent == dir && matches_pattern(name, pattern))
            })
            .cloned()
            .collect())
    }

    async fn run_command(&self, cmd: &str) -> Result<i32, AccessError> {
        tokio::task::yield_now().await;
        self.commands.lock().unwrap().push(cmd.to_owned());
        Ok(self
            .exit_codes
            .lock()
            .unwrap()
            .iter()
            .find(|(prefix, _)| cmd.starts_with(prefix.as_str()))
            .map_or(0, |(_, code)| *code))
    }
}
