// File Server Port (remote directory access, e.g. SFTP)

use crate::domain::{ConnectionTarget, RunError, SftpParams};
use async_trait::async_trait;
use std::path::Path;

/// One remote directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub size: u64,
    /// Modification time, epoch seconds
    pub modified: Option<i64>,
}

/// Opens sessions against a file server
#[async_trait]
pub trait FileServerConnector: Send + Sync {
    async fn connect(&self, params: &SftpParams) -> Result<Box<dyn FileServerSession>, RunError>;
}

/// An authenticated session; dropped to disconnect
#[async_trait]
pub trait FileServerSession: Send {
    fn target(&self) -> &ConnectionTarget;

    /// `None` when the path does not exist
    async fn stat(&mut self, path: &str) -> Result<Option<RemoteEntry>, RunError>;

    /// Direct children of a directory, excluding `.` and `..`
    async fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, RunError>;

    /// Copy a remote file to a local path, returning bytes written
    async fn download(&mut self, remote: &str, local: &Path) -> Result<u64, RunError>;

    /// Copy a local file to a remote path, returning bytes written
    async fn upload(&mut self, local: &Path, remote: &str) -> Result<u64, RunError>;

    async fn create_dir_all(&mut self, path: &str) -> Result<(), RunError>;

    async fn remove_file(&mut self, path: &str) -> Result<(), RunError>;

    async fn set_modified(&mut self, path: &str, modified: i64) -> Result<(), RunError>;
}

/// Join remote path segments with `/`
pub fn join_remote(dir: &str, name: &str) -> String {
    let name = name.trim_start_matches('/');
    if dir.is_empty() {
        name.to_string()
    } else if dir.ends_with('/') {
        format!("{}{}", dir, name)
    } else {
        format!("{}/{}", dir, name)
    }
}

/// Last segment of a remote path
pub fn remote_base_name(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}

pub mod mocks {
    use super::*;
    use crate::domain::ConnectionFailure;
    use std::collections::{BTreeMap, BTreeSet};
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone)]
    pub struct MemoryFile {
        pub data: Vec<u8>,
        pub modified: i64,
    }

    #[derive(Default)]
    struct State {
        files: BTreeMap<String, MemoryFile>,
        dirs: BTreeSet<String>,
        uploads: usize,
        fail_upload_at: Option<usize>,
        refuse_connections: bool,
        connect_delay: Option<std::time::Duration>,
        connects: usize,
    }

    fn normalize(path: &str) -> String {
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    }

    fn parent_of(path: &str) -> String {
        match path.rfind('/') {
            Some(0) => "/".to_string(),
            Some(i) => path[..i].to_string(),
            None => ".".to_string(),
        }
    }

    /// In-memory file server shared by every session it opens
    #[derive(Clone, Default)]
    pub struct MemoryFileServer {
        state: Arc<Mutex<State>>,
    }

    impl MemoryFileServer {
        pub fn new() -> Self {
            let server = Self::default();
            {
                let mut state = server.state.lock().unwrap();
                state.dirs.insert("/".to_string());
                // login directory
                state.dirs.insert(".".to_string());
            }
            server
        }

        /// Add a file, creating parent directories
        pub fn add_file(&self, path: &str, data: &[u8], modified: i64) {
            let path = normalize(path);
            self.add_dir(&parent_of(&path));
            self.state.lock().unwrap().files.insert(
                path,
                MemoryFile {
                    data: data.to_vec(),
                    modified,
                },
            );
        }

        pub fn add_dir(&self, path: &str) {
            let mut state = self.state.lock().unwrap();
            let mut current = normalize(path);
            while current != "/" && current != "." {
                let parent = parent_of(&current);
                state.dirs.insert(current);
                current = parent;
            }
        }

        pub fn file(&self, path: &str) -> Option<MemoryFile> {
            self.state.lock().unwrap().files.get(&normalize(path)).cloned()
        }

        pub fn exists(&self, path: &str) -> bool {
            let path = normalize(path);
            let state = self.state.lock().unwrap();
            state.files.contains_key(&path) || state.dirs.contains(&path)
        }

        /// File paths under `dir`, at any depth
        pub fn files_under(&self, dir: &str) -> Vec<String> {
            let prefix = format!("{}/", normalize(dir).trim_end_matches('/'));
            self.state
                .lock()
                .unwrap()
                .files
                .keys()
                .filter(|p| p.starts_with(&prefix))
                .cloned()
                .collect()
        }

        /// The n-th upload (1-based) fails with a transport error
        pub fn fail_upload_at(&self, n: usize) {
            self.state.lock().unwrap().fail_upload_at = Some(n);
        }

        pub fn refuse_connections(&self) {
            self.state.lock().unwrap().refuse_connections = true;
        }

        /// Every connect sleeps first (simulates a wedged endpoint)
        pub fn delay_connections(&self, delay: std::time::Duration) {
            self.state.lock().unwrap().connect_delay = Some(delay);
        }

        pub fn connect_count(&self) -> usize {
            self.state.lock().unwrap().connects
        }
    }

    #[async_trait]
    impl FileServerConnector for MemoryFileServer {
        async fn connect(
            &self,
            params: &SftpParams,
        ) -> Result<Box<dyn FileServerSession>, RunError> {
            let target = params.target();
            let delay = self.state.lock().unwrap().connect_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let mut state = self.state.lock().unwrap();
            if state.refuse_connections {
                return Err(RunError::connection(
                    ConnectionFailure::Refused,
                    &target,
                    "Connection refused",
                ));
            }
            state.connects += 1;
            Ok(Box::new(MemorySession {
                state: Arc::clone(&self.state),
                target,
            }))
        }
    }

    struct MemorySession {
        state: Arc<Mutex<State>>,
        target: ConnectionTarget,
    }

    impl MemorySession {
        fn missing(&self, path: &str) -> RunError {
            RunError::transport(&self.target, format!("No such file: {}", path))
        }
    }

    #[async_trait]
    impl FileServerSession for MemorySession {
        fn target(&self) -> &ConnectionTarget {
            &self.target
        }

        async fn stat(&mut self, path: &str) -> Result<Option<RemoteEntry>, RunError> {
            let path = normalize(path);
            let state = self.state.lock().unwrap();
            let name = remote_base_name(&path).to_string();
            if let Some(file) = state.files.get(&path) {
                return Ok(Some(RemoteEntry {
                    path: path.clone(),
                    name,
                    is_dir: false,
                    size: file.data.len() as u64,
                    modified: Some(file.modified),
                }));
            }
            if state.dirs.contains(&path) {
                return Ok(Some(RemoteEntry {
                    path: path.clone(),
                    name,
                    is_dir: true,
                    size: 0,
                    modified: None,
                }));
            }
            Ok(None)
        }

        async fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, RunError> {
            let dir = normalize(path);
            let state = self.state.lock().unwrap();
            if !state.dirs.contains(&dir) {
                return Err(self.missing(&dir));
            }
            let mut entries: Vec<RemoteEntry> = state
                .files
                .iter()
                .filter(|(p, _)| parent_of(p) == dir)
                .map(|(p, f)| RemoteEntry {
                    path: p.clone(),
                    name: remote_base_name(p).to_string(),
                    is_dir: false,
                    size: f.data.len() as u64,
                    modified: Some(f.modified),
                })
                .collect();
            entries.extend(
                state
                    .dirs
                    .iter()
                    .filter(|d| d.as_str() != dir && parent_of(d) == dir)
                    .map(|d| RemoteEntry {
                        path: d.clone(),
                        name: remote_base_name(d).to_string(),
                        is_dir: true,
                        size: 0,
                        modified: None,
                    }),
            );
            Ok(entries)
        }

        async fn download(&mut self, remote: &str, local: &Path) -> Result<u64, RunError> {
            let data = {
                let state = self.state.lock().unwrap();
                match state.files.get(&normalize(remote)) {
                    Some(f) => f.data.clone(),
                    None => return Err(self.missing(remote)),
                }
            };
            tokio::fs::write(local, &data)
                .await
                .map_err(|e| RunError::staging(format!("writing {}", local.display()), e))?;
            Ok(data.len() as u64)
        }

        async fn upload(&mut self, local: &Path, remote: &str) -> Result<u64, RunError> {
            let data = tokio::fs::read(local)
                .await
                .map_err(|e| RunError::staging(format!("reading {}", local.display()), e))?;

            let mut state = self.state.lock().unwrap();
            state.uploads += 1;
            if state.fail_upload_at == Some(state.uploads) {
                return Err(RunError::transport(&self.target, "Connection reset by peer"));
            }
            let path = normalize(remote);
            if !state.dirs.contains(&parent_of(&path)) {
                return Err(self.missing(&parent_of(&path)));
            }
            let size = data.len() as u64;
            state.files.insert(path, MemoryFile { data, modified: 0 });
            Ok(size)
        }

        async fn create_dir_all(&mut self, path: &str) -> Result<(), RunError> {
            let mut state = self.state.lock().unwrap();
            let mut current = normalize(path);
            while current != "/" && current != "." {
                let parent = parent_of(&current);
                state.dirs.insert(current);
                current = parent;
            }
            Ok(())
        }

        async fn remove_file(&mut self, path: &str) -> Result<(), RunError> {
            let removed = self.state.lock().unwrap().files.remove(&normalize(path));
            match removed {
                Some(_) => Ok(()),
                None => Err(self.missing(path)),
            }
        }

        async fn set_modified(&mut self, path: &str, modified: i64) -> Result<(), RunError> {
            let mut state = self.state.lock().unwrap();
            match state.files.get_mut(&normalize(path)) {
                Some(file) => {
                    file.modified = modified;
                    Ok(())
                }
                None => Err(self.missing(path)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_remote() {
        assert_eq!(join_remote("/out", "a.csv"), "/out/a.csv");
        assert_eq!(join_remote("/out/", "a.csv"), "/out/a.csv");
        assert_eq!(join_remote("/", "a.csv"), "/a.csv");
        assert_eq!(join_remote("", "a.csv"), "a.csv");
    }

    #[test]
    fn test_remote_base_name() {
        assert_eq!(remote_base_name("/in/data.csv"), "data.csv");
        assert_eq!(remote_base_name("data.csv"), "data.csv");
        assert_eq!(remote_base_name("/in/sub/"), "sub");
    }
}
