// SFTP FileServerConnector Implementation (ssh2)

use crate::classify::{auth_error, io_error, is_not_found, ssh_error};
use crate::key_file::ScopedKeyFile;
use async_trait::async_trait;
use courier_core::domain::{ConnectionFailure, ConnectionTarget, RunError, SftpAuth, SftpParams};
use courier_core::port::file_server::remote_base_name;
use courier_core::port::{FileServerConnector, FileServerSession, RemoteEntry};
use secrecy::{ExposeSecret, SecretString};
use ssh2::{CheckResult, FileStat, KnownHostFileKind, Session, Sftp};
use std::fs::File;
use std::io;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// TCP connect timeout; individual SFTP calls use transport defaults
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SftpConnector {
    known_hosts: Option<PathBuf>,
    connect_timeout: Duration,
}

impl SftpConnector {
    /// `known_hosts` is required unless every credential disables host key checks
    pub fn new(known_hosts: Option<PathBuf>) -> Self {
        Self {
            known_hosts,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

enum Auth {
    Password(SecretString),
    Key {
        key: SecretString,
        passphrase: Option<SecretString>,
    },
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::new(secret.expose_secret().into())
}

/// Owned copy of the connection parameters for the blocking pool
struct ConnectRequest {
    target: ConnectionTarget,
    auth: Auth,
    verify_host_key: bool,
    known_hosts: Option<PathBuf>,
    timeout: Duration,
}

#[async_trait]
impl FileServerConnector for SftpConnector {
    async fn connect(&self, params: &SftpParams) -> Result<Box<dyn FileServerSession>, RunError> {
        let target = params.target();
        let auth = match &params.auth {
            SftpAuth::Password(pw) => Auth::Password(copy_secret(pw)),
            SftpAuth::PrivateKey { key, passphrase } => Auth::Key {
                key: copy_secret(key),
                passphrase: passphrase.as_ref().map(copy_secret),
            },
        };
        if params.disable_host_key_checking {
            warn!(endpoint = %target, "Host key checking disabled for this credential");
        }
        let request = ConnectRequest {
            target: target.clone(),
            auth,
            verify_host_key: !params.disable_host_key_checking,
            known_hosts: self.known_hosts.clone(),
            timeout: self.connect_timeout,
        };

        let connection = tokio::task::spawn_blocking(move || open(request))
            .await
            .map_err(|e| RunError::Aborted(format!("SFTP connect task failed: {}", e)))??;

        info!(host = %target.host, port = target.port, username = %target.username, "SFTP session opened");
        Ok(Box::new(SftpSession {
            target,
            connection: Arc::new(Mutex::new(connection)),
        }))
    }
}

struct Connection {
    // Kept alive for the lifetime of the SFTP channel
    _session: Session,
    sftp: Sftp,
}

fn open(request: ConnectRequest) -> Result<Connection, RunError> {
    let target = &request.target;

    let addr = (target.host.as_str(), target.port)
        .to_socket_addrs()
        .map_err(|e| io_error(target, "resolve", &e))?
        .next()
        .ok_or_else(|| {
            RunError::connection(
                ConnectionFailure::Unreachable,
                target,
                "host name did not resolve to any address",
            )
        })?;
    let tcp = TcpStream::connect_timeout(&addr, request.timeout)
        .map_err(|e| io_error(target, "connect", &e))?;

    let mut session = Session::new().map_err(|e| ssh_error(target, "session", &e))?;
    session.set_tcp_stream(tcp);
    session
        .handshake()
        .map_err(|e| ssh_error(target, "handshake", &e))?;

    if request.verify_host_key {
        verify_host_key(&session, target, request.known_hosts.as_deref())?;
    }
    authenticate(&session, target, &request.auth)?;

    let sftp = session
        .sftp()
        .map_err(|e| ssh_error(target, "sftp subsystem", &e))?;
    Ok(Connection {
        _session: session,
        sftp,
    })
}

fn verify_host_key(
    session: &Session,
    target: &ConnectionTarget,
    known_hosts: Option<&Path>,
) -> Result<(), RunError> {
    let certificate = |message: String| {
        RunError::connection(ConnectionFailure::Certificate, target, message)
    };

    let path = known_hosts.ok_or_else(|| {
        certificate("host key checking is enabled but no known_hosts file is configured".to_string())
    })?;
    let (key, _) = session
        .host_key()
        .ok_or_else(|| certificate("server did not present a host key".to_string()))?;

    let mut known = session
        .known_hosts()
        .map_err(|e| ssh_error(target, "known_hosts", &e))?;
    known
        .read_file(path, KnownHostFileKind::OpenSSH)
        .map_err(|e| certificate(format!("cannot read {}: {}", path.display(), e.message())))?;

    match known.check_port(&target.host, target.port, key) {
        CheckResult::Match => {
            debug!(host = %target.host, "Host key verified");
            Ok(())
        }
        CheckResult::NotFound => Err(certificate(format!(
            "host key for {} not found in {}",
            target.host,
            path.display()
        ))),
        CheckResult::Mismatch => Err(certificate(format!(
            "host key for {} does not match {}",
            target.host,
            path.display()
        ))),
        CheckResult::Failure => Err(certificate("host key check failed".to_string())),
    }
}

fn authenticate(session: &Session, target: &ConnectionTarget, auth: &Auth) -> Result<(), RunError> {
    let result = match auth {
        Auth::Password(password) => {
            session.userauth_password(&target.username, password.expose_secret())
        }
        Auth::Key { key, passphrase } => {
            let key_file = ScopedKeyFile::write(key.expose_secret())
                .map_err(|e| RunError::staging("writing private key file", e))?;
            session.userauth_pubkey_file(
                &target.username,
                None,
                key_file.path(),
                passphrase.as_ref().map(|p| p.expose_secret()),
            )
        }
    };
    result.map_err(|e| auth_error(target, &e))?;

    if !session.authenticated() {
        return Err(RunError::connection(
            ConnectionFailure::AuthFailed,
            target,
            "server did not accept the credentials",
        ));
    }
    Ok(())
}

pub struct SftpSession {
    target: ConnectionTarget,
    connection: Arc<Mutex<Connection>>,
}

impl SftpSession {
    /// Run `op` against the SFTP channel on the blocking pool
    async fn with_sftp<T, F>(&self, op: F) -> Result<T, RunError>
    where
        T: Send + 'static,
        F: FnOnce(&Sftp, &ConnectionTarget) -> Result<T, RunError> + Send + 'static,
    {
        let connection = Arc::clone(&self.connection);
        let target = self.target.clone();
        tokio::task::spawn_blocking(move || {
            let guard = connection
                .lock()
                .map_err(|_| RunError::Aborted("SFTP session lock poisoned".to_string()))?;
            op(&guard.sftp, &target)
        })
        .await
        .map_err(|e| RunError::Aborted(format!("SFTP task failed: {}", e)))?
    }
}

fn to_entry(path: &Path, stat: &FileStat) -> RemoteEntry {
    let path = path.to_string_lossy().into_owned();
    RemoteEntry {
        name: remote_base_name(&path).to_string(),
        path,
        is_dir: stat.is_dir(),
        size: stat.size.unwrap_or(0),
        modified: stat.mtime.map(|m| m as i64),
    }
}

/// Every ancestor of `path`, shortest first, including `path` itself
fn dir_prefixes(path: &str) -> Vec<String> {
    let absolute = path.starts_with('/');
    let mut current = String::new();
    let mut prefixes = Vec::new();
    for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
        if !current.is_empty() || absolute {
            current.push('/');
        }
        current.push_str(part);
        prefixes.push(current.clone());
    }
    prefixes
}

#[async_trait]
impl FileServerSession for SftpSession {
    fn target(&self) -> &ConnectionTarget {
        &self.target
    }

    async fn stat(&mut self, path: &str) -> Result<Option<RemoteEntry>, RunError> {
        let path = path.to_string();
        self.with_sftp(move |sftp, target| match sftp.stat(Path::new(&path)) {
            Ok(stat) => Ok(Some(to_entry(Path::new(&path), &stat))),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(ssh_error(target, &format!("stat {}", path), &e)),
        })
        .await
    }

    async fn list_dir(&mut self, path: &str) -> Result<Vec<RemoteEntry>, RunError> {
        let path = path.to_string();
        self.with_sftp(move |sftp, target| {
            let entries = sftp
                .readdir(Path::new(&path))
                .map_err(|e| ssh_error(target, &format!("list {}", path), &e))?;
            Ok(entries
                .iter()
                .map(|(p, stat)| to_entry(p, stat))
                .filter(|e| e.name != "." && e.name != "..")
                .collect())
        })
        .await
    }

    async fn download(&mut self, remote: &str, local: &Path) -> Result<u64, RunError> {
        let remote = remote.to_string();
        let local = local.to_path_buf();
        self.with_sftp(move |sftp, target| {
            let mut source = sftp
                .open(Path::new(&remote))
                .map_err(|e| ssh_error(target, &format!("open {}", remote), &e))?;
            let mut staged = File::create(&local)
                .map_err(|e| RunError::staging(format!("creating {}", local.display()), e))?;
            io::copy(&mut source, &mut staged)
                .map_err(|e| io_error(target, &format!("download {}", remote), &e))
        })
        .await
    }

    async fn upload(&mut self, local: &Path, remote: &str) -> Result<u64, RunError> {
        let remote = remote.to_string();
        let local = local.to_path_buf();
        self.with_sftp(move |sftp, target| {
            let mut staged = File::open(&local)
                .map_err(|e| RunError::staging(format!("opening {}", local.display()), e))?;
            let mut destination = sftp
                .create(Path::new(&remote))
                .map_err(|e| ssh_error(target, &format!("create {}", remote), &e))?;
            io::copy(&mut staged, &mut destination)
                .map_err(|e| io_error(target, &format!("upload {}", remote), &e))
        })
        .await
    }

    async fn create_dir_all(&mut self, path: &str) -> Result<(), RunError> {
        let prefixes = dir_prefixes(path);
        self.with_sftp(move |sftp, target| {
            for dir in &prefixes {
                match sftp.stat(Path::new(dir)) {
                    Ok(stat) if stat.is_dir() => continue,
                    Ok(_) => {
                        return Err(RunError::Configuration(format!(
                            "Remote path {} exists and is not a directory",
                            dir
                        )))
                    }
                    Err(e) if is_not_found(&e) => {}
                    Err(e) => return Err(ssh_error(target, &format!("stat {}", dir), &e)),
                }
                if let Err(e) = sftp.mkdir(Path::new(dir), 0o755) {
                    // Lost a race with another writer
                    let created = sftp.stat(Path::new(dir)).map(|s| s.is_dir()).unwrap_or(false);
                    if !created {
                        return Err(ssh_error(target, &format!("mkdir {}", dir), &e));
                    }
                }
                debug!(dir = %dir, "Created remote directory");
            }
            Ok(())
        })
        .await
    }

    async fn remove_file(&mut self, path: &str) -> Result<(), RunError> {
        let path = path.to_string();
        self.with_sftp(move |sftp, target| {
            sftp.unlink(Path::new(&path))
                .map_err(|e| ssh_error(target, &format!("remove {}", path), &e))
        })
        .await
    }

    async fn set_modified(&mut self, path: &str, modified: i64) -> Result<(), RunError> {
        let path = path.to_string();
        let time = u64::try_from(modified).unwrap_or(0);
        self.with_sftp(move |sftp, target| {
            let stat = FileStat {
                size: None,
                uid: None,
                gid: None,
                perm: None,
                atime: Some(time),
                mtime: Some(time),
            };
            sftp.setstat(Path::new(&path), stat)
                .map_err(|e| ssh_error(target, &format!("set mtime {}", path), &e))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dir_prefixes() {
        assert_eq!(dir_prefixes("/out/2024/01"), vec!["/out", "/out/2024", "/out/2024/01"]);
        assert_eq!(dir_prefixes("out/a/"), vec!["out", "out/a"]);
        assert_eq!(dir_prefixes("./drop"), vec!["drop"]);
        assert!(dir_prefixes("/").is_empty());
    }

    #[test]
    fn test_to_entry() {
        let stat = FileStat {
            size: Some(42),
            uid: None,
            gid: None,
            perm: Some(0o100644),
            atime: None,
            mtime: Some(1_700_000_000),
        };
        let entry = to_entry(Path::new("/in/data.csv"), &stat);
        assert_eq!(entry.name, "data.csv");
        assert_eq!(entry.size, 42);
        assert!(!entry.is_dir);
        assert_eq!(entry.modified, Some(1_700_000_000));
    }

    #[tokio::test]
    async fn test_refused_port_is_classified() {
        // Bind then drop to get a local port with nothing listening
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let params = SftpParams {
            host: "127.0.0.1".to_string(),
            port,
            username: "etl".to_string(),
            auth: SftpAuth::Password(SecretString::new("pw".into())),
            disable_host_key_checking: true,
        };

        let err = match SftpConnector::new(None).connect(&params).await {
            Err(e) => e,
            Ok(_) => panic!("connect should fail"),
        };
        assert!(matches!(
            err,
            RunError::Connection {
                kind: ConnectionFailure::Refused,
                ..
            }
        ));
    }
}
