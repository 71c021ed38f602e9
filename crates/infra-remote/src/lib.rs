// Courier Infrastructure - Remote Endpoints
// Implements: FileServerConnector (SFTP over ssh2), QuerySource (MSSQL over tiberius)
//
// ssh2 is a blocking library; every SFTP call runs on the blocking pool.

mod classify;
mod key_file;
mod mssql;
mod sftp;

pub use key_file::ScopedKeyFile;
pub use mssql::MssqlSource;
pub use sftp::{SftpConnector, DEFAULT_CONNECT_TIMEOUT};
