//! Optional `serde`+`toml` configuration file layered beneath each
//! binary's `clap` flags (SPEC_FULL §E.1). A binary resolves each
//! setting as `cli_flag.or(file_value).unwrap_or(built_in_default)`, so
//! the file is never required and a flag always wins when both are
//! given.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// The union of settings any of the three binaries might read from a
/// config file. Every field is optional: a binary only looks at the
/// ones relevant to it and ignores the rest, so one file can describe
/// an entire local deployment (name server, every storage server, and
/// a default client identity) if an operator wants that.
#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    /// Address a `ns` or `ss` binary listens on.
    pub bind: Option<SocketAddr>,
    /// Address a storage server advertises to the name server if it
    /// differs from `bind` (e.g. `bind` is a wildcard address).
    pub advertise: Option<SocketAddr>,
    /// Name server's catalog directory (`ns`).
    pub data_dir: Option<PathBuf>,
    /// Storage server's file root (`ss`).
    pub root: Option<PathBuf>,
    /// Name server address a storage server registers with, or a
    /// client connects to.
    pub ns: Option<SocketAddr>,
    /// Username a client session registers as.
    pub username: Option<String>,
}

/// Read and parse a TOML config file. A missing path is the caller's
/// error to handle (unlike the catalog's own persisted files, a
/// config file named explicitly on the command line is expected to
/// exist).
pub fn load_file_config(path: &Path) -> std::io::Result<FileConfig> {
    let contents = std::fs::read_to_string(path)?;
    toml::from_str(&contents).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_partial_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("distrifs.toml");
        std::fs::write(&path, "bind = \"127.0.0.1:9000\"\ndata_dir = \"/var/lib/distrifs\"\n").unwrap();

        let cfg = load_file_config(&path).unwrap();
        assert_eq!(cfg.bind, Some("127.0.0.1:9000".parse().unwrap()));
        assert_eq!(cfg.data_dir, Some(PathBuf::from("/var/lib/distrifs")));
        assert_eq!(cfg.ns, None);
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let missing = PathBuf::from("/nonexistent/distrifs.toml");
        assert!(load_file_config(&missing).is_err());
    }
}
