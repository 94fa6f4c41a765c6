//! On-disk persistence for the catalog (§3, SPEC_FULL §E.6):
//! `user_data.dat` (one username per line) and `file_metadata.dat`
//! (`filename;owner;ss_ip;ss_port[;user,perm]*`). Every save writes a
//! temp file and renames it into place so a crash mid-write never
//! corrupts the file an earlier successful save produced.

use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::types::{FileMetadata, Permission};
use super::CatalogService;

const USER_FILE: &str = "user_data.dat";
const FILE_METADATA_FILE: &str = "file_metadata.dat";

async fn write_atomic(path: &Path, contents: &str) -> io::Result<()> {
    let tmp = path.with_extension("tmp");
    {
        let mut f = fs::File::create(&tmp).await?;
        f.write_all(contents.as_bytes()).await?;
        f.flush().await?;
    }
    fs::rename(&tmp, path).await
}

impl CatalogService {
    /// Load `user_data.dat` and `file_metadata.dat` from the data
    /// directory if present. Missing files mean a fresh catalog, not an
    /// error. A file row naming a storage server that never registers
    /// before first use is simply never resolvable; callers do not treat
    /// that as a load-time failure (§6).
    pub async fn load(&self) -> io::Result<()> {
        self.load_users().await?;
        self.load_files().await?;
        Ok(())
    }

    async fn load_users(&self) -> io::Result<()> {
        let path = self.data_dir().join(USER_FILE);
        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let mut users = self.users.lock().await;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            // A username alone has no address to restore; give it the
            // unspecified address until the user reconnects and
            // re-registers with their real one.
            let placeholder: SocketAddr = "0.0.0.0:0".parse().unwrap();
            users.register(line, placeholder);
        }
        Ok(())
    }

    /// Load `file_metadata.dat`, dropping any row whose storage server is
    /// not currently in the SS registry rather than retaining it pending
    /// (§6). A dropped row is not lost for good: if its storage server
    /// later calls `REGISTER_SS` and advertises the same filename, it is
    /// re-synthesized with owner `ss_owner` by
    /// [`CatalogService::register_storage_server`] — the richer
    /// owner/ACL metadata does not survive, but the file stays visible.
    /// Callers that want persisted rows to outlive a restart should
    /// register their storage servers before calling [`Self::load`] (the
    /// `ns` binary does this with a short startup grace window).
    async fn load_files(&self) -> io::Result<()> {
        let path = self.data_dir().join(FILE_METADATA_FILE);
        let contents = match fs::read_to_string(&path).await {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        let ss_registry = self.ss_registry.lock().await;
        let mut files = self.files.lock().await;
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(meta) = parse_file_record(line) else { continue };
            if !ss_registry.contains(&meta.ss) {
                tracing::warn!(
                    filename = %meta.filename,
                    ss = %meta.ss,
                    "skipping persisted file metadata: storage server not currently registered"
                );
                continue;
            }
            files.insert(meta);
        }
        Ok(())
    }

    pub async fn save(&self) -> io::Result<()> {
        self.save_users().await?;
        self.save_files().await?;
        Ok(())
    }

    async fn save_users(&self) -> io::Result<()> {
        let users = self.users.lock().await;
        let mut body = String::new();
        for name in users.names() {
            body.push_str(&name);
            body.push('\n');
        }
        drop(users);
        write_atomic(&self.data_dir().join(USER_FILE), &body).await
    }

    async fn save_files(&self) -> io::Result<()> {
        let files = self.files.lock().await;
        let mut body = String::new();
        for meta in files.iter() {
            body.push_str(&format_file_record(meta));
            body.push('\n');
        }
        drop(files);
        write_atomic(&self.data_dir().join(FILE_METADATA_FILE), &body).await
    }
}

fn format_file_record(meta: &FileMetadata) -> String {
    let mut fields = vec![
        meta.filename.clone(),
        meta.owner.clone(),
        meta.ss.ip().to_string(),
        meta.ss.port().to_string(),
    ];
    for (user, perm) in &meta.access_list {
        fields.push(format!("{user},{}", perm.as_str()));
    }
    fields.join(";")
}

fn parse_file_record(line: &str) -> Option<FileMetadata> {
    let mut parts = line.split(';');
    let filename = parts.next()?.to_string();
    let owner = parts.next()?.to_string();
    let ip = parts.next()?;
    let port: u16 = parts.next()?.parse().ok()?;
    let ss: SocketAddr = format!("{ip}:{port}").parse().ok()?;

    let mut meta = FileMetadata::new(filename, owner, ss);
    for field in parts {
        let (user, perm) = field.split_once(',')?;
        let perm = Permission::parse(perm)?;
        meta.access_list.push((user.to_string(), perm));
    }
    Some(meta)
}

pub fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}
