//! Catalog value types (§3 DATA MODEL). The catalog exclusively owns
//! these; storage servers never see them.

use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};

/// Read/write permission granted to a non-owner (owner permission is
/// implicit and not stored in `access_list`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Permission {
    Read,
    Write,
}

impl Permission {
    pub fn parse(s: &str) -> Option<Permission> {
        match s {
            "R" => Some(Permission::Read),
            "W" => Some(Permission::Write),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Read => "R",
            Permission::Write => "W",
        }
    }
}

/// `{ username (unique key), last_known_address }` (§3). Re-registration
/// updates the address in place rather than creating a duplicate.
#[derive(Debug, Clone)]
pub struct User {
    pub username: String,
    pub last_known_address: SocketAddr,
}

/// `{ endpoint = (ip, port), known_files }` (§3). Registration is
/// idempotent on `(ip, port)`.
#[derive(Debug, Clone)]
pub struct StorageServer {
    pub endpoint: SocketAddr,
    pub known_files: BTreeSet<String>,
}

/// Owner sentinel installed when a storage server advertises a file the
/// catalog has never seen (§3).
pub const SS_OWNER_SENTINEL: &str = "ss_owner";

/// One `(file, requesting_user)` pending slot, created by
/// `REQUESTACCESS` and consumed by `APPROVE`/`REJECT` (§3, SPEC_FULL §E.2).
pub type AccessRequest = String;

/// `{ filename (unique key), owner, ss, word_count, char_count,
/// last_access_time, access_list, pending_requests, annotation,
/// is_directory }` (§3).
#[derive(Debug, Clone)]
pub struct FileMetadata {
    pub filename: String,
    pub owner: String,
    /// Weak lookup-only reference, resolved through the SS registry by
    /// endpoint — never an owning pointer (§9).
    pub ss: SocketAddr,
    pub word_count: usize,
    pub char_count: usize,
    pub last_access_time: SystemTime,
    pub access_list: Vec<(String, Permission)>,
    pub pending_requests: Vec<AccessRequest>,
    pub annotation: String,
    pub is_directory: bool,
}

impl FileMetadata {
    pub fn new(filename: String, owner: String, ss: SocketAddr) -> Self {
        FileMetadata {
            filename,
            owner,
            ss,
            word_count: 0,
            char_count: 0,
            last_access_time: SystemTime::now(),
            access_list: Vec::new(),
            pending_requests: Vec::new(),
            annotation: String::new(),
            is_directory: false,
        }
    }

    pub fn directory(filename: String, owner: String, ss: SocketAddr) -> Self {
        let mut f = Self::new(filename, owner, ss);
        f.is_directory = true;
        f
    }

    /// `owner(f,u) ⇒ allow(R)∧allow(W)`; `(u,W)` implies R and W; `(u,R)`
    /// implies R only (§8 testable invariant).
    pub fn permits(&self, username: &str, perm: Permission) -> bool {
        if self.owner == username {
            return true;
        }
        self.access_list.iter().any(|(u, p)| {
            u == username && (*p == perm || (*p == Permission::Write && perm == Permission::Read))
        })
    }

    pub fn touch(&mut self) {
        self.last_access_time = SystemTime::now();
    }

    /// Seconds since the Unix epoch, for persistence/printing.
    pub fn last_access_unix(&self) -> u64 {
        self.last_access_time
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }
}
