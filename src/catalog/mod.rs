//! The name server's in-memory catalog: users, storage servers, files,
//! and a bounded "recently touched" cache, each under its own lock
//! (SPEC_FULL §E.3). Call sites that need more than one must acquire
//! them in the fixed order `users < ss_registry < files < cache` to
//! keep the lock order uniform across the whole server; NS-to-SS calls
//! never happen while any of these are held. `pending_creates` is a
//! separate lock consulted only by the CREATE reservation path
//! (`try_begin_create`/`finish_create`/`cancel_create`); it is never
//! held at the same time as `files`, so it carries no position in that
//! ordering.

pub mod files;
pub mod hash_index;
pub mod lru;
pub mod persist;
pub mod ss_registry;
pub mod types;
pub mod users;

use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::PathBuf;

use tokio::sync::Mutex;

use files::FileTable;
use lru::LruCache;
use ss_registry::SsRegistry;
use types::FileMetadata;
use users::UserRegistry;

pub struct CatalogService {
    pub users: Mutex<UserRegistry>,
    pub ss_registry: Mutex<SsRegistry>,
    pub files: Mutex<FileTable>,
    pub cache: Mutex<LruCache>,
    /// Filenames reserved by a CREATE that is still waiting on the
    /// storage server's `ACK_CREATE` (§4.3, SPEC_FULL §E.5). Deliberately
    /// not a `FileMetadata` row: nothing outside the CREATE reservation
    /// path ever looks here, so a file mid-creation stays invisible to
    /// `get`/`touch_and_get`/`exists` and every handler built on them
    /// until the SS has actually ACKed and `finish_create` installs the
    /// real row — the SS-ACK-happens-before-catalog-mutation ordering
    /// the spec requires.
    pending_creates: Mutex<HashSet<String>>,
    data_dir: PathBuf,
}

impl CatalogService {
    pub fn new(data_dir: PathBuf) -> Self {
        CatalogService {
            users: Mutex::new(UserRegistry::new()),
            ss_registry: Mutex::new(SsRegistry::new()),
            files: Mutex::new(FileTable::new()),
            cache: Mutex::new(LruCache::new()),
            pending_creates: Mutex::new(HashSet::new()),
            data_dir,
        }
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    /// Register a user, recording or refreshing their last known address.
    pub async fn register_user(&self, username: &str, address: SocketAddr) {
        self.users.lock().await.register(username, address);
    }

    /// Register a storage server and fold any files it reports holding
    /// into the catalog, installing `SS_OWNER_SENTINEL` rows for files the
    /// catalog has never heard of (§3, SPEC_FULL §E.2).
    pub async fn register_storage_server(
        &self,
        endpoint: SocketAddr,
        known_files: std::collections::BTreeSet<String>,
    ) {
        {
            let mut ss_registry = self.ss_registry.lock().await;
            ss_registry.register(endpoint, known_files.clone());
        }
        let mut files = self.files.lock().await;
        for filename in known_files {
            if files.find(&filename).is_none() {
                files.insert(FileMetadata::new(
                    filename,
                    types::SS_OWNER_SENTINEL.to_string(),
                    endpoint,
                ));
            }
        }
    }

    /// Resolve a filename to its catalog slot: LRU cache first, then the
    /// hash index on a cache miss, promoting the hash-index hit into the
    /// cache (§4.2: "Lookup goes: LRU cache → hash index → miss. On
    /// hash-index hit, the entry is inserted into the cache.").
    async fn resolve_slot(&self, filename: &str) -> Option<usize> {
        if let Some(slot) = self.cache.lock().await.get(filename) {
            return Some(slot);
        }
        let slot = self.files.lock().await.find(filename)?;
        self.cache.lock().await.put(filename, slot);
        Some(slot)
    }

    /// Look up a file by name, bumping its `last_access_time` and its
    /// position in the recency cache. Returns a clone so callers don't
    /// hold the catalog lock while talking to a storage server.
    pub async fn touch_and_get(&self, filename: &str) -> Option<FileMetadata> {
        let slot = self.resolve_slot(filename).await?;
        let meta = {
            let mut files = self.files.lock().await;
            let m = files.get_mut(slot)?;
            m.touch();
            m.clone()
        };
        // A touch is itself a fresh access, so keep the entry at the head.
        self.cache.lock().await.put(filename, slot);
        Some(meta)
    }

    pub async fn get(&self, filename: &str) -> Option<FileMetadata> {
        let slot = self.resolve_slot(filename).await?;
        self.files.lock().await.get(slot).cloned()
    }

    /// Whether `username` is registered, used to gate operations that
    /// name another user as a target (§7: `105 user not found`).
    pub async fn user_exists(&self, username: &str) -> bool {
        self.users.lock().await.contains(username)
    }

    pub async fn exists(&self, filename: &str) -> bool {
        self.files.lock().await.find(filename).is_some()
    }

    /// Insert a brand-new file row. Caller is responsible for having
    /// confirmed the name is free; prefer [`Self::try_reserve_file`] when
    /// that check and the insert need to be atomic (CREATE).
    pub async fn insert_file(&self, meta: FileMetadata) {
        let filename = meta.filename.clone();
        let mut files = self.files.lock().await;
        let slot = files.insert(meta);
        drop(files);
        self.cache.lock().await.put(&filename, slot);
    }

    /// Check-and-insert under a single lock hold, closing the gap between
    /// an `exists` check and a later `insert_file` that two concurrent
    /// callers creating the same name would otherwise race through.
    /// Returns `false` without mutating anything if the name is already
    /// taken. Safe for operations with no external ACK to wait on (e.g.
    /// `CREATEFOLDER`, which is catalog-only); CREATE's SS-backed
    /// reservation uses [`Self::try_begin_create`] instead so the real
    /// row is never visible before the SS's `ACK_CREATE`.
    pub async fn try_reserve_file(&self, meta: FileMetadata) -> bool {
        let filename = meta.filename.clone();
        let mut files = self.files.lock().await;
        if files.find(&filename).is_some() {
            return false;
        }
        let slot = files.insert(meta);
        drop(files);
        self.cache.lock().await.put(&filename, slot);
        true
    }

    /// Reserve `filename` for an in-flight CREATE without installing any
    /// `FileMetadata` row, so read paths (`get`/`touch_and_get`/`exists`)
    /// stay blind to it until [`Self::finish_create`] runs (§4.3, §5,
    /// SPEC_FULL §E.5). Holds the `files` lock for the whole check so a
    /// second concurrent reservation attempt for the same name blocks
    /// until this one has recorded its entry in `pending_creates`,
    /// closing the same race [`Self::try_reserve_file`] closes for a
    /// plain insert. Returns `false` if the name is already a real file
    /// or already reserved by another in-flight CREATE.
    pub async fn try_begin_create(&self, filename: &str) -> bool {
        let files = self.files.lock().await;
        if files.find(filename).is_some() {
            return false;
        }
        let mut pending = self.pending_creates.lock().await;
        pending.insert(filename.to_string())
    }

    /// Release a reservation taken by [`Self::try_begin_create`] without
    /// installing a row, for when the SS call fails (§4.3: "a failed
    /// NS↔SS round trip never mutates catalog").
    pub async fn cancel_create(&self, filename: &str) {
        self.pending_creates.lock().await.remove(filename);
    }

    /// Consume a reservation taken by [`Self::try_begin_create`] and
    /// install the real row now that the SS has ACKed, identical in
    /// shape to DELETE's ACK-gated catalog mutation (SPEC_FULL §E.5).
    pub async fn finish_create(&self, meta: FileMetadata) {
        let filename = meta.filename.clone();
        self.pending_creates.lock().await.remove(&filename);
        self.insert_file(meta).await;
    }

    /// Remove a file row and its cache entry, returning the removed row.
    pub async fn remove_file(&self, filename: &str) -> Option<FileMetadata> {
        let removed = self.files.lock().await.remove(filename);
        if removed.is_some() {
            self.cache.lock().await.remove(filename);
        }
        removed
    }

    /// Mutate a file row in place under the files lock.
    pub async fn with_file_mut<F, R>(&self, filename: &str, f: F) -> Option<R>
    where
        F: FnOnce(&mut FileMetadata) -> R,
    {
        let mut files = self.files.lock().await;
        let meta = files.get_mut_by_name(filename)?;
        Some(f(meta))
    }

    pub async fn list_files(&self) -> Vec<FileMetadata> {
        self.files.lock().await.iter().cloned().collect()
    }

    pub async fn list_usernames(&self) -> Vec<String> {
        let mut names = self.users.lock().await.names();
        names.sort();
        names
    }

    pub async fn resolve_user_address(&self, username: &str) -> Option<SocketAddr> {
        self.users.lock().await.get(username).map(|u| u.last_known_address)
    }

    pub async fn any_storage_server(&self) -> Option<SocketAddr> {
        self.ss_registry.lock().await.any_endpoint()
    }

    /// Fold a freshly created file into a storage server's known-files
    /// set, so a later restart's `register_storage_server` (from its
    /// `REGISTER_SS` advertisement) agrees with what the catalog already
    /// holds instead of re-synthesizing an `ss_owner` row for it.
    pub async fn note_known_file(&self, endpoint: SocketAddr, filename: &str) {
        self.ss_registry.lock().await.note_known_file(endpoint, filename);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:9001".parse().unwrap()
    }

    #[tokio::test]
    async fn pending_create_is_invisible_to_get_and_exists() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CatalogService::new(dir.path().to_path_buf());

        assert!(catalog.try_begin_create("notes.txt").await);
        assert!(catalog.get("notes.txt").await.is_none());
        assert!(!catalog.exists("notes.txt").await);

        catalog
            .finish_create(FileMetadata::new("notes.txt".to_string(), "alice".to_string(), addr()))
            .await;
        assert!(catalog.get("notes.txt").await.is_some());
        assert!(catalog.exists("notes.txt").await);
    }

    #[tokio::test]
    async fn second_reservation_of_the_same_name_fails_while_first_is_pending() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CatalogService::new(dir.path().to_path_buf());

        assert!(catalog.try_begin_create("notes.txt").await);
        assert!(!catalog.try_begin_create("notes.txt").await);
    }

    #[tokio::test]
    async fn cancel_create_frees_the_name_for_a_later_reservation() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CatalogService::new(dir.path().to_path_buf());

        assert!(catalog.try_begin_create("notes.txt").await);
        catalog.cancel_create("notes.txt").await;
        assert!(catalog.try_begin_create("notes.txt").await);
        assert!(catalog.get("notes.txt").await.is_none());
    }

    #[tokio::test]
    async fn try_begin_create_rejects_a_name_already_taken_by_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = CatalogService::new(dir.path().to_path_buf());
        catalog.insert_file(FileMetadata::new("notes.txt".to_string(), "alice".to_string(), addr())).await;

        assert!(!catalog.try_begin_create("notes.txt").await);
    }
}
