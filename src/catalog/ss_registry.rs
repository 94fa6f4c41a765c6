//! Storage-server registry: `(ip, port) -> known_files` (§3).
//! Registration is idempotent on the endpoint; re-registering a server
//! that already exists folds in any newly advertised files rather than
//! replacing the set.

use std::collections::{BTreeSet, HashMap};
use std::net::SocketAddr;

use super::types::StorageServer;

#[derive(Default)]
pub struct SsRegistry {
    servers: HashMap<SocketAddr, StorageServer>,
    /// Registration order, oldest first. A `HashMap` alone would make
    /// "pick the head of the SS registry" (§4.1 tie-break) depend on
    /// hash iteration order instead of arrival order; this keeps the
    /// tie-break simple *and* deterministic as specified.
    order: Vec<SocketAddr>,
}

impl SsRegistry {
    pub fn new() -> Self {
        SsRegistry::default()
    }

    pub fn register(&mut self, endpoint: SocketAddr, known_files: BTreeSet<String>) {
        if !self.servers.contains_key(&endpoint) {
            self.order.push(endpoint);
        }
        self.servers
            .entry(endpoint)
            .and_modify(|ss| ss.known_files.extend(known_files.iter().cloned()))
            .or_insert_with(|| StorageServer { endpoint, known_files });
    }

    pub fn contains(&self, endpoint: &SocketAddr) -> bool {
        self.servers.contains_key(endpoint)
    }

    pub fn get(&self, endpoint: &SocketAddr) -> Option<&StorageServer> {
        self.servers.get(endpoint)
    }

    pub fn note_known_file(&mut self, endpoint: SocketAddr, filename: &str) {
        if !self.servers.contains_key(&endpoint) {
            self.order.push(endpoint);
        }
        self.servers
            .entry(endpoint)
            .and_modify(|ss| {
                ss.known_files.insert(filename.to_string());
            })
            .or_insert_with(|| {
                let mut known_files = BTreeSet::new();
                known_files.insert(filename.to_string());
                StorageServer { endpoint, known_files }
            });
    }

    /// The earliest-registered endpoint still on the books, used as the
    /// deterministic tie-break for "which SS hosts a new file" (§4.1:
    /// "pick the head of the SS registry ... replaceable by round-robin
    /// or free-space policy without changing callers").
    pub fn any_endpoint(&self) -> Option<SocketAddr> {
        self.order.first().copied()
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }
}
