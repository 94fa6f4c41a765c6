//! User registry: `username -> last_known_address` (§3). Registration of
//! an already-known username updates the address in place.

use std::collections::HashMap;
use std::net::SocketAddr;

use super::types::User;

#[derive(Default)]
pub struct UserRegistry {
    users: HashMap<String, User>,
}

impl UserRegistry {
    pub fn new() -> Self {
        UserRegistry::default()
    }

    pub fn register(&mut self, username: &str, address: SocketAddr) {
        self.users
            .entry(username.to_string())
            .and_modify(|u| u.last_known_address = address)
            .or_insert_with(|| User { username: username.to_string(), last_known_address: address });
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn get(&self, username: &str) -> Option<&User> {
        self.users.get(username)
    }

    /// Usernames in registration order is not preserved (a `HashMap`
    /// makes no such promise); callers that print a list sort it first.
    pub fn names(&self) -> Vec<String> {
        self.users.keys().cloned().collect()
    }
}
