//! A small distributed file service: a name server that owns metadata
//! and authorization, one or more storage servers that own file bytes,
//! and an interactive client that multiplexes a persistent NS session
//! with short-lived SS sessions (§1-§2).

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
pub mod ns;
pub mod protocol;
pub mod ss;
