//! Typed facade over the `ldap3` directory client.
//!
//! This crate opens one authenticated session to a directory server and
//! exposes entry-level create/read/update helpers. Entries are attribute-bag
//! objects that track which attributes changed since load, so a save sends a
//! minimal replace request.

#![deny(missing_docs)]

mod client;
mod config;
mod entry;

pub use client::{DirectoryClient, RawEntry, SearchScope};
pub use config::{
    DirectoryConfig, Protocol, DEFAULT_CONNECTION_TIMEOUT_SECS, DEFAULT_LDAPS_PORT,
    DEFAULT_LDAP_PORT, DEFAULT_OPERATION_TIMEOUT_SECS,
};
pub use entry::{AttrValue, Entry};

/// Convenient result alias that reuses the core error type.
pub type Result<T> = directory_core::Result<T>;
