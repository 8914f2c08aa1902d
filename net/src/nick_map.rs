//! Concurrent address → nickname store.

use std::{collections::HashMap, net::SocketAddr, sync::RwLock};

/// Maps ring identities to display names.  Lookup falls back to the
/// textual address, so a node without a nickname still has a stable name.
/// Entries are never evicted.
#[derive(Debug, Default)]
pub struct NickMap {
    nicks: RwLock<HashMap<SocketAddr, String>>,
}

impl NickMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the nickname for a node.  Last writer wins.
    pub fn set(&self, node: SocketAddr, name: String) {
        self.nicks
            .write()
            .expect("nick map lock poisoned")
            .insert(node, name);
    }

    /// The display name for a node: its nickname if one was set,
    /// otherwise its textual address.
    pub fn get(&self, node: SocketAddr) -> String {
        self.nicks
            .read()
            .expect("nick map lock poisoned")
            .get(&node)
            .cloned()
            .unwrap_or_else(|| node.to_string())
    }
}
