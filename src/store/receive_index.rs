use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

/// Side index of pre-registered "expected receive" metadata, written when
/// an address is generated for receiving. The address resolver consults it
/// to attribute inbound onchain payments whose address the node did not
/// track.
#[async_trait]
pub trait ReceiveIndex: Send + Sync {
    /// True when `address` was registered with receive intent.
    async fn is_receive_address(&self, address: &str) -> anyhow::Result<bool>;
}

/// In-memory `ReceiveIndex`.
#[derive(Debug, Default)]
pub struct MemoryReceiveIndex {
    // address -> receive intent
    entries: RwLock<HashMap<String, bool>>,
}

impl MemoryReceiveIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, address: &str, receive_intent: bool) {
        self.entries
            .write()
            .await
            .insert(address.to_string(), receive_intent);
    }
}

#[async_trait]
impl ReceiveIndex for MemoryReceiveIndex {
    async fn is_receive_address(&self, address: &str) -> anyhow::Result<bool> {
        Ok(self
            .entries
            .read()
            .await
            .get(address)
            .copied()
            .unwrap_or(false))
    }
}
