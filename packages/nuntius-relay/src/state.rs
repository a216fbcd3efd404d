//! Relay state: the connected-peer channel table and a handle to the
//! durable key store.
//!
//! The channel table maps each connected identity to the sender side of its
//! writer task. It is written only on connect and disconnect and read on
//! every routed frame, so it sits behind a many-reader/one-writer lock.
//! Entries are mutually exclusive — at most one live entry per identity.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;

use nuntius_core::protocol::Message;
use nuntius_core::IdentityPub;

use crate::store::RelayStore;

/// A connected client's channel to its writer task.
pub type ClientSender = mpsc::UnboundedSender<Message>;

/// Shared relay state.
#[derive(Clone)]
pub struct RelayState {
    /// identity → writer channel for connected clients
    channels: Arc<RwLock<HashMap<IdentityPub, ClientSender>>>,

    /// Durable pre-key / one-time store
    pub store: Arc<RelayStore>,
}

impl RelayState {
    /// Create relay state around an opened store.
    pub fn new(store: RelayStore) -> Self {
        Self {
            channels: Arc::new(RwLock::new(HashMap::new())),
            store: Arc::new(store),
        }
    }

    /// Register a connected identity. A reconnecting identity replaces its
    /// previous channel.
    pub fn register(&self, identity: IdentityPub, sender: ClientSender) {
        tracing::info!(identity = %identity, "client connected");
        self.channels.write().insert(identity, sender);
    }

    /// Remove an identity's channel on disconnect.
    pub fn unregister(&self, identity: &IdentityPub) {
        tracing::info!(identity = %identity, "client disconnected");
        self.channels.write().remove(identity);
    }

    /// Whether an identity currently has a live channel.
    pub fn is_connected(&self, identity: &IdentityPub) -> bool {
        self.channels.read().contains_key(identity)
    }

    /// Push a frame onto a connected identity's channel.
    ///
    /// Returns false when the identity has no live channel (the frame is
    /// dropped — there is no store-and-forward).
    pub fn send_to(&self, identity: &IdentityPub, message: Message) -> bool {
        match self.channels.read().get(identity) {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }

    /// Number of connected identities.
    pub fn connected_count(&self) -> usize {
        self.channels.read().len()
    }
}
