//! Collaborator seams: something that delivers ready items, something that emits new ones

use async_trait::async_trait;

use crate::domain::{RawItem, WorkItem};
use crate::error::Result;
use crate::storage::StateStore;

/// Delivers one ready item to the outside world (mail transport, social poster)
#[async_trait]
pub trait Sender: Send + Sync {
    fn name(&self) -> &str;

    /// Verb embedded in the Done filename after a successful delivery
    fn tag(&self) -> &str {
        "sent"
    }

    /// Deliver the item; an error leaves it in its ready lane for the next poll
    async fn send(&self, item: &WorkItem) -> Result<()>;
}

/// Emits new items (mailbox poller, chat watcher, inbox folder)
#[async_trait]
pub trait Source: Send + Sync {
    fn name(&self) -> &str;

    /// Fetch candidate items
    ///
    /// `state` is the producer's dedup state; sources may use it to skip work for ids
    /// already admitted. Admission re-checks it either way.
    async fn poll(&self, state: &StateStore) -> Result<Vec<RawItem>>;
}
