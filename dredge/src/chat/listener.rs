//! Message handler seam.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::error;

use super::ChatMessage;

/// Receives every chat message of the session.
#[async_trait]
pub trait MessageListener: Send + Sync {
    async fn on_message(&self, message: ChatMessage);
}

/// Single replaceable handler slot.
///
/// Dispatch clones the current `Arc` out of the lock, so a delivery already
/// in flight may still reach a handler that was replaced meanwhile.
#[derive(Default)]
pub(crate) struct ListenerSlot {
    inner: RwLock<Option<Arc<dyn MessageListener>>>,
}

impl ListenerSlot {
    pub fn set(&self, listener: Arc<dyn MessageListener>) {
        *self.inner.write() = Some(listener);
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    pub fn is_set(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Deliver to the current handler. Panics are logged and swallowed.
    pub async fn dispatch(&self, message: ChatMessage) {
        let current = self.inner.read().clone();
        let Some(listener) = current else {
            return;
        };

        let id = message.id.clone();
        let channel = message.channel.clone();
        if let Err(panic) = AssertUnwindSafe(listener.on_message(message))
            .catch_unwind()
            .await
        {
            error!(
                message_id = %id,
                channel = %channel,
                panic = %crate::panic_hook::payload_message(panic.as_ref()),
                "Message listener panicked"
            );
        }
    }
}
