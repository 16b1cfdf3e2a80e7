//! In-process publish/subscribe.

mod bus;
mod envelope;

pub use bus::{PubSub, SubscriptionHandle};
pub use envelope::Envelope;

/// Topic every ingested chat message is published on.
pub const GLOBAL_TOPIC: &str = "global";
