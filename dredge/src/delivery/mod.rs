//! Deduplicating delivery to external listeners.
//!
//! One session per connected listener: bus subscriptions feed a bounded
//! queue, a drain task forwards each message identity at most once per TTL
//! window, and an inbound read deadline ends idle sessions.

mod adapter;
mod dedup;

pub use adapter::{
    DeliveryConfig, DeliverySession, InboundFrame, InboundSource, OutboundSink, SessionEnd,
};
pub use dedup::DedupCache;
