//! The message substrate all Conductor components share: pub/sub channel
//! fan-out plus named, bounded-effort priority task queues.
//!
//! The [`Broker`] decouples producers and consumers. Publishing to a channel
//! with no subscribers is a normal, loggable condition (`Ok == false`), not
//! an error. Dequeueing from an empty queue is a normal "no work" signal.
//! After [`Broker::shutdown`] every operation fails closed instead of
//! blocking; callers treat that as degraded-but-continuing.

/// The broker facade: channels, queues, statistics.
mod broker;
/// Priority-then-FIFO task queues.
mod queue;

pub use broker::{Broker, BrokerStats, Subscription};
pub use queue::TaskQueue;
