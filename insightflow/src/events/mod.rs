//! Progress event delivery.
//!
//! Every workflow log entry is mirrored to an [`EventSink`] as a
//! [`ProgressEvent`](crate::core::ProgressEvent).

mod sink;

pub use sink::{ChannelEventSink, CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
