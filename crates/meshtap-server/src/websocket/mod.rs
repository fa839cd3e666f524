//! WebSocket subscribers: gateway, session lifecycle and fan-out.
//!
//! `gateway` takes a connection slot for each upgrade on `/ws` → `session`
//! registers a [`subscriber::Subscriber`] with the [`hub::BroadcastHub`] →
//! `hub` pushes every record to each subscriber's queue.

pub mod gateway;
pub mod hub;
pub mod session;
pub mod slots;
pub mod subscriber;

pub use hub::{BroadcastHub, PublishReport};
pub use subscriber::{Subscriber, SubscriberId};
