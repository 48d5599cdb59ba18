//! The `client` module holds what feature code builds on top of the
//! connection manager: composing outbound messages, observing inbound
//! events, and keeping a time-ordered message list.

pub mod composer;
pub mod message_list;
pub mod sync;

pub use composer::{MessageComposer, SendOutcome};
pub use message_list::{ListView, MessageList};
pub use sync::{OnEvent, SyncSubscription};
