//! `sonarmap-middleware` – moves messages without caring what they mean.
//!
//! # Modules
//!
//! - [`bus`] – typed, topic-lane publish/subscribe event bus built on Tokio
//!   broadcast channels.
//! - [`codec`] – decodes raw topic payloads (pose, range, combined frames)
//!   into [`MapEvent`][sonarmap_types::MapEvent]s.
//! - [`source`] – the [`MessageSource`] trait every producer implements, plus
//!   the NDJSON [`ReplaySource`] and in-process [`ChannelSource`].

pub mod bus;
pub mod codec;
pub mod source;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use codec::{Route, TopicMap};
pub use source::{ChannelSource, MessageSource, RawMessage, ReplaySource};
