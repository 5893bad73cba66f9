//! Streaming helpers shared by the HTTP model providers.
//!
//! [`Chunks`] adapts a response body into a pull-based byte stream, and
//! [`Sse`] reads server-sent events from it.

#![deny(missing_docs)]

mod chunks;
mod sse;

pub use chunks::{Chunks, Error as ChunksError};
pub use sse::{Error, Event, Sse};
