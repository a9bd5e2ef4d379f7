//! Client side of Parley: an optimistic sync engine over a per-conversation
//! cache, plus the REST and gateway transports that feed it.

pub mod cache;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod http;
