//! Headless chat screen: the live message list and its single active stream.

pub mod chat;

pub use chat::{CancelHandle, ChatSession, ExchangeOutcome};
