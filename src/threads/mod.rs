//! Thread identity: one durable server-side thread per workspace.

pub mod resolver;

pub use resolver::ThreadResolver;
