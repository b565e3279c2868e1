//! Message History Reconciler: turns finished streams and server history into
//! the persisted message list.

pub mod reconciler;

pub use reconciler::HistoryReconciler;
