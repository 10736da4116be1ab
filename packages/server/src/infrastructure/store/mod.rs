//! Store implementations and the background persistence queue.

pub mod inmemory;
pub mod queue;

pub use inmemory::InMemoryStore;
pub use queue::PersistenceQueue;
