//! Port implementations.

pub mod memory;

pub use memory::{CountingEventLog, InMemoryEntityStore, InMemoryIdentityStore, InMemoryShareStore};
