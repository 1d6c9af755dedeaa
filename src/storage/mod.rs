//! In-memory document store implementing the driver traits.

pub mod filter;
pub mod memory;

pub use memory::{MemoryClient, MemoryCollection, MemoryConnector, MemoryDatabase, MemoryServer};
