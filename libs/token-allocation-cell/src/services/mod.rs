pub mod allocation;
pub mod locks;
pub mod memory_store;
pub mod redis_store;
pub mod slot_book;
pub mod slot_registry;
pub mod store;
pub mod token_number;

pub use allocation::*;
pub use locks::SlotLocks;
pub use memory_store::InMemoryTokenStore;
pub use redis_store::RedisTokenStore;
pub use slot_book::{priority_order, SlotBook};
pub use slot_registry::*;
pub use store::*;
pub use token_number::*;
