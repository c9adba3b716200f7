pub mod command;
pub mod engine;
pub mod memory;

pub use command::Command;
pub use engine::{KeyValueStore, WatchGuard};
pub use memory::MemoryStore;
