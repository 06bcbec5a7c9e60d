pub mod context;

pub use context::{ContextMemory, MemorySnapshot};
