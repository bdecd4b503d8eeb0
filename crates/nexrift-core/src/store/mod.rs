//! App definition persistence.

mod atomic;
mod config_store;

pub use atomic::{backup_path, JsonFile, Loaded};
pub use config_store::{ConfigStore, JsonConfigStore, MemoryConfigStore};
