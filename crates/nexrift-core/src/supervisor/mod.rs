//! Supervisor implementation submodules.
//!
//! Each submodule contains `impl Supervisor` blocks for one concern. The
//! struct definition remains in `lib.rs`.

mod apps;
mod builder;
mod lifecycle;
mod shutdown;
mod state;
mod status;


pub use builder::SupervisorBuilder;
pub use shutdown::{ShutdownCoordinator, ShutdownReport};
pub(crate) use state::SupervisorState;
