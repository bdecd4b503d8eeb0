//! Data models for NexRift.
//!
//! These map directly to the JSON the dashboard consumes, so field names
//! follow the wire format rather than Rust naming.

mod api_response;
mod app;
mod responses;

pub use api_response::*;
pub use app::*;
pub use responses::*;
