//! Request handlers, grouped by endpoint.

pub mod client;
pub mod content;
pub mod stubs;
