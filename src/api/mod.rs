//! C boundary: error channel, string arena, JSON handlers and entry points.

pub mod arena;
pub mod dispatcher;
pub mod error_channel;
pub mod ffi;
pub mod handlers;
pub mod types;
