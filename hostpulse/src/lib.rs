//! hostpulse consumer: maintains a session against a hostpulse agent and
//! surfaces its snapshot stream, with a point-polling fallback.

pub mod poller;
pub mod session;
pub mod types;
pub mod ws;
